use crate::protocol::TvSnapshot;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The single shared playback state.  Written only by the channel
/// controller's input handlers; everyone else reads.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    is_muted: bool,
    volume_level: u8,
    current_channel: usize,
    is_channel_changing: bool,
}

impl PlaybackState {
    pub fn new(start_muted: bool, volume_level: u8) -> Self {
        Self {
            is_muted: start_muted,
            volume_level: volume_level.min(100),
            current_channel: 0,
            is_channel_changing: false,
        }
    }

    pub fn is_muted(&self) -> bool {
        self.is_muted
    }

    pub fn volume_level(&self) -> u8 {
        self.volume_level
    }

    pub fn current_channel(&self) -> usize {
        self.current_channel
    }

    /// Set while the static window or the incoming channel's load is pending.
    /// Suppresses the outgoing surface's manual loop restart.
    pub fn is_channel_changing(&self) -> bool {
        self.is_channel_changing
    }

    /// Volume the listener actually hears, 0.0 while muted.
    pub fn effective_volume(&self) -> f32 {
        if self.is_muted {
            0.0
        } else {
            f32::from(self.volume_level) / 100.0
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.is_muted = muted;
    }

    /// Add `delta` and clamp to 0..=100.  Returns the new level.
    pub fn adjust_volume(&mut self, delta: i32) -> u8 {
        let level = (i32::from(self.volume_level) + delta).clamp(0, 100);
        self.volume_level = level as u8;
        self.volume_level
    }

    pub fn set_volume(&mut self, level: u8) {
        self.volume_level = level.min(100);
    }

    /// Caller guarantees `index` is valid for the active playlist.
    pub fn set_current_channel(&mut self, index: usize) {
        self.current_channel = index;
    }

    pub fn set_channel_changing(&mut self, changing: bool) {
        self.is_channel_changing = changing;
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new(true, 50)
    }
}

/// Holds the last published [`TvSnapshot`] for readers outside the core loop
/// (HTTP API).
#[derive(Clone, Default)]
pub struct StateManager {
    state: Arc<RwLock<TvSnapshot>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_state(&self) -> TvSnapshot {
        self.state.read().await.clone()
    }

    /// Replace the snapshot, bumping `rev` only when something changed.
    pub async fn publish(&self, mut snapshot: TvSnapshot) -> u64 {
        let mut state = self.state.write().await;
        snapshot.rev = state.rev;
        if snapshot != *state {
            snapshot.rev = state.rev + 1;
            *state = snapshot;
        }
        state.rev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_is_clamped() {
        let mut state = PlaybackState::new(false, 50);
        assert_eq!(state.adjust_volume(-1000), 0);
        assert_eq!(state.adjust_volume(1000), 100);
        state.set_volume(250);
        assert_eq!(state.volume_level(), 100);
        assert_eq!(PlaybackState::new(true, 180).volume_level(), 100);
    }

    #[test]
    fn test_muted_means_silent() {
        let mut state = PlaybackState::new(true, 80);
        assert_eq!(state.effective_volume(), 0.0);
        state.set_muted(false);
        assert_eq!(state.effective_volume(), 0.8);
    }

    #[tokio::test]
    async fn test_publish_bumps_rev_only_on_change() {
        let manager = StateManager::new();
        let snapshot = TvSnapshot {
            volume_level: 50,
            ..Default::default()
        };
        assert_eq!(manager.publish(snapshot.clone()).await, 1);
        assert_eq!(manager.publish(snapshot.clone()).await, 1);
        let louder = TvSnapshot {
            volume_level: 55,
            ..snapshot
        };
        assert_eq!(manager.publish(louder).await, 2);
        assert_eq!(manager.get_state().await.volume_level, 55);
    }
}
