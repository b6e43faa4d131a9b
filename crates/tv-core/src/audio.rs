//! Audio graph seam and the unlock gate.
//!
//! On platforms that route playback through an audio graph the primary
//! surface is connected as `source -> gain -> destination`.  A surface can be
//! connected only once, so every graph operation is guarded by a presence
//! check and the gate forgets the graph when the surface is torn down.

use thiserror::Error;
use tracing::{debug, info, warn};
use tv_proto::platform::PlatformCapabilities;
use tv_proto::state::PlaybackState;

use crate::surface::{SurfaceId, VideoSurface};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioContextState {
    Missing,
    Suspended,
    Running,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AudioError {
    #[error("audio context unavailable: {0}")]
    ContextUnavailable(String),
    #[error("surface {0:?} already has a media source")]
    SourceAlreadyConnected(SurfaceId),
    #[error("audio graph error: {0}")]
    Graph(String),
}

pub trait AudioGraph {
    fn context_state(&self) -> AudioContextState;
    fn create_context(&mut self) -> Result<(), AudioError>;
    fn resume(&mut self) -> Result<(), AudioError>;
    /// Create the media-element source for `surface`.
    fn connect_source(&mut self, surface: SurfaceId) -> Result<(), AudioError>;
    /// Create the gain node between the source and the destination.
    fn create_gain(&mut self, gain: f32) -> Result<(), AudioError>;
    fn set_gain(&mut self, gain: f32);
    /// Drop the source and gain nodes.  The context survives.
    fn disconnect(&mut self);
}

/// Gain node value for the current state.
pub fn gain_for(state: &PlaybackState, caps: &PlatformCapabilities) -> f32 {
    if state.is_muted() {
        0.0
    } else {
        caps.audible_volume(state.volume_level())
    }
}

/// Idempotent "make sound possible" step run on every unmute.  Failures are
/// logged and never propagate to the caller.
#[derive(Debug, Default)]
pub struct UnlockGate {
    source: Option<SurfaceId>,
    gain_node: bool,
}

impl UnlockGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_graph(&self) -> bool {
        self.source.is_some()
    }

    pub fn unlock(
        &mut self,
        surface: Option<&mut dyn VideoSurface>,
        state: &PlaybackState,
        caps: &PlatformCapabilities,
        audio: &mut dyn AudioGraph,
    ) {
        if caps.uses_audio_graph {
            match audio.context_state() {
                AudioContextState::Missing => match audio.create_context() {
                    Ok(()) => info!("Unlock: audio context created"),
                    Err(e) => warn!("Unlock: could not create audio context: {}", e),
                },
                AudioContextState::Suspended => match audio.resume() {
                    Ok(()) => info!("Unlock: audio context resumed"),
                    Err(e) => warn!("Unlock: could not resume audio context: {}", e),
                },
                AudioContextState::Running => {}
            }
        }

        let Some(surface) = surface else {
            debug!("Unlock: no primary surface yet");
            return;
        };

        if caps.uses_audio_graph {
            self.attach(surface.id(), gain_for(state, caps), audio);
        }

        surface.set_muted(false);
        surface.set_volume(caps.audible_volume(state.volume_level()));
        surface.play();
    }

    /// Connect `surface` to the graph unless it already is.  Needs a context.
    pub fn attach(&mut self, surface: SurfaceId, gain: f32, audio: &mut dyn AudioGraph) {
        if audio.context_state() == AudioContextState::Missing {
            return;
        }

        if self.source != Some(surface) {
            if self.source.is_some() {
                self.reset(audio);
            }
            match audio.connect_source(surface) {
                Ok(()) => {
                    debug!("Unlock: media source connected for {:?}", surface);
                    self.source = Some(surface);
                }
                Err(e) => {
                    warn!("Unlock: could not connect media source: {}", e);
                    return;
                }
            }
        }

        if !self.gain_node {
            match audio.create_gain(gain) {
                Ok(()) => self.gain_node = true,
                Err(e) => warn!("Unlock: could not create gain node: {}", e),
            }
        }
    }

    /// Push the current level into the gain node, if there is one.
    pub fn sync_gain(
        &self,
        state: &PlaybackState,
        caps: &PlatformCapabilities,
        audio: &mut dyn AudioGraph,
    ) {
        if self.gain_node {
            audio.set_gain(gain_for(state, caps));
        }
    }

    /// Forget the graph of a surface that is going away.
    pub fn reset(&mut self, audio: &mut dyn AudioGraph) {
        if self.source.is_some() || self.gain_node {
            audio.disconnect();
        }
        self.source = None;
        self.gain_node = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct CountingGraph {
        context: Option<bool>,
        connected: HashSet<SurfaceId>,
        sources_created: usize,
        gains_created: usize,
        gain: f32,
    }

    impl AudioGraph for CountingGraph {
        fn context_state(&self) -> AudioContextState {
            match self.context {
                None => AudioContextState::Missing,
                Some(false) => AudioContextState::Suspended,
                Some(true) => AudioContextState::Running,
            }
        }

        fn create_context(&mut self) -> Result<(), AudioError> {
            self.context = Some(true);
            Ok(())
        }

        fn resume(&mut self) -> Result<(), AudioError> {
            self.context = Some(true);
            Ok(())
        }

        fn connect_source(&mut self, surface: SurfaceId) -> Result<(), AudioError> {
            if !self.connected.insert(surface) {
                return Err(AudioError::SourceAlreadyConnected(surface));
            }
            self.sources_created += 1;
            Ok(())
        }

        fn create_gain(&mut self, gain: f32) -> Result<(), AudioError> {
            self.gains_created += 1;
            self.gain = gain;
            Ok(())
        }

        fn set_gain(&mut self, gain: f32) {
            self.gain = gain;
        }

        fn disconnect(&mut self) {}
    }

    #[test]
    fn test_attach_is_idempotent() {
        let mut gate = UnlockGate::new();
        let mut graph = CountingGraph {
            context: Some(true),
            ..Default::default()
        };
        for _ in 0..3 {
            gate.attach(SurfaceId(1), 0.5, &mut graph);
        }
        assert_eq!(graph.sources_created, 1);
        assert_eq!(graph.gains_created, 1);
        assert!(gate.has_graph());
    }

    #[test]
    fn test_attach_without_context_does_nothing() {
        let mut gate = UnlockGate::new();
        let mut graph = CountingGraph::default();
        gate.attach(SurfaceId(1), 0.5, &mut graph);
        assert!(!gate.has_graph());
        assert_eq!(graph.sources_created, 0);
    }

    #[test]
    fn test_reset_allows_new_surface() {
        let mut gate = UnlockGate::new();
        let mut graph = CountingGraph {
            context: Some(false),
            ..Default::default()
        };
        gate.attach(SurfaceId(1), 0.5, &mut graph);
        gate.reset(&mut graph);
        gate.attach(SurfaceId(2), 0.5, &mut graph);
        assert_eq!(graph.sources_created, 2);
        assert_eq!(graph.gains_created, 2);
    }

    #[test]
    fn test_gain_follows_state() {
        let caps = PlatformCapabilities::ios();
        let mut state = PlaybackState::new(false, 0);
        assert_eq!(gain_for(&state, &caps), 0.01);
        state.set_volume(70);
        assert_eq!(gain_for(&state, &caps), 0.7);
        state.set_muted(true);
        assert_eq!(gain_for(&state, &caps), 0.0);

        let mut gate = UnlockGate::new();
        let mut graph = CountingGraph {
            context: Some(true),
            ..Default::default()
        };
        gate.sync_gain(&state, &caps, &mut graph);
        assert_eq!(graph.gains_created, 0);
        gate.attach(SurfaceId(3), 0.7, &mut graph);
        gate.sync_gain(&state, &caps, &mut graph);
        assert_eq!(graph.gain, 0.0);
    }
}
