//! Channel controller: owns the primary surface and turns user input into
//! playback, volume and keep-alive transitions.
//!
//! Channel changes go `Stable -> StaticShowing -> Loading -> Stable`.  Extra
//! presses during the static window accumulate into the pending step count
//! and share the window's single timer.  Only events from the current
//! surface are acted on.

use std::time::Duration;

use tracing::{debug, info, warn};
use tv_proto::config::PlaybackConfig;
use tv_proto::platform::PlatformCapabilities;
use tv_proto::playlist::{Direction, Playlist};
use tv_proto::protocol::{ChannelPhase, Notice};
use tv_proto::state::PlaybackState;

use crate::audio::{gain_for, UnlockGate};
use crate::clock::{TimerId, TimerKind};
use crate::host::Io;
use crate::keep_alive::KeepAliveCoordinator;
use crate::surface::{MediaEvent, SurfaceId, SurfaceSpec, VideoSurface};

/// Static noise burst volume relative to the TV volume.
const STATIC_GAIN_RATIO: f32 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSettings {
    pub static_delay: Duration,
    pub error_skip_delay: Duration,
}

impl ChannelSettings {
    pub fn from_config(playback: &PlaybackConfig) -> Self {
        Self {
            static_delay: Duration::from_millis(playback.static_delay_ms),
            error_skip_delay: Duration::from_millis(playback.error_skip_delay_ms),
        }
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self::from_config(&PlaybackConfig::default())
    }
}

pub struct ChannelController {
    playlist: Playlist,
    settings: ChannelSettings,
    caps: PlatformCapabilities,
    gate: UnlockGate,
    phase: ChannelPhase,
    surface: Option<Box<dyn VideoSurface>>,
    /// `CanPlay` / `Error` are handled once per surface.
    can_play_seen: bool,
    error_seen: bool,
    pending_steps: i64,
    static_timer: Option<TimerId>,
    /// Pending auto-advance and its target index.
    skip: Option<(TimerId, usize)>,
    /// Source failures since the last successful load; bounded by the
    /// playlist length.
    consecutive_failures: usize,
}

impl ChannelController {
    pub fn new(playlist: Playlist, settings: ChannelSettings, caps: PlatformCapabilities) -> Self {
        Self {
            playlist,
            settings,
            caps,
            gate: UnlockGate::new(),
            phase: ChannelPhase::Stable,
            surface: None,
            can_play_seen: false,
            error_seen: false,
            pending_steps: 0,
            static_timer: None,
            skip: None,
            consecutive_failures: 0,
        }
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn phase(&self) -> ChannelPhase {
        self.phase
    }

    pub fn gate(&self) -> &UnlockGate {
        &self.gate
    }

    pub fn surface(&self) -> Option<&dyn VideoSurface> {
        self.surface.as_deref()
    }

    pub fn surface_id(&self) -> Option<SurfaceId> {
        self.surface.as_ref().map(|s| s.id())
    }

    pub fn surface_mut(&mut self) -> Option<&mut dyn VideoSurface> {
        self.surface
            .as_mut()
            .map(|s| s.as_mut() as &mut dyn VideoSurface)
    }

    pub fn has_pending_skip(&self) -> bool {
        self.skip.is_some()
    }

    /// Load the initial channel.
    pub fn start(&mut self, state: &mut PlaybackState, io: &mut Io<'_>) {
        self.load_channel(state.current_channel(), state, io);
    }

    /// Destroy the surface and cancel pending timers.
    pub fn teardown(&mut self, io: &mut Io<'_>) {
        if let Some(id) = self.static_timer.take() {
            io.scheduler.cancel(id);
        }
        if let Some((id, _)) = self.skip.take() {
            io.scheduler.cancel(id);
        }
        self.gate.reset(io.audio);
        if let Some(mut surface) = self.surface.take() {
            surface.pause();
            io.surfaces.destroy(surface);
        }
        self.phase = ChannelPhase::Stable;
    }

    // ── channel changes ───────────────────────────────────────────────────────

    pub fn change_channel(
        &mut self,
        direction: Direction,
        state: &mut PlaybackState,
        io: &mut Io<'_>,
    ) {
        if let Some((id, target)) = self.skip.take() {
            io.scheduler.cancel(id);
            info!("Channel: user change overrides pending skip to {}", target);
        }
        self.consecutive_failures = 0;
        self.pending_steps += direction.step();
        state.set_channel_changing(true);

        if self.static_timer.is_some() {
            debug!("Channel: change during static window, {} steps pending", self.pending_steps);
            return;
        }

        self.phase = ChannelPhase::StaticShowing;
        io.notify(Notice::StaticShown {
            gain: state.effective_volume() * STATIC_GAIN_RATIO,
        });
        self.static_timer = Some(
            io.scheduler
                .schedule_once(self.settings.static_delay, TimerKind::StaticWindow),
        );
    }

    pub fn on_timer(
        &mut self,
        id: TimerId,
        kind: TimerKind,
        state: &mut PlaybackState,
        io: &mut Io<'_>,
    ) {
        match kind {
            TimerKind::StaticWindow if self.static_timer == Some(id) => {
                self.static_timer = None;
                let steps = std::mem::take(&mut self.pending_steps);
                let target = self.playlist.step(state.current_channel(), steps);
                self.load_channel(target, state, io);
            }
            TimerKind::ErrorSkip if self.skip.map(|(skip_id, _)| skip_id) == Some(id) => {
                if let Some((_, target)) = self.skip.take() {
                    self.load_channel(target, state, io);
                }
            }
            _ => debug!("Channel: ignoring stale timer {:?} ({:?})", id, kind),
        }
    }

    /// Replace the primary surface with one playing `index`.  Keep-alive is
    /// left alone; it picks up the new surface on its next pass.
    fn load_channel(&mut self, index: usize, state: &mut PlaybackState, io: &mut Io<'_>) {
        let Some(entry) = self.playlist.entry(index).cloned() else {
            warn!("Channel: index {} out of range", index);
            return;
        };

        state.set_channel_changing(true);
        self.phase = ChannelPhase::Loading;

        if let Some(mut old) = self.surface.take() {
            old.pause();
            io.surfaces.destroy(old);
        }
        self.gate.reset(io.audio);

        let mut surface = io.surfaces.create(SurfaceSpec::channel(
            &entry.source,
            state.is_muted(),
            f32::from(state.volume_level()) / 100.0,
        ));
        self.can_play_seen = false;
        self.error_seen = false;
        state.set_current_channel(index);

        if !state.is_muted() && self.caps.uses_audio_graph {
            self.gate
                .attach(surface.id(), gain_for(state, &self.caps), io.audio);
        }

        surface.play();
        self.surface = Some(surface);
        info!("Channel: loading CH {} ({})", index + 1, entry.source);

        io.notify(Notice::PlaybackIntent { play: true });
        io.notify(Notice::ChannelChanged {
            index,
            number: index + 1,
            description: entry.caption().to_string(),
        });
    }

    fn on_source_error(&mut self, reason: &str, state: &mut PlaybackState, io: &mut Io<'_>) {
        if self.phase == ChannelPhase::StaticShowing {
            debug!("Channel: source error during static window, pending change takes over");
            return;
        }

        self.consecutive_failures += 1;
        let len = self.playlist.len();
        if self.consecutive_failures >= len {
            warn!("Channel: all {} channels failed to load, giving up", len);
            self.phase = ChannelPhase::Stable;
            state.set_channel_changing(false);
            io.notify(Notice::StaticHidden);
            return;
        }

        let target = self.playlist.next(state.current_channel(), Direction::Up);
        warn!(
            "Channel: CH {} failed ({}), skipping to CH {} in {:?}",
            state.current_channel() + 1,
            reason,
            target + 1,
            self.settings.error_skip_delay
        );
        if let Some((id, _)) = self.skip.take() {
            io.scheduler.cancel(id);
        }
        let id = io
            .scheduler
            .schedule_once(self.settings.error_skip_delay, TimerKind::ErrorSkip);
        self.skip = Some((id, target));
    }

    // ── surface events ────────────────────────────────────────────────────────

    pub fn on_media_event(
        &mut self,
        surface_id: SurfaceId,
        event: MediaEvent,
        state: &mut PlaybackState,
        keep_alive: &mut KeepAliveCoordinator,
        io: &mut Io<'_>,
    ) {
        if self.surface_id() != Some(surface_id) {
            debug!("Channel: ignoring {:?} from retired surface {:?}", event, surface_id);
            return;
        }

        match event {
            MediaEvent::CanPlay => {
                if std::mem::replace(&mut self.can_play_seen, true) {
                    return;
                }
                self.consecutive_failures = 0;
                if self.phase == ChannelPhase::Loading {
                    self.phase = ChannelPhase::Stable;
                    state.set_channel_changing(false);
                    io.notify(Notice::StaticHidden);
                    debug!("Channel: CH {} ready", state.current_channel() + 1);
                }
            }
            MediaEvent::Error(reason) => {
                if std::mem::replace(&mut self.error_seen, true) {
                    return;
                }
                self.on_source_error(&reason, state, io);
            }
            MediaEvent::Play => {
                if !state.is_muted() {
                    keep_alive.ensure_wake_lock(io);
                }
            }
            MediaEvent::PlayRejected(reason) => {
                info!("Channel: play rejected ({}), waiting for a gesture or sweep", reason);
            }
            MediaEvent::Pause => {
                let Some(surface) = self.surface_mut() else { return };
                if surface.ended() {
                    return;
                }
                if !state.is_muted() {
                    info!("Channel: surface paused while unmuted, resuming");
                    surface.play();
                }
            }
            MediaEvent::Ended => {
                if state.is_channel_changing() {
                    return;
                }
                if let Some(surface) = self.surface_mut() {
                    debug!("Channel: restarting loop manually");
                    surface.set_current_time(0.0);
                    surface.play();
                }
            }
            MediaEvent::VolumeChange => {
                if !self.caps.requires_continuous_audio || state.is_muted() {
                    return;
                }
                let volume = self.caps.audible_volume(state.volume_level());
                if let Some(surface) = self.surface_mut() {
                    if surface.muted() {
                        warn!("Channel: surface muted externally, unmuting");
                        surface.set_muted(false);
                        surface.set_volume(volume);
                    }
                }
            }
            MediaEvent::Stalled | MediaEvent::Suspend => {
                if !self.caps.requires_continuous_audio || state.is_muted() {
                    return;
                }
                if let Some(surface) = self.surface_mut() {
                    debug!("Channel: playback stalled, nudging");
                    surface.play();
                }
            }
        }
    }

    // ── volume ────────────────────────────────────────────────────────────────

    pub fn toggle_mute(
        &mut self,
        state: &mut PlaybackState,
        keep_alive: &mut KeepAliveCoordinator,
        io: &mut Io<'_>,
    ) {
        let muted = !state.is_muted();
        state.set_muted(muted);
        info!("Channel: {}", if muted { "muted" } else { "unmuted" });

        if muted {
            self.apply_volume(state, io);
            io.notify(Notice::VolumeIndicator {
                muted,
                level: state.volume_level(),
            });
            keep_alive.deactivate(io);
        } else {
            self.unmute(state, keep_alive, io);
        }
    }

    /// Relative change, clamped to 0..=100.  A positive delta while muted
    /// unmutes; reaching 0 never mutes.
    pub fn adjust_volume(
        &mut self,
        delta: i32,
        state: &mut PlaybackState,
        keep_alive: &mut KeepAliveCoordinator,
        io: &mut Io<'_>,
    ) {
        let before = state.volume_level();
        state.adjust_volume(delta);
        self.volume_changed(before, delta > 0, state, keep_alive, io);
    }

    /// Absolute level from a knob drag.  Same unmute rule as
    /// [`adjust_volume`](Self::adjust_volume).
    pub fn set_volume(
        &mut self,
        level: u8,
        state: &mut PlaybackState,
        keep_alive: &mut KeepAliveCoordinator,
        io: &mut Io<'_>,
    ) {
        let before = state.volume_level();
        state.set_volume(level);
        let raised = state.volume_level() > before;
        self.volume_changed(before, raised, state, keep_alive, io);
    }

    /// `raised` is the direction the user asked for; at 100 a raise leaves
    /// the level unchanged but still unmutes.
    fn volume_changed(
        &mut self,
        before: u8,
        raised: bool,
        state: &mut PlaybackState,
        keep_alive: &mut KeepAliveCoordinator,
        io: &mut Io<'_>,
    ) {
        let level = state.volume_level();
        debug!("Channel: volume {} → {}", before, level);

        if state.is_muted() && raised && level > 0 {
            state.set_muted(false);
            info!("Channel: unmuted by volume change");
            self.unmute(state, keep_alive, io);
            return;
        }

        self.apply_volume(state, io);
        io.notify(Notice::VolumeIndicator {
            muted: state.is_muted(),
            level,
        });
    }

    /// Shared tail of every muted → unmuted transition.
    fn unmute(
        &mut self,
        state: &mut PlaybackState,
        keep_alive: &mut KeepAliveCoordinator,
        io: &mut Io<'_>,
    ) {
        let surface = self
            .surface
            .as_mut()
            .map(|s| s.as_mut() as &mut dyn VideoSurface);
        self.gate.unlock(surface, state, &self.caps, io.audio);
        self.apply_volume(state, io);
        io.notify(Notice::VolumeIndicator {
            muted: false,
            level: state.volume_level(),
        });
        keep_alive.activate(self.surface_mut(), state, io);
    }

    /// Write the logical mute/volume to the surface and gain node.
    fn apply_volume(&mut self, state: &PlaybackState, io: &mut Io<'_>) {
        let volume = if state.is_muted() {
            f32::from(state.volume_level()) / 100.0
        } else {
            self.caps.audible_volume(state.volume_level())
        };
        if let Some(surface) = self.surface.as_mut() {
            surface.set_muted(state.is_muted());
            surface.set_volume(volume);
        }
        self.gate.sync_gain(state, &self.caps, io.audio);
    }

    // ── page lifecycle ────────────────────────────────────────────────────────

    pub fn on_visibility(
        &mut self,
        hidden: bool,
        state: &PlaybackState,
        keep_alive: &mut KeepAliveCoordinator,
        io: &mut Io<'_>,
    ) {
        if hidden {
            debug!("Channel: page hidden");
            return;
        }
        if let Some(surface) = self.surface_mut() {
            if surface.paused() {
                surface.play();
            }
        }
        keep_alive.on_visible(self.surface_mut(), state, io);
    }

    pub fn on_focus(&mut self) {
        if let Some(surface) = self.surface_mut() {
            if surface.paused() {
                debug!("Channel: window focused, resuming playback");
                surface.play();
            }
        }
    }
}
