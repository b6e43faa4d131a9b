//! TvCore: single-owner state machine for the TV.
//!
//! Every input (user command, page lifecycle, surface callback, wake-lock
//! outcome, timer tick) arrives as one `TvEvent` and is handled to
//! completion before the next.  TvCore owns `PlaybackState`, the channel
//! controller and the keep-alive coordinator exclusively; the host only
//! sees the notices it drains and the snapshots it reads.

use tracing::{debug, info};
use tv_proto::config::Config;
use tv_proto::platform::PlatformCapabilities;
use tv_proto::playlist::Playlist;
use tv_proto::protocol::{Command, Notice, TvSnapshot};
use tv_proto::state::PlaybackState;

use crate::channel::{ChannelController, ChannelSettings};
use crate::clock::TimerKind;
use crate::event::TvEvent;
use crate::host::Host;
use crate::keep_alive::KeepAliveCoordinator;

pub struct TvCore {
    state: PlaybackState,
    channel: ChannelController,
    keep_alive: KeepAliveCoordinator,
    host: Host,
    notices: Vec<Notice>,
    started: bool,
}

impl TvCore {
    pub fn new(
        playlist: Playlist,
        caps: PlatformCapabilities,
        settings: ChannelSettings,
        initial: PlaybackState,
        host: Host,
    ) -> Self {
        Self {
            state: initial,
            channel: ChannelController::new(playlist, settings, caps.clone()),
            keep_alive: KeepAliveCoordinator::new(caps),
            host,
            notices: Vec::new(),
            started: false,
        }
    }

    pub fn from_config(
        config: &Config,
        playlist: Playlist,
        caps: PlatformCapabilities,
        host: Host,
    ) -> Self {
        Self::new(
            playlist,
            caps,
            ChannelSettings::from_config(&config.playback),
            PlaybackState::new(config.playback.start_muted, config.playback.initial_volume),
            host,
        )
    }

    /// Load the first channel.  Starting unmuted activates keep-alive right
    /// away.  Calling twice is a no-op.
    pub fn start(&mut self) {
        if std::mem::replace(&mut self.started, true) {
            return;
        }
        let mut io = self.host.io(&mut self.notices);
        self.channel.start(&mut self.state, &mut io);
        io.notify(Notice::VolumeIndicator {
            muted: self.state.is_muted(),
            level: self.state.volume_level(),
        });
        if !self.state.is_muted() {
            self.keep_alive
                .activate(self.channel.surface_mut(), &self.state, &mut io);
        }
        info!(
            "TvCore: started on CH {} ({} channels, muted={})",
            self.state.current_channel() + 1,
            self.channel.playlist().len(),
            self.state.is_muted()
        );
    }

    pub fn handle(&mut self, event: TvEvent) {
        let mut io = self.host.io(&mut self.notices);
        match event {
            TvEvent::Command(cmd) => {
                debug!("TvCore: command {:?}", cmd);
                match cmd {
                    Command::ToggleMute => {
                        self.channel
                            .toggle_mute(&mut self.state, &mut self.keep_alive, &mut io)
                    }
                    Command::AdjustVolume { delta } => self.channel.adjust_volume(
                        delta,
                        &mut self.state,
                        &mut self.keep_alive,
                        &mut io,
                    ),
                    Command::SetVolume { level } => self.channel.set_volume(
                        level,
                        &mut self.state,
                        &mut self.keep_alive,
                        &mut io,
                    ),
                    Command::ChangeChannel { direction } => {
                        self.channel
                            .change_channel(direction, &mut self.state, &mut io)
                    }
                    Command::Visibility { hidden } => self.channel.on_visibility(
                        hidden,
                        &self.state,
                        &mut self.keep_alive,
                        &mut io,
                    ),
                    Command::Focus => self.channel.on_focus(),
                }
            }

            TvEvent::Media { surface, event } => {
                if self.keep_alive.is_fallback(surface) {
                    self.keep_alive.on_fallback_event(&event);
                } else {
                    self.channel.on_media_event(
                        surface,
                        event,
                        &mut self.state,
                        &mut self.keep_alive,
                        &mut io,
                    );
                }
            }

            TvEvent::WakeLock(evt) => {
                self.keep_alive
                    .on_wake_lock_event(evt, &self.state, &mut io)
            }

            TvEvent::Timer { id, kind } => match kind {
                TimerKind::Sweep | TimerKind::WakeLockReacquire => self.keep_alive.on_timer(
                    id,
                    kind,
                    self.channel.surface_mut(),
                    &self.state,
                    &mut io,
                ),
                TimerKind::StaticWindow | TimerKind::ErrorSkip => {
                    self.channel
                        .on_timer(id, kind, &mut self.state, &mut io)
                }
            },

            TvEvent::Shutdown => {
                info!("TvCore: shutting down");
                self.keep_alive.teardown(&mut io);
                self.channel.teardown(&mut io);
            }
        }
    }

    pub fn command(&mut self, cmd: Command) {
        self.handle(TvEvent::Command(cmd));
    }

    /// Notices produced since the last call, oldest first.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn channel(&self) -> &ChannelController {
        &self.channel
    }

    pub fn keep_alive(&self) -> &KeepAliveCoordinator {
        &self.keep_alive
    }

    pub fn live_timers(&self) -> usize {
        self.host.scheduler.live_timers()
    }

    pub fn snapshot(&self) -> TvSnapshot {
        TvSnapshot {
            rev: 0,
            channels: self
                .channel
                .playlist()
                .iter()
                .map(|c| c.caption().to_string())
                .collect(),
            current_channel: self.state.current_channel(),
            is_muted: self.state.is_muted(),
            volume_level: self.state.volume_level(),
            is_channel_changing: self.state.is_channel_changing(),
            channel_phase: self.channel.phase(),
            keep_alive: self.keep_alive.phase(),
            wake_lock: self.keep_alive.wake_lock_status(),
            fallback_active: self.keep_alive.fallback_active(),
        }
    }
}
