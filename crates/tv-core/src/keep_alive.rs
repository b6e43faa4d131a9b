//! Keep-alive coordinator.
//!
//! Keeps the screen awake while the TV is audible.  Three mechanisms run
//! side by side, each as a reconciliation against the desired state rather
//! than a set of independent callbacks:
//!
//! * a platform wake lock (at most one session or pending request),
//! * a hidden muted fallback loop, used when the wake lock is unavailable or
//!   the platform needs continuous media playback anyway,
//! * a repeating sweep that restores whatever the platform quietly undid.
//!
//! The coordinator never caches the primary surface; every call that needs
//! it receives the controller's current one.

use tracing::{debug, info, warn};
use tv_proto::platform::PlatformCapabilities;
use tv_proto::protocol::{KeepAlivePhase, Notice, WakeLockStatus};
use tv_proto::state::PlaybackState;

use crate::clock::{TimerId, TimerKind};
use crate::host::Io;
use crate::surface::{MediaEvent, SurfaceId, SurfaceSpec, VideoSurface};
use crate::wake_lock::{SessionId, WakeLockError, WakeLockEvent, WakeLockTicket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockSlot {
    Empty,
    Requesting(WakeLockTicket),
    Held(SessionId),
}

pub struct KeepAliveCoordinator {
    caps: PlatformCapabilities,
    /// Keep-alive requested (the TV is unmuted).
    wanted: bool,
    lock: LockSlot,
    /// Last request was refused; the sweep stops re-requesting until the
    /// next explicit activation or a successful grant.
    lock_denied: bool,
    next_ticket: u64,
    /// Created lazily, reused across activations.
    fallback: Option<Box<dyn VideoSurface>>,
    fallback_enabled: bool,
    sweep_timer: Option<TimerId>,
    reacquire_timer: Option<TimerId>,
    published: (KeepAlivePhase, WakeLockStatus),
}

impl KeepAliveCoordinator {
    pub fn new(caps: PlatformCapabilities) -> Self {
        let mut coordinator = Self {
            caps,
            wanted: false,
            lock: LockSlot::Empty,
            lock_denied: false,
            next_ticket: 0,
            fallback: None,
            fallback_enabled: false,
            sweep_timer: None,
            reacquire_timer: None,
            published: (KeepAlivePhase::Idle, WakeLockStatus::Released),
        };
        coordinator.published = (coordinator.phase(), coordinator.wake_lock_status());
        coordinator
    }

    pub fn phase(&self) -> KeepAlivePhase {
        if !self.wanted {
            KeepAlivePhase::Idle
        } else if matches!(self.lock, LockSlot::Requesting(_)) {
            KeepAlivePhase::Transitioning
        } else {
            KeepAlivePhase::Active
        }
    }

    pub fn wake_lock_status(&self) -> WakeLockStatus {
        match self.lock {
            LockSlot::Held(_) => WakeLockStatus::Held,
            LockSlot::Requesting(_) => WakeLockStatus::Requesting,
            LockSlot::Empty if !self.wake_lock_usable() => WakeLockStatus::Unavailable,
            LockSlot::Empty => WakeLockStatus::Released,
        }
    }

    pub fn is_active(&self) -> bool {
        self.wanted
    }

    pub fn session(&self) -> Option<SessionId> {
        match self.lock {
            LockSlot::Held(session) => Some(session),
            _ => None,
        }
    }

    pub fn fallback_active(&self) -> bool {
        self.fallback_enabled
    }

    pub fn fallback_id(&self) -> Option<SurfaceId> {
        self.fallback.as_ref().map(|f| f.id())
    }

    pub fn is_fallback(&self, surface: SurfaceId) -> bool {
        self.fallback_id() == Some(surface)
    }

    pub fn has_sweep_timer(&self) -> bool {
        self.sweep_timer.is_some()
    }

    fn wake_lock_usable(&self) -> bool {
        self.caps.supports_wake_lock && !self.lock_denied
    }

    fn fallback_wanted(&self) -> bool {
        self.wanted && (!self.wake_lock_usable() || self.caps.requires_continuous_audio)
    }

    // ── activation ────────────────────────────────────────────────────────────

    /// Start (or refresh) keep-alive.  Only meaningful while unmuted.
    pub fn activate(
        &mut self,
        primary: Option<&mut dyn VideoSurface>,
        state: &PlaybackState,
        io: &mut Io<'_>,
    ) {
        if state.is_muted() {
            debug!("KeepAlive: activate ignored while muted");
            return;
        }
        if !self.wanted {
            info!("KeepAlive: activating");
        }
        self.wanted = true;
        self.lock_denied = false;

        if self.caps.requires_continuous_audio {
            if let Some(surface) = primary {
                self.enforce_audible(surface, state);
                if surface.paused() {
                    surface.play();
                }
            }
        }

        self.request_wake_lock(io);
        self.reconcile_fallback(io);
        self.restart_sweep(io);
        self.publish(io);
    }

    /// Stop everything keep-alive owns.  Safe to call in any phase.
    pub fn deactivate(&mut self, io: &mut Io<'_>) {
        if self.wanted {
            info!("KeepAlive: deactivating");
        }
        self.wanted = false;
        self.cancel_reacquire(io);

        match std::mem::replace(&mut self.lock, LockSlot::Empty) {
            LockSlot::Held(session) => {
                if !io.wake_lock.is_released(session) {
                    io.wake_lock.release(session);
                }
                info!("KeepAlive: wake lock released");
            }
            LockSlot::Requesting(ticket) => {
                debug!("KeepAlive: abandoning pending request {:?}", ticket);
            }
            LockSlot::Empty => {}
        }

        if let Some(fallback) = self.fallback.as_mut() {
            fallback.pause();
        }
        self.fallback_enabled = false;

        if let Some(id) = self.sweep_timer.take() {
            io.scheduler.cancel(id);
            debug!("KeepAlive: sweep stopped");
        }
        self.publish(io);
    }

    /// Deactivate and drop the fallback surface.
    pub fn teardown(&mut self, io: &mut Io<'_>) {
        self.deactivate(io);
        if let Some(fallback) = self.fallback.take() {
            io.surfaces.destroy(fallback);
        }
    }

    // ── wake lock ─────────────────────────────────────────────────────────────

    /// Request a wake lock, releasing a held session first.  Never leaves two
    /// requests in flight.
    fn request_wake_lock(&mut self, io: &mut Io<'_>) {
        if !self.caps.supports_wake_lock {
            debug!("KeepAlive: no wake lock API, fallback loop carries keep-alive");
            return;
        }
        self.cancel_reacquire(io);

        match self.lock {
            LockSlot::Requesting(ticket) => {
                debug!("KeepAlive: wake lock request {:?} already pending", ticket);
                return;
            }
            LockSlot::Held(session) => {
                if !io.wake_lock.is_released(session) {
                    debug!("KeepAlive: releasing {:?} before re-request", session);
                    io.wake_lock.release(session);
                }
                self.lock = LockSlot::Empty;
            }
            LockSlot::Empty => {}
        }

        self.next_ticket += 1;
        let ticket = WakeLockTicket(self.next_ticket);
        self.lock = LockSlot::Requesting(ticket);
        debug!("KeepAlive: requesting wake lock {:?}", ticket);
        if let Err(e) = io.wake_lock.request(ticket) {
            self.lock = LockSlot::Empty;
            self.wake_lock_failed(e, io);
        }
    }

    /// Request only if nothing is held or pending.
    pub fn ensure_wake_lock(&mut self, io: &mut Io<'_>) {
        if self.wanted && self.wake_lock_usable() && self.lock == LockSlot::Empty {
            self.request_wake_lock(io);
            self.publish(io);
        }
    }

    fn wake_lock_failed(&mut self, error: WakeLockError, io: &mut Io<'_>) {
        match &error {
            WakeLockError::NotAllowed(reason) => {
                warn!("KeepAlive: wake lock not allowed ({}), using fallback loop", reason)
            }
            other => warn!("KeepAlive: {}", other),
        }
        if self.caps.requires_continuous_audio {
            info!("KeepAlive: relying on continuous audio playback");
        }
        self.lock_denied = true;
        self.reconcile_fallback(io);
    }

    pub fn on_wake_lock_event(
        &mut self,
        event: WakeLockEvent,
        state: &PlaybackState,
        io: &mut Io<'_>,
    ) {
        match event {
            WakeLockEvent::Granted { ticket, session } => {
                if self.wanted && self.lock == LockSlot::Requesting(ticket) {
                    info!("KeepAlive: wake lock acquired ({:?})", session);
                    self.lock = LockSlot::Held(session);
                    self.lock_denied = false;
                    self.reconcile_fallback(io);
                } else {
                    debug!("KeepAlive: releasing stale grant {:?}", session);
                    io.wake_lock.release(session);
                }
            }
            WakeLockEvent::Denied { ticket, error } => {
                if self.lock == LockSlot::Requesting(ticket) {
                    self.lock = LockSlot::Empty;
                    self.wake_lock_failed(error, io);
                } else {
                    debug!("KeepAlive: ignoring stale denial for {:?}", ticket);
                }
            }
            WakeLockEvent::Released { session } => {
                if self.lock == LockSlot::Held(session) {
                    warn!("KeepAlive: wake lock released by the platform");
                    self.lock = LockSlot::Empty;
                    if self.wanted
                        && !state.is_muted()
                        && self.caps.requires_continuous_audio
                        && self.reacquire_timer.is_none()
                    {
                        self.reacquire_timer = Some(io.scheduler.schedule_once(
                            self.caps.reacquire_delay,
                            TimerKind::WakeLockReacquire,
                        ));
                    }
                } else {
                    debug!("KeepAlive: session {:?} ended", session);
                }
            }
        }
        self.publish(io);
    }

    fn cancel_reacquire(&mut self, io: &mut Io<'_>) {
        if let Some(id) = self.reacquire_timer.take() {
            io.scheduler.cancel(id);
        }
    }

    // ── fallback loop ─────────────────────────────────────────────────────────

    fn reconcile_fallback(&mut self, io: &mut Io<'_>) {
        let wanted = self.fallback_wanted();
        if wanted == self.fallback_enabled {
            return;
        }

        if wanted {
            let fallback = self.fallback.get_or_insert_with(|| {
                debug!("KeepAlive: creating fallback loop");
                io.surfaces.create(SurfaceSpec::fallback_loop())
            });
            fallback.play();
            info!("KeepAlive: fallback loop enabled");
        } else if let Some(fallback) = self.fallback.as_mut() {
            fallback.pause();
            info!("KeepAlive: fallback loop disabled");
        }
        self.fallback_enabled = wanted;
    }

    pub fn on_fallback_event(&mut self, event: &MediaEvent) {
        match event {
            MediaEvent::PlayRejected(reason) => {
                warn!("KeepAlive: fallback play rejected ({}), retrying on next sweep", reason)
            }
            MediaEvent::Play => debug!("KeepAlive: fallback loop playing"),
            other => debug!("KeepAlive: fallback event {:?}", other),
        }
    }

    // ── sweep ─────────────────────────────────────────────────────────────────

    fn restart_sweep(&mut self, io: &mut Io<'_>) {
        if let Some(id) = self.sweep_timer.take() {
            io.scheduler.cancel(id);
        }
        let interval = self.caps.sweep_interval;
        self.sweep_timer = Some(io.scheduler.schedule_repeating(interval, TimerKind::Sweep));
        debug!("KeepAlive: sweep every {:?}", interval);
    }

    pub fn on_timer(
        &mut self,
        id: TimerId,
        kind: TimerKind,
        primary: Option<&mut dyn VideoSurface>,
        state: &PlaybackState,
        io: &mut Io<'_>,
    ) {
        match kind {
            TimerKind::Sweep if self.sweep_timer == Some(id) => self.sweep(primary, state, io),
            TimerKind::WakeLockReacquire if self.reacquire_timer == Some(id) => {
                self.reacquire_timer = None;
                if self.wanted && !state.is_muted() {
                    info!("KeepAlive: re-acquiring wake lock");
                    self.request_wake_lock(io);
                    self.publish(io);
                }
            }
            _ => debug!("KeepAlive: ignoring stale timer {:?} ({:?})", id, kind),
        }
    }

    /// One reconciliation pass against the desired state.
    pub fn sweep(
        &mut self,
        primary: Option<&mut dyn VideoSurface>,
        state: &PlaybackState,
        io: &mut Io<'_>,
    ) {
        if !self.wanted || state.is_muted() {
            return;
        }

        if let Some(surface) = primary {
            if !surface.is_playing() && !surface.ended() {
                warn!("KeepAlive: primary surface not playing, restarting");
                surface.set_muted(false);
                surface.set_volume(self.caps.audible_volume(state.volume_level()));
                surface.play();
            }
            if surface.ended() && surface.paused() {
                warn!("KeepAlive: primary surface stuck at its end, restarting loop");
                surface.set_current_time(0.0);
                surface.play();
            }
            if self.caps.requires_continuous_audio && surface.muted() {
                warn!("KeepAlive: primary surface was muted, unmuting");
                self.enforce_audible(surface, state);
            }
        }

        if self.fallback_enabled {
            if let Some(fallback) = self.fallback.as_mut() {
                if fallback.paused() {
                    info!("KeepAlive: fallback loop paused, restarting");
                    fallback.play();
                }
            }
        }

        if self.wake_lock_usable() {
            let lost = match self.lock {
                LockSlot::Empty => true,
                LockSlot::Held(session) => io.wake_lock.is_released(session),
                LockSlot::Requesting(_) => false,
            };
            if lost {
                warn!("KeepAlive: wake lock lost, re-requesting");
                self.request_wake_lock(io);
            }
        }

        self.publish(io);
    }

    // ── page lifecycle ────────────────────────────────────────────────────────

    /// Page became visible while keep-alive is wanted.
    pub fn on_visible(
        &mut self,
        primary: Option<&mut dyn VideoSurface>,
        state: &PlaybackState,
        io: &mut Io<'_>,
    ) {
        if state.is_muted() || !self.wanted {
            return;
        }
        info!("KeepAlive: page visible, restoring wake lock and playback");
        self.request_wake_lock(io);

        if let Some(surface) = primary {
            if surface.paused() {
                surface.play();
            }
        }
        if self.fallback_enabled {
            if let Some(fallback) = self.fallback.as_mut() {
                if fallback.paused() {
                    fallback.play();
                }
            }
        }
        self.publish(io);
    }

    fn enforce_audible(&self, surface: &mut dyn VideoSurface, state: &PlaybackState) {
        if surface.muted() {
            surface.set_muted(false);
        }
        surface.set_volume(self.caps.audible_volume(state.volume_level()));
    }

    fn publish(&mut self, io: &mut Io<'_>) {
        let (phase, status) = (self.phase(), self.wake_lock_status());
        if phase != self.published.0 {
            debug!("KeepAlive: phase {:?} → {:?}", self.published.0, phase);
            io.notify(Notice::KeepAlive { phase });
        }
        if status != self.published.1 {
            debug!("KeepAlive: wake lock {:?} → {:?}", self.published.1, status);
            io.notify(Notice::WakeLock { status });
        }
        self.published = (phase, status);
    }
}
