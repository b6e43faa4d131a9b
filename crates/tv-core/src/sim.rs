//! In-process browser simulation.
//!
//! [`SimBrowser`] implements every platform seam (surfaces, wake lock, audio
//! graph) on top of one shared world, queues the asynchronous outcomes a real
//! page would deliver later, and lets tests poke the platform from outside
//! (revoke the wake lock, pause a surface, break a source).  [`Harness`]
//! wires it to a [`TvCore`] and a [`VirtualClock`].

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use tv_proto::platform::PlatformCapabilities;
use tv_proto::playlist::Playlist;
use tv_proto::protocol::{Command, Notice, TvSnapshot};
use tv_proto::state::PlaybackState;

use crate::audio::{AudioContextState, AudioError, AudioGraph};
use crate::channel::ChannelSettings;
use crate::clock::{Scheduler, VirtualClock};
use crate::core::TvCore;
use crate::event::TvEvent;
use crate::host::{Host, HostEvents};
use crate::surface::{MediaEvent, SurfaceFactory, SurfaceId, SurfaceKind, SurfaceSpec, VideoSurface};
use crate::wake_lock::{SessionId, WakeLockError, WakeLockEvent, WakeLockPlatform, WakeLockTicket};

/// Position a surface reports once its first frame is out.
const FIRST_FRAME: f64 = 1.0 / 30.0;

/// Bound on completion rounds per pump, in case handlers feed each other.
const MAX_PUMP_ROUNDS: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct SimSurfaceState {
    pub kind: SurfaceKind,
    pub source: Option<String>,
    pub hidden: bool,
    pub muted: bool,
    pub volume: f32,
    pub paused: bool,
    pub ended: bool,
    pub current_time: f64,
    pub destroyed: bool,
    pub play_requests: usize,
}

#[derive(Debug, Default)]
struct WakeLockSim {
    supported: bool,
    deny: Option<WakeLockError>,
    next_session: u64,
    live: BTreeSet<SessionId>,
    requests: usize,
    max_live: usize,
}

#[derive(Debug)]
struct AudioSim {
    context: AudioContextState,
    unavailable: bool,
    /// A media element can feed at most one source node, ever.
    connected: BTreeSet<SurfaceId>,
    source: Option<SurfaceId>,
    gain: Option<f32>,
    sources_created: usize,
}

impl Default for AudioSim {
    fn default() -> Self {
        Self {
            context: AudioContextState::Missing,
            unavailable: false,
            connected: BTreeSet::new(),
            source: None,
            gain: None,
            sources_created: 0,
        }
    }
}

#[derive(Debug, Default)]
struct World {
    next_surface: u64,
    surfaces: BTreeMap<SurfaceId, SimSurfaceState>,
    broken: BTreeSet<String>,
    block_unmuted_autoplay: bool,
    wake_lock: WakeLockSim,
    audio: AudioSim,
    pending: VecDeque<TvEvent>,
}

impl World {
    fn media(&mut self, surface: SurfaceId, event: MediaEvent) {
        self.pending.push_back(TvEvent::Media { surface, event });
    }

    fn wake(&mut self, event: WakeLockEvent) {
        self.pending.push_back(TvEvent::WakeLock(event));
    }

    fn live_surface(&mut self, id: SurfaceId) -> Option<&mut SimSurfaceState> {
        self.surfaces.get_mut(&id).filter(|s| !s.destroyed)
    }
}

type Shared = Rc<RefCell<World>>;

/// Handle on the simulated page.  Clones share the same world.
#[derive(Debug, Clone, Default)]
pub struct SimBrowser {
    world: Shared,
}

impl SimBrowser {
    pub fn new(caps: &PlatformCapabilities) -> Self {
        let browser = Self::default();
        browser.world.borrow_mut().wake_lock.supported = caps.supports_wake_lock;
        browser
    }

    pub fn host(&self, scheduler: Box<dyn Scheduler>) -> Host {
        Host {
            surfaces: Box::new(SimSurfaceFactory {
                world: self.world.clone(),
            }),
            wake_lock: Box::new(SimWakeLock {
                world: self.world.clone(),
            }),
            audio: Box::new(SimAudioGraph {
                world: self.world.clone(),
            }),
            scheduler,
        }
    }

    // ── configuration ─────────────────────────────────────────────────────────

    /// Surfaces created for `source` fail to load.
    pub fn break_source(&self, source: &str) {
        self.world.borrow_mut().broken.insert(source.to_string());
    }

    /// Every later wake-lock request is denied with `error` (`None` grants
    /// again).
    pub fn deny_wake_lock(&self, error: Option<WakeLockError>) {
        self.world.borrow_mut().wake_lock.deny = error;
    }

    /// Reject `play()` on unmuted channel surfaces, like autoplay policy
    /// outside a user gesture.
    pub fn block_unmuted_autoplay(&self, block: bool) {
        self.world.borrow_mut().block_unmuted_autoplay = block;
    }

    pub fn make_audio_unavailable(&self) {
        self.world.borrow_mut().audio.unavailable = true;
    }

    // ── platform-side actions ─────────────────────────────────────────────────

    /// The OS drops every held wake lock.
    pub fn revoke_wake_locks(&self) {
        let mut world = self.world.borrow_mut();
        let sessions: Vec<_> = std::mem::take(&mut world.wake_lock.live).into_iter().collect();
        for session in sessions {
            world.wake(WakeLockEvent::Released { session });
        }
    }

    /// Something outside the core paused `id`.
    pub fn pause_surface(&self, id: SurfaceId) {
        let mut world = self.world.borrow_mut();
        if let Some(surface) = world.live_surface(id) {
            if !surface.paused {
                surface.paused = true;
                world.media(id, MediaEvent::Pause);
            }
        }
    }

    /// Something outside the core muted `id`.
    pub fn mute_surface(&self, id: SurfaceId) {
        let mut world = self.world.borrow_mut();
        if let Some(surface) = world.live_surface(id) {
            surface.muted = true;
            world.media(id, MediaEvent::VolumeChange);
        }
    }

    /// `id` ran to its end without looping.
    pub fn end_surface(&self, id: SurfaceId) {
        let mut world = self.world.borrow_mut();
        if let Some(surface) = world.live_surface(id) {
            surface.ended = true;
            surface.paused = true;
            world.media(id, MediaEvent::Ended);
        }
    }

    /// Pause `id` without telling anyone, like a backgrounded iOS page.
    pub fn suspend_silently(&self, id: SurfaceId) {
        if let Some(surface) = self.world.borrow_mut().live_surface(id) {
            surface.paused = true;
        }
    }

    /// `id` stopped at its end and no `ended` callback fired.
    pub fn end_silently(&self, id: SurfaceId) {
        if let Some(surface) = self.world.borrow_mut().live_surface(id) {
            surface.ended = true;
            surface.paused = true;
        }
    }

    pub fn stall_surface(&self, id: SurfaceId) {
        self.world.borrow_mut().media(id, MediaEvent::Stalled);
    }

    /// Advance the playback position of every playing surface.
    pub fn advance_media(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        for surface in self.world.borrow_mut().surfaces.values_mut() {
            if !surface.destroyed && !surface.paused {
                surface.current_time += secs;
            }
        }
    }

    // ── inspection ────────────────────────────────────────────────────────────

    pub fn surface(&self, id: SurfaceId) -> Option<SimSurfaceState> {
        self.world.borrow().surfaces.get(&id).cloned()
    }

    pub fn live_surfaces(&self, kind: SurfaceKind) -> Vec<(SurfaceId, SimSurfaceState)> {
        self.world
            .borrow()
            .surfaces
            .iter()
            .filter(|(_, s)| s.kind == kind && !s.destroyed)
            .map(|(id, s)| (*id, s.clone()))
            .collect()
    }

    /// Every surface of `kind` ever created, destroyed ones included.
    pub fn created_surfaces(&self, kind: SurfaceKind) -> usize {
        self.world
            .borrow()
            .surfaces
            .values()
            .filter(|s| s.kind == kind)
            .count()
    }

    pub fn playing_fallbacks(&self) -> usize {
        self.live_surfaces(SurfaceKind::FallbackLoop)
            .iter()
            .filter(|(_, s)| !s.paused)
            .count()
    }

    pub fn live_wake_locks(&self) -> usize {
        self.world.borrow().wake_lock.live.len()
    }

    pub fn max_live_wake_locks(&self) -> usize {
        self.world.borrow().wake_lock.max_live
    }

    pub fn wake_lock_requests(&self) -> usize {
        self.world.borrow().wake_lock.requests
    }

    pub fn audio_context(&self) -> AudioContextState {
        self.world.borrow().audio.context
    }

    pub fn audio_sources_created(&self) -> usize {
        self.world.borrow().audio.sources_created
    }

    pub fn gain(&self) -> Option<f32> {
        self.world.borrow().audio.gain
    }

    pub fn pending_events(&self) -> usize {
        self.world.borrow().pending.len()
    }
}

impl HostEvents for SimBrowser {
    fn drain_events(&mut self) -> Vec<TvEvent> {
        self.world.borrow_mut().pending.drain(..).collect()
    }
}

// ── surfaces ──────────────────────────────────────────────────────────────────

struct SimSurface {
    id: SurfaceId,
    world: Shared,
}

impl SimSurface {
    fn read<T>(&self, f: impl FnOnce(&SimSurfaceState) -> T, default: T) -> T {
        self.world.borrow().surfaces.get(&self.id).map(f).unwrap_or(default)
    }
}

impl VideoSurface for SimSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn play(&mut self) {
        let mut world = self.world.borrow_mut();
        let block = world.block_unmuted_autoplay;
        let broken = world.broken.clone();
        let Some(surface) = world.live_surface(self.id) else {
            return;
        };
        surface.play_requests += 1;
        if surface.source.as_ref().is_some_and(|s| broken.contains(s)) {
            return;
        }
        if block && surface.kind == SurfaceKind::Channel && !surface.muted {
            surface.paused = true;
            world.media(self.id, MediaEvent::PlayRejected("NotAllowedError".into()));
            return;
        }
        if surface.ended {
            surface.ended = false;
            surface.current_time = 0.0;
        }
        surface.paused = false;
        surface.current_time = surface.current_time.max(FIRST_FRAME);
        world.media(self.id, MediaEvent::Play);
    }

    fn pause(&mut self) {
        let mut world = self.world.borrow_mut();
        if let Some(surface) = world.live_surface(self.id) {
            if !surface.paused {
                surface.paused = true;
                world.media(self.id, MediaEvent::Pause);
            }
        }
    }

    fn muted(&self) -> bool {
        self.read(|s| s.muted, true)
    }

    fn set_muted(&mut self, muted: bool) {
        let mut world = self.world.borrow_mut();
        if let Some(surface) = world.live_surface(self.id) {
            if surface.muted != muted {
                surface.muted = muted;
                world.media(self.id, MediaEvent::VolumeChange);
            }
        }
    }

    fn volume(&self) -> f32 {
        self.read(|s| s.volume, 0.0)
    }

    fn set_volume(&mut self, volume: f32) {
        if let Some(surface) = self.world.borrow_mut().live_surface(self.id) {
            surface.volume = volume.clamp(0.0, 1.0);
        }
    }

    fn current_time(&self) -> f64 {
        self.read(|s| s.current_time, 0.0)
    }

    fn set_current_time(&mut self, secs: f64) {
        if let Some(surface) = self.world.borrow_mut().live_surface(self.id) {
            surface.current_time = secs.max(0.0);
            surface.ended = false;
        }
    }

    fn paused(&self) -> bool {
        self.read(|s| s.paused, true)
    }

    fn ended(&self) -> bool {
        self.read(|s| s.ended, false)
    }
}

struct SimSurfaceFactory {
    world: Shared,
}

impl SurfaceFactory for SimSurfaceFactory {
    fn create(&mut self, spec: SurfaceSpec) -> Box<dyn VideoSurface> {
        let mut world = self.world.borrow_mut();
        world.next_surface += 1;
        let id = SurfaceId(world.next_surface);

        if spec.kind == SurfaceKind::Channel {
            let broken = spec.source.as_ref().is_some_and(|s| world.broken.contains(s));
            if broken {
                world.media(id, MediaEvent::Error("MEDIA_ERR_SRC_NOT_SUPPORTED".into()));
            } else {
                world.media(id, MediaEvent::CanPlay);
            }
        }

        world.surfaces.insert(
            id,
            SimSurfaceState {
                kind: spec.kind,
                source: spec.source,
                hidden: spec.hidden,
                muted: spec.muted,
                volume: spec.volume,
                paused: true,
                ended: false,
                current_time: 0.0,
                destroyed: false,
                play_requests: 0,
            },
        );

        Box::new(SimSurface {
            id,
            world: self.world.clone(),
        })
    }

    fn destroy(&mut self, surface: Box<dyn VideoSurface>) {
        let id = surface.id();
        let mut world = self.world.borrow_mut();
        if let Some(state) = world.surfaces.get_mut(&id) {
            state.destroyed = true;
            state.paused = true;
        }
        world
            .pending
            .retain(|e| !matches!(e, TvEvent::Media { surface, .. } if *surface == id));
    }
}

// ── wake lock ─────────────────────────────────────────────────────────────────

struct SimWakeLock {
    world: Shared,
}

impl WakeLockPlatform for SimWakeLock {
    fn request(&mut self, ticket: WakeLockTicket) -> Result<(), WakeLockError> {
        let mut world = self.world.borrow_mut();
        world.wake_lock.requests += 1;
        if !world.wake_lock.supported {
            return Err(WakeLockError::NotSupported);
        }
        if let Some(error) = world.wake_lock.deny.clone() {
            world.wake(WakeLockEvent::Denied { ticket, error });
            return Ok(());
        }

        world.wake_lock.next_session += 1;
        let session = SessionId(world.wake_lock.next_session);
        world.wake_lock.live.insert(session);
        world.wake_lock.max_live = world.wake_lock.max_live.max(world.wake_lock.live.len());
        world.wake(WakeLockEvent::Granted { ticket, session });
        Ok(())
    }

    fn release(&mut self, session: SessionId) {
        let mut world = self.world.borrow_mut();
        if world.wake_lock.live.remove(&session) {
            world.wake(WakeLockEvent::Released { session });
        }
    }

    fn is_released(&self, session: SessionId) -> bool {
        !self.world.borrow().wake_lock.live.contains(&session)
    }
}

// ── audio graph ───────────────────────────────────────────────────────────────

struct SimAudioGraph {
    world: Shared,
}

impl AudioGraph for SimAudioGraph {
    fn context_state(&self) -> AudioContextState {
        self.world.borrow().audio.context
    }

    fn create_context(&mut self) -> Result<(), AudioError> {
        let mut world = self.world.borrow_mut();
        if world.audio.unavailable {
            return Err(AudioError::ContextUnavailable("AudioContext missing".into()));
        }
        world.audio.context = AudioContextState::Running;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        self.world.borrow_mut().audio.context = AudioContextState::Running;
        Ok(())
    }

    fn connect_source(&mut self, surface: SurfaceId) -> Result<(), AudioError> {
        let mut world = self.world.borrow_mut();
        if !world.audio.connected.insert(surface) {
            return Err(AudioError::SourceAlreadyConnected(surface));
        }
        world.audio.source = Some(surface);
        world.audio.sources_created += 1;
        Ok(())
    }

    fn create_gain(&mut self, gain: f32) -> Result<(), AudioError> {
        let mut world = self.world.borrow_mut();
        if world.audio.source.is_none() {
            return Err(AudioError::Graph("no source to attach gain to".into()));
        }
        world.audio.gain = Some(gain);
        Ok(())
    }

    fn set_gain(&mut self, gain: f32) {
        let mut world = self.world.borrow_mut();
        if world.audio.gain.is_some() {
            world.audio.gain = Some(gain);
        }
    }

    fn disconnect(&mut self) {
        let mut world = self.world.borrow_mut();
        world.audio.source = None;
        world.audio.gain = None;
    }
}

// ── harness ───────────────────────────────────────────────────────────────────

/// Core + simulated page + virtual clock.
pub struct Harness {
    pub core: TvCore,
    pub browser: SimBrowser,
    pub clock: VirtualClock,
    notices: Vec<Notice>,
}

impl Harness {
    /// Build an unstarted harness; configure `browser` then call
    /// [`start`](Self::start).
    pub fn new(playlist: Playlist, caps: PlatformCapabilities, initial: PlaybackState) -> Self {
        Self::with_settings(playlist, caps, ChannelSettings::default(), initial)
    }

    pub fn with_settings(
        playlist: Playlist,
        caps: PlatformCapabilities,
        settings: ChannelSettings,
        initial: PlaybackState,
    ) -> Self {
        let clock = VirtualClock::new();
        let browser = SimBrowser::new(&caps);
        let host = browser.host(Box::new(clock.clone()));
        Self {
            core: TvCore::new(playlist, caps, settings, initial, host),
            browser,
            clock,
            notices: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        self.core.start();
        self.pump();
    }

    pub fn send(&mut self, cmd: Command) {
        self.core.command(cmd);
        self.pump();
    }

    pub fn handle(&mut self, event: TvEvent) {
        self.core.handle(event);
        self.pump();
    }

    /// Deliver queued host completions until none are left.
    pub fn pump(&mut self) {
        for _ in 0..MAX_PUMP_ROUNDS {
            let events = self.browser.drain_events();
            if events.is_empty() {
                break;
            }
            for event in events {
                self.core.handle(event);
            }
        }
        self.notices.extend(self.core.take_notices());
    }

    /// Move virtual time forward, firing due timers in order.
    pub fn advance(&mut self, by: Duration) {
        let deadline = self.clock.now() + by;
        while let Some(due) = self.clock.next_due().filter(|due| *due <= deadline) {
            self.browser
                .advance_media(due.saturating_sub(self.clock.now()));
            let Some((id, kind)) = self.clock.fire_next(deadline) else {
                break;
            };
            self.core.handle(TvEvent::Timer { id, kind });
            self.pump();
        }
        self.browser
            .advance_media(deadline.saturating_sub(self.clock.now()));
        self.clock.set_now(deadline);
    }

    pub fn advance_ms(&mut self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn snapshot(&self) -> TvSnapshot {
        self.core.snapshot()
    }

    /// State of the current primary surface.
    pub fn primary(&self) -> Option<SimSurfaceState> {
        self.core
            .channel()
            .surface_id()
            .and_then(|id| self.browser.surface(id))
    }
}
