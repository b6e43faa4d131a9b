//! Video surfaces: the primary channel player and the hidden fallback loop.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

/// What a surface is for.  The host picks the media for `FallbackLoop`
/// itself (a tiny blank clip).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Channel,
    FallbackLoop,
}

/// Construction parameters.  Surfaces always autoplay, loop and play inline.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSpec {
    pub kind: SurfaceKind,
    pub source: Option<String>,
    pub muted: bool,
    pub volume: f32,
    pub hidden: bool,
}

impl SurfaceSpec {
    pub fn channel(source: &str, muted: bool, volume: f32) -> Self {
        Self {
            kind: SurfaceKind::Channel,
            source: Some(source.to_string()),
            muted,
            volume,
            hidden: false,
        }
    }

    /// Hidden, muted, looping blank clip.
    pub fn fallback_loop() -> Self {
        Self {
            kind: SurfaceKind::FallbackLoop,
            source: None,
            muted: true,
            volume: 0.0,
            hidden: true,
        }
    }
}

/// Things a surface reports back asynchronously.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// A play request went through.
    Play,
    /// Autoplay policy (or anything else) rejected a play request.
    PlayRejected(String),
    Pause,
    Ended,
    /// The source failed to load or decode.
    Error(String),
    /// Enough data buffered to start.
    CanPlay,
    VolumeChange,
    Stalled,
    Suspend,
}

/// One `<video>`-like element.  Property writes apply immediately; `play`
/// only issues the request, the outcome arrives later as
/// [`MediaEvent::Play`] or [`MediaEvent::PlayRejected`].
pub trait VideoSurface {
    fn id(&self) -> SurfaceId;
    fn play(&mut self);
    fn pause(&mut self);
    fn muted(&self) -> bool;
    fn set_muted(&mut self, muted: bool);
    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);
    /// Playback position in seconds.
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, secs: f64);
    fn paused(&self) -> bool;
    fn ended(&self) -> bool;

    /// Playing and past the first frame.
    fn is_playing(&self) -> bool {
        !self.paused() && self.current_time() > 0.0
    }
}

pub trait SurfaceFactory {
    fn create(&mut self, spec: SurfaceSpec) -> Box<dyn VideoSurface>;
    /// Detach the surface from the page and free it.  No events for it are
    /// delivered afterwards.
    fn destroy(&mut self, surface: Box<dyn VideoSurface>);
}
