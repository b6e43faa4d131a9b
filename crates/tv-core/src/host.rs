//! Bundle of platform seams the core drives.

use tv_proto::protocol::Notice;

use crate::audio::AudioGraph;
use crate::clock::Scheduler;
use crate::event::TvEvent;
use crate::surface::SurfaceFactory;
use crate::wake_lock::WakeLockPlatform;

/// Owned platform handles.
pub struct Host {
    pub surfaces: Box<dyn SurfaceFactory>,
    pub wake_lock: Box<dyn WakeLockPlatform>,
    pub audio: Box<dyn AudioGraph>,
    pub scheduler: Box<dyn Scheduler>,
}

impl Host {
    pub fn io<'a>(&'a mut self, notices: &'a mut Vec<Notice>) -> Io<'a> {
        Io {
            surfaces: self.surfaces.as_mut(),
            wake_lock: self.wake_lock.as_mut(),
            audio: self.audio.as_mut(),
            scheduler: self.scheduler.as_mut(),
            notices,
        }
    }
}

/// Borrowed view handed to the coordinator and controller for one event.
pub struct Io<'a> {
    pub surfaces: &'a mut dyn SurfaceFactory,
    pub wake_lock: &'a mut dyn WakeLockPlatform,
    pub audio: &'a mut dyn AudioGraph,
    pub scheduler: &'a mut dyn Scheduler,
    pub notices: &'a mut Vec<Notice>,
}

impl Io<'_> {
    pub fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}

/// Host side that settles requests out of band (play promises, wake-lock
/// grants, media callbacks).  Drained after every handled event.
pub trait HostEvents {
    fn drain_events(&mut self) -> Vec<TvEvent>;
}
