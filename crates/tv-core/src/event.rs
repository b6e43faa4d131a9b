use tv_proto::protocol::Command;

use crate::clock::{TimerId, TimerKind};
use crate::surface::{MediaEvent, SurfaceId};
use crate::wake_lock::WakeLockEvent;

/// All inputs into the [`TvCore`](crate::core::TvCore).  Handled strictly one
/// at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum TvEvent {
    /// User input or page lifecycle change.
    Command(Command),
    /// A surface reported something.
    Media { surface: SurfaceId, event: MediaEvent },
    WakeLock(WakeLockEvent),
    Timer { id: TimerId, kind: TimerKind },
    /// Stop keep-alive and tear everything down.
    Shutdown,
}

impl From<Command> for TvEvent {
    fn from(cmd: Command) -> Self {
        TvEvent::Command(cmd)
    }
}

impl From<WakeLockEvent> for TvEvent {
    fn from(evt: WakeLockEvent) -> Self {
        TvEvent::WakeLock(evt)
    }
}
