//! Timer seam.
//!
//! Every delay in the core (sweep period, static window, error skip, wake-lock
//! re-acquire) goes through a [`Scheduler`].  A fired timer comes back into
//! the core as `TvEvent::Timer { id, kind }`; owners compare `id` against the
//! handle they hold so a tick that was already queued when its timer got
//! cancelled is ignored.
//!
//! [`VirtualClock`] is the deterministic implementation used by the
//! simulation harness; `runtime::TokioScheduler` is the real one.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Keep-alive reconciliation pass (repeating).
    Sweep,
    /// Retry after the platform revoked the wake lock.
    WakeLockReacquire,
    /// End of the static window between channels.
    StaticWindow,
    /// Auto-advance after a channel's source failed.
    ErrorSkip,
}

pub trait Scheduler {
    fn schedule_once(&mut self, delay: Duration, kind: TimerKind) -> TimerId;
    fn schedule_repeating(&mut self, period: Duration, kind: TimerKind) -> TimerId;
    /// Cancelling an unknown or already-fired timer is a no-op.
    fn cancel(&mut self, id: TimerId);
    fn live_timers(&self) -> usize;
}

// ── virtual clock ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct VirtualTimer {
    due: Duration,
    period: Option<Duration>,
    kind: TimerKind,
}

#[derive(Debug, Default)]
struct ClockInner {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<TimerId, VirtualTimer>,
}

/// Manually advanced time source.  Cloning shares the same timeline.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    inner: Rc<RefCell<ClockInner>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since the clock was created.
    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    /// Pop the earliest timer due at or before `deadline`, moving `now` to
    /// its due time.  Repeating timers are re-armed one period later.
    /// Ties fire in creation order.
    pub fn fire_next(&self, deadline: Duration) -> Option<(TimerId, TimerKind)> {
        let mut inner = self.inner.borrow_mut();
        let (id, due) = inner
            .timers
            .iter()
            .filter(|(_, t)| t.due <= deadline)
            .min_by_key(|(id, t)| (t.due, **id))
            .map(|(id, t)| (*id, t.due))?;

        inner.now = inner.now.max(due);
        let timer = inner.timers.remove(&id)?;
        if let Some(period) = timer.period {
            inner.timers.insert(
                id,
                VirtualTimer {
                    due: due + period,
                    ..timer.clone()
                },
            );
        }
        Some((id, timer.kind))
    }

    /// Due time of the earliest pending timer.
    pub fn next_due(&self) -> Option<Duration> {
        self.inner.borrow().timers.values().map(|t| t.due).min()
    }

    /// Move `now` forward without firing anything.
    pub fn set_now(&self, now: Duration) {
        let mut inner = self.inner.borrow_mut();
        inner.now = inner.now.max(now);
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.inner.borrow().timers.contains_key(&id)
    }

    fn insert(&self, delay: Duration, period: Option<Duration>, kind: TimerKind) -> TimerId {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = TimerId(inner.next_id);
        let due = inner.now + delay;
        inner.timers.insert(id, VirtualTimer { due, period, kind });
        id
    }
}

impl Scheduler for VirtualClock {
    fn schedule_once(&mut self, delay: Duration, kind: TimerKind) -> TimerId {
        self.insert(delay, None, kind)
    }

    fn schedule_repeating(&mut self, period: Duration, kind: TimerKind) -> TimerId {
        self.insert(period, Some(period), kind)
    }

    fn cancel(&mut self, id: TimerId) {
        self.inner.borrow_mut().timers.remove(&id);
    }

    fn live_timers(&self) -> usize {
        self.inner.borrow().timers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_once_timer_fires_once() {
        let mut clock = VirtualClock::new();
        let id = clock.schedule_once(Duration::from_millis(500), TimerKind::StaticWindow);
        assert_eq!(clock.fire_next(Duration::from_millis(499)), None);
        assert_eq!(
            clock.fire_next(Duration::from_millis(500)),
            Some((id, TimerKind::StaticWindow))
        );
        assert_eq!(clock.now(), Duration::from_millis(500));
        assert_eq!(clock.fire_next(Duration::from_secs(10)), None);
        assert_eq!(clock.live_timers(), 0);
    }

    #[test]
    fn test_repeating_timer_rearms() {
        let mut clock = VirtualClock::new();
        let id = clock.schedule_repeating(Duration::from_secs(1), TimerKind::Sweep);
        let mut fired = 0;
        while clock.fire_next(Duration::from_millis(3500)).is_some() {
            fired += 1;
        }
        assert_eq!(fired, 3);
        assert_eq!(clock.now(), Duration::from_secs(3));
        assert!(clock.is_pending(id));
        clock.cancel(id);
        assert_eq!(clock.live_timers(), 0);
    }

    #[test]
    fn test_ties_fire_in_creation_order() {
        let mut clock = VirtualClock::new();
        let a = clock.schedule_once(Duration::from_millis(100), TimerKind::ErrorSkip);
        let b = clock.schedule_once(Duration::from_millis(100), TimerKind::StaticWindow);
        assert_eq!(clock.fire_next(Duration::MAX).map(|(id, _)| id), Some(a));
        assert_eq!(clock.fire_next(Duration::MAX).map(|(id, _)| id), Some(b));
    }
}
