//! Tokio side: real timers and the async loop that feeds a [`TvCore`].

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};
use tv_proto::protocol::Notice;
use tv_proto::state::StateManager;

use crate::clock::{Scheduler, TimerId, TimerKind};
use crate::core::TvCore;
use crate::event::TvEvent;
use crate::host::HostEvents;

/// Each timer is a spawned task that posts `TvEvent::Timer` back into the
/// core's event channel.
pub struct TokioScheduler {
    event_tx: mpsc::Sender<TvEvent>,
    next_id: u64,
    tasks: HashMap<TimerId, AbortHandle>,
}

impl TokioScheduler {
    pub fn new(event_tx: mpsc::Sender<TvEvent>) -> Self {
        Self {
            event_tx,
            next_id: 0,
            tasks: HashMap::new(),
        }
    }

    fn allocate(&mut self) -> TimerId {
        self.tasks.retain(|_, handle| !handle.is_finished());
        self.next_id += 1;
        TimerId(self.next_id)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&mut self, delay: Duration, kind: TimerKind) -> TimerId {
        let id = self.allocate();
        let tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TvEvent::Timer { id, kind }).await;
        });
        self.tasks.insert(id, handle.abort_handle());
        id
    }

    fn schedule_repeating(&mut self, period: Duration, kind: TimerKind) -> TimerId {
        let id = self.allocate();
        let tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(TvEvent::Timer { id, kind }).await.is_err() {
                    break;
                }
            }
        });
        self.tasks.insert(id, handle.abort_handle());
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.tasks.remove(&id) {
            handle.abort();
        }
    }

    fn live_timers(&self) -> usize {
        self.tasks.values().filter(|h| !h.is_finished()).count()
    }
}

/// Run the core until `Shutdown` or until every sender is gone.  After each
/// event the host's completions are delivered, the snapshot is published and
/// the produced notices are broadcast.
pub async fn run<H: HostEvents>(
    mut core: TvCore,
    mut host: H,
    mut event_rx: mpsc::Receiver<TvEvent>,
    state_manager: StateManager,
    notice_tx: broadcast::Sender<Notice>,
) -> anyhow::Result<()> {
    info!("TvCore: starting event loop");
    core.start();
    settle(&mut core, &mut host, &state_manager, &notice_tx).await;

    loop {
        let Some(evt) = event_rx.recv().await else {
            info!("TvCore: event channel closed, shutting down");
            core.handle(TvEvent::Shutdown);
            break;
        };
        let shutdown = evt == TvEvent::Shutdown;
        core.handle(evt);
        settle(&mut core, &mut host, &state_manager, &notice_tx).await;
        if shutdown {
            break;
        }
    }

    settle(&mut core, &mut host, &state_manager, &notice_tx).await;
    Ok(())
}

async fn settle<H: HostEvents>(
    core: &mut TvCore,
    host: &mut H,
    state_manager: &StateManager,
    notice_tx: &broadcast::Sender<Notice>,
) {
    loop {
        let events = host.drain_events();
        if events.is_empty() {
            break;
        }
        for evt in events {
            core.handle(evt);
        }
    }

    for notice in core.take_notices() {
        debug!("TvCore: notice {:?}", notice);
        // no receivers is fine
        let _ = notice_tx.send(notice);
    }
    state_manager.publish(core.snapshot()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBrowser;
    use tv_proto::platform::PlatformCapabilities;
    use tv_proto::playlist::{builtin_channels, Playlist};
    use tv_proto::protocol::{Command, KeepAlivePhase};
    use tv_proto::state::PlaybackState;

    #[tokio::test(start_paused = true)]
    async fn test_once_timer_posts_event() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler = TokioScheduler::new(tx);
        let id = scheduler.schedule_once(Duration::from_millis(500), TimerKind::StaticWindow);
        let evt = rx.recv().await.unwrap();
        assert_eq!(
            evt,
            TvEvent::Timer {
                id,
                kind: TimerKind::StaticWindow
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler = TokioScheduler::new(tx);
        let id = scheduler.schedule_repeating(Duration::from_secs(1), TimerKind::Sweep);
        assert_eq!(scheduler.live_timers(), 1);
        scheduler.cancel(id);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(scheduler.live_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_publishes_and_shuts_down() {
        let caps = PlatformCapabilities::desktop();
        let (event_tx, event_rx) = mpsc::channel(64);
        let (notice_tx, mut notice_rx) = broadcast::channel(256);
        let state_manager = StateManager::new();

        let browser = SimBrowser::new(&caps);
        let host = browser.host(Box::new(TokioScheduler::new(event_tx.clone())));
        let playlist = Playlist::load(builtin_channels()).unwrap();
        let core = TvCore::new(
            playlist,
            caps,
            crate::channel::ChannelSettings::default(),
            PlaybackState::default(),
            host,
        );

        event_tx
            .send(TvEvent::Command(Command::ToggleMute))
            .await
            .unwrap();
        event_tx.send(TvEvent::Shutdown).await.unwrap();
        run(core, browser.clone(), event_rx, state_manager.clone(), notice_tx)
            .await
            .unwrap();

        let snapshot = state_manager.get_state().await;
        assert!(!snapshot.is_muted);
        assert_eq!(snapshot.keep_alive, KeepAlivePhase::Idle);
        assert_eq!(browser.live_wake_locks(), 0);

        let mut saw_channel = false;
        while let Ok(notice) = notice_rx.try_recv() {
            if matches!(notice, Notice::ChannelChanged { .. }) {
                saw_channel = true;
            }
        }
        assert!(saw_channel);
    }
}
