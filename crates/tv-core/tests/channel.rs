mod common;

use common::{abc, assert_invariants, desktop};
use tv_core::event::TvEvent;
use tv_core::sim::Harness;
use tv_core::surface::{MediaEvent, SurfaceKind};
use tv_proto::platform::PlatformCapabilities;
use tv_proto::playlist::Direction;
use tv_proto::protocol::{ChannelPhase, Command, Notice};
use tv_proto::state::PlaybackState;

fn up() -> Command {
    Command::ChangeChannel {
        direction: Direction::Up,
    }
}

fn down() -> Command {
    Command::ChangeChannel {
        direction: Direction::Down,
    }
}

#[test]
fn down_from_first_channel_wraps() {
    let mut h = desktop();
    h.send(down());
    h.advance_ms(500);
    assert_eq!(h.snapshot().current_channel, 2);
    assert_eq!(h.primary().unwrap().source.as_deref(), Some("c.webm"));
}

#[test]
fn presses_during_static_window_accumulate() {
    let mut h = desktop();
    h.take_notices();
    h.send(up());
    h.advance_ms(200);
    h.send(up());
    h.advance_ms(299);
    assert_eq!(h.snapshot().current_channel, 0);
    h.advance_ms(1);

    assert_eq!(h.snapshot().current_channel, 2);
    let notices = h.take_notices();
    let statics = notices
        .iter()
        .filter(|n| matches!(n, Notice::StaticShown { .. }))
        .count();
    assert_eq!(statics, 1);
    // one new surface for both presses
    assert_eq!(h.browser.created_surfaces(SurfaceKind::Channel), 2);
}

#[test]
fn opposite_presses_reload_the_same_channel() {
    let mut h = desktop();
    h.send(up());
    h.send(down());
    h.advance_ms(500);
    assert_eq!(h.snapshot().current_channel, 0);
    assert_eq!(h.snapshot().channel_phase, ChannelPhase::Stable);
}

#[test]
fn static_gain_is_silent_when_muted() {
    let mut h = desktop();
    h.take_notices();
    h.send(up());
    assert!(h
        .take_notices()
        .contains(&Notice::StaticShown { gain: 0.0 }));
}

#[test]
fn broken_source_skips_to_next_channel() {
    let mut h = Harness::new(abc(), PlatformCapabilities::desktop(), PlaybackState::new(true, 50));
    h.browser.break_source("b.webm");
    h.start();

    h.send(up());
    h.advance_ms(500);
    assert_eq!(h.snapshot().current_channel, 1);
    assert!(h.core.channel().has_pending_skip());
    assert!(h.snapshot().is_channel_changing);

    h.advance_ms(500);
    assert_eq!(h.snapshot().current_channel, 2);
    assert!(!h.core.channel().has_pending_skip());
    assert!(!h.snapshot().is_channel_changing);
    assert_invariants(&h);
}

#[test]
fn all_sources_broken_gives_up_after_one_pass() {
    let mut h = Harness::new(abc(), PlatformCapabilities::desktop(), PlaybackState::new(true, 50));
    for source in ["a.webm", "b.webm", "c.webm"] {
        h.browser.break_source(source);
    }
    h.start();
    h.advance_ms(60_000);

    assert_eq!(h.browser.created_surfaces(SurfaceKind::Channel), 3);
    assert!(h.take_notices().contains(&Notice::StaticHidden));
    assert!(!h.core.channel().has_pending_skip());
    assert_eq!(h.core.live_timers(), 0);
    assert_eq!(h.snapshot().channel_phase, ChannelPhase::Stable);

    // a user change starts a fresh attempt budget
    h.send(up());
    h.advance_ms(60_000);
    assert_eq!(h.browser.created_surfaces(SurfaceKind::Channel), 6);
    let notices = h.take_notices();
    let shown = notices
        .iter()
        .filter(|n| matches!(n, Notice::StaticShown { .. }))
        .count();
    let hidden = notices
        .iter()
        .filter(|n| matches!(n, Notice::StaticHidden))
        .count();
    assert_eq!((shown, hidden), (1, 1));
    assert!(!h.snapshot().is_channel_changing);
}

#[test]
fn user_change_overrides_pending_skip() {
    let mut h = Harness::new(abc(), PlatformCapabilities::desktop(), PlaybackState::new(true, 50));
    h.browser.break_source("b.webm");
    h.start();

    h.send(up());
    h.advance_ms(500);
    assert!(h.core.channel().has_pending_skip());

    h.advance_ms(100);
    h.send(down());
    assert!(!h.core.channel().has_pending_skip());
    h.advance_ms(500);
    assert_eq!(h.snapshot().current_channel, 0);

    // the cancelled skip never lands
    h.advance_ms(5_000);
    assert_eq!(h.snapshot().current_channel, 0);
}

#[test]
fn error_during_static_window_is_left_to_pending_change() {
    let mut h = desktop();
    let primary = h.core.channel().surface_id().unwrap();
    h.send(up());
    h.handle(TvEvent::Media {
        surface: primary,
        event: MediaEvent::Error("network".into()),
    });
    assert!(!h.core.channel().has_pending_skip());
    h.advance_ms(500);
    assert_eq!(h.snapshot().current_channel, 1);
}

#[test]
fn events_from_retired_surface_are_ignored() {
    let mut h = desktop();
    let old = h.core.channel().surface_id().unwrap();
    h.send(up());
    h.advance_ms(500);
    assert_ne!(h.core.channel().surface_id(), Some(old));

    h.handle(TvEvent::Media {
        surface: old,
        event: MediaEvent::Error("late".into()),
    });
    h.handle(TvEvent::Media {
        surface: old,
        event: MediaEvent::Ended,
    });
    assert!(!h.core.channel().has_pending_skip());
    assert_eq!(h.snapshot().current_channel, 1);
    assert!(h.browser.surface(old).unwrap().destroyed);
}

#[test]
fn ended_restarts_loop_unless_changing() {
    let mut h = desktop();
    let primary = h.core.channel().surface_id().unwrap();
    h.browser.end_surface(primary);
    h.pump();
    let state = h.browser.surface(primary).unwrap();
    assert!(!state.ended && !state.paused);

    h.send(up());
    h.browser.end_surface(primary);
    h.pump();
    assert!(h.browser.surface(primary).unwrap().ended);
}

#[test]
fn pause_while_unmuted_resumes() {
    let mut h = desktop();
    h.send(Command::ToggleMute);
    let primary = h.core.channel().surface_id().unwrap();
    h.browser.pause_surface(primary);
    h.pump();
    assert!(!h.browser.surface(primary).unwrap().paused);
}

#[test]
fn can_play_is_handled_once() {
    let mut h = desktop();
    let primary = h.core.channel().surface_id().unwrap();
    h.send(up());
    // a second canplay from the old surface must not hide the static
    h.handle(TvEvent::Media {
        surface: primary,
        event: MediaEvent::CanPlay,
    });
    assert_eq!(h.snapshot().channel_phase, ChannelPhase::StaticShowing);
    assert!(h.snapshot().is_channel_changing);
}

#[test]
fn blocked_autoplay_waits_for_sweep() {
    let mut h = desktop();
    h.browser.block_unmuted_autoplay(true);
    h.send(Command::ToggleMute);
    assert!(h.primary().unwrap().paused);

    h.browser.block_unmuted_autoplay(false);
    h.advance_ms(3000);
    assert!(!h.primary().unwrap().paused);
}

#[test]
fn ios_stall_nudges_playback() {
    let mut h = common::ios();
    h.send(Command::ToggleMute);
    let primary = h.core.channel().surface_id().unwrap();
    h.browser.suspend_silently(primary);
    h.browser.stall_surface(primary);
    h.pump();
    assert!(!h.browser.surface(primary).unwrap().paused);
}
