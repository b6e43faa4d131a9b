#![allow(dead_code)]

use tv_core::sim::Harness;
use tv_core::surface::SurfaceKind;
use tv_proto::platform::PlatformCapabilities;
use tv_proto::playlist::{ChannelEntry, Playlist};
use tv_proto::state::PlaybackState;

pub fn abc() -> Playlist {
    Playlist::load(vec![
        ChannelEntry::new("a.webm", Some("A")),
        ChannelEntry::new("b.webm", Some("B")),
        ChannelEntry::new("c.webm", Some("C")),
    ])
    .unwrap()
}

/// Started harness on the A/B/C list, muted at volume 50.
pub fn started(caps: PlatformCapabilities) -> Harness {
    started_with(caps, true, 50)
}

pub fn started_with(caps: PlatformCapabilities, muted: bool, volume: u8) -> Harness {
    let mut h = Harness::new(abc(), caps, PlaybackState::new(muted, volume));
    h.start();
    h
}

pub fn desktop() -> Harness {
    started(PlatformCapabilities::desktop())
}

pub fn ios() -> Harness {
    started(PlatformCapabilities::ios())
}

/// Properties that hold after every fully delivered event.
pub fn assert_invariants(h: &Harness) {
    assert!(
        h.browser.max_live_wake_locks() <= 1,
        "more than one wake lock was live at once"
    );
    assert!(h.browser.playing_fallbacks() <= 1, "fallback loops multiplied");
    assert!(h.browser.live_surfaces(SurfaceKind::FallbackLoop).len() <= 1);
    assert_eq!(h.browser.live_surfaces(SurfaceKind::Channel).len(), 1);

    let state = h.core.state();
    assert!(state.volume_level() <= 100);
    assert!(state.current_channel() < h.core.channel().playlist().len());

    if state.is_muted() {
        assert_eq!(h.browser.live_wake_locks(), 0, "wake lock held while muted");
        assert_eq!(h.browser.playing_fallbacks(), 0, "fallback playing while muted");
        assert!(!h.core.keep_alive().has_sweep_timer(), "sweep running while muted");
    }
}
