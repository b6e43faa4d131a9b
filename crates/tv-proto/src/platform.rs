use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::KeepAliveConfig;

const APP_DIR: &str = "kafka-tv";

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/kafka-tv/ (XDG standard)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(APP_DIR)
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

// ── browser identity ──────────────────────────────────────────────────────────

/// What the host page reports about the browser it runs in.  Only ever read
/// by [`PlatformCapabilities::detect`]; nothing else sniffs user agents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BrowserIdentity {
    pub user_agent: String,
    pub max_touch_points: u32,
    /// `'wakeLock' in navigator`
    pub wake_lock_api: bool,
}

impl BrowserIdentity {
    /// iPhone / iPad / iPod, including iPadOS 13+ which identifies as a Mac
    /// but has a touch screen.
    pub fn is_ios(&self) -> bool {
        let ua = &self.user_agent;
        if ua.contains("iPad") || ua.contains("iPhone") || ua.contains("iPod") {
            return true;
        }
        ua.contains("Mac") && self.max_touch_points > 1
    }

    pub fn is_safari(&self) -> bool {
        let ua = self.user_agent.to_ascii_lowercase();
        ua.contains("safari") && !ua.contains("chrome") && !ua.contains("android")
    }
}

// ── capabilities ──────────────────────────────────────────────────────────────

/// Everything the core is allowed to branch on.  Computed once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformCapabilities {
    /// A platform wake-lock API exists.
    pub supports_wake_lock: bool,
    /// The OS only stays awake while audible media plays and silently drops
    /// wake locks (iOS Safari).  Enables the aggressive sweep, the fallback
    /// loop alongside a held wake lock, and immediate re-acquire on release.
    pub requires_continuous_audio: bool,
    /// Route the primary surface through an audio graph with a gain node.
    pub uses_audio_graph: bool,
    pub sweep_interval: Duration,
    pub reacquire_delay: Duration,
    /// Lowest volume written to a surface that is meant to be audible.
    pub audible_floor: f32,
}

impl PlatformCapabilities {
    pub fn detect(identity: &BrowserIdentity, keep_alive: &KeepAliveConfig) -> Self {
        let ios = identity.is_ios();
        let sweep_ms = if ios {
            keep_alive.continuous_audio_sweep_interval_ms
        } else {
            keep_alive.sweep_interval_ms
        };

        let caps = Self {
            supports_wake_lock: identity.wake_lock_api,
            requires_continuous_audio: ios,
            uses_audio_graph: ios,
            sweep_interval: Duration::from_millis(sweep_ms.max(1)),
            reacquire_delay: Duration::from_millis(keep_alive.reacquire_delay_ms),
            audible_floor: keep_alive.audible_floor.clamp(0.0, 1.0),
        };

        tracing::info!(
            ios,
            safari = identity.is_safari(),
            wake_lock_api = identity.wake_lock_api,
            max_touch_points = identity.max_touch_points,
            "platform capabilities detected: {:?}",
            caps
        );
        if ios {
            tracing::info!("iOS detected: audio must remain unmuted and playing to keep the screen awake");
        }
        caps
    }

    /// Desktop defaults: wake lock available, no continuous-audio requirement.
    pub fn desktop() -> Self {
        Self::detect(
            &BrowserIdentity {
                user_agent: DESKTOP_USER_AGENT.to_string(),
                max_touch_points: 0,
                wake_lock_api: true,
            },
            &KeepAliveConfig::default(),
        )
    }

    /// iOS Safari 16.4+ defaults: wake lock API present but unreliable.
    pub fn ios() -> Self {
        Self::detect(
            &BrowserIdentity {
                user_agent: IOS_USER_AGENT.to_string(),
                max_touch_points: 5,
                wake_lock_api: true,
            },
            &KeepAliveConfig::default(),
        )
    }

    /// Audible volume for a 0–100 level, never below the floor.
    pub fn audible_volume(&self, level: u8) -> f32 {
        (f32::from(level.min(100)) / 100.0).max(self.audible_floor)
    }
}

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

pub const IOS_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(ua: &str, touch: u32) -> BrowserIdentity {
        BrowserIdentity {
            user_agent: ua.to_string(),
            max_touch_points: touch,
            wake_lock_api: true,
        }
    }

    #[test]
    fn test_iphone_is_ios_safari() {
        let id = identity(IOS_USER_AGENT, 5);
        assert!(id.is_ios());
        assert!(id.is_safari());
    }

    #[test]
    fn test_ipados_desktop_mode_detected_by_touch_points() {
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
                  (KHTML, like Gecko) Version/17.0 Safari/605.1.15";
        assert!(identity(ua, 5).is_ios());
        assert!(!identity(ua, 0).is_ios());
    }

    #[test]
    fn test_chrome_is_not_safari() {
        let id = identity(DESKTOP_USER_AGENT, 0);
        assert!(!id.is_ios());
        assert!(!id.is_safari());
    }

    #[test]
    fn test_sweep_interval_follows_platform() {
        let cfg = KeepAliveConfig::default();
        let ios = PlatformCapabilities::detect(&identity(IOS_USER_AGENT, 5), &cfg);
        let desktop = PlatformCapabilities::detect(&identity(DESKTOP_USER_AGENT, 0), &cfg);
        assert_eq!(ios.sweep_interval, Duration::from_secs(1));
        assert_eq!(desktop.sweep_interval, Duration::from_secs(3));
        assert!(ios.requires_continuous_audio && ios.uses_audio_graph);
        assert!(!desktop.requires_continuous_audio && !desktop.uses_audio_graph);
    }

    #[test]
    fn test_audible_volume_floor() {
        let caps = PlatformCapabilities::desktop();
        assert_eq!(caps.audible_volume(0), 0.01);
        assert_eq!(caps.audible_volume(50), 0.5);
        assert_eq!(caps.audible_volume(200), 1.0);
    }
}
