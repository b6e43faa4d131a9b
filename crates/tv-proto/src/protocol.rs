use serde::{Deserialize, Serialize};

use crate::playlist::Direction;

/// Inputs from the presentation layer (buttons, knob, keyboard, page events).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    ToggleMute,
    /// Relative change from wheel / arrow keys.
    AdjustVolume { delta: i32 },
    /// Absolute level from a knob drag.
    SetVolume { level: u8 },
    ChangeChannel { direction: Direction },
    /// Page visibility changed (`document.hidden`).
    Visibility { hidden: bool },
    /// Window regained focus.
    Focus,
}

impl Command {
    /// Keyboard shortcuts of the TV page.
    pub fn from_key(key: &str, volume_step: i32) -> Option<Self> {
        match key {
            "ArrowUp" => Some(Command::ChangeChannel {
                direction: Direction::Up,
            }),
            "ArrowDown" => Some(Command::ChangeChannel {
                direction: Direction::Down,
            }),
            "ArrowRight" => Some(Command::AdjustVolume { delta: volume_step }),
            "ArrowLeft" => Some(Command::AdjustVolume {
                delta: -volume_step,
            }),
            "m" | "M" => Some(Command::ToggleMute),
            _ => None,
        }
    }
}

/// Keep-alive coordinator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KeepAlivePhase {
    #[default]
    Idle,
    /// Keep-alive wanted, wake-lock request still in flight.
    Transitioning,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WakeLockStatus {
    #[default]
    Released,
    Requesting,
    Held,
    /// Unsupported or denied; the fallback loop carries sleep prevention.
    Unavailable,
}

/// Channel controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelPhase {
    #[default]
    Stable,
    StaticShowing,
    Loading,
}

/// Outputs to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notice")]
pub enum Notice {
    ChannelChanged {
        index: usize,
        /// 1-based, as printed on the `CH n` display.
        number: usize,
        description: String,
    },
    /// Start the static canvas and play the noise burst at `gain`.
    StaticShown { gain: f32 },
    StaticHidden,
    VolumeIndicator { muted: bool, level: u8 },
    /// The primary surface was asked to play (`true`) or was paused.
    PlaybackIntent { play: bool },
    WakeLock { status: WakeLockStatus },
    KeepAlive { phase: KeepAlivePhase },
    Log { message: String },
}

impl Notice {
    /// `MUTE` / `VOL: n` text of the volume indicator.
    pub fn indicator_text(muted: bool, level: u8) -> String {
        if muted {
            "MUTE".to_string()
        } else {
            format!("VOL: {level}")
        }
    }
}

/// Full observable state, republished after every handled event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TvSnapshot {
    /// Monotonic revision counter.
    #[serde(default)]
    pub rev: u64,
    pub channels: Vec<String>,
    pub current_channel: usize,
    pub is_muted: bool,
    pub volume_level: u8,
    pub is_channel_changing: bool,
    pub channel_phase: ChannelPhase,
    pub keep_alive: KeepAlivePhase,
    pub wake_lock: WakeLockStatus,
    pub fallback_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bindings() {
        assert_eq!(
            Command::from_key("ArrowUp", 5),
            Some(Command::ChangeChannel {
                direction: Direction::Up
            })
        );
        assert_eq!(
            Command::from_key("ArrowLeft", 5),
            Some(Command::AdjustVolume { delta: -5 })
        );
        assert_eq!(Command::from_key("M", 5), Some(Command::ToggleMute));
        assert_eq!(Command::from_key("q", 5), None);
    }

    #[test]
    fn test_command_json_shape() {
        let cmd: Command = serde_json::from_str(r#"{"cmd":"AdjustVolume","delta":-10}"#).unwrap();
        assert_eq!(cmd, Command::AdjustVolume { delta: -10 });
        let json = serde_json::to_string(&Command::Visibility { hidden: true }).unwrap();
        assert_eq!(json, r#"{"cmd":"Visibility","hidden":true}"#);
    }

    #[test]
    fn test_notice_tagging() {
        let json = serde_json::to_value(Notice::WakeLock {
            status: WakeLockStatus::Held,
        })
        .unwrap();
        assert_eq!(json["notice"], "WakeLock");
        assert_eq!(json["status"], "Held");
    }

    #[test]
    fn test_indicator_text() {
        assert_eq!(Notice::indicator_text(true, 40), "MUTE");
        assert_eq!(Notice::indicator_text(false, 40), "VOL: 40");
    }
}
