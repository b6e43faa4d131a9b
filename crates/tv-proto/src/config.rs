use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform::{self, BrowserIdentity};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub playlist: PlaylistConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub keep_alive: KeepAliveConfig,
    #[serde(default)]
    pub platform: BrowserIdentityConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Where the channel list comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistConfig {
    /// Local TOML `[[channel]]` file (highest priority).
    /// Defaults to `$XDG_CONFIG_HOME/kafka-tv/channels.toml`.
    #[serde(default = "default_playlist_toml")]
    pub playlist_toml: PathBuf,
    /// Media manifest JSON produced by the asset scanner (fallback).
    #[serde(default)]
    pub manifest: Option<PathBuf>,
    /// Prefix joined with manifest-relative video paths.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_true")]
    pub shuffle: bool,
    /// Fixed shuffle seed; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_true")]
    pub start_muted: bool,
    #[serde(default = "default_initial_volume")]
    pub initial_volume: u8,
    /// Volume delta for the arrow keys / wheel.
    #[serde(default = "default_volume_step")]
    pub volume_step: i32,
    /// Length of the static window between channels.
    #[serde(default = "default_half_second")]
    pub static_delay_ms: u64,
    /// Delay before skipping a channel whose source failed.
    #[serde(default = "default_half_second")]
    pub error_skip_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepAliveConfig {
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Sweep period on platforms that need continuous audio (iOS).
    #[serde(default = "default_continuous_sweep_interval_ms")]
    pub continuous_audio_sweep_interval_ms: u64,
    #[serde(default = "default_reacquire_delay_ms")]
    pub reacquire_delay_ms: u64,
    #[serde(default = "default_audible_floor")]
    pub audible_floor: f32,
}

/// Browser the simulated host pretends to be.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserIdentityConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub max_touch_points: u32,
    #[serde(default = "default_true")]
    pub wake_lock_api: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            playlist_toml: default_playlist_toml(),
            manifest: None,
            base_url: default_base_url(),
            shuffle: true,
            seed: None,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            start_muted: true,
            initial_volume: default_initial_volume(),
            volume_step: default_volume_step(),
            static_delay_ms: default_half_second(),
            error_skip_delay_ms: default_half_second(),
        }
    }
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval_ms(),
            continuous_audio_sweep_interval_ms: default_continuous_sweep_interval_ms(),
            reacquire_delay_ms: default_reacquire_delay_ms(),
            audible_floor: default_audible_floor(),
        }
    }
}

impl Default for BrowserIdentityConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            max_touch_points: 0,
            wake_lock_api: true,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl BrowserIdentityConfig {
    pub fn identity(&self) -> BrowserIdentity {
        BrowserIdentity {
            user_agent: self.user_agent.clone(),
            max_touch_points: self.max_touch_points,
            wake_lock_api: self.wake_lock_api,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_playlist_toml() -> PathBuf {
    platform::config_dir().join("channels.toml")
}

fn default_base_url() -> String {
    "https://github.com/rockenman1234/kafka/raw/main/".to_string()
}

fn default_initial_volume() -> u8 {
    50
}

fn default_volume_step() -> i32 {
    5
}

fn default_half_second() -> u64 {
    500
}

fn default_sweep_interval_ms() -> u64 {
    3000
}

fn default_continuous_sweep_interval_ms() -> u64 {
    1000
}

fn default_reacquire_delay_ms() -> u64 {
    100
}

fn default_audible_floor() -> f32 {
    0.01
}

fn default_user_agent() -> String {
    platform::DESKTOP_USER_AGENT.to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
