//! Channel list: loading, one-time shuffle, and wraparound indexing.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// One channel.  Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub source: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl ChannelEntry {
    pub fn new(source: impl Into<String>, description: Option<&str>) -> Self {
        Self {
            source: source.into(),
            description: description.map(str::to_string),
        }
    }

    /// Text for the rolodex display.
    pub fn caption(&self) -> &str {
        self.description
            .as_deref()
            .unwrap_or("Lorem ipsum dolor sit amet")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn step(self) -> i64 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }
}

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("playlist is empty")]
    Empty,
    #[error("invalid playlist TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid media manifest: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered, possibly shuffled channel list.  Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    entries: Vec<ChannelEntry>,
}

impl Playlist {
    /// An empty list is a configuration error, surfaced here at startup.
    pub fn load(raw: Vec<ChannelEntry>) -> Result<Self, PlaylistError> {
        if raw.is_empty() {
            return Err(PlaylistError::Empty);
        }
        Ok(Self { entries: raw })
    }

    /// Unbiased Fisher–Yates permutation.  A seed makes it reproducible.
    pub fn shuffle(&mut self, seed: Option<u64>) {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.entries.shuffle(&mut rng);
    }

    pub fn shuffled(mut self, seed: Option<u64>) -> Self {
        self.shuffle(seed);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: usize) -> Option<&ChannelEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelEntry> {
        self.entries.iter()
    }

    /// Neighbour of `index`, wrapping in both directions.
    pub fn next(&self, index: usize, direction: Direction) -> usize {
        self.step(index, direction.step())
    }

    /// `index + steps` modulo the playlist length.
    pub fn step(&self, index: usize, steps: i64) -> usize {
        let len = self.entries.len() as i64;
        (index as i64 + steps).rem_euclid(len) as usize
    }
}

// ── TOML channel loader ───────────────────────────────────────────────────────

/// Matches the `[[channel]]` table of `channels.toml`.
#[derive(Debug, Deserialize)]
struct TomlChannelFile {
    #[serde(default)]
    channel: Vec<ChannelEntry>,
}

pub fn parse_channels_from_toml_str(content: &str) -> Result<Vec<ChannelEntry>, PlaylistError> {
    let file: TomlChannelFile = toml::from_str(content)?;
    Ok(file.channel)
}

pub fn load_channels_from_toml(path: &Path) -> Result<Vec<ChannelEntry>, PlaylistError> {
    let content = std::fs::read_to_string(path)?;
    parse_channels_from_toml_str(&content)
}

// ── media manifest ────────────────────────────────────────────────────────────

/// Output of the asset scanner: sorted relative paths of the videos and
/// background images that ship with the site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaManifest {
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub videos: Vec<String>,
    #[serde(default)]
    pub backgrounds: Vec<String>,
}

impl MediaManifest {
    pub fn parse(content: &str) -> Result<Self, PlaylistError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, PlaylistError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// One channel per video, in manifest order, sources prefixed with
    /// `base_url`.
    pub fn channels(&self, base_url: &str) -> Vec<ChannelEntry> {
        self.videos
            .iter()
            .map(|path| ChannelEntry::new(join_url(base_url, path), None))
            .collect()
    }
}

fn join_url(base: &str, path: &str) -> String {
    if base.is_empty() {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

// ── built-in list ─────────────────────────────────────────────────────────────

const BUILTIN_BASE: &str = "https://github.com/rockenman1234/kafka/raw/main/vids/";

const BUILTIN: &[(&str, &str)] = &[
    ("KAFKA1.webm", "A man walks into a career fair, looking for a job. As he approaches the booth, he is greeted by a representative who has no interest in hiring him."),
    ("KAFKA2.webm", "A woman goes to see her college counselor to discuss her future plans. The counselor is unhelpful and dismissive, leaving the woman feeling lost and uncertain."),
    ("KAFKA4.webm", "A classroom of students is working, but one student is sure he has meet his friends in real life before."),
    ("die-woodys.webm", "Fichtls Lied by Die Woodys is a novelty German folk-pop song that became infamous on the internet for its quirky, exaggerated performance style and its almost surreal, earworm-like melody."),
    ("KAFKA3.webm", "A young man walks into work hoping to make it home, but he finds himself transforming into a giant beast instead."),
    ("kafka-edit.webm", "Franz Kafka was a German-speaking Bohemian novelist and short story writer, widely regarded as one of the major figures of 20th-century literature."),
    ("yodel.webm", "Performed by Franzl Lang, known as the \"Yodel King,\" this traditional Alpine yodeling piece showcases his exceptional vocal range and skill."),
    ("holzhacker.webm", "A group of German woodcutters singing a traditional folk song while chopping wood in an auditorium."),
];

/// WebM-only list that ships with the site.
pub fn builtin_channels() -> Vec<ChannelEntry> {
    BUILTIN
        .iter()
        .map(|(file, description)| {
            ChannelEntry::new(format!("{BUILTIN_BASE}{file}"), Some(description))
        })
        .collect()
}

/// Resolve the channel list: TOML file, then manifest, then the built-in list.
pub fn load_channels(config: &crate::config::PlaylistConfig) -> Result<Playlist, PlaylistError> {
    let raw = if config.playlist_toml.exists() {
        tracing::info!("loading channels from {:?}", config.playlist_toml);
        load_channels_from_toml(&config.playlist_toml)?
    } else if let Some(manifest) = config.manifest.as_deref().filter(|p| p.exists()) {
        tracing::info!("loading channels from manifest {:?}", manifest);
        MediaManifest::load(manifest)?.channels(&config.base_url)
    } else {
        tracing::info!("no channel file found, using built-in list");
        builtin_channels()
    };

    let playlist = Playlist::load(raw)?;
    Ok(if config.shuffle {
        playlist.shuffled(config.seed)
    } else {
        playlist
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Playlist {
        Playlist::load(vec![
            ChannelEntry::new("a.webm", None),
            ChannelEntry::new("b.webm", None),
            ChannelEntry::new("c.webm", None),
        ])
        .unwrap()
    }

    #[test]
    fn test_empty_playlist_rejected() {
        assert!(matches!(Playlist::load(Vec::new()), Err(PlaylistError::Empty)));
    }

    #[test]
    fn test_next_wraps_both_ways() {
        let p = abc();
        assert_eq!(p.next(2, Direction::Up), 0);
        assert_eq!(p.next(0, Direction::Down), 2);
        assert_eq!(p.next(1, Direction::Up), 2);
        assert_eq!(p.step(0, -7), 2);
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let original = Playlist::load(builtin_channels()).unwrap();
        for seed in 0..20 {
            let shuffled = original.clone().shuffled(Some(seed));
            assert_eq!(shuffled.len(), original.len());
            let mut a: Vec<_> = original.iter().map(|e| e.source.clone()).collect();
            let mut b: Vec<_> = shuffled.iter().map(|e| e.source.clone()).collect();
            a.sort();
            b.sort();
            assert_eq!(a, b);
        }
        // unseeded shuffles are permutations too
        let shuffled = original.clone().shuffled(None);
        assert_eq!(shuffled.len(), original.len());
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let p = Playlist::load(builtin_channels()).unwrap();
        assert_eq!(p.clone().shuffled(Some(7)), p.shuffled(Some(7)));
    }

    #[test]
    fn test_parse_toml_channels() {
        let channels = parse_channels_from_toml_str(
            r#"
            [[channel]]
            source = "https://example.com/a.webm"
            description = "first"

            [[channel]]
            source = "https://example.com/b.webm"
            "#,
        )
        .unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].caption(), "first");
        assert_eq!(channels[1].description, None);
        assert_eq!(channels[1].caption(), "Lorem ipsum dolor sit amet");
    }

    #[test]
    fn test_manifest_channels() {
        let manifest = MediaManifest::parse(
            r#"{
                "generatedAt": "2025-01-02T03:04:05.678Z",
                "videos": ["vids/a.mp4", "vids/b.webm"],
                "backgrounds": ["background/x.gif"]
            }"#,
        )
        .unwrap();
        let channels = manifest.channels("https://cdn.example.com/");
        assert_eq!(channels[0].source, "https://cdn.example.com/vids/a.mp4");
        assert_eq!(manifest.backgrounds.len(), 1);
        assert_eq!(manifest.channels("")[1].source, "vids/b.webm");
    }

    #[test]
    fn test_builtin_list() {
        let channels = builtin_channels();
        assert_eq!(channels.len(), 8);
        assert!(channels.iter().all(|c| c.source.ends_with(".webm")));
    }
}
