//! Configuration loading and resolution.
//!
//! Values come from an optional TOML file; command-line flags win over the file,
//! and library defaults fill whatever neither sets.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use audio_player::config::{EngineConfig, PlaybackConfig};
use serde::Deserialize;

use crate::cli::Tuning;

/// Top-level player configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlayerConfig {
    /// Music library root used when `play`/`scan` get no path.
    pub music_dir: Option<PathBuf>,
    /// Output device substring.
    pub device: Option<String>,
    /// Start in shuffle mode.
    pub shuffle: Option<bool>,
    pub buffer_seconds: Option<f32>,
    pub chunk_frames: Option<usize>,
    pub refill_max_frames: Option<usize>,
    pub control_capacity: Option<usize>,
    /// Playlist file written by `scan` and replayed by `play --playlist`.
    pub playlist_file: Option<PathBuf>,
}

impl PlayerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        toml::from_str::<PlayerConfig>(&raw).with_context(|| format!("parse config {:?}", path))
    }
}

/// Effective settings after merging file and flags.
#[derive(Clone, Debug)]
pub struct Settings {
    pub playback: PlaybackConfig,
    pub engine: EngineConfig,
    pub music_dir: Option<PathBuf>,
    pub playlist_file: Option<PathBuf>,
}

impl Settings {
    pub fn resolve(file: PlayerConfig, flags: &Tuning) -> Self {
        let defaults = PlaybackConfig::default();
        let playback = PlaybackConfig {
            chunk_frames: flags
                .chunk_frames
                .or(file.chunk_frames)
                .unwrap_or(defaults.chunk_frames),
            refill_max_frames: flags
                .refill_max_frames
                .or(file.refill_max_frames)
                .unwrap_or(defaults.refill_max_frames),
            buffer_seconds: flags
                .buffer_seconds
                .or(file.buffer_seconds)
                .unwrap_or(defaults.buffer_seconds),
            device: normalize_device_name(flags.device.clone().or(file.device)),
        };

        let engine_defaults = EngineConfig::default();
        let engine = EngineConfig {
            control_capacity: flags
                .control_capacity
                .or(file.control_capacity)
                .unwrap_or(engine_defaults.control_capacity),
            shuffle: file.shuffle.unwrap_or(engine_defaults.shuffle),
            shuffle_seed: None,
        };

        Self {
            playback,
            engine,
            music_dir: file.music_dir,
            playlist_file: file.playlist_file,
        }
    }
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_file() {
        let cfg: PlayerConfig = toml::from_str(
            r#"
            music_dir = "/srv/music"
            device = "USB DAC"
            shuffle = true
            buffer_seconds = 1.5
            chunk_frames = 512
            refill_max_frames = 2048
            control_capacity = 4
            playlist_file = "/var/lib/player/all.m3u"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.music_dir, Some(PathBuf::from("/srv/music")));
        assert_eq!(cfg.shuffle, Some(true));
        assert_eq!(cfg.control_capacity, Some(4));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<PlayerConfig>("volume = 3").is_err());
    }

    #[test]
    fn flags_override_file_values() {
        let file = PlayerConfig {
            device: Some("Speakers".into()),
            chunk_frames: Some(512),
            buffer_seconds: Some(4.0),
            ..PlayerConfig::default()
        };
        let flags = Tuning {
            device: Some("  USB DAC ".into()),
            chunk_frames: Some(256),
            ..Tuning::default()
        };
        let s = Settings::resolve(file, &flags);
        assert_eq!(s.playback.device.as_deref(), Some("USB DAC"));
        assert_eq!(s.playback.chunk_frames, 256);
        assert_eq!(s.playback.buffer_seconds, 4.0);
        assert_eq!(s.playback.refill_max_frames, 4096);
        assert_eq!(s.engine.control_capacity, 8);
    }

    #[test]
    fn blank_device_means_default() {
        assert_eq!(normalize_device_name(Some("  ".to_string())), None);
        assert_eq!(
            normalize_device_name(Some("USB  DAC".to_string())),
            Some("USB  DAC".to_string())
        );
    }

    #[test]
    fn load_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.toml");
        std::fs::write(&path, "shuffle = \"yes\"").unwrap();
        let err = PlayerConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("player.toml"));
    }
}
