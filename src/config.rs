use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::{MAX_RATE, MIN_RATE};
use crate::wave::DEFAULT_ENVELOPE_BUCKETS;

pub const CONFIG_ENV: &str = "ABWAVE_CONFIG";

/// Player defaults read from a TOML file. Every key is optional.
///
/// ```toml
/// envelope_buckets = 500
/// tick_interval_ms = 33
/// volume = 0.8
/// playback_rate = 1.0
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub envelope_buckets: usize,
    pub tick_interval_ms: u64,
    pub volume: f32,
    pub playback_rate: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            envelope_buckets: DEFAULT_ENVELOPE_BUCKETS,
            tick_interval_ms: 33,
            volume: 1.0,
            playback_rate: 1.0,
        }
    }
}

impl PlayerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("parse player config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Explicit path first, then `ABWAVE_CONFIG`, then built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(p) if !p.is_empty() => Self::load(&PathBuf::from(p)),
            _ => Ok(Self::default()),
        }
    }

    pub fn envelope_buckets(&self) -> usize {
        self.envelope_buckets.max(1)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn initial_volume(&self) -> f32 {
        if self.volume.is_finite() {
            self.volume.clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    pub fn initial_rate(&self) -> f32 {
        if self.playback_rate.is_finite() {
            self.playback_rate.clamp(MIN_RATE, MAX_RATE)
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = PlayerConfig::from_toml_str("").expect("parse empty");
        assert_eq!(cfg, PlayerConfig::default());
        assert_eq!(cfg.tick_interval(), Duration::from_millis(33));
        assert_eq!(cfg.envelope_buckets(), 500);
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let cfg = PlayerConfig::from_toml_str("volume = 0.25\ntick_interval_ms = 16\n")
            .expect("parse partial");
        assert_eq!(cfg.initial_volume(), 0.25);
        assert_eq!(cfg.tick_interval(), Duration::from_millis(16));
        assert_eq!(cfg.envelope_buckets, DEFAULT_ENVELOPE_BUCKETS);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let cfg = PlayerConfig::from_toml_str(
            "volume = 3.0\nplayback_rate = 0.1\nenvelope_buckets = 0\ntick_interval_ms = 0\n",
        )
        .expect("parse");
        assert_eq!(cfg.initial_volume(), 1.0);
        assert_eq!(cfg.initial_rate(), MIN_RATE);
        assert_eq!(cfg.envelope_buckets(), 1);
        assert_eq!(cfg.tick_interval(), Duration::from_millis(1));
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(PlayerConfig::from_toml_str("volume = \"loud\"").is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let path = std::env::temp_dir().join("abwave_config_does_not_exist.toml");
        assert!(PlayerConfig::resolve(Some(&path)).is_err());
    }
}
