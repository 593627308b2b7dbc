// src/config.rs

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::engine::ScaledDistance;
use crate::error::ConfigError;
use crate::harmonics::F0Search;
use crate::spectrogram::SpectrogramParams;

const CONFIG_FILE_NAME: &str = ".changepoint_annotator.json";

/// How "click near an existing point" is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Euclidean over (dt / time_unit_s, df / freq_unit_hz).
    #[default]
    Scaled,
    /// Euclidean in display pixels.
    Display,
}

impl DistanceMetric {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "scaled" => Some(DistanceMetric::Scaled),
            "display" | "pixels" => Some(DistanceMetric::Display),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    pub metric: DistanceMetric,
    /// A point is "near" when its distance is strictly below this.
    pub threshold: f64,
    pub time_unit_s: f64,
    pub freq_unit_hz: f64,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        let scaled = ScaledDistance::default();
        Self {
            metric: DistanceMetric::Scaled,
            threshold: 1.0,
            time_unit_s: scaled.time_unit_s,
            freq_unit_hz: scaled.freq_unit_hz,
        }
    }
}

impl RemovalConfig {
    pub fn scaled_distance(&self) -> ScaledDistance {
        ScaledDistance {
            time_unit_s: self.time_unit_s,
            freq_unit_hz: self.freq_unit_hz,
        }
    }
}

/// Where the fundamental is looked for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonicConfig {
    pub f0_min_hz: f64,
    pub f0_max_hz: f64,
    pub prominence_db: f32,
}

impl Default for HarmonicConfig {
    fn default() -> Self {
        let search = F0Search::default();
        Self {
            f0_min_hz: search.min_hz,
            f0_max_hz: search.max_hz,
            prominence_db: search.prominence_db,
        }
    }
}

impl HarmonicConfig {
    pub fn search(&self) -> F0Search {
        F0Search {
            min_hz: self.f0_min_hz,
            max_hz: self.f0_max_hz,
            prominence_db: self.prominence_db,
        }
    }
}

/// User configuration, persisted as JSON in the home directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    pub last_directory: Option<PathBuf>,
    pub removal: RemovalConfig,
    pub spectrogram: SpectrogramParams,
    pub harmonics: HarmonicConfig,
    /// How many "Clear Previous" events are remembered.
    pub history_depth: usize,
    /// Open contours with at least this many points are finished on navigation.
    pub auto_finish_min_points: usize,
    pub audio_extensions: Vec<String>,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            last_directory: None,
            removal: RemovalConfig::default(),
            spectrogram: SpectrogramParams::default(),
            harmonics: HarmonicConfig::default(),
            history_depth: 1,
            auto_finish_min_points: 2,
            audio_extensions: ["wav", "flac", "mp3", "ogg"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl AnnotatorConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
    }

    /// Missing file means defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Like `load`, but a broken config only costs a warning.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        Self::load(path).unwrap_or_else(|e| {
            warn!("Could not load config: {e}");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let file = File::create(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), self).map_err(|source| {
            ConfigError::Json {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.removal;
        if !(r.threshold > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "removal.threshold must be positive, got {}",
                r.threshold
            )));
        }
        if !(r.time_unit_s > 0.0 && r.freq_unit_hz > 0.0) {
            return Err(ConfigError::Invalid(
                "removal.time_unit_s and removal.freq_unit_hz must be positive".into(),
            ));
        }
        let s = &self.spectrogram;
        if s.nfft < 16 {
            return Err(ConfigError::Invalid(format!(
                "spectrogram.nfft must be at least 16, got {}",
                s.nfft
            )));
        }
        if s.overlap >= s.nfft {
            return Err(ConfigError::Invalid(format!(
                "spectrogram.overlap ({}) must be smaller than nfft ({})",
                s.overlap, s.nfft
            )));
        }
        if s.fmax > 0.0 && s.fmax <= s.fmin {
            return Err(ConfigError::Invalid(
                "spectrogram.fmax must be above fmin".into(),
            ));
        }
        let h = &self.harmonics;
        if !(h.f0_min_hz >= 0.0 && h.f0_max_hz > h.f0_min_hz) {
            return Err(ConfigError::Invalid(format!(
                "harmonics band {}-{} Hz is empty",
                h.f0_min_hz, h.f0_max_hz
            )));
        }
        if !(h.prominence_db >= 0.0) {
            return Err(ConfigError::Invalid(
                "harmonics.prominence_db must not be negative".into(),
            ));
        }
        if self.audio_extensions.is_empty() {
            return Err(ConfigError::Invalid("audio_extensions is empty".into()));
        }
        Ok(())
    }

    pub fn remember_directory(&mut self, directory: &Path) {
        self.last_directory = Some(directory.to_path_buf());
    }

    /// The last opened directory, if it still exists.
    pub fn last_directory(&self) -> Option<&Path> {
        self.last_directory
            .as_deref()
            .filter(|dir| dir.is_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AnnotatorConfig::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, AnnotatorConfig::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{ "removal": { "threshold": 2.5, "metric": "display" } }"#)
            .unwrap();

        let config = AnnotatorConfig::load(&path).unwrap();
        assert_eq!(config.removal.threshold, 2.5);
        assert_eq!(config.removal.metric, DistanceMetric::Display);
        assert_eq!(config.removal.time_unit_s, 0.01);
        assert_eq!(config.spectrogram.nfft, 512);
    }

    #[test]
    fn save_then_load_preserves_last_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.json");
        let mut config = AnnotatorConfig::default();
        config.remember_directory(dir.path());
        config.save(&path).unwrap();

        let loaded = AnnotatorConfig::load(&path).unwrap();
        assert_eq!(loaded.last_directory(), Some(dir.path()));
    }

    #[test]
    fn rejects_overlap_not_below_nfft() {
        let mut config = AnnotatorConfig::default();
        config.spectrogram.overlap = config.spectrogram.nfft;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_an_empty_fundamental_band() {
        let mut config = AnnotatorConfig::default();
        assert_eq!(config.harmonics.search().max_hz, 8000.0);
        config.harmonics.f0_max_hz = config.harmonics.f0_min_hz;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(
            AnnotatorConfig::load_or_default(Some(&path)),
            AnnotatorConfig::default()
        );
    }
}
