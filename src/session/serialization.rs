// src/session/serialization.rs

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::warn;

use crate::contour::{FinishedContour, Point, SyllableMetrics};
use crate::decoder::AudioMeta;
use crate::error::PersistError;
use crate::spectrogram::{SpectrogramParams, WindowKind};

pub const ANNOTATION_VERSION: &str = "2.0";

// ==========================================
// WRITE SIDE
// ==========================================

/// On-disk shape of one audio file's annotations.
///
/// `syllables` duplicates `contours` for older readers.
#[derive(Serialize, Debug, Clone)]
pub struct AnnotationFile {
    pub audio_file: String,
    pub sample_rate: u32,
    pub duration: f64,
    pub contours: Vec<Vec<Point>>,
    pub syllables: Vec<Vec<Point>>,
    pub unusable: bool,
    pub skip_reason: Option<String>,
    pub syllable_metrics: Vec<SyllableMetrics>,
    pub nfft: usize,
    pub overlap: usize,
    pub window: WindowKind,
    pub annotation_version: String,
}

impl AnnotationFile {
    pub fn new(
        audio_file: &Path,
        meta: AudioMeta,
        contours: &[FinishedContour],
        unusable: bool,
        skip_reason: Option<String>,
        params: &SpectrogramParams,
    ) -> Self {
        let points: Vec<Vec<Point>> = contours.iter().map(|c| c.points().to_vec()).collect();
        let syllable_metrics = contours
            .iter()
            .enumerate()
            .map(|(i, c)| SyllableMetrics::from_contour(i, c))
            .collect();

        Self {
            audio_file: audio_file.to_string_lossy().into_owned(),
            sample_rate: meta.sample_rate,
            duration: meta.duration,
            syllables: points.clone(),
            contours: points,
            unusable,
            skip_reason,
            syllable_metrics,
            nfft: params.nfft,
            overlap: params.overlap,
            window: params.window,
            annotation_version: ANNOTATION_VERSION.to_string(),
        }
    }

    pub fn save_to_disk(&self, path: &Path) -> Result<(), PersistError> {
        let file = File::create(path).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self).map_err(|source| PersistError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

// ==========================================
// READ SIDE
// ==========================================

/// Permissive reader shape. Every field is optional so files written by
/// older tools still load.
#[derive(Deserialize, Debug, Default)]
pub struct RawAnnotationFile {
    pub audio_file: Option<String>,
    pub sample_rate: Option<u32>,
    pub duration: Option<f64>,
    pub contours: Option<Vec<Vec<Point>>>,
    pub syllables: Option<Vec<Vec<Point>>>,
    #[serde(default)]
    pub unusable: bool,
    /// Older name for `unusable`. Files may carry both.
    pub skipped: Option<bool>,
    pub skip_reason: Option<String>,
    pub nfft: Option<usize>,
    pub overlap: Option<usize>,
    pub window: Option<String>,
    /// Older files nest STFT settings here as `n_fft` / `hop_length`.
    pub spec_params: Option<LegacySpecParams>,
    pub annotation_version: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone, Copy)]
pub struct LegacySpecParams {
    pub n_fft: Option<usize>,
    pub hop_length: Option<usize>,
}

/// What a session restores from disk after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedAnnotations {
    pub audio_file: Option<String>,
    pub meta: Option<AudioMeta>,
    pub contours: Vec<FinishedContour>,
    pub unusable: bool,
    pub skip_reason: Option<String>,
    pub params: SpectrogramParams,
    pub version: Option<String>,
}

impl RawAnnotationFile {
    /// Any I/O failure is `Io`; anything serde rejects is `Malformed`, and so
    /// is a file carrying neither `contours` nor `syllables`.
    pub fn load_from_disk(path: &Path) -> Result<Self, PersistError> {
        let file = File::open(path).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);
        let raw: Self = serde_json::from_reader(reader).map_err(|e| {
            if e.is_io() {
                PersistError::Io {
                    path: path.to_path_buf(),
                    source: e.into(),
                }
            } else {
                PersistError::Malformed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        })?;

        if raw.contours.is_none() && raw.syllables.is_none() {
            return Err(PersistError::Malformed {
                path: path.to_path_buf(),
                reason: "missing contours and syllables".into(),
            });
        }
        Ok(raw)
    }

    /// Picks `contours` (or legacy `syllables`), drops unusable points and
    /// re-sorts each contour by time. Missing spectrogram settings come
    /// from `defaults`.
    pub fn normalize(self, defaults: &SpectrogramParams) -> LoadedAnnotations {
        let source = match self.contours {
            Some(c) if !c.is_empty() => c,
            _ => self.syllables.unwrap_or_default(),
        };

        let mut contours = Vec::with_capacity(source.len());
        for (i, points) in source.into_iter().enumerate() {
            let before = points.len();
            let finite: Vec<Point> = points.into_iter().filter(Point::is_finite).collect();
            if finite.len() < before {
                warn!("contour {} had {} non-finite point(s); dropped", i + 1, before - finite.len());
            }
            match FinishedContour::from_points(finite) {
                Some(contour) => contours.push(contour),
                None => warn!("skipping empty contour {}", i + 1),
            }
        }

        let window = match self.window.as_deref() {
            None => defaults.window,
            Some(name) => WindowKind::parse(name).unwrap_or_else(|| {
                warn!("unknown window '{name}', using {}", defaults.window);
                defaults.window
            }),
        };
        let legacy = self.spec_params.unwrap_or_default();
        let nfft = self.nfft.or(legacy.n_fft).unwrap_or(defaults.nfft);
        let overlap = match (self.overlap, legacy.n_fft, legacy.hop_length) {
            (Some(overlap), _, _) => overlap,
            (None, Some(n_fft), Some(hop)) => n_fft.saturating_sub(hop),
            _ => defaults.overlap,
        };
        let params = SpectrogramParams {
            nfft,
            overlap,
            window,
            ..*defaults
        };

        let meta = match (self.sample_rate, self.duration) {
            (Some(sample_rate), Some(duration)) => Some(AudioMeta {
                sample_rate,
                duration,
            }),
            _ => None,
        };

        LoadedAnnotations {
            audio_file: self.audio_file,
            meta,
            contours,
            unusable: self.unusable || self.skipped.unwrap_or(false),
            skip_reason: self.skip_reason,
            params,
            version: self.annotation_version,
        }
    }
}

/// Reads and normalizes one annotation file.
pub fn load_annotations(
    path: &Path,
    defaults: &SpectrogramParams,
) -> Result<LoadedAnnotations, PersistError> {
    Ok(RawAnnotationFile::load_from_disk(path)?.normalize(defaults))
}
