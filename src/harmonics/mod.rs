// src/harmonics/mod.rs

//! Harmonic stack markers for one audio file.
//!
//! H1 is the fundamental, estimated from the spectrogram as the strongest
//! prominent peak inside a frequency band. The operator then marks integer
//! multiples `k * f0` on top of it. The set is stored beside the contour
//! annotations as `<name>_harmonics.json`.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{HarmonicError, PersistError};
use crate::session::workspace::ANNOTATION_SUFFIX;
use crate::spectrogram::{Spectrogram, SpectrogramParams, WindowKind};

pub const HARMONICS_SUFFIX: &str = "_harmonics.json";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Harmonic {
    pub harmonic_num: u32,
    pub frequency: f64,
    /// Everything except H1 was placed by hand.
    pub is_manual: bool,
}

impl Harmonic {
    fn of(f0: f64, k: u32) -> Self {
        Self {
            harmonic_num: k,
            frequency: f0 * k as f64,
            is_manual: k != 1,
        }
    }
}

/// Outcome of `HarmonicSet::toggle`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Toggled {
    Added(Harmonic),
    Removed(Harmonic),
}

// ==========================================
// HARMONIC SET
// ==========================================

/// Fundamental plus marked harmonics, kept sorted by harmonic number.
/// Whenever a fundamental is set, H1 is present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarmonicSet {
    f0: Option<f64>,
    harmonics: Vec<Harmonic>,
}

impl HarmonicSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fundamental(&self) -> Option<f64> {
        self.f0
    }

    pub fn harmonics(&self) -> &[Harmonic] {
        &self.harmonics
    }

    pub fn is_empty(&self) -> bool {
        self.f0.is_none()
    }

    pub fn contains(&self, k: u32) -> bool {
        self.harmonics.iter().any(|h| h.harmonic_num == k)
    }

    /// Replaces the fundamental. Every marked harmonic is dropped and the
    /// set restarts at `[H1]`.
    pub fn set_fundamental(&mut self, f0: f64) -> Result<(), HarmonicError> {
        if !(f0.is_finite() && f0 > 0.0) {
            return Err(HarmonicError::InvalidFundamental(f0));
        }
        self.f0 = Some(f0);
        self.harmonics = vec![Harmonic::of(f0, 1)];
        Ok(())
    }

    pub fn add(&mut self, k: u32) -> Result<Harmonic, HarmonicError> {
        let f0 = self.f0.ok_or(HarmonicError::NoFundamental)?;
        if k == 0 {
            return Err(HarmonicError::InvalidNumber);
        }
        if self.contains(k) {
            return Err(HarmonicError::AlreadyPresent(k));
        }
        let harmonic = Harmonic::of(f0, k);
        let at = self.harmonics.partition_point(|h| h.harmonic_num < k);
        self.harmonics.insert(at, harmonic);
        Ok(harmonic)
    }

    pub fn remove(&mut self, k: u32) -> Result<Harmonic, HarmonicError> {
        if k == 1 {
            return Err(HarmonicError::CannotRemoveFundamental);
        }
        let at = self
            .harmonics
            .iter()
            .position(|h| h.harmonic_num == k)
            .ok_or(HarmonicError::NotPresent(k))?;
        Ok(self.harmonics.remove(at))
    }

    pub fn toggle(&mut self, k: u32) -> Result<Toggled, HarmonicError> {
        if self.contains(k) {
            self.remove(k).map(Toggled::Removed)
        } else {
            self.add(k).map(Toggled::Added)
        }
    }

    /// Drops every manual harmonic, keeping H1. Returns how many went.
    pub fn clear(&mut self) -> usize {
        let before = self.harmonics.len();
        self.harmonics.retain(|h| h.harmonic_num == 1);
        before - self.harmonics.len()
    }

    /// Rebuilds a set from a stored file. Bad entries are dropped; a stored
    /// H1 stands in for a missing `detected_f0`.
    pub fn from_file(file: HarmonicFile) -> Self {
        let f0 = file
            .detected_f0
            .or_else(|| {
                file.harmonics
                    .iter()
                    .find(|h| h.harmonic_num == 1)
                    .map(|h| h.frequency)
            })
            .filter(|f| f.is_finite() && *f > 0.0);

        let Some(f0) = f0 else {
            if !file.harmonics.is_empty() {
                warn!("harmonics stored without a fundamental; ignored");
            }
            return Self::default();
        };

        let mut set = Self::default();
        // set_fundamental cannot fail on a positive finite f0.
        let _ = set.set_fundamental(f0);
        for h in file.harmonics {
            if h.harmonic_num <= 1 || set.contains(h.harmonic_num) {
                continue;
            }
            if !h.frequency.is_finite() {
                warn!("dropping H{} with non-finite frequency", h.harmonic_num);
                continue;
            }
            let at = set.harmonics.partition_point(|x| x.harmonic_num < h.harmonic_num);
            set.harmonics.insert(
                at,
                Harmonic {
                    is_manual: true,
                    ..h
                },
            );
        }
        set
    }
}

// ==========================================
// FUNDAMENTAL ESTIMATION
// ==========================================

/// Band and peak-prominence settings for `estimate_fundamental`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct F0Search {
    pub min_hz: f64,
    pub max_hz: f64,
    /// A peak must rise this far (dB) above the higher of its two bases.
    pub prominence_db: f32,
}

impl Default for F0Search {
    fn default() -> Self {
        Self {
            min_hz: 500.0,
            max_hz: 8000.0,
            prominence_db: 5.0,
        }
    }
}

/// Strongest prominent spectral peak inside the search band.
///
/// With a time, the nearest frame is searched; without one, the mean
/// spectrum over the whole file.
pub fn estimate_fundamental(spec: &Spectrogram, time: Option<f64>, search: &F0Search) -> Option<f64> {
    let spectrum: Vec<f32> = match time {
        Some(t) => spec.power_db.get(spec.frame_at(t)?)?.clone(),
        None => mean_spectrum(&spec.power_db)?,
    };

    let band: Vec<usize> = spec
        .freqs
        .iter()
        .enumerate()
        .filter(|(_, f)| **f >= search.min_hz && **f <= search.max_hz)
        .map(|(i, _)| i)
        .collect();
    let (first, last) = (*band.first()?, *band.last()?);
    let values = &spectrum[first..=last];

    peak_prominences(values)
        .into_iter()
        .filter(|&(_, prominence)| prominence >= search.prominence_db)
        .max_by(|(a, _), (b, _)| values[*a].total_cmp(&values[*b]))
        .and_then(|(i, _)| spec.freqs.get(first + i).copied())
}

fn mean_spectrum(frames: &[Vec<f32>]) -> Option<Vec<f32>> {
    let bins = frames.first()?.len();
    let mut sum = vec![0.0f32; bins];
    for frame in frames {
        for (acc, v) in sum.iter_mut().zip(frame) {
            *acc += v;
        }
    }
    let n = frames.len() as f32;
    Some(sum.into_iter().map(|v| v / n).collect())
}

/// Interior local maxima with their topographic prominence. Plateaus count
/// once, at their left edge.
fn peak_prominences(values: &[f32]) -> Vec<(usize, f32)> {
    let mut peaks = Vec::new();
    if values.len() < 3 {
        return peaks;
    }
    for i in 1..values.len() - 1 {
        let v = values[i];
        if !(v > values[i - 1] && v >= values[i + 1]) {
            continue;
        }

        let mut left_min = v;
        for &x in values[..i].iter().rev() {
            if x > v {
                break;
            }
            left_min = left_min.min(x);
        }
        let mut right_min = v;
        for &x in &values[i + 1..] {
            if x > v {
                break;
            }
            right_min = right_min.min(x);
        }
        peaks.push((i, v - left_min.max(right_min)));
    }
    peaks
}

// ==========================================
// PERSISTENCE
// ==========================================

/// `<stem>_annotations.json` becomes `<stem>_harmonics.json` in the same
/// directory.
pub fn harmonics_path_for(annotation_path: &Path) -> PathBuf {
    let name = annotation_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = match name.strip_suffix(ANNOTATION_SUFFIX) {
        Some(stem) => stem.to_string(),
        None => annotation_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    annotation_path.with_file_name(format!("{stem}{HARMONICS_SUFFIX}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarmonicParameters {
    pub nfft: usize,
    pub overlap: usize,
    pub window: WindowKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonicFile {
    #[serde(default)]
    pub audio_file: String,
    #[serde(default)]
    pub detected_f0: Option<f64>,
    #[serde(default)]
    pub harmonics: Vec<Harmonic>,
    #[serde(default)]
    pub parameters: Option<HarmonicParameters>,
}

impl HarmonicFile {
    pub fn new(audio_file: &Path, set: &HarmonicSet, params: &SpectrogramParams) -> Self {
        Self {
            audio_file: audio_file.to_string_lossy().into_owned(),
            detected_f0: set.fundamental(),
            harmonics: set.harmonics().to_vec(),
            parameters: Some(HarmonicParameters {
                nfft: params.nfft,
                overlap: params.overlap,
                window: params.window,
            }),
        }
    }

    pub fn save_to_disk(&self, path: &Path) -> Result<(), PersistError> {
        let file = File::create(path).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), self).map_err(|source| {
            PersistError::Json {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    pub fn load_from_disk(path: &Path) -> Result<Self, PersistError> {
        let file = File::open(path).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
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
        })
    }
}
