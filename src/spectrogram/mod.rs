// src/spectrogram/mod.rs

pub mod view;

pub use view::{CoordinateMapper, SpectrogramView};

use rustfft::{FftPlanner, num_complex::Complex};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest frame used for very short clips.
const MIN_FRAME: usize = 16;

/// Analysis window applied to each frame before the FFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    #[default]
    Hann,
    Hamming,
    Rectangular,
}

impl WindowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowKind::Hann => "hann",
            WindowKind::Hamming => "hamming",
            WindowKind::Rectangular => "rectangular",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "hann" | "hanning" => Some(WindowKind::Hann),
            "hamming" => Some(WindowKind::Hamming),
            "rectangular" | "boxcar" | "none" => Some(WindowKind::Rectangular),
            _ => None,
        }
    }

    fn coefficient(&self, i: usize, len: usize) -> f32 {
        if len < 2 {
            return 1.0;
        }
        let phase = 2.0 * std::f32::consts::PI * i as f32 / (len - 1) as f32;
        match self {
            WindowKind::Hann => 0.5 * (1.0 - phase.cos()),
            WindowKind::Hamming => 0.54 - 0.46 * phase.cos(),
            WindowKind::Rectangular => 1.0,
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// STFT settings. These are also written into every annotation file so the
/// view an annotator worked from can be reproduced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramParams {
    pub nfft: usize,
    /// Samples shared by consecutive frames.
    pub overlap: usize,
    pub window: WindowKind,
    /// Lowest displayed frequency (Hz).
    pub fmin: f64,
    /// Highest displayed frequency (Hz); 0 means Nyquist.
    pub fmax: f64,
}

impl Default for SpectrogramParams {
    fn default() -> Self {
        Self {
            nfft: 512,
            overlap: 384,
            window: WindowKind::Hann,
            fmin: 0.0,
            fmax: 0.0,
        }
    }
}

impl SpectrogramParams {
    pub fn hop(&self) -> usize {
        self.nfft.saturating_sub(self.overlap).max(1)
    }
}

/// Magnitude spectrogram in dB. `power_db[frame][bin]`.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub sample_rate: u32,
    pub times: Vec<f64>,
    pub freqs: Vec<f64>,
    pub power_db: Vec<Vec<f32>>,
}

impl Spectrogram {
    /// Short-time Fourier transform of a mono signal.
    ///
    /// Clips shorter than `nfft` shrink the frame to the clip length (never
    /// below 16 samples, zero-padded). Frame times are frame centres.
    pub fn compute(samples: &[f32], sample_rate: u32, params: &SpectrogramParams) -> Self {
        let frame_len = params.nfft.min(samples.len().max(MIN_FRAME)).max(MIN_FRAME);
        let overlap = params.overlap.min(frame_len - 1);
        let hop = frame_len - overlap;
        let sr = sample_rate.max(1) as f64;

        let nyquist = sr / 2.0;
        let fmax = if params.fmax > 0.0 { params.fmax.min(nyquist) } else { nyquist };
        let bins: Vec<usize> = (0..=frame_len / 2)
            .filter(|&k| {
                let f = k as f64 * sr / frame_len as f64;
                f >= params.fmin && f <= fmax
            })
            .collect();
        let freqs: Vec<f64> = bins.iter().map(|&k| k as f64 * sr / frame_len as f64).collect();

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_len);
        let window: Vec<f32> = (0..frame_len)
            .map(|i| params.window.coefficient(i, frame_len))
            .collect();
        let mut buffer = vec![Complex { re: 0.0, im: 0.0 }; frame_len];

        let mut times = Vec::new();
        let mut power_db = Vec::new();
        let mut start = 0usize;

        loop {
            // Always emit at least one (zero-padded) frame.
            if start + frame_len > samples.len() && !times.is_empty() {
                break;
            }

            for (i, slot) in buffer.iter_mut().enumerate() {
                let s = samples.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex { re: s * window[i], im: 0.0 };
            }
            fft.process(&mut buffer);

            let column: Vec<f32> = bins
                .iter()
                .map(|&k| 20.0 * (buffer[k].norm() + 1e-12).log10())
                .collect();
            power_db.push(column);
            times.push((start + frame_len / 2) as f64 / sr);

            start += hop;
        }

        Self {
            sample_rate,
            times,
            freqs,
            power_db,
        }
    }

    pub fn time_range(&self) -> (f64, f64) {
        match (self.times.first(), self.times.last()) {
            (Some(&a), Some(&b)) => (a, b),
            _ => (0.0, 0.0),
        }
    }

    pub fn freq_range(&self) -> (f64, f64) {
        match (self.freqs.first(), self.freqs.last()) {
            (Some(&a), Some(&b)) => (a, b),
            _ => (0.0, 0.0),
        }
    }

    /// Index of the frame whose centre is closest to `time`.
    pub fn frame_at(&self, time: f64) -> Option<usize> {
        self.times
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (**a - time).abs().total_cmp(&(**b - time).abs()))
            .map(|(i, _)| i)
    }

    /// Frequency of the loudest bin in the frame nearest to `time`.
    pub fn peak_frequency_at(&self, time: f64) -> Option<f64> {
        let column = &self.power_db[self.frame_at(time)?];
        column
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .and_then(|(bin, _)| self.freqs.get(bin).copied())
    }
}
