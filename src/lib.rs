// src/lib.rs

pub mod config;
pub mod console;
pub mod contour;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod harmonics;
pub mod session;
pub mod spectrogram;

pub use config::AnnotatorConfig;
pub use contour::{FinishedContour, Point, Region, Role, Syllable, SyllableMetrics};
pub use engine::ContourEngine;
pub use harmonics::{Harmonic, HarmonicSet};
pub use session::{AnnotationSession, Workspace};
pub use spectrogram::{CoordinateMapper, Spectrogram, SpectrogramParams, SpectrogramView};
