// src/error.rs

//! Error types for the annotator.
//!
//! Engine errors are soft: each one means "nothing changed" and is reported
//! to the operator, never escalated. Persistence and workspace errors carry
//! the path that failed so the operator can find the file.

use std::path::PathBuf;
use thiserror::Error;

use crate::contour::Region;

/// Rejected engine operations. State is unchanged whenever one is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Finish requested on an empty current contour.
    #[error("nothing to finish: current contour is empty")]
    NothingToFinish,

    /// Clear Previous with no points and no finished contours.
    #[error("nothing to clear")]
    NothingToClear,

    /// Region extraction matched fewer than two points.
    #[error("only found {found} point(s) in region {region}")]
    InsufficientPoints { region: Region, found: usize },

    /// Caller passed NaN or infinity as a coordinate.
    #[error("rejected non-finite point (t={time}, f={freq})")]
    NonFinitePoint { time: f64, freq: f64 },
}

/// Rejected harmonic-marker edits. The set is unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HarmonicError {
    #[error("no fundamental yet: estimate f0 first")]
    NoFundamental,

    #[error("harmonic numbers start at 1")]
    InvalidNumber,

    #[error("H{0} is already marked")]
    AlreadyPresent(u32),

    #[error("H{0} is not marked")]
    NotPresent(u32),

    #[error("H1 is the fundamental and cannot be removed")]
    CannotRemoveFundamental,

    #[error("rejected fundamental frequency {0} Hz")]
    InvalidFundamental(f64),
}

/// Reading or writing an annotation file.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize annotations for {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The file exists but its shape is unusable; the session fails closed.
    #[error("malformed annotation file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// Opening or decoding an audio file.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: symphonia::core::errors::Error,
    },

    #[error("no default audio track in {0}")]
    NoTrack(PathBuf),

    #[error("unknown sample rate in {0}")]
    UnknownSampleRate(PathBuf),
}

/// Directory scanning and file navigation.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("audio directory {0} does not exist")]
    MissingAudioDir(PathBuf),

    #[error("no audio files found in {0}")]
    NoAudioFiles(PathBuf),

    #[error("file number {requested} is out of range (1..={total})")]
    InvalidFileNumber { requested: usize, total: usize },

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Loading, validating or saving the user configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error on config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
