// src/decoder/mod.rs

pub mod dsp;

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use crate::error::AudioError;

/// Sample rate and length of a recording, as written into annotation files.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioMeta {
    pub sample_rate: u32,
    pub duration: f64,
}

impl AudioMeta {
    pub fn is_known(&self) -> bool {
        self.sample_rate > 0
    }
}

/// A decoded recording, downmixed to mono.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub source_channels: usize,
}

impl AudioClip {
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn meta(&self) -> AudioMeta {
        AudioMeta {
            sample_rate: self.sample_rate,
            duration: self.duration(),
        }
    }
}

/// True if `path` has one of `extensions` (case-insensitive, no dot).
pub fn is_audio_file(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn open_format(path: &Path) -> Result<Box<dyn FormatReader>, AudioError> {
    let file = File::open(path).map_err(|source| AudioError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|source| AudioError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(probed.format)
}

/// Reads sample rate and duration from the container header. Falls back to a
/// full decode when the container does not declare its length.
pub fn probe_metadata(path: &Path) -> Result<AudioMeta, AudioError> {
    let format = open_format(path)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::NoTrack(path.to_path_buf()))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AudioError::UnknownSampleRate(path.to_path_buf()))?;

    match track.codec_params.n_frames {
        Some(frames) => Ok(AudioMeta {
            sample_rate,
            duration: frames as f64 / sample_rate as f64,
        }),
        None => {
            debug!("{} has no frame count; decoding to measure it", path.display());
            Ok(load_audio(path)?.meta())
        }
    }
}

/// Decodes the whole file to mono f32.
pub fn load_audio(path: &Path) -> Result<AudioClip, AudioError> {
    let mut format = open_format(path)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::NoTrack(path.to_path_buf()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|source| AudioError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut source_channels = codec_params.channels.map(|c| c.count()).unwrap_or(1);
    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            // End of stream surfaces as an I/O error.
            Err(SymphoniaError::IoError(_)) => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(source) => {
                return Err(AudioError::Decode {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("skipping corrupt packet in {}: {e}", path.display());
                continue;
            }
            Err(SymphoniaError::IoError(_)) => continue,
            Err(source) => {
                return Err(AudioError::Decode {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        source_channels = spec.channels.count();

        if sample_buf.as_ref().map_or(true, |b| b.capacity() < decoded.capacity()) {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);
        samples.extend(dsp::downmix_to_mono(buf.samples(), source_channels));
    }

    if sample_rate == 0 {
        return Err(AudioError::UnknownSampleRate(path.to_path_buf()));
    }

    Ok(AudioClip {
        samples,
        sample_rate,
        source_channels,
    })
}
