// tests/common/mod.rs

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use changepoint_annotator::config::AnnotatorConfig;

pub const SAMPLE_RATE: u32 = 16_000;

/// Writes a mono 16-bit sine tone.
pub fn write_tone(path: &Path, freq: f32, secs: f32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let n = (SAMPLE_RATE as f32 * secs) as usize;
    for i in 0..n {
        let t = i as f32 / SAMPLE_RATE as f32;
        let s = (2.0 * std::f32::consts::PI * freq * t).sin() * 0.5;
        writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// root/a.wav, root/b.wav, root/site/c.wav (one second each).
pub fn audio_tree(root: &Path) -> Vec<PathBuf> {
    let files = vec![
        root.join("a.wav"),
        root.join("b.wav"),
        root.join("site").join("c.wav"),
    ];
    for (i, path) in files.iter().enumerate() {
        write_tone(path, 1000.0 * (i + 1) as f32, 1.0);
    }
    files
}

pub fn config() -> AnnotatorConfig {
    AnnotatorConfig::default()
}
