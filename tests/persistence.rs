// tests/persistence.rs

use std::path::Path;

use changepoint_annotator::contour::Point;
use changepoint_annotator::decoder::AudioMeta;
use changepoint_annotator::session::AnnotationSession;
use changepoint_annotator::spectrogram::SpectrogramParams;
use serde_json::Value;
use tempfile::TempDir;

const LEGACY: &str = r#"{
  "audio_file": "recordings/zf_017.wav",
  "annotations": [{"time": 0.12, "freq": 2500, "type": "onset"}],
  "syllables": [
    [{"time": 0.30, "freq": 3100}, {"time": 0.12, "freq": 2500}, {"time": 0.21, "freq": 4200}],
    [{"time": 0.55, "freq": 1800}]
  ],
  "skipped": false
}"#;

fn load(path: &Path) -> AnnotationSession {
    AnnotationSession::load(
        Path::new("zf_017.wav"),
        path,
        AudioMeta {
            sample_rate: 32_000,
            duration: 1.0,
        },
        SpectrogramParams::default(),
        1,
    )
    .unwrap()
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn legacy_syllables_are_normalized_and_resaved_under_both_keys() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("zf_017_annotations.json");
    std::fs::write(&path, LEGACY).unwrap();

    let mut session = load(&path);
    assert!(!session.needs_review());
    let contours = session.contours();
    assert_eq!(contours.len(), 2);
    assert_eq!(contours[0].onset(), Point::new(0.12, 2500.0));
    assert_eq!(contours[0].changepoints(), &[Point::new(0.21, 4200.0)]);
    assert_eq!(contours[0].offset(), Point::new(0.30, 3100.0));
    assert_eq!(contours[1].len(), 1);

    session.save().unwrap();
    let json = read_json(&path);
    assert_eq!(json["contours"], json["syllables"]);
    assert_eq!(json["contours"].as_array().unwrap().len(), 2);
    assert_eq!(json["contours"][0][1]["time"], 0.21);
    assert_eq!(json["unusable"], false);
    assert_eq!(json["sample_rate"], 32_000);
    assert!(json.get("annotations").is_none());
}

#[test]
fn saved_session_reloads_identically() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a_annotations.json");

    let mut session = load(&path);
    for (t, f) in [(0.4, 4000.0), (0.1, 1000.0), (0.2, 2500.0)] {
        session.add_point(t, f).unwrap();
    }
    session.finish_contour().unwrap();
    session.mark_unusable("clipping");
    session.save().unwrap();

    let reloaded = load(&path);
    assert_eq!(reloaded.contours(), session.contours());
    assert!(reloaded.is_unusable());
    assert_eq!(reloaded.skip_reason(), Some("clipping"));
    assert!(!reloaded.has_changes());
}

#[test]
fn malformed_file_fails_closed_and_leaves_siblings_alone() {
    let dir = TempDir::new().unwrap();
    let bad = dir.path().join("bad_annotations.json");
    let good = dir.path().join("good_annotations.json");
    std::fs::write(&bad, r#"{"contours": [[{"time": "soon"}]]}"#).unwrap();
    std::fs::write(&good, LEGACY).unwrap();

    let session = load(&bad);
    assert!(session.needs_review());
    assert!(session.engine().is_empty());
    assert_eq!(std::fs::read_to_string(&good).unwrap(), LEGACY);

    // Loading does not rewrite or back up anything.
    assert!(!dir.path().join("bad_annotations.json.bak").exists());
}

#[test]
fn missing_file_is_an_empty_clean_session() {
    let dir = TempDir::new().unwrap();
    let session = load(&dir.path().join("new_annotations.json"));
    assert!(session.engine().is_empty());
    assert!(!session.needs_review());
    assert!(!session.has_changes());
}

#[test]
fn stored_spectrogram_settings_override_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a_annotations.json");
    std::fs::write(
        &path,
        r#"{"contours": [], "nfft": 1024, "overlap": 768, "window": "hamming"}"#,
    )
    .unwrap();

    let session = load(&path);
    assert_eq!(session.params().nfft, 1024);
    assert_eq!(session.params().overlap, 768);
    assert_eq!(session.params().window.as_str(), "hamming");
}

#[test]
fn file_without_contours_or_syllables_needs_review() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a_annotations.json");
    let original = r#"{"audio_file": "a.wav", "unusable": false}"#;
    std::fs::write(&path, original).unwrap();

    let mut session = load(&path);
    assert!(session.needs_review());
    assert!(session.engine().is_empty());

    session.add_point(0.1, 1000.0).unwrap();
    session.add_point(0.2, 1100.0).unwrap();
    session.finish_contour().unwrap();
    session.save().unwrap();

    let backup = dir.path().join("a_annotations.json.bak");
    assert_eq!(std::fs::read_to_string(backup).unwrap(), original);
    assert_eq!(read_json(&path)["contours"].as_array().unwrap().len(), 1);
}

#[test]
fn both_unusable_spellings_load_cleanly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a_annotations.json");
    std::fs::write(
        &path,
        r#"{
          "contours": [[{"time": 0.1, "freq": 1000}, {"time": 0.2, "freq": 1200}]],
          "unusable": false,
          "skipped": false
        }"#,
    )
    .unwrap();

    let session = load(&path);
    assert!(!session.needs_review());
    assert!(!session.is_unusable());
    assert_eq!(session.contours().len(), 1);
    assert_eq!(session.contours()[0].len(), 2);
}

#[test]
fn legacy_skipped_flag_alone_marks_unusable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a_annotations.json");
    std::fs::write(&path, r#"{"syllables": [], "skipped": true}"#).unwrap();

    let session = load(&path);
    assert!(!session.needs_review());
    assert!(session.is_unusable());
}

#[test]
fn nested_legacy_settings_are_honored() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a_annotations.json");
    std::fs::write(
        &path,
        r#"{"syllables": [], "spec_params": {"n_fft": 2048, "hop_length": 512}}"#,
    )
    .unwrap();

    let session = load(&path);
    assert_eq!(session.params().nfft, 2048);
    assert_eq!(session.params().overlap, 1536);
}
