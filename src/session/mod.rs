// src/session/mod.rs

pub mod serialization;
pub mod workspace;

pub use workspace::Workspace;

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::contour::FinishedContour;
use crate::decoder::AudioMeta;
use crate::engine::{ClearEvent, ContourEngine, PointDistance, RegionStep};
use crate::error::{EngineError, HarmonicError, PersistError};
use crate::harmonics::{HarmonicFile, HarmonicSet, Toggled, harmonics_path_for};
use crate::spectrogram::SpectrogramParams;
use serialization::{AnnotationFile, load_annotations};

/// Annotation state of one audio file: the engine plus the file-level flags
/// that get persisted next to the contours.
#[derive(Debug, Clone)]
pub struct AnnotationSession {
    audio_file: PathBuf,
    annotation_path: PathBuf,
    meta: AudioMeta,
    params: SpectrogramParams,
    engine: ContourEngine,
    unusable: bool,
    skip_reason: Option<String>,
    harmonics: HarmonicSet,
    harmonics_path: PathBuf,
    changes_made: bool,
    needs_review: bool,
    harmonics_need_review: bool,
}

/// Copies a file that failed to parse to `<name>.bak` before it is replaced.
fn backup_original(path: &Path) -> Result<(), PersistError> {
    let mut backup = path.to_path_buf().into_os_string();
    backup.push(".bak");
    let backup = PathBuf::from(backup);
    std::fs::copy(path, &backup).map_err(|source| PersistError::Io {
        path: backup.clone(),
        source,
    })?;
    warn!("backed up malformed file to {}", backup.display());
    Ok(())
}

impl AnnotationSession {
    pub fn new(
        audio_file: &Path,
        annotation_path: &Path,
        meta: AudioMeta,
        params: SpectrogramParams,
        history_depth: usize,
    ) -> Self {
        Self {
            audio_file: audio_file.to_path_buf(),
            annotation_path: annotation_path.to_path_buf(),
            meta,
            params,
            engine: ContourEngine::new(history_depth),
            unusable: false,
            skip_reason: None,
            harmonics: HarmonicSet::new(),
            harmonics_path: harmonics_path_for(annotation_path),
            changes_made: false,
            needs_review: false,
            harmonics_need_review: false,
        }
    }

    /// Restores the session from `annotation_path` if it exists.
    ///
    /// A file that cannot be parsed yields an empty session flagged
    /// `needs_review`; nothing on disk is modified. Plain I/O failures
    /// are returned.
    pub fn load(
        audio_file: &Path,
        annotation_path: &Path,
        meta: AudioMeta,
        params: SpectrogramParams,
        history_depth: usize,
    ) -> Result<Self, PersistError> {
        let mut session = Self::new(audio_file, annotation_path, meta, params, history_depth);
        session.load_harmonics()?;
        if !annotation_path.exists() {
            return Ok(session);
        }

        match load_annotations(annotation_path, &params) {
            Ok(loaded) => {
                info!(
                    "✓ Loaded {} contour(s) from {}",
                    loaded.contours.len(),
                    annotation_path.display()
                );
                if !session.meta.is_known() {
                    if let Some(stored) = loaded.meta {
                        session.meta = stored;
                    }
                }
                session.params = loaded.params;
                session.unusable = loaded.unusable;
                session.skip_reason = loaded.skip_reason;
                session.engine = ContourEngine::with_finished(loaded.contours, history_depth);
            }
            Err(PersistError::Malformed { path, reason }) => {
                warn!("⚠ {} is malformed ({reason}); starting empty, original kept", path.display());
                session.needs_review = true;
            }
            Err(e) => return Err(e),
        }
        Ok(session)
    }

    /// Same fail-closed policy as the contour file, tracked separately.
    fn load_harmonics(&mut self) -> Result<(), PersistError> {
        if !self.harmonics_path.exists() {
            return Ok(());
        }
        match HarmonicFile::load_from_disk(&self.harmonics_path) {
            Ok(file) => {
                self.harmonics = HarmonicSet::from_file(file);
                info!(
                    "✓ Loaded {} harmonic marker(s) from {}",
                    self.harmonics.harmonics().len(),
                    self.harmonics_path.display()
                );
            }
            Err(PersistError::Malformed { path, reason }) => {
                warn!("⚠ {} is malformed ({reason}); starting without harmonics", path.display());
                self.harmonics_need_review = true;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    // ==========================================
    // ACCESSORS
    // ==========================================

    pub fn audio_file(&self) -> &Path {
        &self.audio_file
    }

    pub fn annotation_path(&self) -> &Path {
        &self.annotation_path
    }

    pub fn meta(&self) -> AudioMeta {
        self.meta
    }

    pub fn params(&self) -> &SpectrogramParams {
        &self.params
    }

    pub fn engine(&self) -> &ContourEngine {
        &self.engine
    }

    pub fn contours(&self) -> &[FinishedContour] {
        self.engine.finished()
    }

    pub fn is_unusable(&self) -> bool {
        self.unusable
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.skip_reason.as_deref()
    }

    pub fn has_changes(&self) -> bool {
        self.changes_made
    }

    pub fn needs_review(&self) -> bool {
        self.needs_review
    }

    pub fn harmonics(&self) -> &HarmonicSet {
        &self.harmonics
    }

    pub fn harmonics_path(&self) -> &Path {
        &self.harmonics_path
    }

    /// Replaces metadata measured from the decoded audio.
    pub fn set_meta(&mut self, meta: AudioMeta) {
        self.meta = meta;
    }

    // ==========================================
    // EDITING (marks the session dirty on success)
    // ==========================================

    pub fn add_point(&mut self, time: f64, freq: f64) -> Result<(), EngineError> {
        self.engine.add_point(time, freq)?;
        self.changes_made = true;
        Ok(())
    }

    pub fn remove_nearby(
        &mut self,
        x: f64,
        y: f64,
        threshold: f64,
        metric: &dyn PointDistance,
    ) -> bool {
        let removed = self.engine.remove_nearby(x, y, threshold, metric);
        self.changes_made |= removed;
        removed
    }

    pub fn finish_contour(&mut self) -> Result<usize, EngineError> {
        let len = self.engine.finish_contour()?.len();
        self.changes_made = true;
        Ok(len)
    }

    pub fn finish_if_ready(&mut self, min_points: usize) -> bool {
        let finished = self.engine.finish_if_ready(min_points).is_some();
        self.changes_made |= finished;
        finished
    }

    pub fn clear_previous(&mut self) -> Result<ClearEvent, EngineError> {
        let event = self.engine.clear_previous()?;
        self.changes_made = true;
        Ok(event)
    }

    pub fn clear_all(&mut self) {
        if !self.engine.is_empty() {
            self.changes_made = true;
        }
        self.engine.clear_all();
    }

    pub fn mark_region_corner(&mut self, time: f64, freq: f64) -> Result<RegionStep, EngineError> {
        let step = self.engine.mark_region_corner(time, freq)?;
        if matches!(step, RegionStep::Extracted { .. }) {
            self.changes_made = true;
        }
        Ok(step)
    }

    pub fn reset_region_marker(&mut self) {
        self.engine.reset_region_marker();
    }

    /// Flags the file as unusable. Contours already drawn are kept.
    pub fn mark_unusable(&mut self, reason: &str) {
        let reason = reason.trim();
        self.unusable = true;
        self.skip_reason = (!reason.is_empty()).then(|| reason.to_string());
        self.changes_made = true;
        info!("⊘ Marked {} as unusable: {}", self.audio_file.display(), self.skip_reason().unwrap_or("no reason"));
    }

    // ==========================================
    // HARMONICS (marks the session dirty on success)
    // ==========================================

    pub fn set_fundamental(&mut self, f0: f64) -> Result<(), HarmonicError> {
        self.harmonics.set_fundamental(f0)?;
        self.changes_made = true;
        Ok(())
    }

    pub fn add_harmonic(&mut self, k: u32) -> Result<f64, HarmonicError> {
        let harmonic = self.harmonics.add(k)?;
        self.changes_made = true;
        Ok(harmonic.frequency)
    }

    pub fn remove_harmonic(&mut self, k: u32) -> Result<(), HarmonicError> {
        self.harmonics.remove(k)?;
        self.changes_made = true;
        Ok(())
    }

    pub fn toggle_harmonic(&mut self, k: u32) -> Result<Toggled, HarmonicError> {
        let toggled = self.harmonics.toggle(k)?;
        self.changes_made = true;
        Ok(toggled)
    }

    /// Drops every marked harmonic except H1.
    pub fn clear_harmonics(&mut self) -> usize {
        let removed = self.harmonics.clear();
        self.changes_made |= removed > 0;
        removed
    }

    // ==========================================
    // PERSISTENCE
    // ==========================================

    pub fn to_file(&self) -> AnnotationFile {
        AnnotationFile::new(
            &self.audio_file,
            self.meta,
            self.engine.finished(),
            self.unusable,
            self.skip_reason.clone(),
            &self.params,
        )
    }

    /// Writes the session to its annotation path, and harmonic markers to
    /// theirs. A malformed original is copied to `<name>.bak` first.
    pub fn save(&mut self) -> Result<(), PersistError> {
        let path = self.annotation_path.clone();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| PersistError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        if self.needs_review && path.exists() {
            backup_original(&path)?;
        }
        self.to_file().save_to_disk(&path)?;
        self.needs_review = false;

        self.save_harmonics()?;
        self.changes_made = false;
        info!(
            "✓ Saved {} contour(s) to {}",
            self.engine.finished().len(),
            path.display()
        );
        Ok(())
    }

    /// The harmonics file is only written once a fundamental exists, or to
    /// overwrite one that is already on disk.
    fn save_harmonics(&mut self) -> Result<(), PersistError> {
        let path = self.harmonics_path.clone();
        let exists = path.exists();
        if self.harmonics.is_empty() && !exists {
            return Ok(());
        }
        if self.harmonics_need_review && exists {
            backup_original(&path)?;
        }
        HarmonicFile::new(&self.audio_file, &self.harmonics, &self.params).save_to_disk(&path)?;
        self.harmonics_need_review = false;
        Ok(())
    }

    /// Saves only when there is something new to write.
    pub fn save_if_dirty(&mut self) -> Result<bool, PersistError> {
        if !self.changes_made {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ScaledDistance;
    use tempfile::TempDir;

    fn session_in(dir: &TempDir) -> AnnotationSession {
        AnnotationSession::new(
            Path::new("a.wav"),
            &dir.path().join("annotations").join("a_annotations.json"),
            AudioMeta {
                sample_rate: 22_050,
                duration: 2.0,
            },
            SpectrogramParams::default(),
            1,
        )
    }

    #[test]
    fn edits_mark_the_session_dirty() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir);
        assert!(!session.has_changes());

        session.add_point(0.1, 1000.0).unwrap();
        assert!(session.has_changes());
    }

    #[test]
    fn failed_operations_leave_the_session_clean() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir);
        assert!(session.finish_contour().is_err());
        assert!(session.clear_previous().is_err());
        assert!(!session.remove_nearby(0.1, 1.0, 1.0, &ScaledDistance::default()));
        session.clear_all();
        assert!(!session.has_changes());
    }

    #[test]
    fn save_creates_directory_and_clears_dirty_flag() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir);
        session.add_point(0.1, 1000.0).unwrap();
        session.add_point(0.2, 1200.0).unwrap();
        session.finish_contour().unwrap();

        assert!(session.save_if_dirty().unwrap());
        assert!(session.annotation_path().exists());
        assert!(!session.has_changes());
        assert!(!session.save_if_dirty().unwrap());
    }

    #[test]
    fn mark_unusable_keeps_contours() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir);
        session.add_point(0.1, 1000.0).unwrap();
        session.finish_contour().unwrap();
        session.mark_unusable("  wind noise ");

        assert!(session.is_unusable());
        assert_eq!(session.skip_reason(), Some("wind noise"));
        assert_eq!(session.contours().len(), 1);
    }

    #[test]
    fn harmonics_are_saved_beside_contours_and_reloaded() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir);
        assert!(session.add_harmonic(2).is_err());
        assert!(!session.has_changes());

        session.set_fundamental(750.0).unwrap();
        assert_eq!(session.add_harmonic(3).unwrap(), 2250.0);
        session.save().unwrap();
        assert!(session.harmonics_path().ends_with("annotations/a_harmonics.json"));

        let reloaded = AnnotationSession::load(
            Path::new("a.wav"),
            session.annotation_path(),
            AudioMeta::default(),
            SpectrogramParams::default(),
            1,
        )
        .unwrap();
        assert_eq!(reloaded.harmonics(), session.harmonics());
    }

    #[test]
    fn no_harmonics_file_without_a_fundamental() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir);
        session.add_point(0.1, 1000.0).unwrap();
        session.save().unwrap();
        assert!(!session.harmonics_path().exists());
    }

    #[test]
    fn malformed_file_loads_empty_and_is_backed_up_on_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a_annotations.json");
        std::fs::write(&path, "{ garbage").unwrap();

        let mut session = AnnotationSession::load(
            Path::new("a.wav"),
            &path,
            AudioMeta::default(),
            SpectrogramParams::default(),
            1,
        )
        .unwrap();
        assert!(session.needs_review());
        assert!(session.engine().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ garbage");

        session.save().unwrap();
        let backup = dir.path().join("a_annotations.json.bak");
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "{ garbage");
        assert!(!session.needs_review());
    }
}
