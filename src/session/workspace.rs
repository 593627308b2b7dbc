// src/session/workspace.rs

use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::AnnotatorConfig;
use crate::decoder::{self, AudioMeta};
use crate::error::{PersistError, WorkspaceError};
use crate::harmonics::HARMONICS_SUFFIX;
use crate::session::AnnotationSession;
use crate::session::serialization::load_annotations;

pub const ANNOTATION_SUFFIX: &str = "_annotations.json";

/// Annotation state of one audio file, as seen from its JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    /// No annotation file yet.
    Unannotated,
    Annotated { contours: usize },
    Unusable { contours: usize, reason: Option<String> },
    /// The file exists but cannot be parsed.
    Unreadable,
}

impl FileStatus {
    /// True for files that still want an annotator's attention.
    pub fn needs_annotation(&self) -> bool {
        !matches!(self, FileStatus::Annotated { contours } if *contours > 0)
    }

    pub fn contours(&self) -> usize {
        match self {
            FileStatus::Annotated { contours } | FileStatus::Unusable { contours, .. } => *contours,
            _ => 0,
        }
    }
}

/// A directory of recordings being annotated, with exactly one active
/// session. Switching files flushes the old session before loading the new.
#[derive(Debug)]
pub struct Workspace {
    audio_dir: PathBuf,
    annotation_dir: PathBuf,
    files: Vec<PathBuf>,
    index: usize,
    session: AnnotationSession,
    config: AnnotatorConfig,
}

impl Workspace {
    /// Scans `audio_dir` recursively and opens the first file.
    /// Annotations default to `<audio_dir>/annotations`.
    pub fn open(
        audio_dir: &Path,
        annotation_dir: Option<&Path>,
        config: &AnnotatorConfig,
    ) -> Result<Self, WorkspaceError> {
        if !audio_dir.is_dir() {
            return Err(WorkspaceError::MissingAudioDir(audio_dir.to_path_buf()));
        }

        let files = scan_audio_files(audio_dir, &config.audio_extensions);
        if files.is_empty() {
            return Err(WorkspaceError::NoAudioFiles(audio_dir.to_path_buf()));
        }
        info!("Found {} audio file(s) in {}", files.len(), audio_dir.display());

        let annotation_dir = annotation_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| audio_dir.join("annotations"));

        let session = load_session(audio_dir, &annotation_dir, &files[0], config)?;
        Ok(Self {
            audio_dir: audio_dir.to_path_buf(),
            annotation_dir,
            files,
            index: 0,
            session,
            config: config.clone(),
        })
    }

    // ==========================================
    // ACCESSORS
    // ==========================================

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    pub fn annotation_dir(&self) -> &Path {
        &self.annotation_dir
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Zero-based index of the active file.
    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn current_file(&self) -> &Path {
        &self.files[self.index]
    }

    pub fn session(&self) -> &AnnotationSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut AnnotationSession {
        &mut self.session
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    /// `<annotation_dir>/<prefix>_<stem>_annotations.json`, where the prefix
    /// is the file's sub-directory under the audio root joined with `_`.
    pub fn annotation_path(&self, audio: &Path) -> PathBuf {
        annotation_path_for(&self.audio_dir, &self.annotation_dir, audio)
    }

    // ==========================================
    // NAVIGATION
    // ==========================================

    /// Puts the active session on disk: drops a half-marked region,
    /// finishes a contour that is far enough along and saves if dirty.
    pub fn flush(&mut self) -> Result<(), WorkspaceError> {
        self.session.reset_region_marker();
        self.session
            .finish_if_ready(self.config.auto_finish_min_points);
        self.session.save_if_dirty()?;
        Ok(())
    }

    /// Flushes the active session and loads file `index` (zero-based).
    pub fn switch_to(&mut self, index: usize) -> Result<(), WorkspaceError> {
        if index >= self.files.len() {
            return Err(WorkspaceError::InvalidFileNumber {
                requested: index + 1,
                total: self.files.len(),
            });
        }
        self.flush()?;
        let session = load_session(
            &self.audio_dir,
            &self.annotation_dir,
            &self.files[index],
            &self.config,
        )?;
        self.session = session;
        self.index = index;
        info!(
            "File {}/{}: {}",
            index + 1,
            self.files.len(),
            self.files[index].display()
        );
        Ok(())
    }

    pub fn next(&mut self) -> Result<(), WorkspaceError> {
        self.switch_to((self.index + 1) % self.files.len())
    }

    pub fn previous(&mut self) -> Result<(), WorkspaceError> {
        let len = self.files.len();
        self.switch_to((self.index + len - 1) % len)
    }

    /// One-based jump, as typed by the operator.
    pub fn jump_to(&mut self, number: usize) -> Result<(), WorkspaceError> {
        if number == 0 || number > self.files.len() {
            return Err(WorkspaceError::InvalidFileNumber {
                requested: number,
                total: self.files.len(),
            });
        }
        self.switch_to(number - 1)
    }

    /// Flags the active file unusable, saves it and moves on.
    pub fn skip_current(&mut self, reason: &str) -> Result<(), WorkspaceError> {
        self.session.mark_unusable(reason);
        self.session.save()?;
        self.next()
    }

    /// Index of the first file after the active one (wrapping) that still
    /// needs annotation.
    pub fn find_next_unannotated(&self) -> Option<usize> {
        let len = self.files.len();
        (1..=len)
            .map(|step| (self.index + step) % len)
            .find(|&i| self.status(i).needs_annotation())
    }

    /// Flushes, then jumps to the next file that needs annotation.
    pub fn goto_next_unannotated(&mut self) -> Result<Option<usize>, WorkspaceError> {
        self.flush()?;
        let Some(index) = self.find_next_unannotated() else {
            info!("✓ All files have annotations");
            return Ok(None);
        };
        self.switch_to(index)?;
        Ok(Some(index))
    }

    // ==========================================
    // REPORTING
    // ==========================================

    /// Status of file `index`. The active file reports its live session.
    pub fn status(&self, index: usize) -> FileStatus {
        if index == self.index {
            let s = &self.session;
            let contours = s.contours().len();
            return if s.is_unusable() {
                FileStatus::Unusable {
                    contours,
                    reason: s.skip_reason().map(str::to_string),
                }
            } else if contours == 0 && s.engine().current().is_empty() && !s.annotation_path().exists() {
                FileStatus::Unannotated
            } else {
                FileStatus::Annotated { contours }
            };
        }

        let path = self.annotation_path(&self.files[index]);
        if !path.exists() {
            return FileStatus::Unannotated;
        }
        match load_annotations(&path, &self.config.spectrogram) {
            Ok(loaded) if loaded.unusable => FileStatus::Unusable {
                contours: loaded.contours.len(),
                reason: loaded.skip_reason,
            },
            Ok(loaded) => FileStatus::Annotated {
                contours: loaded.contours.len(),
            },
            Err(e) => {
                warn!("skipping {}: {e}", path.display());
                FileStatus::Unreadable
            }
        }
    }

    pub fn statuses(&self) -> Vec<FileStatus> {
        (0..self.files.len()).map(|i| self.status(i)).collect()
    }

    pub fn total_syllables(&self) -> usize {
        self.statuses().iter().map(FileStatus::contours).sum()
    }

    pub fn unusable_count(&self) -> usize {
        self.statuses()
            .iter()
            .filter(|s| matches!(s, FileStatus::Unusable { .. }))
            .count()
    }

    // ==========================================
    // IMPORT
    // ==========================================

    /// Copies every `*_annotations.json` and `*_harmonics.json` from
    /// `from_dir` into the annotation directory, then reloads the active
    /// session from disk.
    pub fn import_annotations(&mut self, from_dir: &Path) -> Result<usize, WorkspaceError> {
        let entries = std::fs::read_dir(from_dir).map_err(|source| WorkspaceError::Io {
            path: from_dir.to_path_buf(),
            source,
        })?;

        self.flush()?;
        std::fs::create_dir_all(&self.annotation_dir).map_err(|source| WorkspaceError::Io {
            path: self.annotation_dir.clone(),
            source,
        })?;

        let mut imported = 0;
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!("Error accessing entry in {}: {e}", from_dir.display());
                    continue;
                }
            };
            let is_annotation = path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(ANNOTATION_SUFFIX) || n.ends_with(HARMONICS_SUFFIX));
            if !is_annotation {
                continue;
            }
            let Some(name) = path.file_name() else {
                continue;
            };
            let target = self.annotation_dir.join(name);
            std::fs::copy(&path, &target).map_err(|source| WorkspaceError::Io {
                path: target.clone(),
                source,
            })?;
            debug!("imported {}", target.display());
            imported += 1;
        }

        self.session = load_session(
            &self.audio_dir,
            &self.annotation_dir,
            &self.files[self.index],
            &self.config,
        )?;
        info!("✓ Imported {imported} annotation file(s) from {}", from_dir.display());
        Ok(imported)
    }
}

// ==========================================
// HELPERS
// ==========================================

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Recursive scan, sorted by path. Hidden entries are skipped.
pub fn scan_audio_files(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Error accessing entry: {e}");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && decoder::is_audio_file(e.path(), extensions))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

pub fn annotation_path_for(audio_dir: &Path, annotation_dir: &Path, audio: &Path) -> PathBuf {
    let stem = audio
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let prefix: Vec<String> = audio
        .strip_prefix(audio_dir)
        .ok()
        .and_then(Path::parent)
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let name = if prefix.is_empty() {
        format!("{stem}{ANNOTATION_SUFFIX}")
    } else {
        format!("{}_{stem}{ANNOTATION_SUFFIX}", prefix.join("_"))
    };
    annotation_dir.join(name)
}

fn load_session(
    audio_dir: &Path,
    annotation_dir: &Path,
    audio: &Path,
    config: &AnnotatorConfig,
) -> Result<AnnotationSession, PersistError> {
    let meta = decoder::probe_metadata(audio).unwrap_or_else(|e| {
        warn!("could not read audio metadata: {e}");
        AudioMeta::default()
    });
    AnnotationSession::load(
        audio,
        &annotation_path_for(audio_dir, annotation_dir, audio),
        meta,
        config.spectrogram,
        config.history_depth,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_name_at_root_has_no_prefix() {
        let path = annotation_path_for(
            Path::new("/data/audio"),
            Path::new("/data/labels"),
            Path::new("/data/audio/call01.wav"),
        );
        assert_eq!(path, Path::new("/data/labels/call01_annotations.json"));
    }

    #[test]
    fn nested_directories_become_a_prefix() {
        let path = annotation_path_for(
            Path::new("/data/audio"),
            Path::new("/data/labels"),
            Path::new("/data/audio/site_a/2024/call01.flac"),
        );
        assert_eq!(
            path,
            Path::new("/data/labels/site_a_2024_call01_annotations.json")
        );
    }

    #[test]
    fn only_complete_annotations_are_done() {
        assert!(FileStatus::Unannotated.needs_annotation());
        assert!(FileStatus::Unreadable.needs_annotation());
        assert!(FileStatus::Annotated { contours: 0 }.needs_annotation());
        assert!(
            FileStatus::Unusable {
                contours: 3,
                reason: None
            }
            .needs_annotation()
        );
        assert!(!FileStatus::Annotated { contours: 2 }.needs_annotation());
    }
}
