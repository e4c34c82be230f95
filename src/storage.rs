//! Durable frame storage.
//!
//! One directory per run holds sequentially numbered frame images plus a
//! small manifest recording the final page count and completion state. The
//! page index is zero-padded in the filename so lexical and numeric order
//! coincide, and is always parsed back from the filename rather than trusted
//! from discovery order.

use crate::types::{Frame, PageIndex, PipelineError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const FRAME_PREFIX: &str = "page_";
const FRAME_EXT: &str = "png";
const MANIFEST_NAME: &str = "manifest.json";

/// Record of a capture session's final page count and completion state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Number of frames persisted
    pub pages: u32,
    /// Whether the session ran to a normal stop (fixed count or
    /// end-of-document) rather than an abort or failure
    pub completed: bool,
    /// RFC 3339 timestamp of when the session finished
    pub finished_at: String,
}

/// Frame storage rooted at one run directory
#[derive(Debug, Clone)]
pub struct FrameStore {
    dir: PathBuf,
}

impl FrameStore {
    /// Open (creating if needed) a frame store at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for the frame with the given page index
    pub fn frame_path(&self, index: PageIndex) -> PathBuf {
        self.dir
            .join(format!("{}{:04}.{}", FRAME_PREFIX, index, FRAME_EXT))
    }

    /// Persist a frame to durable storage, keyed by its page index.
    ///
    /// Called before the session advances past the frame's page, so a killed
    /// process always leaves a valid prefix of frames on disk.
    pub fn persist(&self, frame: &Frame) -> Result<PathBuf, PipelineError> {
        let path = self.frame_path(frame.index);
        frame.image.save(&path)?;
        debug!(
            "Persisted page {} ({}x{}) to {:?}",
            frame.index,
            frame.image.width(),
            frame.image.height(),
            path
        );
        Ok(path)
    }

    /// Remove frames and manifest left over from a previous run
    pub fn clear(&self) -> Result<(), PipelineError> {
        for (_, path) in self.list_frames()? {
            std::fs::remove_file(path)?;
        }
        let manifest = self.dir.join(MANIFEST_NAME);
        if manifest.exists() {
            std::fs::remove_file(manifest)?;
        }
        Ok(())
    }

    /// Enumerate persisted frames in ascending page-index order.
    ///
    /// The index is parsed from each filename; files that do not match the
    /// `page_NNNN.png` pattern are ignored.
    pub fn list_frames(&self) -> Result<Vec<(PageIndex, PathBuf)>, PipelineError> {
        let pattern = self
            .dir
            .join(format!("{}*.{}", FRAME_PREFIX, FRAME_EXT))
            .to_string_lossy()
            .into_owned();

        let mut frames = Vec::new();
        let paths = glob::glob(&pattern).map_err(|e| {
            PipelineError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        for entry in paths {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            match parse_frame_index(&path) {
                Some(index) => frames.push((index, path)),
                None => debug!("Ignoring non-frame file {:?}", path),
            }
        }

        frames.sort_by_key(|(index, _)| *index);
        Ok(frames)
    }

    /// Write the run manifest
    pub fn write_manifest(&self, manifest: &Manifest) -> Result<(), PipelineError> {
        let path = self.dir.join(MANIFEST_NAME);
        let contents = serde_json::to_string_pretty(manifest)?;
        std::fs::write(&path, contents)?;
        debug!("Wrote manifest to {:?}", path);
        Ok(())
    }

    /// Read the run manifest, if one was written
    pub fn read_manifest(&self) -> Result<Option<Manifest>, PipelineError> {
        let path = self.dir.join(MANIFEST_NAME);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }
}

/// Parse the page index out of a `page_NNNN.png` filename
fn parse_frame_index(path: &Path) -> Option<PageIndex> {
    let stem = path.file_stem()?.to_str()?;
    let digits = stem.strip_prefix(FRAME_PREFIX)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn test_frame(index: PageIndex) -> Frame {
        Frame::new(index, DynamicImage::ImageRgb8(RgbImage::new(4, 4)))
    }

    #[test]
    fn test_frame_path_zero_padded() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FrameStore::open(tmp.path()).unwrap();
        assert!(store
            .frame_path(3)
            .to_string_lossy()
            .ends_with("page_0003.png"));
        assert!(store
            .frame_path(1234)
            .to_string_lossy()
            .ends_with("page_1234.png"));
    }

    #[test]
    fn test_persist_and_list_in_index_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FrameStore::open(tmp.path()).unwrap();

        // Persist out of order; listing must come back sorted by index
        for index in [2, 1, 3] {
            store.persist(&test_frame(index)).unwrap();
        }

        let frames = store.list_frames().unwrap();
        let indices: Vec<_> = frames.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_list_ignores_foreign_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FrameStore::open(tmp.path()).unwrap();
        store.persist(&test_frame(1)).unwrap();

        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();
        std::fs::write(tmp.path().join("page_abc.png"), "x").unwrap();
        std::fs::write(tmp.path().join("page_.png"), "x").unwrap();

        let frames = store.list_frames().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, 1);
    }

    #[test]
    fn test_manifest_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FrameStore::open(tmp.path()).unwrap();

        assert!(store.read_manifest().unwrap().is_none());

        let manifest = Manifest {
            pages: 42,
            completed: true,
            finished_at: "2026-01-01T00:00:00Z".to_string(),
        };
        store.write_manifest(&manifest).unwrap();
        assert_eq!(store.read_manifest().unwrap(), Some(manifest));
    }

    #[test]
    fn test_clear_removes_frames_and_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FrameStore::open(tmp.path()).unwrap();
        store.persist(&test_frame(1)).unwrap();
        store.persist(&test_frame(2)).unwrap();
        store
            .write_manifest(&Manifest {
                pages: 2,
                completed: false,
                finished_at: String::new(),
            })
            .unwrap();

        store.clear().unwrap();
        assert!(store.list_frames().unwrap().is_empty());
        assert!(store.read_manifest().unwrap().is_none());
    }

    #[test]
    fn test_parse_frame_index() {
        assert_eq!(parse_frame_index(Path::new("x/page_0001.png")), Some(1));
        assert_eq!(parse_frame_index(Path::new("page_0150.png")), Some(150));
        assert_eq!(parse_frame_index(Path::new("page_.png")), None);
        assert_eq!(parse_frame_index(Path::new("other_0001.png")), None);
    }
}
