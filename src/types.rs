//! Core types used throughout the capture/OCR pipeline.
//!
//! This module defines the fundamental data structures for capture targets,
//! captured frames, and the shared error taxonomy.

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// 1-based page index. Captured frames always form a contiguous range [1, n].
pub type PageIndex = u32;

/// Unique identifier for a window (CGWindowID on macOS)
pub type WindowId = u32;

/// A rectangular screen region in global display coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Check if another region lies entirely inside this one
    pub fn contains(&self, other: &Region) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x + other.width as i32 <= self.x + self.width as i32
            && other.y + other.height as i32 <= self.y + self.height as i32
    }

    /// Parse a region from `x,y,width,height` form
    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(PipelineError::CaptureUnavailable(format!(
                "region must be x,y,width,height, got '{}'",
                s
            )));
        }
        let parse_i32 = |p: &str| {
            p.parse::<i32>().map_err(|_| {
                PipelineError::CaptureUnavailable(format!("invalid region component '{}'", p))
            })
        };
        let parse_u32 = |p: &str| {
            p.parse::<u32>().map_err(|_| {
                PipelineError::CaptureUnavailable(format!("invalid region component '{}'", p))
            })
        };
        Ok(Self {
            x: parse_i32(parts[0])?,
            y: parse_i32(parts[1])?,
            width: parse_u32(parts[2])?,
            height: parse_u32(parts[3])?,
        })
    }
}

/// The window/application being captured and paged through.
///
/// Resolved once before a session starts and passed explicitly through every
/// capture and page-advance call; the bounds and optional region are fixed for
/// the whole session (no re-measurement mid-run).
#[derive(Debug, Clone)]
pub struct CaptureTarget {
    /// Window identifier
    pub window_id: WindowId,
    /// Process ID of the owning application (page-advance events go here)
    pub pid: i32,
    /// Application name (for logging)
    pub app_name: String,
    /// Window bounds at resolution time
    pub bounds: Region,
    /// Optional explicit capture region; full window if absent
    pub region: Option<Region>,
}

/// Direction of the "next page" key event.
///
/// Vertical Japanese text advances with the left arrow, horizontal text with
/// the right arrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageDirection {
    Left,
    Right,
}

impl PageDirection {
    /// macOS virtual keycode for the arrow key
    pub fn keycode(&self) -> u16 {
        match self {
            PageDirection::Left => 123,
            PageDirection::Right => 124,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left" => Some(PageDirection::Left),
            "right" => Some(PageDirection::Right),
            _ => None,
        }
    }
}

impl Default for PageDirection {
    fn default() -> Self {
        PageDirection::Left
    }
}

/// One captured page image, owned by the session until persisted
#[derive(Debug, Clone)]
pub struct Frame {
    /// 1-based page index
    pub index: PageIndex,
    /// Immutable raster image
    pub image: DynamicImage,
    /// Capture timestamp
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(index: PageIndex, image: DynamicImage) -> Self {
        Self {
            index,
            image,
            captured_at: Utc::now(),
        }
    }
}

/// Pipeline mode selected by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Capture then transcribe
    Full,
    /// Capture only, leaving transcription for a later invocation
    CaptureOnly,
    /// Transcribe a previously captured storage directory
    OcrOnly,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Full => "full",
            Mode::CaptureOnly => "capture-only",
            Mode::OcrOnly => "ocr-only",
        }
    }
}

/// Why a capture session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured fixed page count was reached
    FixedCount,
    /// Page-turning stopped having a visible effect
    EndOfDocument,
    /// External abort signal observed at a loop checkpoint
    Aborted,
}

/// Result of a completed (or aborted) capture session
#[derive(Debug, Clone, Copy)]
pub struct CaptureOutcome {
    /// Number of frames persisted
    pub pages: u32,
    /// What ended the session
    pub stop: StopReason,
}

/// Errors that can occur in the pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("capture target not found: {0}")]
    TargetNotFound(String),

    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("OCR unavailable: {0}")]
    OcrUnavailable(String),

    #[error("no captured frames found in {0}")]
    NoFrames(std::path::PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::error::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Capture-phase failure. All frames persisted before the failure remain
/// valid on disk and can still be transcribed.
#[derive(Debug, thiserror::Error)]
#[error("capture failed at page {page} ({pages_captured} pages persisted): {source}")]
pub struct CaptureFailed {
    /// Page index that was in progress when the error hit
    pub page: PageIndex,
    /// Frames successfully persisted before the failure
    pub pages_captured: u32,
    #[source]
    pub source: PipelineError,
}
