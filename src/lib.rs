//! pagescan - Automated digitization of on-screen paginated readers
//!
//! This crate captures a reader window page by page, turning pages with
//! synthetic key events, and runs OCR over the captured frames to produce one
//! ordered text document:
//!
//! - **Capture**: focus-independent window/region screenshots, persisted
//!   immediately so an interrupted run leaves a valid, resumable prefix
//! - **End-of-book detection**: perceptual hash comparison of consecutive
//!   frames; a page-turn with no visible effect stops the session
//! - **Transcription**: per-frame OCR merged strictly in page order, possibly
//!   across a bounded worker pool
//!
//! # Architecture
//!
//! `CaptureSession` drives the capture/advance loop over narrow `FrameSource`
//! / `PageAdvancer` / `DuplicateDetector` traits; `TranscriptionJob` drives
//! the `OcrEngine` trait over the persisted frames; `PipelineController`
//! sequences the two phases for the full, capture-only and OCR-only modes.

pub mod config;
pub mod controller;
pub mod duplicate;
pub mod frame_source;
pub mod ocr;
pub mod page_advancer;
pub mod session;
pub mod storage;
pub mod transcribe;
pub mod types;
pub mod windows;

// Re-export commonly used types
pub use config::Config;
pub use controller::{PipelineController, PipelineReport};
pub use duplicate::{
    gradient_hash, hamming_distance, mean_hash, DuplicateDetector, HashAlgorithm,
    PerceptualDetector, PerceptualHash,
};
pub use frame_source::{FrameSource, ScreenFrameSource};
pub use ocr::{OcrEngine, VisionOcr};
pub use page_advancer::{ArrowKeyAdvancer, PageAdvancer};
pub use session::{CaptureSession, SessionOptions, SessionState};
pub use storage::{FrameStore, Manifest};
pub use transcribe::{TranscriptionJob, TranscriptionResult, PAGE_SEPARATOR};
pub use types::{
    CaptureFailed, CaptureOutcome, CaptureTarget, Frame, Mode, PageDirection, PageIndex,
    PipelineError, Region, StopReason, WindowId,
};
pub use windows::{TargetSelector, VisibleWindow};
