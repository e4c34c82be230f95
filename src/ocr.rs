//! OCR recognition backend.
//!
//! Recognition runs in an external Vision-based helper binary invoked once
//! per frame image, with language hints, returning JSON on stdout. The
//! engine is stateless: identical image bytes and language hints produce
//! identical text for a given helper version.

use crate::types::PipelineError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Converts one image into recognized text.
///
/// Empty text is a valid result (a blank page), distinct from
/// `OcrUnavailable` (the backend could not be invoked at all).
#[async_trait]
pub trait OcrEngine {
    async fn recognize(&self, image: &Path, languages: &[String])
        -> Result<String, PipelineError>;
}

/// OCR engine backed by the `pagescan-ocr` helper binary (Apple Vision)
pub struct VisionOcr {
    /// Path to the helper binary
    binary_path: PathBuf,
    /// Also recognize a grayscale-inverted, contrast-boosted copy and keep
    /// whichever recognition produced more text (dark-mode readers)
    invert_fallback: bool,
}

impl VisionOcr {
    pub fn new(invert_fallback: bool) -> Self {
        Self {
            binary_path: Self::default_binary_path(),
            invert_fallback,
        }
    }

    /// Create with a custom helper binary path
    pub fn with_path(path: PathBuf, invert_fallback: bool) -> Self {
        Self {
            binary_path: path,
            invert_fallback,
        }
    }

    /// Get the default helper binary path
    fn default_binary_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        let paths = [
            // Same directory as the running binary
            exe_dir.join("pagescan-ocr"),
            // Swift build output relative to the repo root
            PathBuf::from("pagescan-ocr/.build/release/pagescan-ocr"),
            PathBuf::from("pagescan-ocr/.build/debug/pagescan-ocr"),
            // System path
            PathBuf::from("/usr/local/bin/pagescan-ocr"),
        ];

        for path in paths {
            if path.exists() {
                return path;
            }
        }

        PathBuf::from("pagescan-ocr")
    }

    /// Check if the helper binary is available
    pub fn is_available(&self) -> bool {
        let exists = self.binary_path.exists();
        if !exists {
            debug!(
                "OCR helper binary not found at: {}",
                self.binary_path.display()
            );
        }
        exists
    }

    /// Run the helper once over a single image file
    async fn recognize_file(
        &self,
        image: &Path,
        languages: &[String],
    ) -> Result<String, PipelineError> {
        let output = Command::new(&self.binary_path)
            .arg("--image")
            .arg(image)
            .arg("--languages")
            .arg(languages.join(","))
            .arg("--json")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                PipelineError::OcrUnavailable(format!(
                    "failed to invoke {}: {}",
                    self.binary_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::OcrUnavailable(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let result: serde_json::Value = serde_json::from_str(&stdout).map_err(|e| {
            PipelineError::OcrUnavailable(format!("unparseable helper output: {}", e))
        })?;

        if let Some(error) = result["error"].as_str() {
            return Err(PipelineError::OcrUnavailable(error.to_string()));
        }

        // Empty text is a valid result for a blank page
        Ok(result["text"].as_str().unwrap_or("").to_string())
    }

    /// Write a grayscale, inverted, contrast-boosted copy for dark-mode pages
    fn preprocess_dark(image: &Path) -> Result<PathBuf, PipelineError> {
        let mut img = image::open(image)?.grayscale();
        img.invert();
        let img = img.adjust_contrast(50.0);

        let file_name = image
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("frame");
        let temp_path = std::env::temp_dir().join(format!("pagescan_inverted_{}.png", file_name));
        img.save(&temp_path)?;
        Ok(temp_path)
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    async fn recognize(
        &self,
        image: &Path,
        languages: &[String],
    ) -> Result<String, PipelineError> {
        if !self.is_available() {
            return Err(PipelineError::OcrUnavailable(format!(
                "OCR helper binary not found at {}",
                self.binary_path.display()
            )));
        }

        let text = self.recognize_file(image, languages).await?;

        if !self.invert_fallback {
            return Ok(text);
        }

        // Recognize both renderings and keep the longer text; mixed
        // light/dark books come through either way
        let inverted = match Self::preprocess_dark(image) {
            Ok(path) => path,
            Err(e) => {
                warn!("Dark-mode preprocessing failed, keeping normal pass: {}", e);
                return Ok(text);
            }
        };
        let dark_text = self.recognize_file(&inverted, languages).await;
        let _ = std::fs::remove_file(&inverted);

        match dark_text {
            Ok(dark) if dark.len() > text.len() => {
                debug!(
                    "Dark-mode pass won for {:?} ({} vs {} chars)",
                    image,
                    dark.len(),
                    text.len()
                );
                Ok(dark)
            }
            Ok(_) => Ok(text),
            Err(e) => {
                warn!("Dark-mode pass failed, keeping normal pass: {}", e);
                Ok(text)
            }
        }
    }
}
