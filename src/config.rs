//! Configuration management for the pipeline.
//!
//! Loads configuration from TOML files and provides runtime defaults.
//! Command-line flags override individual fields after loading.

use crate::types::PageDirection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub ocr: OcrConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Fixed page count; absent means auto-stop via duplicate detection
    #[serde(default)]
    pub pages: Option<u32>,

    /// Settling time between a page-turn and the next capture, in seconds.
    /// Too short misses page turns, too long just wastes wall-clock time.
    #[serde(default = "default_delay")]
    pub delay_seconds: f64,

    /// Pre-start countdown in seconds, giving the operator time to put the
    /// reader window where it belongs
    #[serde(default = "default_countdown")]
    pub countdown_seconds: u64,

    /// Page-turn direction
    #[serde(default)]
    pub direction: PageDirection,

    /// Pixels to crop from the top of every frame (browser chrome removal)
    #[serde(default)]
    pub crop_top: u32,

    /// Pixels to crop from the bottom of every frame
    #[serde(default)]
    pub crop_bottom: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            pages: None,
            delay_seconds: 1.5,
            countdown_seconds: 5,
            direction: PageDirection::default(),
            crop_top: 0,
            crop_bottom: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Hash algorithm for frame comparison (mean or gradient)
    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: String,

    /// Hamming distance below which two frames count as the same page (0-64)
    #[serde(default = "default_hash_threshold")]
    pub hash_threshold: u32,

    /// Consecutive duplicate captures required before declaring
    /// end-of-document
    #[serde(default = "default_max_duplicate_run")]
    pub max_duplicate_run: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: default_hash_algorithm(),
            hash_threshold: default_hash_threshold(),
            max_duplicate_run: default_max_duplicate_run(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Recognition language hints, in priority order
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,

    /// Maximum concurrent OCR invocations
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Path to the OCR helper binary
    #[serde(default)]
    pub binary_path: Option<String>,

    /// Also recognize an inverted copy of each frame and keep whichever
    /// produced more text (dark-mode readers)
    #[serde(default)]
    pub invert_fallback: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            parallelism: default_parallelism(),
            binary_path: None,
            invert_fallback: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output text artifact path
    #[serde(default = "default_text_path")]
    pub text_path: PathBuf,

    /// Storage directory for captured frames
    #[serde(default = "default_frames_dir")]
    pub frames_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            text_path: default_text_path(),
            frames_dir: default_frames_dir(),
        }
    }
}

// Default value functions for serde
fn default_delay() -> f64 {
    1.5
}

fn default_countdown() -> u64 {
    5
}

fn default_hash_algorithm() -> String {
    "mean".to_string()
}

fn default_hash_threshold() -> u32 {
    8
}

fn default_max_duplicate_run() -> u32 {
    1
}

fn default_languages() -> Vec<String> {
    vec!["ja".to_string(), "en".to_string()]
}

fn default_parallelism() -> usize {
    1
}

fn default_text_path() -> PathBuf {
    PathBuf::from("output.txt")
}

fn default_frames_dir() -> PathBuf {
    PathBuf::from("screenshots")
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pagescan")
            .join("config.toml")
    }
}
