//! Transcription of persisted frames into one ordered text artifact.
//!
//! Frames are enumerated in ascending page-index order (the index comes from
//! the filename, never from discovery order) and recognized by the OCR
//! engine, possibly in parallel across a bounded worker pool. The merge
//! re-orders by page index before anything is written, so the output reads
//! in book order regardless of OCR completion order. The job fails fast on
//! `OcrUnavailable` with no partial artifact written; source frames are never
//! touched, so a failed job is safely re-runnable.

use crate::ocr::OcrEngine;
use crate::storage::FrameStore;
use crate::types::{PageIndex, PipelineError};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Stable marker between page texts in the output artifact, so downstream
/// tooling can re-split by page
pub const PAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Ordered (page index, recognized text) pairs
#[derive(Debug, Clone, Default)]
pub struct TranscriptionResult {
    pages: Vec<(PageIndex, String)>,
}

impl TranscriptionResult {
    pub fn pages(&self) -> &[(PageIndex, String)] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Page texts concatenated in index order with the page separator
    pub fn to_text(&self) -> String {
        self.pages
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join(PAGE_SEPARATOR)
    }

    /// Total recognized characters, for reporting
    pub fn total_chars(&self) -> usize {
        self.pages.iter().map(|(_, text)| text.chars().count()).sum()
    }
}

/// Runs the OCR engine over a storage directory of persisted frames
pub struct TranscriptionJob<E> {
    engine: Arc<E>,
    languages: Vec<String>,
    parallelism: usize,
}

impl<E> TranscriptionJob<E>
where
    E: OcrEngine + Send + Sync + 'static,
{
    pub fn new(engine: E, languages: Vec<String>, parallelism: usize) -> Self {
        Self {
            engine: Arc::new(engine),
            languages,
            parallelism: parallelism.max(1),
        }
    }

    /// Recognize every persisted frame, merged in ascending page-index order
    pub async fn run(&self, store: &FrameStore) -> Result<TranscriptionResult, PipelineError> {
        let frames = store.list_frames()?;
        if frames.is_empty() {
            return Err(PipelineError::NoFrames(store.dir().to_path_buf()));
        }

        let total = frames.len();
        info!(
            "Transcribing {} pages from {:?} ({} workers)",
            total,
            store.dir(),
            self.parallelism
        );
        warn_on_gaps(&frames);

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut workers = JoinSet::new();

        for (index, path) in frames {
            let engine = Arc::clone(&self.engine);
            let semaphore = Arc::clone(&semaphore);
            let languages = self.languages.clone();

            workers.spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|_| {
                    PipelineError::OcrUnavailable("worker pool closed".to_string())
                })?;
                let text = engine.recognize(&path, &languages).await?;
                debug!("Page {} recognized: {} chars", index, text.chars().count());
                Ok::<(PageIndex, String), PipelineError>((index, text))
            });
        }

        let mut pages = Vec::with_capacity(total);
        while let Some(joined) = workers.join_next().await {
            let result = joined.map_err(|e| {
                PipelineError::OcrUnavailable(format!("OCR worker panicked: {}", e))
            })?;
            match result {
                Ok(page) => pages.push(page),
                Err(e) => {
                    // Fail fast: abort the whole job rather than silently
                    // dropping a page
                    workers.abort_all();
                    return Err(e);
                }
            }
        }

        // The ordering guarantee: merge strictly by page index, whatever
        // order the workers finished in
        pages.sort_by_key(|(index, _)| *index);

        Ok(TranscriptionResult { pages })
    }

    /// Run the job and serialize the result to the output artifact.
    ///
    /// Nothing is written until every page has been recognized, so a failed
    /// job never leaves a partial artifact behind.
    pub async fn run_to_file(
        &self,
        store: &FrameStore,
        output: &Path,
    ) -> Result<TranscriptionResult, PipelineError> {
        let result = self.run(store).await?;
        std::fs::write(output, result.to_text())?;
        info!(
            "Wrote {:?} ({} pages, {} chars)",
            output,
            result.len(),
            result.total_chars()
        );
        Ok(result)
    }
}

fn warn_on_gaps(frames: &[(PageIndex, std::path::PathBuf)]) {
    for pair in frames.windows(2) {
        if pair[1].0 != pair[0].0 + 1 {
            warn!(
                "Frame indices jump from {} to {}; output will skip the gap",
                pair[0].0, pair[1].0
            );
        }
    }
}
