//! Top-level pipeline coordination.
//!
//! Selects one of three modes and sequences the capture session and the
//! transcription job. A capture failure that still produced frames is a
//! non-fatal warning: the frames form a valid prefix and Full mode goes on to
//! transcribe them. Transcription errors are always fatal for the
//! invocation.

use crate::duplicate::DuplicateDetector;
use crate::frame_source::FrameSource;
use crate::ocr::OcrEngine;
use crate::page_advancer::PageAdvancer;
use crate::session::CaptureSession;
use crate::storage::FrameStore;
use crate::transcribe::TranscriptionJob;
use crate::types::{Mode, PipelineError, StopReason};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// What one controller invocation accomplished
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Frames persisted by the capture phase, when one ran
    pub pages_captured: Option<u32>,
    /// Pages written to the output artifact, when transcription ran
    pub pages_transcribed: Option<usize>,
    /// Output artifact path, when transcription ran
    pub output: Option<PathBuf>,
}

/// Outcome of the capture phase as seen by the controller
enum CapturePhase {
    /// The session reached `Done`
    Completed { pages: u32, stop: StopReason },
    /// The session failed but left a usable prefix of frames
    Partial { pages: u32 },
}

/// Sequences CaptureSession and TranscriptionJob for one invocation
pub struct PipelineController<S, A, D, E> {
    mode: Mode,
    session: Option<CaptureSession<S, A, D>>,
    job: TranscriptionJob<E>,
    store: FrameStore,
    output: PathBuf,
}

impl<S, A, D, E> PipelineController<S, A, D, E>
where
    S: FrameSource,
    A: PageAdvancer,
    D: DuplicateDetector,
    E: OcrEngine + Send + Sync + 'static,
{
    pub fn new(
        mode: Mode,
        session: Option<CaptureSession<S, A, D>>,
        job: TranscriptionJob<E>,
        store: FrameStore,
        output: PathBuf,
    ) -> Self {
        Self {
            mode,
            session,
            job,
            store,
            output,
        }
    }

    pub async fn run(mut self) -> Result<PipelineReport, PipelineError> {
        info!("Running in {} mode", self.mode.as_str());
        let mut report = PipelineReport::default();

        if self.mode == Mode::OcrOnly {
            let result = self.job.run_to_file(&self.store, &self.output).await?;
            report.pages_transcribed = Some(result.len());
            report.output = Some(self.output.clone());
            return Ok(report);
        }

        let phase = self.capture_phase().await?;
        let (pages, transcribe) = match phase {
            CapturePhase::Completed { pages, stop } => {
                report.pages_captured = Some(pages);
                match stop {
                    StopReason::Aborted => {
                        warn!(
                            "Capture aborted; skipping transcription. Rerun with \
                             --ocr-only against {:?} to transcribe.",
                            self.store.dir()
                        );
                        (pages, false)
                    }
                    _ => (pages, true),
                }
            }
            CapturePhase::Partial { pages } => {
                report.pages_captured = Some(pages);
                (pages, true)
            }
        };

        if self.mode == Mode::Full && transcribe && pages > 0 {
            let result = self.job.run_to_file(&self.store, &self.output).await?;
            report.pages_transcribed = Some(result.len());
            report.output = Some(self.output.clone());
        }

        Ok(report)
    }

    /// Run the capture session. Failure with zero frames is fatal; failure
    /// with frames persisted degrades to a warning because the prefix is
    /// still transcribable.
    async fn capture_phase(&mut self) -> Result<CapturePhase, PipelineError> {
        let session = self.session.as_mut().ok_or_else(|| {
            PipelineError::TargetNotFound("no capture target configured".to_string())
        })?;

        match session.run().await {
            Ok(outcome) => Ok(CapturePhase::Completed {
                pages: outcome.pages,
                stop: outcome.stop,
            }),
            Err(failed) if failed.pages_captured > 0 => {
                warn!(
                    "Capture failed at page {} but {} pages were persisted: {}",
                    failed.page, failed.pages_captured, failed.source
                );
                warn!(
                    "Frames remain valid in {:?}; a later --ocr-only run can use them",
                    self.store.dir()
                );
                Ok(CapturePhase::Partial {
                    pages: failed.pages_captured,
                })
            }
            Err(failed) => {
                error!("{}", failed);
                Err(failed.source)
            }
        }
    }
}
