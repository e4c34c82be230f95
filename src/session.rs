//! Capture session state machine.
//!
//! Drives the capture/advance loop: `Idle → Counting → Capturing → Stopping →
//! Done`, with error transitions to `Failed` from any state. Strictly
//! sequential; the inter-page settling delay is the only intentional
//! suspension point, and an external abort flag is honored at the top of each
//! loop iteration.
//!
//! The loop keeps a two-slot buffer (previous/current): the capture taken to
//! check for end-of-document is reused as the next iteration's current frame,
//! so no page is ever captured twice. Every frame is persisted before the
//! next page-turn, so a killed process always leaves a valid prefix of frames
//! on disk.

use crate::duplicate::DuplicateDetector;
use crate::frame_source::FrameSource;
use crate::page_advancer::PageAdvancer;
use crate::storage::{FrameStore, Manifest};
use crate::types::{
    CaptureFailed, CaptureOutcome, CaptureTarget, Frame, PageIndex, PipelineError, StopReason,
};
use chrono::Utc;
use image::DynamicImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Capture session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Counting,
    Capturing,
    Stopping,
    Done,
    Failed,
}

/// Run-level capture options, immutable once the session starts
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Fixed page count; absent means auto-stop via duplicate detection
    pub pages: Option<u32>,
    /// Settling delay between a page-turn and the next capture
    pub delay: Duration,
    /// Pre-start countdown in seconds
    pub countdown_seconds: u64,
    /// Pixels cropped from the top of every frame
    pub crop_top: u32,
    /// Pixels cropped from the bottom of every frame
    pub crop_bottom: u32,
    /// Consecutive duplicate captures required before declaring
    /// end-of-document
    pub max_duplicate_run: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            pages: None,
            delay: Duration::from_millis(1500),
            countdown_seconds: 5,
            crop_top: 0,
            crop_bottom: 0,
            max_duplicate_run: 1,
        }
    }
}

/// Orchestrates FrameSource + PageAdvancer + DuplicateDetector over one run
pub struct CaptureSession<S, A, D> {
    source: S,
    advancer: A,
    detector: D,
    store: FrameStore,
    target: CaptureTarget,
    options: SessionOptions,
    abort: Arc<AtomicBool>,
    state: SessionState,
}

fn fail(page: PageIndex, pages_captured: u32, source: PipelineError) -> CaptureFailed {
    CaptureFailed {
        page,
        pages_captured,
        source,
    }
}

impl<S, A, D> CaptureSession<S, A, D>
where
    S: FrameSource,
    A: PageAdvancer,
    D: DuplicateDetector,
{
    pub fn new(
        source: S,
        advancer: A,
        detector: D,
        store: FrameStore,
        target: CaptureTarget,
        options: SessionOptions,
        abort: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            advancer,
            detector,
            store,
            target,
            options,
            abort,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion.
    ///
    /// On failure, all frames persisted before the error remain valid on
    /// disk and the error reports which page index was in progress.
    pub async fn run(&mut self) -> Result<CaptureOutcome, CaptureFailed> {
        match self.drive().await {
            Ok(outcome) => Ok(outcome),
            Err(failed) => {
                self.state = SessionState::Failed;
                let manifest = Manifest {
                    pages: failed.pages_captured,
                    completed: false,
                    finished_at: Utc::now().to_rfc3339(),
                };
                if let Err(e) = self.store.write_manifest(&manifest) {
                    warn!("Could not write manifest after failure: {}", e);
                }
                Err(failed)
            }
        }
    }

    async fn drive(&mut self) -> Result<CaptureOutcome, CaptureFailed> {
        self.state = SessionState::Counting;
        if self.countdown().await {
            info!("Aborted during countdown");
            return self.finish(0, StopReason::Aborted);
        }

        self.state = SessionState::Capturing;
        let label = self
            .options
            .pages
            .map(|p| p.to_string())
            .unwrap_or_else(|| "?".to_string());

        let mut current = self.capture_frame(1).map_err(|e| fail(1, 0, e))?;
        self.store.persist(&current).map_err(|e| fail(1, 0, e))?;
        let mut captured: u32 = 1;
        info!("[{}/{}] page captured", captured, label);

        let mut dup_run: u32 = 0;
        let stop = loop {
            if self.abort.load(Ordering::SeqCst) {
                info!("Abort observed, stopping after page {}", captured);
                break StopReason::Aborted;
            }

            if let Some(pages) = self.options.pages {
                if captured >= pages {
                    break StopReason::FixedCount;
                }
            }

            let next_index = captured + 1;
            self.advancer
                .advance(&self.target)
                .map_err(|e| fail(next_index, captured, e))?;
            sleep(self.options.delay).await;

            let next = self
                .capture_frame(next_index)
                .map_err(|e| fail(next_index, captured, e))?;

            // Auto-stop only; a fixed page count overrides the detector
            if self.options.pages.is_none()
                && self.detector.is_duplicate(&current.image, &next.image)
            {
                dup_run += 1;
                debug!(
                    "Page-turn had no visible effect ({}/{})",
                    dup_run, self.options.max_duplicate_run
                );
                if dup_run >= self.options.max_duplicate_run {
                    // The duplicate frame depicts a page already recorded
                    info!("End of document detected after page {}", captured);
                    break StopReason::EndOfDocument;
                }
                // Discard the duplicate capture and try turning again
            } else {
                dup_run = 0;
                self.store
                    .persist(&next)
                    .map_err(|e| fail(next_index, captured, e))?;
                captured = next_index;
                current = next;
                info!("[{}/{}] page captured", captured, label);
            }
        };

        self.finish(captured, stop)
    }

    fn finish(
        &mut self,
        pages: u32,
        stop: StopReason,
    ) -> Result<CaptureOutcome, CaptureFailed> {
        self.state = SessionState::Stopping;
        let manifest = Manifest {
            pages,
            completed: stop != StopReason::Aborted,
            finished_at: Utc::now().to_rfc3339(),
        };
        self.store
            .write_manifest(&manifest)
            .map_err(|e| fail(pages, pages, e))?;
        self.state = SessionState::Done;
        Ok(CaptureOutcome { pages, stop })
    }

    /// Pre-start wait so the operator can line up the reader window.
    /// Returns true if the abort flag was observed.
    async fn countdown(&self) -> bool {
        for remaining in (1..=self.options.countdown_seconds).rev() {
            if self.abort.load(Ordering::SeqCst) {
                return true;
            }
            info!("Starting in {}...", remaining);
            sleep(Duration::from_secs(1)).await;
        }
        self.abort.load(Ordering::SeqCst)
    }

    fn capture_frame(&self, index: PageIndex) -> Result<Frame, PipelineError> {
        let image = self.source.capture(&self.target)?;
        let image = crop_margins(image, self.options.crop_top, self.options.crop_bottom);
        Ok(Frame::new(index, image))
    }
}

/// Crop fixed margins from the top and bottom of a frame (browser chrome
/// removal). Returns the image unchanged when the margins do not fit.
fn crop_margins(image: DynamicImage, top: u32, bottom: u32) -> DynamicImage {
    if top == 0 && bottom == 0 {
        return image;
    }
    let height = image.height();
    if top + bottom >= height {
        warn!(
            "Crop margins {}+{} exceed frame height {}, skipping crop",
            top, bottom, height
        );
        return image;
    }
    image.crop_imm(0, top, image.width(), height - top - bottom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Region;
    use image::RgbImage;
    use std::sync::atomic::AtomicU32;

    fn page(brightness: u8) -> DynamicImage {
        let mut img = RgbImage::new(32, 32);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb([brightness, brightness, brightness]);
        }
        DynamicImage::ImageRgb8(img)
    }

    fn test_target() -> CaptureTarget {
        CaptureTarget {
            window_id: 7,
            pid: 1234,
            app_name: "FakeReader".to_string(),
            bounds: Region::new(0, 0, 32, 32),
            region: None,
        }
    }

    fn quick_options() -> SessionOptions {
        SessionOptions {
            delay: Duration::ZERO,
            countdown_seconds: 0,
            ..SessionOptions::default()
        }
    }

    /// Replays a canned sequence of frames, repeating the last one forever
    struct ScriptedSource {
        frames: Vec<DynamicImage>,
        cursor: AtomicU32,
        fail_at: Option<u32>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<DynamicImage>) -> Self {
            Self {
                frames,
                cursor: AtomicU32::new(0),
                fail_at: None,
            }
        }

        fn failing_at(frames: Vec<DynamicImage>, capture_number: u32) -> Self {
            Self {
                frames,
                cursor: AtomicU32::new(0),
                fail_at: Some(capture_number),
            }
        }

        fn captures(&self) -> u32 {
            self.cursor.load(Ordering::SeqCst)
        }
    }

    impl FrameSource for &ScriptedSource {
        fn capture(&self, _target: &CaptureTarget) -> Result<DynamicImage, PipelineError> {
            let n = self.cursor.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(n) == self.fail_at {
                return Err(PipelineError::PermissionDenied(
                    "screen recording revoked".to_string(),
                ));
            }
            let idx = (n as usize - 1).min(self.frames.len() - 1);
            Ok(self.frames[idx].clone())
        }
    }

    struct CountingAdvancer {
        count: AtomicU32,
    }

    impl CountingAdvancer {
        fn new() -> Self {
            Self {
                count: AtomicU32::new(0),
            }
        }

        fn advances(&self) -> u32 {
            self.count.load(Ordering::SeqCst)
        }
    }

    impl PageAdvancer for &CountingAdvancer {
        fn advance(&self, _target: &CaptureTarget) -> Result<(), PipelineError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Byte-exact comparison; deterministic for canned flat frames
    struct ExactDetector;

    impl DuplicateDetector for ExactDetector {
        fn is_duplicate(&self, a: &DynamicImage, b: &DynamicImage) -> bool {
            a.as_bytes() == b.as_bytes()
        }
    }

    fn store() -> (tempfile::TempDir, FrameStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = FrameStore::open(tmp.path()).unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn test_fixed_count_overrides_detector() {
        // Three distinct pages, then page 3 repeats forever
        let source = ScriptedSource::new(vec![page(10), page(20), page(30)]);
        let advancer = CountingAdvancer::new();
        let (_tmp, frame_store) = store();

        let mut session = CaptureSession::new(
            &source,
            &advancer,
            ExactDetector,
            frame_store.clone(),
            test_target(),
            SessionOptions {
                pages: Some(3),
                ..quick_options()
            },
            Arc::new(AtomicBool::new(false)),
        );

        let outcome = session.run().await.unwrap();
        assert_eq!(outcome.pages, 3);
        assert_eq!(outcome.stop, StopReason::FixedCount);
        assert_eq!(session.state(), SessionState::Done);

        // No page-turn after the final page
        assert_eq!(advancer.advances(), 2);

        let indices: Vec<_> = frame_store
            .list_frames()
            .unwrap()
            .iter()
            .map(|(i, _)| *i)
            .collect();
        assert_eq!(indices, vec![1, 2, 3]);

        let manifest = frame_store.read_manifest().unwrap().unwrap();
        assert_eq!(manifest.pages, 3);
        assert!(manifest.completed);
    }

    #[tokio::test]
    async fn test_fixed_count_captures_duplicates_verbatim() {
        // With a fixed count the detector verdict is irrelevant; identical
        // pages are still captured
        let source = ScriptedSource::new(vec![page(10)]);
        let advancer = CountingAdvancer::new();
        let (_tmp, frame_store) = store();

        let mut session = CaptureSession::new(
            &source,
            &advancer,
            ExactDetector,
            frame_store.clone(),
            test_target(),
            SessionOptions {
                pages: Some(4),
                ..quick_options()
            },
            Arc::new(AtomicBool::new(false)),
        );

        let outcome = session.run().await.unwrap();
        assert_eq!(outcome.pages, 4);
        assert_eq!(frame_store.list_frames().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_auto_stop_on_stall() {
        // Five distinct pages, then the reader stalls
        let source = ScriptedSource::new(vec![page(10), page(20), page(30), page(40), page(50)]);
        let advancer = CountingAdvancer::new();
        let (_tmp, frame_store) = store();

        let mut session = CaptureSession::new(
            &source,
            &advancer,
            ExactDetector,
            frame_store.clone(),
            test_target(),
            quick_options(),
            Arc::new(AtomicBool::new(false)),
        );

        let outcome = session.run().await.unwrap();
        assert_eq!(outcome.pages, 5);
        assert_eq!(outcome.stop, StopReason::EndOfDocument);
        assert_eq!(session.state(), SessionState::Done);

        // The stall was detected at the 6th capture attempt, and that
        // duplicate frame was discarded, never persisted
        assert_eq!(source.captures(), 6);
        let indices: Vec<_> = frame_store
            .list_frames()
            .unwrap()
            .iter()
            .map(|(i, _)| *i)
            .collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_duplicate_run_length_threshold() {
        // One stalled turn recovers (run length 2 required); the final stall
        // takes two duplicate captures to end the session
        let source = ScriptedSource::new(vec![
            page(10),
            page(20),
            page(20), // first turn after page 2 stalls once...
            page(30), // ...then recovers
            page(30),
            page(30),
        ]);
        let advancer = CountingAdvancer::new();
        let (_tmp, frame_store) = store();

        let mut session = CaptureSession::new(
            &source,
            &advancer,
            ExactDetector,
            frame_store.clone(),
            test_target(),
            SessionOptions {
                max_duplicate_run: 2,
                ..quick_options()
            },
            Arc::new(AtomicBool::new(false)),
        );

        let outcome = session.run().await.unwrap();
        assert_eq!(outcome.pages, 3);
        assert_eq!(outcome.stop, StopReason::EndOfDocument);
        assert_eq!(frame_store.list_frames().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_abort_before_first_capture() {
        let source = ScriptedSource::new(vec![page(10)]);
        let advancer = CountingAdvancer::new();
        let (_tmp, frame_store) = store();

        let mut session = CaptureSession::new(
            &source,
            &advancer,
            ExactDetector,
            frame_store.clone(),
            test_target(),
            quick_options(),
            Arc::new(AtomicBool::new(true)),
        );

        let outcome = session.run().await.unwrap();
        assert_eq!(outcome.pages, 0);
        assert_eq!(outcome.stop, StopReason::Aborted);
        assert_eq!(source.captures(), 0);
        assert!(!frame_store.read_manifest().unwrap().unwrap().completed);
    }

    #[tokio::test]
    async fn test_failure_leaves_valid_prefix() {
        // Third capture fails: two frames must survive on disk and the error
        // must name the page that was in progress
        let source =
            ScriptedSource::failing_at(vec![page(10), page(20), page(30), page(40)], 3);
        let advancer = CountingAdvancer::new();
        let (_tmp, frame_store) = store();

        let mut session = CaptureSession::new(
            &source,
            &advancer,
            ExactDetector,
            frame_store.clone(),
            test_target(),
            quick_options(),
            Arc::new(AtomicBool::new(false)),
        );

        let failed = session.run().await.unwrap_err();
        assert_eq!(failed.page, 3);
        assert_eq!(failed.pages_captured, 2);
        assert!(matches!(failed.source, PipelineError::PermissionDenied(_)));
        assert_eq!(session.state(), SessionState::Failed);

        let indices: Vec<_> = frame_store
            .list_frames()
            .unwrap()
            .iter()
            .map(|(i, _)| *i)
            .collect();
        assert_eq!(indices, vec![1, 2]);

        let manifest = frame_store.read_manifest().unwrap().unwrap();
        assert_eq!(manifest.pages, 2);
        assert!(!manifest.completed);
    }

    #[tokio::test]
    async fn test_crop_margins_applied_before_persist() {
        let source = ScriptedSource::new(vec![page(10)]);
        let advancer = CountingAdvancer::new();
        let (_tmp, frame_store) = store();

        let mut session = CaptureSession::new(
            &source,
            &advancer,
            ExactDetector,
            frame_store.clone(),
            test_target(),
            SessionOptions {
                pages: Some(1),
                crop_top: 4,
                crop_bottom: 8,
                ..quick_options()
            },
            Arc::new(AtomicBool::new(false)),
        );

        session.run().await.unwrap();
        let (_, path) = frame_store.list_frames().unwrap().remove(0);
        let stored = image::open(path).unwrap();
        assert_eq!(stored.height(), 32 - 4 - 8);
        assert_eq!(stored.width(), 32);
    }

    #[test]
    fn test_crop_margins_too_large_is_noop() {
        let img = page(10);
        let cropped = crop_margins(img.clone(), 20, 20);
        assert_eq!(cropped.height(), img.height());
    }
}
