//! Screen capture of the target window or region.
//!
//! Capture never touches the target's input focus or z-order: the reader can
//! sit behind other windows (but not on another Space) while a session runs.

use crate::types::{CaptureTarget, PipelineError, Region};
use crate::windows;
use image::DynamicImage;
use tracing::trace;

/// Produces a raw image of the target on demand.
///
/// A single-method contract so tests can substitute canned frame sequences
/// without OS-level capture.
pub trait FrameSource {
    fn capture(&self, target: &CaptureTarget) -> Result<DynamicImage, PipelineError>;
}

impl<T: FrameSource + ?Sized> FrameSource for std::sync::Arc<T> {
    fn capture(&self, target: &CaptureTarget) -> Result<DynamicImage, PipelineError> {
        (**self).capture(target)
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use super::*;
    use core_graphics::geometry::{CGPoint, CGRect, CGSize};
    use core_graphics::image::CGImage;
    use core_graphics::window::{
        kCGWindowImageBestResolution, kCGWindowImageBoundsIgnoreFraming,
        kCGWindowListOptionIncludingWindow, CGWindowListCreateImage,
    };
    use foreign_types_shared::ForeignType;
    use image::RgbaImage;

    fn to_cg_rect(region: &Region) -> CGRect {
        CGRect::new(
            &CGPoint::new(region.x as f64, region.y as f64),
            &CGSize::new(region.width as f64, region.height as f64),
        )
    }

    /// Capture a specific window without bringing it to the foreground
    pub fn capture_window(
        window_id: u32,
        bounds: &Region,
    ) -> Result<DynamicImage, PipelineError> {
        let options = kCGWindowImageBoundsIgnoreFraming | kCGWindowImageBestResolution;

        let cg_image: CGImage = unsafe {
            let image_ref = CGWindowListCreateImage(
                to_cg_rect(bounds),
                kCGWindowListOptionIncludingWindow,
                window_id,
                options,
            );
            if image_ref.is_null() {
                return Err(PipelineError::PermissionDenied(
                    "window capture returned nothing; grant Screen Recording in \
                     System Settings > Privacy & Security"
                        .to_string(),
                ));
            }
            CGImage::from_ptr(image_ref)
        };

        convert_cgimage(&cg_image)
    }

    /// Capture a fixed screen region across all windows
    pub fn capture_region(region: &Region) -> Result<DynamicImage, PipelineError> {
        let cg_image: CGImage = unsafe {
            // Null window id with no list option captures the composited screen
            let image_ref = CGWindowListCreateImage(
                to_cg_rect(region),
                0,
                0,
                kCGWindowImageBestResolution,
            );
            if image_ref.is_null() {
                return Err(PipelineError::PermissionDenied(
                    "region capture returned nothing; grant Screen Recording in \
                     System Settings > Privacy & Security"
                        .to_string(),
                ));
            }
            CGImage::from_ptr(image_ref)
        };

        convert_cgimage(&cg_image)
    }

    /// Convert CGImage pixels (BGRA on macOS) to the image crate's RGBA
    fn convert_cgimage(cg_image: &CGImage) -> Result<DynamicImage, PipelineError> {
        let width = cg_image.width();
        let height = cg_image.height();
        let bytes_per_row = cg_image.bytes_per_row();
        let bits_per_pixel = cg_image.bits_per_pixel();

        let data = cg_image.data();
        let bytes = data.bytes();

        if bytes.is_empty() {
            return Err(PipelineError::CaptureUnavailable(
                "captured image has no pixel data".to_string(),
            ));
        }

        let mut rgba_data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            let row_start = y * bytes_per_row;
            for x in 0..width {
                let pixel_start = row_start + x * (bits_per_pixel / 8);
                if pixel_start + 3 < bytes.len() {
                    let b = bytes[pixel_start];
                    let g = bytes[pixel_start + 1];
                    let r = bytes[pixel_start + 2];
                    let a = bytes[pixel_start + 3];
                    rgba_data.extend_from_slice(&[r, g, b, a]);
                }
            }
        }

        RgbaImage::from_raw(width as u32, height as u32, rgba_data)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| {
                PipelineError::CaptureUnavailable("captured pixel buffer was truncated".to_string())
            })
    }
}

#[cfg(not(target_os = "macos"))]
mod macos {
    use super::*;

    pub fn capture_window(
        _window_id: u32,
        _bounds: &Region,
    ) -> Result<DynamicImage, PipelineError> {
        Err(PipelineError::CaptureUnavailable(
            "screen capture requires macOS".to_string(),
        ))
    }

    pub fn capture_region(_region: &Region) -> Result<DynamicImage, PipelineError> {
        Err(PipelineError::CaptureUnavailable(
            "screen capture requires macOS".to_string(),
        ))
    }
}

/// Screen-backed frame source
pub struct ScreenFrameSource;

impl ScreenFrameSource {
    pub fn new() -> Self {
        Self
    }

    /// Verify an explicit region lies inside some physical display
    fn validate_region(region: &Region) -> Result<(), PipelineError> {
        let displays = windows::display_bounds();
        if displays.iter().any(|d| d.contains(region)) {
            Ok(())
        } else {
            Err(PipelineError::CaptureUnavailable(format!(
                "region {},{},{}x{} lies outside every display",
                region.x, region.y, region.width, region.height
            )))
        }
    }
}

impl Default for ScreenFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for ScreenFrameSource {
    fn capture(&self, target: &CaptureTarget) -> Result<DynamicImage, PipelineError> {
        let start = std::time::Instant::now();
        let image = match &target.region {
            Some(region) => {
                Self::validate_region(region)?;
                macos::capture_region(region)?
            }
            None => macos::capture_window(target.window_id, &target.bounds)?,
        };
        trace!(
            "Captured {}x{} from window {} in {:?}",
            image.width(),
            image.height(),
            target.window_id,
            start.elapsed()
        );
        Ok(image)
    }
}
