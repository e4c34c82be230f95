//! Visible-window enumeration and target resolution.
//!
//! Replaces a GUI window picker with a plain listing of on-screen windows.
//! The selected window becomes the session's capture target; its bounds are
//! measured once here and never re-measured mid-run.

use crate::types::{CaptureTarget, PipelineError, Region, WindowId};
use tracing::debug;

/// A visible window eligible as a capture target
#[derive(Debug, Clone)]
pub struct VisibleWindow {
    pub id: WindowId,
    pub pid: i32,
    pub app_name: String,
    pub title: String,
    pub bounds: Region,
}

impl VisibleWindow {
    pub fn label(&self) -> String {
        if self.title.is_empty() {
            self.app_name.clone()
        } else {
            format!("{} - {}", self.app_name, self.title)
        }
    }
}

/// Window owners that are never valid capture targets
const SKIP_OWNERS: &[&str] = &[
    "Window Server",
    "Dock",
    "SystemUIServer",
    "Control Center",
    "Spotlight",
];

#[cfg(target_os = "macos")]
mod macos {
    use super::*;
    use core_foundation::array::CFArray;
    use core_foundation::base::{CFType, TCFType};
    use core_foundation::dictionary::CFDictionary;
    use core_foundation::number::CFNumber;
    use core_foundation::string::CFString;
    use core_graphics::display::{CGDisplayBounds, CGGetActiveDisplayList};
    use core_graphics::window::{
        kCGNullWindowID, kCGWindowListExcludeDesktopElements, kCGWindowListOptionOnScreenOnly,
        CGWindowListCopyWindowInfo,
    };

    pub fn list_windows() -> Vec<VisibleWindow> {
        let options = kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements;

        let window_list: CFArray<CFDictionary<CFString, CFType>> = unsafe {
            let list_ref = CGWindowListCopyWindowInfo(options, kCGNullWindowID);
            if list_ref.is_null() {
                return vec![];
            }
            CFArray::wrap_under_create_rule(list_ref)
        };

        let mut windows = Vec::new();
        for i in 0..window_list.len() {
            if let Some(dict) = window_list.get(i) {
                if let Some(window) = parse_window_dict(&dict) {
                    windows.push(window);
                }
            }
        }
        windows
    }

    fn parse_window_dict(dict: &CFDictionary<CFString, CFType>) -> Option<VisibleWindow> {
        let id = get_dict_number(dict, "kCGWindowNumber")? as WindowId;
        let pid = get_dict_number(dict, "kCGWindowOwnerPID")? as i32;

        // Skip menu bars, docks and other non-normal layers
        let layer = get_dict_number(dict, "kCGWindowLayer").unwrap_or(0);
        if layer != 0 {
            return None;
        }

        let app_name = get_dict_string(dict, "kCGWindowOwnerName").unwrap_or_default();
        if app_name.is_empty() || SKIP_OWNERS.contains(&app_name.as_str()) {
            return None;
        }

        let bounds = get_window_bounds(dict)?;

        // Tooltips and popups, not readers
        if bounds.width <= 100 || bounds.height <= 100 {
            return None;
        }

        let title = get_dict_string(dict, "kCGWindowName").unwrap_or_default();

        Some(VisibleWindow {
            id,
            pid,
            app_name,
            title,
            bounds,
        })
    }

    fn get_dict_number(dict: &CFDictionary<CFString, CFType>, key: &str) -> Option<i64> {
        let cf_key = CFString::new(key);
        dict.find(&cf_key).and_then(|value| {
            if value.type_of() == CFNumber::type_id() {
                let num: CFNumber =
                    unsafe { CFNumber::wrap_under_get_rule(value.as_CFTypeRef() as *const _) };
                num.to_i64()
            } else {
                None
            }
        })
    }

    fn get_dict_string(dict: &CFDictionary<CFString, CFType>, key: &str) -> Option<String> {
        let cf_key = CFString::new(key);
        dict.find(&cf_key).and_then(|value| {
            if value.type_of() == CFString::type_id() {
                let s: CFString =
                    unsafe { CFString::wrap_under_get_rule(value.as_CFTypeRef() as *const _) };
                Some(s.to_string())
            } else {
                None
            }
        })
    }

    fn get_window_bounds(dict: &CFDictionary<CFString, CFType>) -> Option<Region> {
        let cf_key = CFString::new("kCGWindowBounds");
        let bounds_dict = dict.find(&cf_key)?;

        if bounds_dict.type_of() != CFDictionary::<CFString, CFType>::type_id() {
            return None;
        }

        let bounds: CFDictionary<CFString, CFType> = unsafe {
            CFDictionary::wrap_under_get_rule(bounds_dict.as_CFTypeRef() as *const _)
        };

        let x = get_dict_number_f64(&bounds, "X")? as i32;
        let y = get_dict_number_f64(&bounds, "Y")? as i32;
        let width = get_dict_number_f64(&bounds, "Width")? as u32;
        let height = get_dict_number_f64(&bounds, "Height")? as u32;

        Some(Region::new(x, y, width, height))
    }

    fn get_dict_number_f64(dict: &CFDictionary<CFString, CFType>, key: &str) -> Option<f64> {
        let cf_key = CFString::new(key);
        dict.find(&cf_key).and_then(|value| {
            if value.type_of() == CFNumber::type_id() {
                let num: CFNumber =
                    unsafe { CFNumber::wrap_under_get_rule(value.as_CFTypeRef() as *const _) };
                num.to_f64()
            } else {
                None
            }
        })
    }

    /// Get the bounds of every active display
    pub fn display_bounds() -> Vec<Region> {
        let mut display_count: u32 = 0;
        unsafe {
            CGGetActiveDisplayList(0, std::ptr::null_mut(), &mut display_count);
        }
        if display_count == 0 {
            return vec![];
        }

        let mut displays = vec![0u32; display_count as usize];
        unsafe {
            CGGetActiveDisplayList(display_count, displays.as_mut_ptr(), &mut display_count);
        }

        displays
            .into_iter()
            .map(|id| {
                let bounds = unsafe { CGDisplayBounds(id) };
                Region::new(
                    bounds.origin.x as i32,
                    bounds.origin.y as i32,
                    bounds.size.width as u32,
                    bounds.size.height as u32,
                )
            })
            .collect()
    }
}

#[cfg(not(target_os = "macos"))]
mod macos {
    use super::*;

    pub fn list_windows() -> Vec<VisibleWindow> {
        vec![]
    }

    pub fn display_bounds() -> Vec<Region> {
        vec![]
    }
}

/// Enumerate visible, capture-eligible windows
pub fn list_windows() -> Vec<VisibleWindow> {
    let windows = macos::list_windows();
    debug!("Found {} capture-eligible windows", windows.len());
    windows
}

/// Check whether a window still exists on screen
pub fn window_exists(id: WindowId) -> bool {
    macos::list_windows().iter().any(|w| w.id == id)
}

/// Bounds of all active displays, for region validation
pub fn display_bounds() -> Vec<Region> {
    macos::display_bounds()
}

/// How the operator names the capture target
#[derive(Debug, Clone)]
pub enum TargetSelector {
    /// Explicit window id
    WindowId(WindowId),
    /// Case-insensitive application name substring; first match wins
    AppName(String),
}

/// Resolve a selector to a concrete capture target.
///
/// The window's bounds are recorded here and stay fixed for the session.
pub fn resolve_target(
    selector: &TargetSelector,
    region: Option<Region>,
) -> Result<CaptureTarget, PipelineError> {
    let windows = list_windows();

    let window = match selector {
        TargetSelector::WindowId(id) => windows.iter().find(|w| w.id == *id),
        TargetSelector::AppName(name) => {
            let needle = name.to_lowercase();
            windows
                .iter()
                .find(|w| w.app_name.to_lowercase().contains(&needle))
        }
    };

    let window = window.ok_or_else(|| match selector {
        TargetSelector::WindowId(id) => {
            PipelineError::TargetNotFound(format!("no visible window with id {}", id))
        }
        TargetSelector::AppName(name) => {
            PipelineError::TargetNotFound(format!("no visible window for app '{}'", name))
        }
    })?;

    debug!("Resolved target: {} (window {})", window.label(), window.id);

    Ok(CaptureTarget {
        window_id: window.id,
        pid: window.pid,
        app_name: window.app_name.clone(),
        bounds: window.bounds,
        region,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label() {
        let window = VisibleWindow {
            id: 1,
            pid: 100,
            app_name: "Safari".to_string(),
            title: "Kindle Cloud Reader".to_string(),
            bounds: Region::new(0, 0, 800, 600),
        };
        assert_eq!(window.label(), "Safari - Kindle Cloud Reader");

        let untitled = VisibleWindow {
            title: String::new(),
            ..window
        };
        assert_eq!(untitled.label(), "Safari");
    }
}
