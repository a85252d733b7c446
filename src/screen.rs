use base64::{Engine as _, engine::general_purpose};
use screenshots::Screen;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::hands::Hands;
use crate::types::DisplaySize;

pub const PNG_MEDIA_TYPE: &str = "image/png";

/// A captured screen, base64-encoded for the request body.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedScreenshot {
    pub media_type: String,
    pub data: String,
}

impl EncodedScreenshot {
    pub fn from_png_bytes(bytes: &[u8]) -> Self {
        Self {
            media_type: PNG_MEDIA_TYPE.to_string(),
            data: general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, CaptureError> {
        let bytes = fs::read(path)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Encoding screenshot");
        Ok(Self::from_png_bytes(&bytes))
    }
}

/// Captures the primary screen into `path` as PNG.
pub fn take_screenshot(path: &Path) -> Result<PathBuf, CaptureError> {
    let screens = Screen::all().map_err(|e| CaptureError::Capture(e.to_string()))?;
    let screen = screens
        .iter()
        .find(|s| s.display_info.is_primary)
        .or_else(|| screens.first())
        .ok_or(CaptureError::NoDisplay)?;

    let image = screen
        .capture()
        .map_err(|e| CaptureError::Capture(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    image.save(path).map_err(|e| CaptureError::Save {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    info!(path = %path.display(), width = image.width(), height = image.height(), "Screenshot captured");
    Ok(path.to_path_buf())
}

/// Captures and encodes in one go.
pub fn capture_encoded(path: &Path) -> Result<EncodedScreenshot, CaptureError> {
    let saved = take_screenshot(path)?;
    EncodedScreenshot::from_file(&saved)
}

/// Asks the input capability for the primary display size, falling back to 1024x768.
pub fn detect_display_size<H, F>(acquire: F) -> DisplaySize
where
    H: Hands,
    F: FnOnce() -> Result<H, crate::error::InjectionError>,
{
    match acquire().and_then(|hands| hands.screen_size()) {
        Ok(size) => size,
        Err(e) => {
            let fallback = DisplaySize::default();
            warn!(error = %e, %fallback, "Could not detect display size, using fallback");
            fallback
        }
    }
}
