//! Screen capture

use crate::errors::AxError;
use ax_protocol::Rect;
use base64::Engine;
use image::{DynamicImage, RgbaImage};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Produces pixels for a screen region
pub trait ScreenCapture {
    /// `pid` narrows capture to one application's windows where supported
    fn capture(&self, rect: Rect, pid: Option<i32>) -> Result<RgbaImage, AxError>;
}

/// Crops regions out of a recorded full-screen image
pub struct SnapshotCapture {
    screen: Option<PathBuf>,
}

impl SnapshotCapture {
    pub fn new(screen: Option<PathBuf>) -> Self {
        Self { screen }
    }
}

impl ScreenCapture for SnapshotCapture {
    fn capture(&self, rect: Rect, _pid: Option<i32>) -> Result<RgbaImage, AxError> {
        let path = self
            .screen
            .as_deref()
            .ok_or_else(|| AxError::PermissionDenied("no screen image available for capture".into()))?;
        let screen = image::open(path)
            .map_err(|e| AxError::action_failed(format!("failed to load {}: {}", path.display(), e)))?;
        crop(&screen, rect)
    }
}

/// Crop to `rect`, clamped to the image bounds
pub fn crop(screen: &DynamicImage, rect: Rect) -> Result<RgbaImage, AxError> {
    let (width, height) = (screen.width() as f64, screen.height() as f64);
    let x0 = rect.x.floor().clamp(0.0, width);
    let y0 = rect.y.floor().clamp(0.0, height);
    let x1 = (rect.x + rect.width).ceil().clamp(0.0, width);
    let y1 = (rect.y + rect.height).ceil().clamp(0.0, height);

    if x1 <= x0 || y1 <= y0 {
        return Err(AxError::action_failed(format!(
            "region {}x{} at ({}, {}) lies outside the screen",
            rect.width, rect.height, rect.x, rect.y
        )));
    }

    Ok(screen
        .crop_imm(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
        .to_rgba8())
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, AxError> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, image::ImageFormat::Png)
        .map_err(|e| AxError::action_failed(format!("failed to encode image: {}", e)))?;
    Ok(buffer.into_inner())
}

/// Where a capture ended up
#[derive(Debug, Clone, Serialize)]
pub struct CaptureResult {
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    pub size_bytes: usize,
}

fn default_output_path() -> PathBuf {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("ax-screenshot-{}.png", timestamp))
}

/// Write the image as PNG to `output` (or a temp file), or return it inline
pub fn deliver(image: &RgbaImage, output: Option<&Path>, inline: bool) -> Result<CaptureResult, AxError> {
    let png = encode_png(image)?;
    let mut result = CaptureResult {
        width: image.width(),
        height: image.height(),
        file_path: None,
        base64: None,
        size_bytes: png.len(),
    };

    if inline {
        result.base64 = Some(base64::engine::general_purpose::STANDARD.encode(&png));
        return Ok(result);
    }

    let path = output.map(Path::to_path_buf).unwrap_or_else(default_output_path);
    std::fs::write(&path, &png)
        .map_err(|e| AxError::action_failed(format!("failed to write {}: {}", path.display(), e)))?;
    result.file_path = Some(path);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen() -> DynamicImage {
        let mut img = RgbaImage::new(100, 50);
        img.put_pixel(95, 45, image::Rgba([255, 0, 0, 255]));
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_crop_is_clamped_to_screen() {
        let cropped = crop(&screen(), Rect::new(90.0, 40.0, 20.0, 20.0)).unwrap();
        assert_eq!(cropped.dimensions(), (10, 10));
        assert_eq!(cropped.get_pixel(5, 5), &image::Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_crop_outside_screen_fails() {
        let err = crop(&screen(), Rect::new(200.0, 200.0, 10.0, 10.0)).unwrap_err();
        assert!(matches!(err, AxError::ActionFailed(_)));
    }

    #[test]
    fn test_capture_without_screen_is_permission_denied() {
        let capture = SnapshotCapture::new(None);
        let err = capture.capture(Rect::new(0.0, 0.0, 1.0, 1.0), None).unwrap_err();
        assert!(matches!(err, AxError::PermissionDenied(_)));
    }

    #[test]
    fn test_capture_from_file_and_deliver() {
        let dir = tempfile::tempdir().unwrap();
        let screen_path = dir.path().join("screen.png");
        screen().save(&screen_path).unwrap();

        let capture = SnapshotCapture::new(Some(screen_path));
        let image = capture.capture(Rect::new(0.0, 0.0, 40.0, 30.0), Some(1)).unwrap();

        let out = dir.path().join("out.png");
        let result = deliver(&image, Some(&out), false).unwrap();
        assert_eq!((result.width, result.height), (40, 30));
        assert_eq!(result.file_path.as_deref(), Some(out.as_path()));
        assert_eq!(image::open(&out).unwrap().width(), 40);

        let inline = deliver(&image, None, true).unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(inline.base64.unwrap())
            .unwrap();
        assert_eq!(image::load_from_memory(&bytes).unwrap().height(), 30);
    }
}
