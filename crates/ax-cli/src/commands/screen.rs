//! Screenshot command

use super::{Context, parse_address, to_json};
use crate::capture::deliver;
use crate::errors::AxError;
use crate::lock::Launcher;
use crate::store::CapabilityStore;
use serde_json::Value;
use std::path::PathBuf;

pub fn screenshot<S: CapabilityStore, L: Launcher>(
    ctx: &Context<'_, S, L>,
    address: &str,
    output: Option<PathBuf>,
    base64: bool,
) -> Result<Value, AxError> {
    let rect = ctx.resolver().resolve_rect(&parse_address(address)?)?;
    let pid = rect.id.map(|id| id.pid);

    let image = ctx.capture.capture(rect.rect(), pid)?;
    let captured = deliver(&image, output.as_deref(), base64)?;

    let mut result = to_json(&captured)?;
    result["rect"] = to_json(&rect)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::super::Command;
    use super::super::harness::Harness;
    use crate::capture::SnapshotCapture;
    use crate::errors::AxError;
    use image::{Rgba, RgbaImage};

    fn harness_with_screen() -> (Harness, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen.png");
        let mut screen = RgbaImage::new(1440, 900);
        screen.put_pixel(125, 125, Rgba([0, 255, 0, 255]));
        screen.save(&path).unwrap();

        let mut h = Harness::new();
        h.capture = SnapshotCapture::new(Some(path));
        (h, dir)
    }

    #[tokio::test]
    async fn test_screenshot_of_element_frame() {
        let (mut h, dir) = harness_with_screen();
        let id = h.id_of("Back");
        let out = dir.path().join("back.png");

        let result = h
            .run(Command::Screenshot {
                address: id.clone(),
                output: Some(out.clone()),
                base64: false,
            })
            .await
            .unwrap();

        assert_eq!(result["width"], 30);
        assert_eq!(result["rect"]["id"], id);
        let saved = image::open(&out).unwrap().to_rgba8();
        // 事後条件: 切り出し原点は要素フレームの左上
        assert_eq!(saved.get_pixel(15, 15), &Rgba([0, 255, 0, 255]));
    }

    #[tokio::test]
    async fn test_screenshot_of_absolute_rect_inline() {
        let (mut h, _dir) = harness_with_screen();
        let result = h
            .run(Command::Screenshot {
                address: "@0,0+64x48".into(),
                output: None,
                base64: true,
            })
            .await
            .unwrap();
        assert_eq!(result["height"], 48);
        assert!(result["base64"].as_str().is_some());
        assert!(result.get("file_path").is_none());
    }

    #[tokio::test]
    async fn test_screenshot_without_capture_backend() {
        let mut h = Harness::new();
        let err = h
            .run(Command::Screenshot {
                address: "@0,0+10x10".into(),
                output: None,
                base64: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AxError::PermissionDenied(_)));
    }
}
