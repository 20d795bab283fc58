//! Live camera capture seam.
//!
//! No capture backend ships with the crate; hosts plug one in through
//! `CaptureDevice`. `NoCaptureDevice` always reports `DeviceError::Unavailable`
//! so a descriptor asking for the webcam degrades to a null `u_cam`.
use std::collections::BTreeMap;

use async_trait::async_trait;
use image::RgbaImage;

use crate::error::DeviceError;
use crate::textures::{CameraTexture, Dimensions};

/// Requested capture size plus caller-supplied constraints layered over it.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub width: u32,
    pub height: u32,
    pub constraints: BTreeMap<String, serde_json::Value>,
}

impl CaptureRequest {
    pub fn new(dimensions: Dimensions) -> Self {
        Self {
            width: dimensions.width,
            height: dimensions.height,
            constraints: BTreeMap::new(),
        }
    }

    pub fn with_constraints(mut self, constraints: BTreeMap<String, serde_json::Value>) -> Self {
        self.constraints = constraints;
        self
    }

    /// Flattened constraint set: `width`/`height` first, constraints override.
    pub fn merged_constraints(&self) -> BTreeMap<String, serde_json::Value> {
        let mut merged = BTreeMap::new();
        merged.insert("width".to_string(), serde_json::Value::from(self.width));
        merged.insert("height".to_string(), serde_json::Value::from(self.height));
        merged.extend(self.constraints.clone());
        merged
    }
}

/// A running capture stream.
pub trait VideoSource: Send {
    /// Settled stream size, which may differ from the requested one.
    fn dimensions(&self) -> (u32, u32);

    /// Most recent frame, if a new one arrived since the last call.
    fn latest_frame(&mut self) -> Option<RgbaImage>;
}

#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn open(&self, request: &CaptureRequest) -> Result<Box<dyn VideoSource>, DeviceError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoCaptureDevice;

#[async_trait]
impl CaptureDevice for NoCaptureDevice {
    async fn open(&self, _request: &CaptureRequest) -> Result<Box<dyn VideoSource>, DeviceError> {
        Err(DeviceError::Unavailable)
    }
}

/// Opens the device and wraps the stream as a streaming texture.
pub async fn acquire_camera(
    device: &dyn CaptureDevice,
    request: &CaptureRequest,
) -> Result<CameraTexture, DeviceError> {
    let source = device.open(request).await?;
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Err(DeviceError::Capture(format!(
            "capture stream reported an empty frame size {width}x{height}"
        )));
    }
    tracing::info!(width, height, "camera stream bound");
    Ok(CameraTexture::new(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    struct SolidSource {
        size: (u32, u32),
    }

    impl VideoSource for SolidSource {
        fn dimensions(&self) -> (u32, u32) {
            self.size
        }

        fn latest_frame(&mut self) -> Option<RgbaImage> {
            Some(RgbaImage::from_pixel(self.size.0, self.size.1, Rgba([1, 2, 3, 255])))
        }
    }

    struct FakeDevice {
        size: (u32, u32),
    }

    #[async_trait]
    impl CaptureDevice for FakeDevice {
        async fn open(
            &self,
            _request: &CaptureRequest,
        ) -> Result<Box<dyn VideoSource>, DeviceError> {
            Ok(Box::new(SolidSource { size: self.size }))
        }
    }

    #[test]
    fn constraints_override_requested_dimensions() {
        let mut constraints = BTreeMap::new();
        constraints.insert("height".to_string(), serde_json::json!(480));
        constraints.insert("facingMode".to_string(), serde_json::json!("user"));
        let request = CaptureRequest::new(Dimensions::new(640, 360)).with_constraints(constraints);

        let merged = request.merged_constraints();
        assert_eq!(merged["width"], serde_json::json!(640));
        assert_eq!(merged["height"], serde_json::json!(480));
        assert_eq!(merged["facingMode"], serde_json::json!("user"));
    }

    #[tokio::test]
    async fn missing_device_is_unavailable() {
        let request = CaptureRequest::new(Dimensions::new(640, 480));
        let err = acquire_camera(&NoCaptureDevice, &request).await.unwrap_err();
        assert!(matches!(err, DeviceError::Unavailable));
    }

    #[tokio::test]
    async fn acquired_camera_reports_stream_size() {
        let request = CaptureRequest::new(Dimensions::new(640, 480));
        let mut camera = acquire_camera(&FakeDevice { size: (320, 240) }, &request)
            .await
            .unwrap();
        assert_eq!(camera.dimensions(), (320, 240));
        assert!(camera.next_frame().is_some());
    }

    #[tokio::test]
    async fn empty_stream_size_is_a_capture_error() {
        let request = CaptureRequest::new(Dimensions::new(640, 480));
        let err = acquire_camera(&FakeDevice { size: (0, 0) }, &request)
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Capture(_)));
    }
}
