//! In-memory fixtures shared by the unit tests.
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use url::Url;

use crate::error::TransportError;
use crate::fetch::{Transport, TransportResponse};

/// Serves registered bodies; anything else answers 404.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    responses: HashMap<String, TransportResponse>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.responses
            .insert(url.to_string(), TransportResponse::ok(body));
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.responses
            .insert(url.to_string(), TransportResponse::status(status));
        self
    }

    pub fn requests(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.requests)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(url.to_string());
        Ok(self
            .responses
            .get(url.as_str())
            .cloned()
            .unwrap_or_else(|| TransportResponse::status(404)))
    }
}

pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}
