//! Turns fetched payloads into uniform-ready texture artifacts.
//!
//! Three shapes come out of here:
//!
//! - `ImageTexture`: one decoded image plus its aspect-correction pair.
//! - `ArrayTexture`: equally sized RGBA frames packed layer after layer into a
//!   single buffer and sampled as a 2D array.
//! - `CameraTexture`: a live `VideoSource` re-uploaded every frame.
//!
//! Still images and array frames are flipped vertically so row zero is the
//! bottom of the picture, tagged sRGB, linear-filtered, and flagged for
//! upload. The renderer clears the flag after its first upload.
//!
//! `TextureAssembler` owns the fetcher and the target frame size and runs
//! the `image` and `array` strategies against a resolver context.
use futures::future::join_all;
use image::imageops::{self, flip_vertical_in_place, FilterType};
use image::{DynamicImage, GenericImageView, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::camera::VideoSource;
use crate::descriptor::{correction_uniform, depth_uniform};
use crate::error::{DecodeError, LoadError};
use crate::fetch::Fetcher;
use crate::resolver::ResolverContext;
use crate::uniforms::Uniform;

pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Bytes in one RGBA frame of this size.
    pub fn stride(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self::new(512, 512)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// Display-referred data; sampled through an sRGB view.
    Srgb,
    /// Raw values, no transfer function applied on sampling.
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureDimension {
    D2,
    D2Array,
}

#[derive(Debug, Clone)]
pub struct ImageTexture {
    pub pixels: RgbaImage,
    /// Decoded size before any GPU-side processing.
    pub natural_size: (u32, u32),
    pub correction: [f32; 2],
    pub color_space: ColorSpace,
    pub needs_upload: bool,
}

impl ImageTexture {
    pub fn from_image(image: DynamicImage) -> Self {
        let (width, height) = image.dimensions();
        let mut pixels = image.to_rgba8();
        flip_vertical_in_place(&mut pixels);
        Self {
            pixels,
            natural_size: (width, height),
            correction: aspect_correction(width, height),
            color_space: ColorSpace::Srgb,
            needs_upload: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArrayTexture {
    pub data: Vec<u8>,
    pub dimensions: Dimensions,
    pub depth: u32,
    pub color_space: ColorSpace,
    pub needs_upload: bool,
}

impl ArrayTexture {
    pub fn layer(&self, index: u32) -> Option<&[u8]> {
        if index >= self.depth {
            return None;
        }
        let stride = self.dimensions.stride();
        let start = index as usize * stride;
        self.data.get(start..start + stride)
    }
}

pub struct CameraTexture {
    source: Box<dyn VideoSource>,
    pub color_space: ColorSpace,
}

impl std::fmt::Debug for CameraTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraTexture")
            .field("dimensions", &self.source.dimensions())
            .finish()
    }
}

impl CameraTexture {
    pub fn new(source: Box<dyn VideoSource>) -> Self {
        Self {
            source,
            color_space: ColorSpace::Linear,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.source.dimensions()
    }

    pub fn next_frame(&mut self) -> Option<RgbaImage> {
        self.source.latest_frame()
    }
}

#[derive(Debug)]
pub enum TextureSource {
    Image(ImageTexture),
    Array(ArrayTexture),
    Camera(CameraTexture),
}

impl TextureSource {
    pub fn dimension(&self) -> TextureDimension {
        match self {
            Self::Array(_) => TextureDimension::D2Array,
            Self::Image(_) | Self::Camera(_) => TextureDimension::D2,
        }
    }

    /// Camera textures stream, so they always need an upload.
    pub fn needs_upload(&self) -> bool {
        match self {
            Self::Image(texture) => texture.needs_upload,
            Self::Array(texture) => texture.needs_upload,
            Self::Camera(_) => true,
        }
    }

    pub fn mark_uploaded(&mut self) {
        match self {
            Self::Image(texture) => texture.needs_upload = false,
            Self::Array(texture) => texture.needs_upload = false,
            Self::Camera(_) => {}
        }
    }

    pub fn color_space(&self) -> ColorSpace {
        match self {
            Self::Image(texture) => texture.color_space,
            Self::Array(texture) => texture.color_space,
            Self::Camera(texture) => texture.color_space,
        }
    }
}

/// Per-axis factors that undo the stretch of a non-square image: the shorter
/// axis gets 1.0, the longer one the aspect ratio.
pub fn aspect_correction(width: u32, height: u32) -> [f32; 2] {
    if width == 0 || height == 0 {
        return [1.0, 1.0];
    }
    let (w, h) = (width as f32, height as f32);
    if width > height {
        [1.0, w / h]
    } else {
        [h / w, 1.0]
    }
}

pub fn decode_image(uri: &Url, bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
    image::load_from_memory(bytes).map_err(|err| DecodeError::new(uri, err))
}

/// Scales every frame to `dimensions` and packs them contiguously, frame `i`
/// occupying `i * stride .. (i + 1) * stride`.
pub fn pack_frames(frames: &[DynamicImage], dimensions: Dimensions) -> Vec<u8> {
    let stride = dimensions.stride();
    let mut data = Vec::with_capacity(frames.len() * stride);
    for frame in frames {
        let rgba = frame.to_rgba8();
        let mut scaled = if rgba.dimensions() == (dimensions.width, dimensions.height) {
            rgba
        } else {
            imageops::resize(
                &rgba,
                dimensions.width,
                dimensions.height,
                FilterType::Triangle,
            )
        };
        flip_vertical_in_place(&mut scaled);
        data.extend_from_slice(scaled.as_raw());
    }
    data
}

pub fn image_uniforms(name: &str, texture: ImageTexture) -> Vec<(String, Uniform)> {
    let correction = texture.correction;
    vec![
        (
            name.to_string(),
            Uniform::Texture(Some(TextureSource::Image(texture))),
        ),
        (correction_uniform(name), Uniform::Vec2(correction)),
    ]
}

pub fn array_uniforms(name: &str, texture: ArrayTexture) -> Vec<(String, Uniform)> {
    let depth = i32::try_from(texture.depth).unwrap_or(i32::MAX);
    vec![
        (
            name.to_string(),
            Uniform::Texture(Some(TextureSource::Array(texture))),
        ),
        (depth_uniform(name), Uniform::Int(depth)),
    ]
}

#[derive(Debug, Clone)]
pub struct TextureAssembler {
    fetcher: Fetcher,
    dimensions: Dimensions,
}

impl TextureAssembler {
    pub fn new(fetcher: Fetcher, dimensions: Dimensions) -> Self {
        Self {
            fetcher,
            dimensions,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub async fn load_image(&self, uri: &Url) -> Result<ImageTexture, LoadError> {
        let bytes = self.fetcher.blob(uri).await?;
        let image = decode_image(uri, &bytes)?;
        let texture = ImageTexture::from_image(image);
        debug!(
            %uri,
            width = texture.natural_size.0,
            height = texture.natural_size.1,
            correction = ?texture.correction,
            "decoded image texture"
        );
        Ok(texture)
    }

    /// Fetches the index at `uri`, then every frame it lists relative to the
    /// index file's own location.
    pub async fn load_array(&self, uri: &Url) -> Result<ArrayTexture, LoadError> {
        let references: Vec<String> = self.fetcher.json(uri).await?;
        if references.is_empty() {
            return Err(DecodeError::new(uri, "image index lists no frames").into());
        }
        let context = ResolverContext::new(uri.clone()).descend(".")?;
        let frame_urls = references
            .iter()
            .map(|reference| context.resolve(reference))
            .collect::<Result<Vec<_>, _>>()?;
        self.load_frames(&frame_urls).await
    }

    /// All frames are fetched concurrently; any failure fails the whole array.
    pub async fn load_frames(&self, urls: &[Url]) -> Result<ArrayTexture, LoadError> {
        let fetches = urls.iter().map(|url| async move {
            let bytes = self.fetcher.blob(url).await?;
            Ok::<_, LoadError>(decode_image(url, &bytes)?)
        });
        let frames = join_all(fetches)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        for (url, frame) in urls.iter().zip(&frames) {
            let (width, height) = frame.dimensions();
            if (width, height) != (self.dimensions.width, self.dimensions.height) {
                debug!(
                    %url,
                    width,
                    height,
                    target_width = self.dimensions.width,
                    target_height = self.dimensions.height,
                    "array frame rescaled to target size"
                );
            }
        }

        let data = pack_frames(&frames, self.dimensions);
        let depth = u32::try_from(frames.len()).unwrap_or(u32::MAX);
        debug!(depth, bytes = data.len(), "packed array texture");
        Ok(ArrayTexture {
            data,
            dimensions: self.dimensions,
            depth,
            color_space: ColorSpace::Srgb,
            needs_upload: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::testing::{png_bytes, MemoryTransport};

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn aspect_correction_identity_holds() {
        for (w, h) in [(200u32, 100u32), (100, 300), (64, 64), (1920, 1080), (3, 7)] {
            let [w_corr, h_corr] = aspect_correction(w, h);
            assert!((w_corr * w as f32 - h_corr * h as f32).abs() < 1e-3);
            let ones = [w_corr, h_corr].iter().filter(|v| **v == 1.0).count();
            assert!(ones >= 1);
            if w != h {
                assert_eq!(ones, 1);
            }
        }
    }

    #[test]
    fn aspect_correction_of_empty_image_is_neutral() {
        assert_eq!(aspect_correction(0, 10), [1.0, 1.0]);
    }

    #[test]
    fn pack_frames_resizes_and_lays_out_layers() {
        let red = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 4, Rgba([255, 0, 0, 255])));
        let blue = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255])));
        let dims = Dimensions::new(4, 4);

        let data = pack_frames(&[red, blue], dims);
        assert_eq!(data.len(), 2 * 4 * 4 * 4);
        assert_eq!(&data[..4], &[255, 0, 0, 255]);
        assert_eq!(&data[dims.stride()..dims.stride() + 4], &[0, 0, 255, 255]);
    }

    #[test]
    fn image_texture_is_flipped_and_tagged() {
        let mut pixels = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        pixels.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        let texture = ImageTexture::from_image(DynamicImage::ImageRgba8(pixels));

        assert_eq!(texture.pixels.get_pixel(0, 1), &Rgba([255, 255, 255, 255]));
        assert_eq!(texture.color_space, ColorSpace::Srgb);
        assert!(texture.needs_upload);
    }

    #[tokio::test]
    async fn loads_image_with_correction_uniform() {
        let transport =
            MemoryTransport::new().with("https://host/a.png", png_bytes(200, 100, [9, 9, 9, 255]));
        let assembler = TextureAssembler::new(Fetcher::new(transport), Dimensions::new(4, 4));

        let texture = assembler.load_image(&url("https://host/a.png")).await.unwrap();
        assert_eq!(texture.natural_size, (200, 100));

        let uniforms = image_uniforms("u_tex", texture);
        assert_eq!(uniforms[0].0, "u_tex");
        assert!(matches!(
            uniforms[0].1,
            Uniform::Texture(Some(TextureSource::Image(_)))
        ));
        assert_eq!(uniforms[1].0, "u_tex_corr");
        assert_eq!(uniforms[1].1.as_vec2(), Some([1.0, 2.0]));
    }

    #[tokio::test]
    async fn undecodable_image_is_a_decode_error() {
        let transport = MemoryTransport::new().with("https://host/a.png", "not an image");
        let assembler = TextureAssembler::new(Fetcher::new(transport), Dimensions::new(4, 4));
        let err = assembler.load_image(&url("https://host/a.png")).await.unwrap_err();
        assert!(matches!(err, LoadError::Decode(_)));
    }

    #[tokio::test]
    async fn array_frames_resolve_relative_to_index_file() {
        let transport = MemoryTransport::new()
            .with("https://host/assets/idx.json", r#"["f0.png", "f1.png"]"#)
            .with("https://host/assets/f0.png", png_bytes(4, 4, [1, 1, 1, 255]))
            .with("https://host/assets/f1.png", png_bytes(6, 2, [2, 2, 2, 255]));
        let requests = transport.requests();
        let dims = Dimensions::new(4, 4);
        let assembler = TextureAssembler::new(Fetcher::new(transport), dims);

        let texture = assembler
            .load_array(&url("https://host/assets/idx.json"))
            .await
            .unwrap();
        assert_eq!(texture.depth, 2);
        assert_eq!(texture.data.len(), 2 * dims.stride());
        assert_eq!(texture.layer(1).map(|layer| layer[0]), Some(2));
        assert!(texture.layer(2).is_none());

        let requests = requests.lock().unwrap();
        assert!(requests.contains(&"https://host/assets/f0.png".to_string()));
        assert!(requests.contains(&"https://host/assets/f1.png".to_string()));

        let uniforms = array_uniforms("u_frames", texture);
        assert_eq!(uniforms[1].0, "u_frames_depth");
        assert_eq!(uniforms[1].1.as_int(), Some(2));
    }

    #[tokio::test]
    async fn one_missing_frame_fails_the_whole_array() {
        let transport = MemoryTransport::new()
            .with("https://host/idx.json", r#"["f0.png", "gone.png"]"#)
            .with("https://host/f0.png", png_bytes(4, 4, [1, 1, 1, 255]));
        let assembler = TextureAssembler::new(Fetcher::new(transport), Dimensions::new(4, 4));

        let err = assembler
            .load_array(&url("https://host/idx.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Fetch(ref fetch) if fetch.status() == Some(404)));
    }

    #[tokio::test]
    async fn empty_index_is_rejected() {
        let transport = MemoryTransport::new().with("https://host/idx.json", "[]");
        let assembler = TextureAssembler::new(Fetcher::new(transport), Dimensions::new(4, 4));
        let err = assembler
            .load_array(&url("https://host/idx.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Decode(_)));
    }
}
