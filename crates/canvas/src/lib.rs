mod camera;
mod degrade;
mod descriptor;
mod error;
mod fetch;
mod includes;
mod listing;
mod pipeline;
mod resolver;
mod textures;
mod uniforms;

#[cfg(test)]
mod testing;

pub use camera::{acquire_camera, CaptureDevice, CaptureRequest, NoCaptureDevice, VideoSource};
pub use degrade::Degrade;
pub use descriptor::{correction_uniform, depth_uniform, ShaderDescriptor, TextureEntry};
pub use error::{DecodeError, DeviceError, FetchError, LoadError, ResolutionError, TransportError};
pub use fetch::{
    FileTransport, Fetcher, HttpTransport, Payload, PayloadKind, SchemeTransport, Transport,
    TransportResponse,
};
pub use includes::{IncludeResolver, LygiaIncludes, NoIncludes, DEFAULT_INCLUDE_SERVICE};
pub use listing::{is_image_name, list_images, IMAGE_EXTENSIONS, INDEX_FILE_NAME};
pub use pipeline::{DescriptorPipeline, PipelineError, PipelineStage, PreparedShader};
pub use resolver::ResolverContext;
pub use textures::{
    aspect_correction, pack_frames, ArrayTexture, CameraTexture, ColorSpace, Dimensions,
    ImageTexture, TextureAssembler, TextureDimension, TextureSource,
};
pub use uniforms::{
    Uniform, UniformKind, UniformLayer, UniformSet, CAMERA_UNIFORM, DELTA_UNIFORM,
    RESOLUTION_UNIFORM, TIME_UNIFORM,
};

pub use url::Url;

/// Where a descriptor is read from: a full URL or a local filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorLocation {
    Url(Url),
    Path(std::path::PathBuf),
}

impl DescriptorLocation {
    pub fn from_input(input: &str) -> Self {
        match Url::parse(input) {
            Ok(url) if url.scheme().len() > 1 => Self::Url(url),
            _ => Self::Path(std::path::PathBuf::from(input)),
        }
    }

    /// Reference to hand to `DescriptorPipeline::run`, relative to `root`
    /// for paths.
    pub fn reference(&self, root: &ResolverContext) -> Result<String, ResolutionError> {
        match self {
            Self::Url(url) => Ok(url.to_string()),
            Self::Path(path) if path.is_absolute() => Url::from_file_path(path)
                .map(|url| url.to_string())
                .map_err(|_| ResolutionError {
                    reference: path.display().to_string(),
                    base: root.base().to_string(),
                    source: url::ParseError::RelativeUrlWithoutBase,
                }),
            Self::Path(path) => Ok(path.to_string_lossy().replace('\\', "/")),
        }
    }
}
