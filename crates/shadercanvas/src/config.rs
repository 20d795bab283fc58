//! TOML configuration merged with command-line overrides.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use canvas::{Dimensions, Uniform, UniformLayer, DEFAULT_INCLUDE_SERVICE};
use renderer::{RenderPolicy, RendererConfig};
use serde::Deserialize;

use crate::cli::RunArgs;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub canvas: CanvasSection,
    pub dimensions: DimensionsSection,
    pub webcam: WebcamSection,
    pub includes: IncludesSection,
    pub uniforms: BTreeMap<String, UniformValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CanvasSection {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for CanvasSection {
    fn default() -> Self {
        let defaults = RendererConfig::default();
        Self {
            width: defaults.surface_size.0,
            height: defaults.surface_size.1,
            title: defaults.title,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DimensionsSection {
    pub width: u32,
    pub height: u32,
}

impl Default for DimensionsSection {
    fn default() -> Self {
        let defaults = Dimensions::default();
        Self {
            width: defaults.width,
            height: defaults.height,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebcamSection {
    pub constraints: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IncludesSection {
    pub enabled: bool,
    pub service: String,
}

impl Default for IncludesSection {
    fn default() -> Self {
        Self {
            enabled: true,
            service: DEFAULT_INCLUDE_SERVICE.to_string(),
        }
    }
}

/// A control uniform as written in TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum UniformValue {
    Int(i64),
    Float(f64),
    Vector(Vec<f64>),
}

impl UniformValue {
    fn to_uniform(&self, name: &str) -> Result<Uniform> {
        Ok(match self {
            Self::Int(value) => Uniform::Int(
                i32::try_from(*value)
                    .with_context(|| format!("uniform `{name}` does not fit in an int"))?,
            ),
            Self::Float(value) => Uniform::Float(*value as f32),
            Self::Vector(values) => match values.as_slice() {
                [x, y] => Uniform::Vec2([*x as f32, *y as f32]),
                [x, y, z] => Uniform::Vec3([*x as f32, *y as f32, *z as f32]),
                [x, y, z, w] => Uniform::Vec4([*x as f32, *y as f32, *z as f32, *w as f32]),
                other => bail!(
                    "uniform `{name}` has {} components; expected 2, 3 or 4",
                    other.len()
                ),
            },
        })
    }
}

impl FileConfig {
    pub fn parse(input: &str) -> Result<Self> {
        toml::from_str(input).context("invalid configuration file")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("while loading {}", path.display()))
    }

    /// Reads `path` when it exists; a missing default file is not an error.
    pub fn load_optional(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no configuration file; using defaults");
            Ok(Self::default())
        }
    }
}

/// Everything a run needs, after CLI overrides are applied.
#[derive(Debug)]
pub struct Settings {
    pub renderer: RendererConfig,
    pub dimensions: Dimensions,
    pub capture_constraints: BTreeMap<String, serde_json::Value>,
    pub include_service: Option<String>,
    pub control: UniformLayer,
}

impl Settings {
    pub fn resolve(file: FileConfig, args: &RunArgs) -> Result<Self> {
        let (width, height) = args
            .size
            .unwrap_or((file.canvas.width, file.canvas.height));
        if width == 0 || height == 0 {
            bail!("canvas size must be greater than zero");
        }
        let (dim_width, dim_height) = args
            .dimensions
            .unwrap_or((file.dimensions.width, file.dimensions.height));
        if dim_width == 0 || dim_height == 0 {
            bail!("texture dimensions must be greater than zero");
        }

        let policy = match (args.time, args.fps) {
            (Some(time), _) => RenderPolicy::Still { time },
            (None, Some(fps)) if fps > 0.0 => RenderPolicy::Animate {
                target_fps: Some(fps),
            },
            (None, _) => RenderPolicy::Animate { target_fps: None },
        };

        let include_service = if args.no_includes || !file.includes.enabled {
            None
        } else {
            Some(
                args.include_service
                    .clone()
                    .unwrap_or(file.includes.service),
            )
        };

        let mut control = UniformLayer::new("control");
        for (name, value) in &file.uniforms {
            control.insert(name.clone(), value.to_uniform(name)?);
        }

        Ok(Self {
            renderer: RendererConfig {
                title: file.canvas.title,
                surface_size: (width, height),
                policy,
            },
            dimensions: Dimensions::new(dim_width, dim_height),
            capture_constraints: file.webcam.constraints,
            include_service,
            control,
        })
    }
}
