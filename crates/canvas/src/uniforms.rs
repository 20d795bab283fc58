//! Uniform values and the layered merge that produces the live uniform set.
//!
//! Layers merge in the order they are supplied with last-write-wins on key
//! collisions. The pipeline always supplies built-ins, camera, control
//! uniforms, then resolved textures.
use std::collections::BTreeMap;

use tracing::trace;

use crate::textures::TextureSource;

pub const TIME_UNIFORM: &str = "u_time";
pub const DELTA_UNIFORM: &str = "u_delta";
pub const RESOLUTION_UNIFORM: &str = "u_resolution";
pub const CAMERA_UNIFORM: &str = "u_cam";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Texture,
}

impl UniformKind {
    /// GLSL type name used when declaring the uniform.
    pub fn glsl_type(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::Texture => "sampler2D",
        }
    }
}

/// A tagged uniform value. `Texture(None)` is the null texture slot.
#[derive(Debug)]
pub enum Uniform {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Texture(Option<TextureSource>),
}

impl Uniform {
    pub fn null_texture() -> Self {
        Self::Texture(None)
    }

    pub fn kind(&self) -> UniformKind {
        match self {
            Self::Float(_) => UniformKind::Float,
            Self::Int(_) => UniformKind::Int,
            Self::Vec2(_) => UniformKind::Vec2,
            Self::Vec3(_) => UniformKind::Vec3,
            Self::Vec4(_) => UniformKind::Vec4,
            Self::Texture(_) => UniformKind::Texture,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Texture(None))
    }

    pub fn texture(&self) -> Option<&TextureSource> {
        match self {
            Self::Texture(texture) => texture.as_ref(),
            _ => None,
        }
    }

    pub fn texture_mut(&mut self) -> Option<&mut TextureSource> {
        match self {
            Self::Texture(texture) => texture.as_mut(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_vec2(&self) -> Option<[f32; 2]> {
        match self {
            Self::Vec2(value) => Some(*value),
            _ => None,
        }
    }
}

/// One named source of uniforms taking part in the merge.
#[derive(Debug, Default)]
pub struct UniformLayer {
    name: String,
    values: BTreeMap<String, Uniform>,
}

impl UniformLayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    /// `u_time`, `u_delta` and `u_resolution` with their initial values.
    pub fn builtins() -> Self {
        Self::new("builtins")
            .with(TIME_UNIFORM, Uniform::Float(1.0))
            .with(DELTA_UNIFORM, Uniform::Float(1.0))
            .with(RESOLUTION_UNIFORM, Uniform::Vec2([0.0, 0.0]))
    }

    pub fn with(mut self, key: impl Into<String>, value: Uniform) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Uniform) {
        self.values.insert(key.into(), value);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = (String, Uniform)>) {
        self.values.extend(entries);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Uniform> {
        self.values.get(key)
    }
}

/// The live uniform set handed to the render loop.
#[derive(Debug, Default)]
pub struct UniformSet {
    values: BTreeMap<String, Uniform>,
}

impl UniformSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic last-write-wins merge in the order given.
    pub fn merge(layers: impl IntoIterator<Item = UniformLayer>) -> Self {
        let mut values = BTreeMap::new();
        for layer in layers {
            for (key, value) in layer.values {
                if values.contains_key(&key) {
                    trace!(uniform = %key, layer = %layer.name, "uniform overridden by later layer");
                }
                values.insert(key, value);
            }
        }
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Uniform> {
        self.values.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Uniform> {
        self.values.get_mut(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Uniform) -> Option<Uniform> {
        self.values.insert(key.into(), value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Uniform)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Uniform)> {
        self.values
            .iter_mut()
            .map(|(key, value)| (key.as_str(), value))
    }

    /// Overwrites a float uniform, inserting it when absent.
    pub fn set_float(&mut self, key: &str, value: f32) {
        match self.values.get_mut(key) {
            Some(Uniform::Float(slot)) => *slot = value,
            _ => {
                self.values.insert(key.to_string(), Uniform::Float(value));
            }
        }
    }

    pub fn set_vec2(&mut self, key: &str, value: [f32; 2]) {
        match self.values.get_mut(key) {
            Some(Uniform::Vec2(slot)) => *slot = value,
            _ => {
                self.values.insert(key.to_string(), Uniform::Vec2(value));
            }
        }
    }
}
