use std::borrow::Cow;
use std::collections::BTreeMap;

use anyhow::Result;
use canvas::{TextureDimension, UniformKind, UniformSet};
use wgpu::naga::ShaderStage;

/// Compiles the static full-screen quad vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("fullscreen quad vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(VERTEX_SHADER_GLSL),
            stage: ShaderStage::Vertex,
            defines: &[],
        },
    }))
}

/// Wraps the fragment source with the uniform prelude and compiles it.
pub(crate) fn compile_fragment_shader(
    device: &wgpu::Device,
    source: &str,
    interface: &ShaderInterface,
) -> Result<wgpu::ShaderModule> {
    let wrapped = wrap_fragment(source, interface);
    tracing::trace!(lines = wrapped.lines().count(), "wrapped fragment shader");

    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("canvas fragment"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(wrapped),
            stage: ShaderStage::Fragment,
            defines: &[],
        },
    }))
}

/// Byte placement of one scalar or vector uniform inside the std140 block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: String,
    pub kind: UniformKind,
    pub offset: usize,
}

/// std140 layout of every non-texture uniform, ordered by name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UniformBlockLayout {
    fields: Vec<FieldLayout>,
    size: usize,
}

fn std140_size_align(kind: UniformKind) -> (usize, usize) {
    match kind {
        UniformKind::Float | UniformKind::Int => (4, 4),
        UniformKind::Vec2 => (8, 8),
        UniformKind::Vec3 => (12, 16),
        UniformKind::Vec4 => (16, 16),
        UniformKind::Texture => (0, 1),
    }
}

fn align_to(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

impl UniformBlockLayout {
    pub fn new<'a>(fields: impl IntoIterator<Item = (&'a str, UniformKind)>) -> Self {
        let mut offset = 0;
        let mut laid_out = Vec::new();
        for (name, kind) in fields {
            if kind == UniformKind::Texture {
                continue;
            }
            let (size, align) = std140_size_align(kind);
            offset = align_to(offset, align);
            laid_out.push(FieldLayout {
                name: name.to_string(),
                kind,
                offset,
            });
            offset += size;
        }
        Self {
            fields: laid_out,
            size: align_to(offset.max(4), 16),
        }
    }

    pub fn from_uniforms(uniforms: &UniformSet) -> Self {
        Self::new(uniforms.iter().map(|(name, value)| (name, value.kind())))
    }

    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    /// Block size rounded up to a 16-byte multiple.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// A texture uniform bound as a texture + sampler pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBinding {
    pub name: String,
    pub dimension: TextureDimension,
}

/// Everything the prelude declares for one shader.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderInterface {
    pub block: UniformBlockLayout,
    pub textures: Vec<TextureBinding>,
}

impl ShaderInterface {
    /// Texture dimensionality comes from the bound texture when there is one,
    /// otherwise from the shader's own `sampler2DArray` declaration.
    ///
    /// Uniforms the shader declares but the set lacks still get a slot: a
    /// zero-filled block field or a placeholder texture, which control logic
    /// may fill in later.
    pub fn new(source: &str, uniforms: &UniformSet) -> Self {
        let declared = declared_uniforms(source);
        let mut scalars: BTreeMap<&str, UniformKind> = BTreeMap::new();
        let mut textures: BTreeMap<&str, TextureDimension> = BTreeMap::new();

        for (name, value) in uniforms.iter() {
            if value.kind() != UniformKind::Texture {
                scalars.insert(name, value.kind());
                continue;
            }
            let dimension = match value.texture() {
                Some(texture) => texture.dimension(),
                None if declared.get(name).map(String::as_str) == Some("sampler2DArray") => {
                    TextureDimension::D2Array
                }
                None => TextureDimension::D2,
            };
            textures.insert(name, dimension);
        }

        for (name, ty) in &declared {
            if uniforms.contains(name) {
                continue;
            }
            match ty.as_str() {
                "sampler2D" => {
                    textures.insert(name, TextureDimension::D2);
                }
                "sampler2DArray" => {
                    textures.insert(name, TextureDimension::D2Array);
                }
                other => match scalar_kind(other) {
                    Some(kind) => {
                        scalars.insert(name, kind);
                    }
                    None => {
                        tracing::debug!(uniform = %name, ty = other, "unsupported uniform type left in source");
                        continue;
                    }
                },
            }
            tracing::debug!(uniform = %name, ty = %ty, "declared uniform has no value; zero-filled");
        }

        Self {
            block: UniformBlockLayout::new(scalars),
            textures: textures
                .into_iter()
                .map(|(name, dimension)| TextureBinding {
                    name: name.to_string(),
                    dimension,
                })
                .collect(),
        }
    }

    fn declares(&self, name: &str) -> bool {
        self.block.field(name).is_some() || self.textures.iter().any(|t| t.name == name)
    }
}

/// `uniform <type> <name>;` declarations found in the source, by name.
fn declared_uniforms(source: &str) -> BTreeMap<String, String> {
    source
        .lines()
        .filter_map(parse_uniform_declaration)
        .map(|(ty, name)| (name.to_string(), ty.to_string()))
        .collect()
}

/// `(type, name)` of a single `uniform` declaration. Arrays are not
/// recognised and stay in the source.
fn parse_uniform_declaration(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim().strip_prefix("uniform ")?;
    let mut words = rest.split_whitespace().filter(|word| {
        !matches!(*word, "lowp" | "mediump" | "highp")
    });
    let ty = words.next()?;
    let name = words.next()?.trim_end_matches(';');
    if name.contains('[') || name.contains(',') {
        return None;
    }
    Some((ty, name))
}

fn scalar_kind(ty: &str) -> Option<UniformKind> {
    match ty {
        "float" => Some(UniformKind::Float),
        "int" => Some(UniformKind::Int),
        "vec2" => Some(UniformKind::Vec2),
        "vec3" => Some(UniformKind::Vec3),
        "vec4" => Some(UniformKind::Vec4),
        _ => None,
    }
}

/// Produces a self-contained Vulkan GLSL fragment shader.
///
/// 1. Strip `#version`, `precision`, `vUv` varyings and the `uniform`
///    declarations the prelude will provide.
/// 2. Prepend the prelude: the std140 block, a texture/sampler pair per
///    texture uniform, and macros that map the original names onto them.
pub(crate) fn wrap_fragment(source: &str, interface: &ShaderInterface) -> String {
    let mut body = String::new();
    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#version") || trimmed.starts_with("precision ") {
            continue;
        }
        if is_vuv_declaration(trimmed) {
            continue;
        }
        if let Some((_, name)) = parse_uniform_declaration(trimmed) {
            if interface.declares(name) {
                continue;
            }
        }
        body.push_str(line);
        body.push('\n');
    }

    format!("{prelude}\n#line 1\n{body}", prelude = prelude(interface))
}

fn is_vuv_declaration(line: &str) -> bool {
    let mut words = line.split_whitespace();
    matches!(words.next(), Some("varying" | "in"))
        && words.next() == Some("vec2")
        && words.next().map(|name| name.trim_end_matches(';')) == Some("vUv")
}

fn prelude(interface: &ShaderInterface) -> String {
    let mut out = String::from(PRELUDE_HEAD);

    out.push_str("layout(std140, set = 0, binding = 0) uniform CanvasUniforms {\n");
    if interface.block.fields().is_empty() {
        out.push_str("    float _canvas_unused;\n");
    }
    for field in interface.block.fields() {
        out.push_str(&format!(
            "    {} _{};\n",
            field.kind.glsl_type(),
            field.name
        ));
    }
    out.push_str("} canvas_uniforms;\n\n");
    for field in interface.block.fields() {
        out.push_str(&format!(
            "#define {name} canvas_uniforms._{name}\n",
            name = field.name
        ));
    }

    for (index, texture) in interface.textures.iter().enumerate() {
        let (texture_type, sampler_type) = match texture.dimension {
            TextureDimension::D2 => ("texture2D", "sampler2D"),
            TextureDimension::D2Array => ("texture2DArray", "sampler2DArray"),
        };
        let binding = index * 2;
        out.push_str(&format!(
            "layout(set = 1, binding = {binding}) uniform {texture_type} canvas_{name}_texture;\n\
             layout(set = 1, binding = {sampler_binding}) uniform sampler canvas_{name}_sampler;\n\
             #define {name} {sampler_type}(canvas_{name}_texture, canvas_{name}_sampler)\n",
            name = texture.name,
            sampler_binding = binding + 1,
        ));
    }
    out.push_str(PRELUDE_TAIL);
    out
}

const PRELUDE_HEAD: &str = r"#version 450
layout(location = 0) in vec2 vUv;
layout(location = 0) out vec4 canvas_FragColor;

";

/// Aliases for WebGL-era names; must follow the `texture2D` declarations.
const PRELUDE_TAIL: &str = r"
#define gl_FragColor canvas_FragColor
#define texture2D texture
";

/// Two triangles covering clip space; `vUv` spans [0, 1] with the origin at
/// the bottom-left.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 vUv;

const vec2 positions[6] = vec2[6](
    vec2(-1.0, -1.0),
    vec2(1.0, -1.0),
    vec2(1.0, 1.0),
    vec2(-1.0, -1.0),
    vec2(1.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    vec2 pos = positions[gl_VertexIndex];
    vUv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

pub(crate) const QUAD_VERTEX_COUNT: u32 = 6;
