use canvas::{ColorSpace, TextureDimension, TextureSource, Uniform, UniformSet};
use image::imageops::flip_vertical_in_place;
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::compile::TextureBinding;

const PLACEHOLDER_TEXEL: [u8; 4] = [0, 0, 0, 255];

/// GPU side of one texture uniform: the bound view plus its sampler.
pub(crate) struct TextureSlot {
    pub name: String,
    pub dimension: TextureDimension,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    extent: (u32, u32, u32),
    placeholder: bool,
    mismatch_reported: bool,
    oversize_reported: bool,
}

impl TextureSlot {
    pub(crate) fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue, binding: &TextureBinding) -> Self {
        let (texture, view) = create_texture(
            device,
            queue,
            &format!("placeholder {}", binding.name),
            binding.dimension,
            (1, 1, 1),
            wgpu::TextureFormat::Rgba8Unorm,
            &PLACEHOLDER_TEXEL,
        );
        Self {
            name: binding.name.clone(),
            dimension: binding.dimension,
            texture,
            view,
            sampler: create_sampler(device),
            extent: (1, 1, 1),
            placeholder: true,
            mismatch_reported: false,
            oversize_reported: false,
        }
    }

    /// Brings the slot in line with the uniform's current value. Returns true
    /// when the view changed and the bind group must be rebuilt.
    pub(crate) fn sync(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        uniform: Option<&mut Uniform>,
    ) -> bool {
        let Some(source) = uniform.and_then(Uniform::texture_mut) else {
            if self.placeholder {
                return false;
            }
            let binding = TextureBinding {
                name: self.name.clone(),
                dimension: self.dimension,
            };
            *self = Self::placeholder(device, queue, &binding);
            tracing::debug!(uniform = %self.name, "texture slot reset to placeholder");
            return true;
        };

        if source.dimension() != self.dimension {
            if !self.mismatch_reported {
                tracing::warn!(
                    uniform = %self.name,
                    expected = ?self.dimension,
                    actual = ?source.dimension(),
                    "texture dimensionality does not match the compiled shader; keeping placeholder"
                );
                self.mismatch_reported = true;
            }
            return false;
        }
        if !source.needs_upload() {
            return false;
        }

        let format = texture_format(source.color_space());
        let rebound = match &mut *source {
            TextureSource::Image(image) => {
                let (width, height) = image.pixels.dimensions();
                let extent = (width, height, 1);
                if self.admit(device, extent) {
                    self.replace(device, queue, extent, format, image.pixels.as_raw());
                    true
                } else {
                    false
                }
            }
            TextureSource::Array(array) => {
                let extent = (array.dimensions.width, array.dimensions.height, array.depth);
                if self.admit(device, extent) {
                    self.replace(device, queue, extent, format, &array.data);
                    true
                } else {
                    false
                }
            }
            TextureSource::Camera(camera) => match camera.next_frame() {
                Some(mut frame) => {
                    flip_vertical_in_place(&mut frame);
                    let (width, height) = frame.dimensions();
                    if !self.placeholder && self.extent == (width, height, 1) {
                        write_layer(queue, &self.texture, width, height, frame.as_raw());
                        false
                    } else if self.admit(device, (width, height, 1)) {
                        self.replace(device, queue, (width, height, 1), format, frame.as_raw());
                        true
                    } else {
                        false
                    }
                }
                None => false,
            },
        };
        source.mark_uploaded();
        rebound
    }

    /// False, with a single warning, when the extent is beyond what the
    /// device can allocate; the slot keeps its current texture.
    fn admit(&mut self, device: &wgpu::Device, extent: (u32, u32, u32)) -> bool {
        let limits = device.limits();
        if extent_fits(extent, &limits) {
            return true;
        }
        if !self.oversize_reported {
            tracing::warn!(
                uniform = %self.name,
                width = extent.0,
                height = extent.1,
                layers = extent.2,
                max_dimension = limits.max_texture_dimension_2d,
                max_layers = limits.max_texture_array_layers,
                "texture exceeds GPU limits; keeping current binding"
            );
            self.oversize_reported = true;
        }
        false
    }

    fn replace(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        extent: (u32, u32, u32),
        format: wgpu::TextureFormat,
        data: &[u8],
    ) {
        let (texture, view) = create_texture(
            device,
            queue,
            &format!("uniform {}", self.name),
            self.dimension,
            extent,
            format,
            data,
        );
        self.texture = texture;
        self.view = view;
        self.extent = extent;
        self.placeholder = false;
        tracing::debug!(
            uniform = %self.name,
            width = extent.0,
            height = extent.1,
            layers = extent.2,
            ?format,
            "uploaded texture"
        );
    }
}

fn extent_fits((width, height, layers): (u32, u32, u32), limits: &wgpu::Limits) -> bool {
    width <= limits.max_texture_dimension_2d
        && height <= limits.max_texture_dimension_2d
        && layers <= limits.max_texture_array_layers
}

fn texture_format(color_space: ColorSpace) -> wgpu::TextureFormat {
    match color_space {
        ColorSpace::Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        ColorSpace::Linear => wgpu::TextureFormat::Rgba8Unorm,
    }
}

fn create_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

fn create_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    dimension: TextureDimension,
    (width, height, layers): (u32, u32, u32),
    format: wgpu::TextureFormat,
    data: &[u8],
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: layers.max(1),
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        data,
    );
    let view_dimension = match dimension {
        TextureDimension::D2 => wgpu::TextureViewDimension::D2,
        TextureDimension::D2Array => wgpu::TextureViewDimension::D2Array,
    };
    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(label),
        dimension: Some(view_dimension),
        ..Default::default()
    });
    (texture, view)
}

fn write_layer(queue: &wgpu::Queue, texture: &wgpu::Texture, width: u32, height: u32, data: &[u8]) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

/// Creates one placeholder slot per texture binding, in binding order.
pub(crate) fn create_slots(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    bindings: &[TextureBinding],
) -> Vec<TextureSlot> {
    bindings
        .iter()
        .map(|binding| TextureSlot::placeholder(device, queue, binding))
        .collect()
}

/// Synchronises every slot with the uniform set; true if any view changed.
pub(crate) fn sync_slots(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    slots: &mut [TextureSlot],
    uniforms: &mut UniformSet,
) -> bool {
    let mut rebound = false;
    for slot in slots.iter_mut() {
        rebound |= slot.sync(device, queue, uniforms.get_mut(&slot.name));
    }
    rebound
}

pub(crate) fn layout_entries(slots: &[TextureSlot]) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(slots.len() * 2);
    for (index, slot) in slots.iter().enumerate() {
        let view_dimension = match slot.dimension {
            TextureDimension::D2 => wgpu::TextureViewDimension::D2,
            TextureDimension::D2Array => wgpu::TextureViewDimension::D2Array,
        };
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (index as u32) * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (index as u32) * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

pub(crate) fn bind_group_entries(slots: &[TextureSlot]) -> Vec<wgpu::BindGroupEntry<'_>> {
    let mut entries = Vec::with_capacity(slots.len() * 2);
    for (index, slot) in slots.iter().enumerate() {
        entries.push(wgpu::BindGroupEntry {
            binding: (index as u32) * 2,
            resource: wgpu::BindingResource::TextureView(&slot.view),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: (index as u32) * 2 + 1,
            resource: wgpu::BindingResource::Sampler(&slot.sampler),
        });
    }
    entries
}
