use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use canvas::UniformSet;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::debug;
use winit::dpi::PhysicalSize;

use crate::compile::{ShaderInterface, UniformBlockLayout, QUAD_VERTEX_COUNT};
use crate::render_loop::{FrameStatus, RenderTarget};

use super::context::GpuContext;
use super::pipeline::ShaderPipeline;
use super::textures::{self, TextureSlot};
use super::uniforms::write_block;

/// GPU-backed render target: one pipeline, one uniform buffer, one texture
/// slot per texture uniform.
pub struct GpuTarget {
    context: GpuContext,
    pipeline: ShaderPipeline,
    block: UniformBlockLayout,
    block_bytes: Vec<u8>,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    texture_layout: wgpu::BindGroupLayout,
    texture_bind_group: wgpu::BindGroup,
    slots: Vec<TextureSlot>,
    logical_size: [f32; 2],
    stats: FrameStats,
}

struct FrameStats {
    frames: u64,
    window_frames: u32,
    window_start: Instant,
}

impl FrameStats {
    fn new() -> Self {
        Self {
            frames: 0,
            window_frames: 0,
            window_start: Instant::now(),
        }
    }

    fn record(&mut self) {
        self.frames += 1;
        self.window_frames += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let fps = self.window_frames as f32 / elapsed.as_secs_f32();
            debug!(fps = fps.round(), frame_count = self.frames, "render stats");
            self.window_frames = 0;
            self.window_start = Instant::now();
        }
    }
}

impl GpuTarget {
    /// `physical_size` sizes the surface; `logical_size` is what the shader
    /// sees as `u_resolution`.
    pub fn new<T>(
        target: &T,
        physical_size: PhysicalSize<u32>,
        logical_size: [f32; 2],
        fragment_source: &str,
        uniforms: &UniformSet,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, physical_size)?;
        let device = &context.device;

        let interface = ShaderInterface::new(fragment_source, uniforms);
        let block = interface.block.clone();
        let block_bytes = vec![0u8; block.size()];

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform buffer"),
            size: block.size() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform bind group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let slots = textures::create_slots(device, &context.queue, &interface.textures);
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture layout"),
            entries: &textures::layout_entries(&slots),
        });
        let texture_bind_group = create_texture_bind_group(device, &texture_layout, &slots);

        let pipeline = ShaderPipeline::new(
            device,
            context.surface_format,
            fragment_source,
            &interface,
            &uniform_layout,
            &texture_layout,
        )?;

        debug!(
            block_size = block.size(),
            scalars = block.fields().len(),
            textures = slots.len(),
            "shader pipeline ready"
        );

        Ok(Self {
            context,
            pipeline,
            block,
            block_bytes,
            uniform_buffer,
            uniform_bind_group,
            texture_layout,
            texture_bind_group,
            slots,
            logical_size,
            stats: FrameStats::new(),
        })
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.context.size
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.context.resize(new_size);
    }

    fn sync_textures(&mut self, uniforms: &mut UniformSet) {
        let device = &self.context.device;
        if textures::sync_slots(device, &self.context.queue, &mut self.slots, uniforms) {
            self.texture_bind_group =
                create_texture_bind_group(device, &self.texture_layout, &self.slots);
        }
    }
}

fn create_texture_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    slots: &[TextureSlot],
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("texture bind group"),
        layout,
        entries: &textures::bind_group_entries(slots),
    })
}

impl RenderTarget for GpuTarget {
    fn resolution(&self) -> [f32; 2] {
        self.logical_size
    }

    fn draw(&mut self, uniforms: &mut UniformSet) -> Result<FrameStatus> {
        let frame = match self.context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                debug!("surface lost or outdated; reconfiguring");
                self.context.reconfigure();
                return Ok(FrameStatus::Skipped);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                debug!("surface timeout; retrying next frame");
                return Ok(FrameStatus::Skipped);
            }
            Err(err) => return Err(anyhow!("failed to acquire surface texture: {err}")),
        };

        self.sync_textures(uniforms);
        write_block(&self.block, uniforms, &mut self.block_bytes);
        self.context
            .queue
            .write_buffer(&self.uniform_buffer, 0, &self.block_bytes);

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("render encoder"),
                });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&self.pipeline.pipeline);
            render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            render_pass.set_bind_group(1, &self.texture_bind_group, &[]);
            render_pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
        }
        self.context.queue.submit(Some(encoder.finish()));
        frame.present();
        self.stats.record();
        Ok(FrameStatus::Presented)
    }
}
