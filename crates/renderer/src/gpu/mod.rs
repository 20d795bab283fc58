//! wgpu rendering target for the render loop.
//!
//! - `context` owns the instance/device/surface wiring and reconfigures the
//!   swapchain on resize or loss.
//! - `pipeline` compiles the wrapped fragment shader into the full-screen
//!   quad pipeline with two bind groups (uniform block, texture slots).
//! - `textures` keeps one GPU texture per texture uniform, uploading lazily
//!   and falling back to a 1x1 placeholder for null slots.
//! - `uniforms` packs the scalar uniforms into the std140 block each frame.
//! - `state` glues everything together as `GpuTarget`.

mod context;
mod pipeline;
mod state;
mod textures;
mod uniforms;

pub use state::GpuTarget;
