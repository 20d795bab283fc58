//! Renderer crate for Shader Canvas.
//!
//! The crate turns a prepared fragment shader plus its uniform set into
//! pixels. The overall flow is:
//!
//! ```text
//!   shadercanvas CLI
//!          │ RendererConfig + CanvasProgram
//!          ▼
//!   Renderer::run ──▶ winit event loop ──▶ FrameScheduler ──▶ RenderLoop::frame()
//!                                                              │
//!                          u_time / u_delta / control logic ◀──┘
//!                                                              │
//!                                         GpuTarget::draw() ◀──┘
//!                                           ├─▶ texture slots (lazy upload)
//!                                           └─▶ std140 uniform block
//! ```
//!
//! `RenderLoop` is backend-agnostic and owns the uniform set; `GpuTarget`
//! owns every `wgpu` resource. Fragment shaders are written against WebGL
//! style GLSL and wrapped at compile time so the uniforms the set declares
//! become a single uniform block plus one texture/sampler pair per texture
//! uniform.

mod compile;
mod gpu;
mod render_loop;
mod runtime;
mod types;
mod window;

pub use compile::{FieldLayout, ShaderInterface, TextureBinding, UniformBlockLayout};
pub use gpu::GpuTarget;
pub use render_loop::{ControlLogic, FrameStatus, LoopState, NoControl, RenderLoop, RenderTarget};
pub use runtime::{
    time_source_for_policy, BoxedTimeSource, FixedTimeSource, FrameScheduler, ManualTimeSource,
    RenderPolicy, SystemTimeSource, TimeSample, TimeSource,
};
pub use types::RendererConfig;
pub use window::{CanvasProgram, Renderer};
