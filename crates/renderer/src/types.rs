use crate::runtime::RenderPolicy;

/// Immutable configuration passed to the renderer at start-up.
///
/// `RendererConfig` mirrors CLI flags: how large the window should be, what
/// to call it, and whether frames animate or stay frozen.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window title.
    pub title: String,
    /// Window size in logical pixels. This is also what the shader sees as
    /// `u_resolution`.
    pub surface_size: (u32, u32),
    /// High-level render behaviour requested by the caller.
    pub policy: RenderPolicy,
}

impl RendererConfig {
    pub fn logical_size(&self) -> [f32; 2] {
        [self.surface_size.0 as f32, self.surface_size.1 as f32]
    }
}

impl Default for RendererConfig {
    /// An 800x600 animated window.
    fn default() -> Self {
        Self {
            title: "Shader Canvas".to_string(),
            surface_size: (800, 600),
            policy: RenderPolicy::default(),
        }
    }
}
