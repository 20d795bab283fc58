use std::time::Instant;

use anyhow::{anyhow, Result};
use canvas::UniformSet;
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

use crate::gpu::GpuTarget;
use crate::render_loop::{ControlLogic, FrameStatus, RenderLoop};
use crate::runtime::{time_source_for_policy, BoxedTimeSource, FrameScheduler, RenderPolicy};
use crate::types::RendererConfig;

/// Everything the window needs to start drawing: the fragment shader and the
/// assembled uniform set it reads from.
pub struct CanvasProgram {
    pub fragment_source: String,
    pub uniforms: UniformSet,
}

struct WindowState {
    target: GpuTarget,
    window: winit::window::Window,
}

/// Opens a window and drives the render loop until it is closed or a frame
/// fails to draw.
pub struct Renderer {
    config: RendererConfig,
    time_source: Option<BoxedTimeSource>,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            time_source: None,
        }
    }

    /// Replaces the clock chosen from the render policy.
    pub fn with_time_source(mut self, time_source: BoxedTimeSource) -> Self {
        self.time_source = Some(time_source);
        self
    }

    /// Blocks on the windowing event loop.
    pub fn run(self, program: CanvasProgram, control: impl ControlLogic + 'static) -> Result<()> {
        let time_source = self
            .time_source
            .unwrap_or_else(|| time_source_for_policy(&self.config.policy));
        run_window(self.config, program, time_source, control)
    }
}

fn run_window(
    config: RendererConfig,
    program: CanvasProgram,
    time_source: BoxedTimeSource,
    control: impl ControlLogic + 'static,
) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let (width, height) = config.surface_size;
    let window = WindowBuilder::new()
        .with_title(config.title.clone())
        .with_inner_size(LogicalSize::new(width, height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;

    let target = GpuTarget::new(
        &window,
        window.inner_size(),
        config.logical_size(),
        &program.fragment_source,
        &program.uniforms,
    )
    .map_err(|err| anyhow!("failed to initialise renderer: {err:#}"))?;
    // Field order drops the surface before the window it was created from.
    let mut state = WindowState { target, window };
    let WindowState { target, window } = &mut state;

    let mut render_loop = RenderLoop::new(program.uniforms, time_source, control);
    render_loop.start(&*target)?;

    let mut scheduler = FrameScheduler::new(config.policy);
    if scheduler.ready_for_frame(Instant::now()) {
        window.request_redraw();
    }

    let mut failure: Option<anyhow::Error> = None;
    let failure_slot = &mut failure;
    let run_result = event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                tracing::info!("window closed");
                elwt.exit();
            }
            WindowEvent::Resized(new_size) => {
                target.resize(new_size);
                if matches!(config.policy, RenderPolicy::Still { .. }) {
                    scheduler.reset();
                }
            }
            WindowEvent::RedrawRequested => match render_loop.frame(&mut *target) {
                Ok(FrameStatus::Presented) => scheduler.mark_rendered(),
                Ok(FrameStatus::Skipped) => scheduler.mark_skipped(),
                Err(err) => {
                    tracing::error!(error = %err, "frame failed; stopping render loop");
                    *failure_slot = Some(err);
                    elwt.exit();
                }
            },
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            if scheduler.ready_for_frame(now) {
                tracing::trace!("scheduler: issuing redraw now");
                window.request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            } else if let Some(deadline) = scheduler.next_deadline() {
                let ms = deadline.saturating_duration_since(now).as_millis();
                tracing::trace!(deadline_ms = ms, "scheduler: waiting until next frame");
                elwt.set_control_flow(ControlFlow::WaitUntil(deadline));
            } else {
                tracing::trace!("scheduler: idle (no redraw requested)");
                elwt.set_control_flow(ControlFlow::Wait);
            }
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))?;
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
