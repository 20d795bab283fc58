//! Per-frame driver for the assembled uniform set.
//!
//! A `RenderLoop` starts once (`Stopped -> Running`) and from then on each
//! call to `frame` samples the clock, writes `u_time` and `u_delta`, hands
//! the uniforms to the caller's control logic, then draws exactly once.
//! `u_resolution` is written a single time, when the loop starts.
//!
//! The loop is backend-agnostic: anything implementing `RenderTarget` can be
//! driven, which is how the tests single-step frames without a GPU.
use anyhow::{bail, Result};
use canvas::{UniformSet, DELTA_UNIFORM, RESOLUTION_UNIFORM, TIME_UNIFORM};
use tracing::{info, trace};

use crate::runtime::{BoxedTimeSource, TimeSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

/// Result of a draw that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// The surface had to be reconfigured; nothing was presented.
    Skipped,
}

pub trait RenderTarget {
    /// Layout size of the drawing area in logical pixels.
    fn resolution(&self) -> [f32; 2];

    /// Draws one full-screen frame with the current uniform values. Texture
    /// slots that need an upload are synchronised first.
    fn draw(&mut self, uniforms: &mut UniformSet) -> Result<FrameStatus>;
}

/// Caller-supplied per-frame hook, free to mutate any uniform in place.
pub trait ControlLogic {
    fn update(&mut self, uniforms: &mut UniformSet, time: f32, delta: f32);
}

impl<F> ControlLogic for F
where
    F: FnMut(&mut UniformSet, f32, f32),
{
    fn update(&mut self, uniforms: &mut UniformSet, time: f32, delta: f32) {
        self(uniforms, time, delta)
    }
}

/// Control logic that leaves every uniform untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoControl;

impl ControlLogic for NoControl {
    fn update(&mut self, _uniforms: &mut UniformSet, _time: f32, _delta: f32) {}
}

pub struct RenderLoop {
    state: LoopState,
    uniforms: UniformSet,
    time_source: BoxedTimeSource,
    control: Box<dyn ControlLogic>,
    last_sample: Option<TimeSample>,
}

impl std::fmt::Debug for RenderLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderLoop")
            .field("state", &self.state)
            .field("uniforms", &self.uniforms.len())
            .field("last_sample", &self.last_sample)
            .finish_non_exhaustive()
    }
}

impl RenderLoop {
    pub fn new(
        uniforms: UniformSet,
        time_source: BoxedTimeSource,
        control: impl ControlLogic + 'static,
    ) -> Self {
        Self {
            state: LoopState::Stopped,
            uniforms,
            time_source,
            control: Box::new(control),
            last_sample: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn uniforms(&self) -> &UniformSet {
        &self.uniforms
    }

    pub fn uniforms_mut(&mut self) -> &mut UniformSet {
        &mut self.uniforms
    }

    pub fn last_sample(&self) -> Option<TimeSample> {
        self.last_sample
    }

    /// Enters `Running`. May only happen once per loop.
    pub fn start(&mut self, target: &dyn RenderTarget) -> Result<()> {
        if self.state == LoopState::Running {
            bail!("render loop is already running");
        }
        let resolution = target.resolution();
        self.uniforms.set_vec2(RESOLUTION_UNIFORM, resolution);
        self.time_source.reset();
        self.state = LoopState::Running;
        info!(
            width = resolution[0],
            height = resolution[1],
            uniforms = self.uniforms.len(),
            "render loop running"
        );
        Ok(())
    }

    /// Runs one iteration. A draw error is returned to the caller, which is
    /// expected to stop scheduling frames.
    pub fn frame(&mut self, target: &mut dyn RenderTarget) -> Result<FrameStatus> {
        if self.state != LoopState::Running {
            bail!("render loop has not been started");
        }
        let sample = self.time_source.sample();
        self.uniforms.set_float(TIME_UNIFORM, sample.seconds);
        self.uniforms.set_float(DELTA_UNIFORM, sample.delta);
        self.control
            .update(&mut self.uniforms, sample.seconds, sample.delta);
        self.last_sample = Some(sample);

        let status = target.draw(&mut self.uniforms)?;
        trace!(
            frame = sample.frame_index,
            time = sample.seconds,
            delta = sample.delta,
            ?status,
            "frame complete"
        );
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use canvas::{Uniform, UniformLayer};

    use super::*;
    use crate::runtime::ManualTimeSource;

    #[derive(Default)]
    struct RecordingTarget {
        frames: Vec<(f32, f32, [f32; 2])>,
        fail_on: Option<usize>,
    }

    impl RenderTarget for RecordingTarget {
        fn resolution(&self) -> [f32; 2] {
            [800.0, 600.0]
        }

        fn draw(&mut self, uniforms: &mut UniformSet) -> Result<FrameStatus> {
            if self.fail_on == Some(self.frames.len()) {
                return Err(anyhow!("device lost"));
            }
            let time = uniforms.get(TIME_UNIFORM).and_then(Uniform::as_float).unwrap();
            let delta = uniforms.get(DELTA_UNIFORM).and_then(Uniform::as_float).unwrap();
            let resolution = uniforms
                .get(RESOLUTION_UNIFORM)
                .and_then(Uniform::as_vec2)
                .unwrap();
            self.frames.push((time, delta, resolution));
            Ok(FrameStatus::Presented)
        }
    }

    fn builtins() -> UniformSet {
        UniformSet::merge([UniformLayer::builtins()])
    }

    #[test]
    fn frame_before_start_is_rejected() {
        let mut render_loop =
            RenderLoop::new(builtins(), Box::new(ManualTimeSource::new(0.1)), NoControl);
        let mut target = RecordingTarget::default();
        assert_eq!(render_loop.state(), LoopState::Stopped);
        assert!(render_loop.frame(&mut target).is_err());
        assert!(target.frames.is_empty());
    }

    #[test]
    fn start_is_entered_once() {
        let mut render_loop =
            RenderLoop::new(builtins(), Box::new(ManualTimeSource::new(0.1)), NoControl);
        let target = RecordingTarget::default();
        render_loop.start(&target).unwrap();
        assert_eq!(render_loop.state(), LoopState::Running);
        assert!(render_loop.start(&target).is_err());
    }

    #[test]
    fn frames_advance_builtins_from_the_clock() {
        let mut render_loop =
            RenderLoop::new(builtins(), Box::new(ManualTimeSource::new(0.25)), NoControl);
        let mut target = RecordingTarget::default();
        render_loop.start(&target).unwrap();
        for _ in 0..3 {
            assert_eq!(render_loop.frame(&mut target).unwrap(), FrameStatus::Presented);
        }
        assert_eq!(
            target.frames,
            vec![
                (0.25, 0.25, [800.0, 600.0]),
                (0.5, 0.25, [800.0, 600.0]),
                (0.75, 0.25, [800.0, 600.0]),
            ]
        );
    }

    #[test]
    fn control_logic_sees_time_and_mutates_uniforms() {
        let control = |uniforms: &mut UniformSet, time: f32, _delta: f32| {
            uniforms.set_float("u_phase", time * 2.0);
            uniforms.set_float(TIME_UNIFORM, 100.0);
        };
        let mut render_loop =
            RenderLoop::new(builtins(), Box::new(ManualTimeSource::new(0.5)), control);
        let mut target = RecordingTarget::default();
        render_loop.start(&target).unwrap();
        render_loop.frame(&mut target).unwrap();

        assert_eq!(
            render_loop.uniforms().get("u_phase").and_then(Uniform::as_float),
            Some(1.0)
        );
        assert_eq!(target.frames[0].0, 100.0);
    }

    #[test]
    fn draw_failure_surfaces_to_caller() {
        let mut render_loop =
            RenderLoop::new(builtins(), Box::new(ManualTimeSource::new(0.1)), NoControl);
        let mut target = RecordingTarget {
            fail_on: Some(1),
            ..Default::default()
        };
        render_loop.start(&target).unwrap();
        render_loop.frame(&mut target).unwrap();
        let err = render_loop.frame(&mut target).unwrap_err();
        assert!(err.to_string().contains("device lost"));
        assert_eq!(target.frames.len(), 1);
    }
}
