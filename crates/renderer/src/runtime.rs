use std::time::{Duration, Instant};

/// High-level behaviour requested by the caller.
///
/// The render policy decides whether frames animate continuously or are
/// evaluated at a fixed timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderPolicy {
    /// Run the render loop continuously, optionally clamping the frame rate.
    Animate {
        /// Optional requested frames-per-second cap.
        target_fps: Option<f32>,
    },
    /// Render with the clock frozen at `time`, redrawing only when the
    /// surface changes.
    Still { time: f32 },
}

impl Default for RenderPolicy {
    fn default() -> Self {
        Self::Animate { target_fps: None }
    }
}

/// Snapshot of the time state supplied to the built-in uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Elapsed wall-clock or simulated time in seconds.
    pub seconds: f32,
    /// Seconds since the previous sample.
    pub delta: f32,
    /// Monotonic frame counter for the running session.
    pub frame_index: u64,
}

impl TimeSample {
    pub fn new(seconds: f32, delta: f32, frame_index: u64) -> Self {
        Self {
            seconds,
            delta,
            frame_index,
        }
    }
}

/// Abstraction over where time values originate from.
pub trait TimeSource: Send {
    /// Resets the source to its initial state.
    fn reset(&mut self);
    /// Produces a time sample for the next frame.
    fn sample(&mut self) -> TimeSample;
}

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
    last: Duration,
    frame: u64,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            last: Duration::ZERO,
            frame: 0,
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn sample(&mut self) -> TimeSample {
        let elapsed = self.origin.elapsed();
        let delta = elapsed.saturating_sub(self.last);
        self.last = elapsed;
        let sample = TimeSample::new(elapsed.as_secs_f32(), delta.as_secs_f32(), self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Time source that always reports a fixed timestamp.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource {
    time: f32,
    frame: u64,
}

impl FixedTimeSource {
    pub fn new(time: f32) -> Self {
        Self { time, frame: 0 }
    }

    pub fn time(&self) -> f32 {
        self.time
    }
}

impl TimeSource for FixedTimeSource {
    fn reset(&mut self) {
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.time, 0.0, self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Advances by a fixed step on every sample; used to single-step frames.
#[derive(Debug, Clone, Copy)]
pub struct ManualTimeSource {
    step: f32,
    elapsed: f32,
    frame: u64,
}

impl ManualTimeSource {
    pub fn new(step: f32) -> Self {
        Self {
            step,
            elapsed: 0.0,
            frame: 0,
        }
    }
}

impl TimeSource for ManualTimeSource {
    fn reset(&mut self) {
        self.elapsed = 0.0;
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        self.elapsed += self.step;
        let sample = TimeSample::new(self.elapsed, self.step, self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Convenient alias for owning time sources behind trait objects.
pub type BoxedTimeSource = Box<dyn TimeSource + Send>;

/// Builds a time source suited to the requested render policy.
pub fn time_source_for_policy(policy: &RenderPolicy) -> BoxedTimeSource {
    match policy {
        RenderPolicy::Animate { .. } => Box::new(SystemTimeSource::new()),
        RenderPolicy::Still { time } => Box::new(FixedTimeSource::new(*time)),
    }
}

/// Decides when the next frame may be issued.
///
/// Frames never overlap: a frame is only requested once the previous one was
/// marked rendered.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    policy: RenderPolicy,
    last_render: Option<Instant>,
    in_flight: bool,
}

impl FrameScheduler {
    pub fn new(policy: RenderPolicy) -> Self {
        Self {
            policy,
            last_render: None,
            in_flight: false,
        }
    }

    fn frame_interval(&self) -> Option<Duration> {
        match self.policy {
            RenderPolicy::Animate {
                target_fps: Some(fps),
            } if fps > 0.0 => Some(Duration::from_secs_f32(1.0 / fps)),
            _ => None,
        }
    }

    pub fn ready_for_frame(&mut self, now: Instant) -> bool {
        if self.in_flight {
            return false;
        }
        let ready = match (self.policy, self.last_render) {
            (_, None) => true,
            (RenderPolicy::Still { .. }, Some(_)) => false,
            (RenderPolicy::Animate { .. }, Some(last)) => match self.frame_interval() {
                Some(interval) => now.saturating_duration_since(last) >= interval,
                None => true,
            },
        };
        if ready {
            self.in_flight = true;
        }
        ready
    }

    pub fn mark_rendered(&mut self) {
        self.mark_rendered_at(Instant::now());
    }

    pub fn mark_rendered_at(&mut self, now: Instant) {
        self.in_flight = false;
        self.last_render = Some(now);
    }

    /// Lets a skipped frame be requested again without counting as rendered.
    pub fn mark_skipped(&mut self) {
        self.in_flight = false;
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let last = self.last_render?;
        self.frame_interval().map(|interval| last + interval)
    }

    /// Forgets the last render, e.g. after a resize invalidates a still frame.
    pub fn reset(&mut self) {
        self.last_render = None;
        self.in_flight = false;
    }
}
