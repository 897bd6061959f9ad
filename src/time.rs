//! Frame timing and fixed-rate step scheduling.
//!
//! [`Clock`] measures wall-clock frame deltas and a smoothed FPS for the
//! overlay. [`FixedStep`] converts those variable deltas into an exact
//! number of simulation steps at a configured steps-per-second rate,
//! carrying fractional remainder time between frames so no step is lost or
//! duplicated regardless of frame cadence.

use std::time::{Duration, Instant};

/// Wall-clock frame timer.
#[derive(Debug)]
pub struct Clock {
    start: Instant,
    last_frame: Instant,
    delta_secs: f64,
    frame_count: u64,
    fps: f32,
    fps_frame_count: u64,
    fps_update_time: Instant,
    fps_update_interval: Duration,
}

impl Clock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            delta_secs: 0.0,
            frame_count: 0,
            fps: 0.0,
            fps_frame_count: 0,
            fps_update_time: now,
            fps_update_interval: Duration::from_millis(500),
        }
    }

    /// Advance to the next frame. Returns the delta in seconds.
    pub fn tick(&mut self) -> f64 {
        let now = Instant::now();
        self.delta_secs = now.duration_since(self.last_frame).as_secs_f64();
        self.last_frame = now;
        self.frame_count += 1;

        let fps_elapsed = now.duration_since(self.fps_update_time);
        if fps_elapsed >= self.fps_update_interval {
            let frames_since = self.frame_count - self.fps_frame_count;
            self.fps = frames_since as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = self.frame_count;
            self.fps_update_time = now;
        }

        self.delta_secs
    }

    /// Time since the last `tick` pair, in seconds.
    #[inline]
    pub fn delta(&self) -> f64 {
        self.delta_secs
    }

    /// Total frames ticked.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    /// Smoothed frames per second, updated twice a second.
    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Seconds since the clock was created.
    #[inline]
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulator that schedules whole simulation steps at a fixed rate.
///
/// The remainder `r` always satisfies `0 <= r < 1 / steps_per_second` after
/// each [`advance`](Self::advance): given a delta `dt`, the step count is
/// `floor((r + dt) * steps_per_second)` and the fractional part carries into
/// the next frame. The rate is read fresh on every call, so changing it
/// between frames takes effect immediately without touching the remainder.
#[derive(Debug)]
pub struct FixedStep {
    remainder: f64,
    max_steps: Option<u32>,
}

impl FixedStep {
    pub fn new() -> Self {
        Self {
            remainder: 0.0,
            max_steps: None,
        }
    }

    /// Cap the number of steps returned per frame. Time beyond the cap is
    /// discarded so a long stall cannot trigger a catch-up spiral.
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Consume `delta` seconds and return how many whole steps are due at
    /// `steps_per_second`. A zero delta never yields a step on its own.
    pub fn advance(&mut self, delta: f64, steps_per_second: u32) -> u32 {
        let rate = f64::from(steps_per_second.max(1));

        // Multiply by the rate rather than dividing by the period so that
        // whole multiples of the period floor exactly.
        self.remainder += delta.max(0.0);
        let mut steps = (self.remainder * rate).floor() as u32;
        self.remainder = (self.remainder - f64::from(steps) / rate).max(0.0);

        if let Some(cap) = self.max_steps {
            if steps > cap {
                steps = cap;
                // Drop the skipped time instead of carrying it forward.
                self.remainder = self.remainder.rem_euclid(1.0 / rate);
            }
        }
        steps
    }

    /// Fractional seconds currently carried toward the next step.
    #[inline]
    pub fn remainder(&self) -> f64 {
        self.remainder
    }

    /// Discard any accumulated remainder.
    pub fn reset(&mut self) {
        self.remainder = 0.0;
    }
}

impl Default for FixedStep {
    fn default() -> Self {
        Self::new()
    }
}
