//! User-tunable simulation parameters.
//!
//! One plain struct shared between the UI panel and the run loop. Setters
//! clamp to the documented ranges; the randomize request is edge-triggered
//! and consumed exactly once per frame by [`take_randomize`](SimParams::take_randomize).

/// Parameters the user can change at runtime.
#[derive(Debug, Clone)]
pub struct SimParams {
    steps_per_second: u32,
    randomize_density: f32,
    randomize_requested: bool,
}

impl SimParams {
    pub const MIN_STEPS_PER_SECOND: u32 = 1;
    pub const MAX_STEPS_PER_SECOND: u32 = 500;

    #[inline]
    pub fn steps_per_second(&self) -> u32 {
        self.steps_per_second
    }

    /// Set the simulation rate, clamped to `1..=500`.
    pub fn set_steps_per_second(&mut self, sps: u32) {
        self.steps_per_second = sps.clamp(Self::MIN_STEPS_PER_SECOND, Self::MAX_STEPS_PER_SECOND);
    }

    #[inline]
    pub fn randomize_density(&self) -> f32 {
        self.randomize_density
    }

    /// Set the live-cell probability used on randomize, clamped to `[0, 1]`.
    pub fn set_randomize_density(&mut self, density: f32) {
        self.randomize_density = if density.is_finite() {
            density.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// Request a reseed on the next frame. Repeated requests within one
    /// frame collapse into a single reseed.
    pub fn request_randomize(&mut self) {
        self.randomize_requested = true;
    }

    /// Consume a pending randomize request, if any.
    pub fn take_randomize(&mut self) -> bool {
        std::mem::take(&mut self.randomize_requested)
    }
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            steps_per_second: 1,
            randomize_density: 0.5,
            randomize_requested: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = SimParams::default();
        assert_eq!(params.steps_per_second(), 1);
        assert_eq!(params.randomize_density(), 0.5);
    }

    #[test]
    fn test_steps_per_second_clamps() {
        let mut params = SimParams::default();
        params.set_steps_per_second(0);
        assert_eq!(params.steps_per_second(), 1);
        params.set_steps_per_second(10_000);
        assert_eq!(params.steps_per_second(), 500);
        params.set_steps_per_second(60);
        assert_eq!(params.steps_per_second(), 60);
    }

    #[test]
    fn test_density_clamps() {
        let mut params = SimParams::default();
        params.set_randomize_density(-0.5);
        assert_eq!(params.randomize_density(), 0.0);
        params.set_randomize_density(2.0);
        assert_eq!(params.randomize_density(), 1.0);
        params.set_randomize_density(f32::NAN);
        assert_eq!(params.randomize_density(), 0.0);
    }

    #[test]
    fn test_randomize_is_edge_triggered() {
        let mut params = SimParams::default();
        assert!(!params.take_randomize());

        params.request_randomize();
        params.request_randomize();
        assert!(params.take_randomize());
        assert!(!params.take_randomize());
    }
}
