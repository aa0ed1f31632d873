//! Time management utilities

use std::time::Instant;

use crate::config::RuntimeConfig;

/// Wall-clock frame timer feeding the per-frame dispatch
#[derive(Debug, Clone)]
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f64,
    frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a timer starting now
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Measure the time since the previous tick and return it in seconds
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.advance(elapsed)
    }

    /// Advance by a known delta instead of reading the clock
    pub fn advance(&mut self, delta_time: f32) -> f32 {
        self.delta_time = delta_time.max(0.0);
        self.total_time += f64::from(self.delta_time);
        self.frame_count += 1;
        self.delta_time
    }

    /// Seconds covered by the last frame
    pub const fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Seconds since creation
    pub const fn total_time(&self) -> f64 {
        self.total_time
    }

    /// Frames ticked so far
    pub const fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Average frames per second since creation
    #[allow(clippy::cast_precision_loss)]
    pub fn average_fps(&self) -> f64 {
        if self.total_time > 0.0 {
            self.frame_count as f64 / self.total_time
        } else {
            0.0
        }
    }
}

/// Fixed-step accumulator driving the fixed update pass
///
/// Each frame's variable delta is accumulated and converted into a whole
/// number of fixed steps. When a frame would need more than
/// `max_steps` steps, the excess backlog is dropped instead of being
/// carried into the next frame.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    step: f32,
    max_steps: u32,
    accumulator: f32,
    total_steps: u64,
}

impl Default for FixedTimestep {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

impl FixedTimestep {
    /// Create an accumulator with the given step length in seconds
    pub fn new(step: f32) -> Self {
        Self {
            step,
            max_steps: RuntimeConfig::default().max_fixed_steps_per_frame,
            accumulator: 0.0,
            total_steps: 0,
        }
    }

    /// Create an accumulator from runtime configuration
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.fixed_time_step).with_max_steps(config.max_fixed_steps_per_frame)
    }

    /// Limit how many fixed steps a single frame may run
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Length of one fixed step in seconds
    pub const fn step(&self) -> f32 {
        self.step
    }

    /// Feed a frame delta and return how many fixed steps to run
    pub fn accumulate(&mut self, frame_delta: f32) -> u32 {
        if frame_delta <= 0.0 || !frame_delta.is_finite() || self.step <= 0.0 {
            return 0;
        }

        self.accumulator += frame_delta;

        let mut steps = 0;
        while self.accumulator >= self.step && steps < self.max_steps {
            self.accumulator -= self.step;
            steps += 1;
        }

        if self.accumulator >= self.step {
            log::debug!(
                "Fixed timestep fell behind, dropping {:.4}s of backlog",
                self.accumulator - self.accumulator % self.step
            );
            self.accumulator %= self.step;
        }

        self.total_steps += u64::from(steps);
        steps
    }

    /// Fraction of a step left in the accumulator, for interpolation
    pub fn alpha(&self) -> f32 {
        if self.step > 0.0 {
            self.accumulator / self.step
        } else {
            0.0
        }
    }

    /// Total fixed steps produced since creation
    pub const fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Drop any accumulated time
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_accumulate_converts_time_into_whole_steps() {
        let mut timestep = FixedTimestep::new(0.25);

        assert_eq!(timestep.accumulate(0.1), 0);
        assert_eq!(timestep.accumulate(0.4), 2);
        assert_relative_eq!(timestep.alpha(), 0.0, epsilon = 1e-6);
        assert_eq!(timestep.total_steps(), 2);
    }

    #[test]
    fn test_accumulate_drops_backlog_beyond_cap() {
        let mut timestep = FixedTimestep::new(0.25).with_max_steps(2);

        assert_eq!(timestep.accumulate(2.0), 2);
        // Remaining backlog is discarded, only the sub-step remainder survives
        assert!(timestep.alpha() < 1.0);
        assert_eq!(timestep.accumulate(0.0), 0);
    }

    #[test]
    fn test_timer_advance_tracks_totals() {
        let mut timer = Timer::new();
        timer.advance(0.5);
        timer.advance(-1.0);
        timer.advance(0.25);

        assert_eq!(timer.frame_count(), 3);
        assert_relative_eq!(timer.total_time(), 0.75, epsilon = 1e-9);
        assert_relative_eq!(timer.average_fps(), 4.0, epsilon = 1e-9);
        assert!(timer.tick() >= 0.0);
    }

    #[test]
    fn test_accumulate_ignores_invalid_deltas() {
        let mut timestep = FixedTimestep::new(0.5);

        assert_eq!(timestep.accumulate(-1.0), 0);
        assert_eq!(timestep.accumulate(f32::NAN), 0);
        assert_eq!(timestep.accumulate(f32::INFINITY), 0);
        assert_eq!(timestep.total_steps(), 0);
    }
}
