//! Deterministic time system
//!
//! Fixed 60Hz tick rate with a frame-time accumulator: `latch_runtime`
//! feeds wall-clock deltas in and gets back the number of `World::tick`
//! calls to make before presenting, keeping simulation cadence independent
//! of display refresh rate.

use std::time::Duration;

/// Fixed simulation tick rate (60 Hz = 16.666ms per tick)
pub const TICK_RATE_HZ: u32 = 60;
pub const TICK_DURATION: Duration = Duration::from_micros(16_666); // ~16.666ms

/// Simulation time tracker
pub struct SimulationTime {
    tick_count: u64,
    accumulated_time: Duration,
    carry: Duration,
}

impl SimulationTime {
    pub fn new() -> Self {
        Self {
            tick_count: 0,
            accumulated_time: Duration::ZERO,
            carry: Duration::ZERO,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn advance_tick(&mut self) {
        self.tick_count += 1;
        self.accumulated_time += TICK_DURATION;
    }

    pub fn total_time(&self) -> Duration {
        self.accumulated_time
    }

    /// Folds a wall-clock frame delta into the accumulator and returns how
    /// many fixed-size ticks are now due. Leftover time under one tick
    /// carries into the next call rather than being dropped.
    pub fn accumulate(&mut self, frame_delta: Duration) -> u32 {
        self.carry += frame_delta;
        let mut due = 0u32;
        while self.carry >= TICK_DURATION {
            self.carry -= TICK_DURATION;
            self.advance_tick();
            due += 1;
        }
        due
    }

    /// Fraction (0..1) of the way into the next tick, for render interpolation.
    pub fn interpolation_alpha(&self) -> f32 {
        self.carry.as_secs_f32() / TICK_DURATION.as_secs_f32()
    }
}

impl Default for SimulationTime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_yields_one_tick_per_fixed_interval() {
        let mut time = SimulationTime::new();
        assert_eq!(time.accumulate(TICK_DURATION), 1);
        assert_eq!(time.tick_count(), 1);
    }

    #[test]
    fn leftover_time_carries_across_calls() {
        let mut time = SimulationTime::new();
        let half = TICK_DURATION / 2;
        assert_eq!(time.accumulate(half), 0);
        assert_eq!(time.accumulate(half), 1);
    }

    #[test]
    fn large_delta_catches_up_multiple_ticks() {
        let mut time = SimulationTime::new();
        assert_eq!(time.accumulate(TICK_DURATION * 3), 3);
    }
}
