//! Loop-rate measurement.
//!
//! `FpsMeter` counts control cycles and produces a rate once per interval.
//! The daemon logs it together with controller state instead of drawing it
//! on a preview window.

use std::time::{Duration, Instant};

/// Cycle counter with a fixed reporting interval.
#[derive(Debug)]
pub struct FpsMeter {
    interval: Duration,
    window_start: Instant,
    window_count: u64,
    total: u64,
    last_fps: f64,
}

impl FpsMeter {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            window_start: now,
            window_count: 0,
            total: 0,
            last_fps: 0.0,
        }
    }

    /// Count one cycle. Returns the rate when an interval has elapsed.
    pub fn tick(&mut self) -> Option<f64> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Option<f64> {
        self.window_count += 1;
        self.total += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed <= self.interval || elapsed.is_zero() {
            return None;
        }
        self.last_fps = self.window_count as f64 / elapsed.as_secs_f64();
        self.window_count = 0;
        self.window_start = now;
        Some(self.last_fps)
    }

    /// Most recent rate, 0 until the first interval has elapsed.
    pub fn fps(&self) -> f64 {
        self.last_fps
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}
