use anyhow::Result;

use crate::actuation::{ActuationInterface, Settled};

/// Default sweep increment in degrees.
pub const DEFAULT_SWEEP_STEP: f32 = 10.0;

/// Triangle-wave sweep between the servo limits.
///
/// Each step commands the current angle, then moves the cursor one increment
/// in the sweep direction, bouncing off 0° and 180°.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanBehavior {
    step: f32,
}

impl ScanBehavior {
    pub fn new(step: f32) -> Self {
        Self { step }
    }

    pub fn step_degrees(&self) -> f32 {
        self.step
    }

    /// Run one sweep step.
    ///
    /// The cursor advances even when the servo command fails.
    pub fn step(&self, actuation: &mut ActuationInterface) -> Result<Settled> {
        let target = actuation.angle();
        let result = actuation.set_angle(target);
        actuation.advance_sweep(self.step);
        result
    }
}

impl Default for ScanBehavior {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_STEP)
    }
}
