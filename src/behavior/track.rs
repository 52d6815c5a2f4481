//! Corrective tracking.
//!
//! One detection is chosen from the batch, and its box center is compared with
//! the frame center on both image axes. Each axis whose error exceeds the
//! deadband produces one fixed-size correction.
//!
//! The rig has a single pan servo, so the horizontal and the vertical error
//! both act on the same angle: a target above center nudges the pan angle up,
//! one below nudges it down. The two axes can cancel or compound each other.
//! This crosstalk is a known limitation of the single-servo rig.

use serde::{Deserialize, Serialize};

use crate::actuation::{ActuationInterface, Angle};
use crate::detect::{Detection, DetectionBatch};

/// Default deadband in pixels.
pub const DEFAULT_TOLERANCE_PX: u32 = 20;
/// Default correction per axis in degrees.
pub const DEFAULT_CORRECTION_STEP: f32 = 5.0;

/// Which detection of a batch the tracker follows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// The last detection the detector reported.
    #[default]
    Last,
    /// The detection with the highest score; earliest wins ties.
    HighestScore,
}

impl SelectionPolicy {
    pub fn select<'a>(&self, batch: &'a DetectionBatch) -> Option<&'a Detection> {
        match self {
            SelectionPolicy::Last => batch.detections.last(),
            SelectionPolicy::HighestScore => batch
                .detections
                .iter()
                .reduce(|best, d| if d.score > best.score { d } else { best }),
        }
    }
}

/// Mapping from horizontal image error to pan direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanPolarity {
    /// Target left of center decreases the angle.
    #[default]
    Normal,
    /// Target left of center increases the angle (mirrored mount).
    Inverted,
}

impl PanPolarity {
    fn sign(self) -> f32 {
        match self {
            PanPolarity::Normal => 1.0,
            PanPolarity::Inverted => -1.0,
        }
    }
}

/// Image axis a correction came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorAxis {
    Horizontal,
    Vertical,
}

/// One corrective servo command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correction {
    pub axis: ErrorAxis,
    /// Signed pixel error, target minus frame center.
    pub error_px: i64,
    pub from: Angle,
    pub to: Angle,
}

/// Result of tracking one batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackOutcome {
    /// A detection was selected from the batch.
    pub target_present: bool,
    /// Corrections that were commanded and settled.
    pub corrections: Vec<Correction>,
    /// Corrections that were computed but failed at the servo.
    pub failed: usize,
}

/// Deadband tracker.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackingBehavior {
    pub tolerance_px: u32,
    pub step: f32,
    pub selection: SelectionPolicy,
    pub polarity: PanPolarity,
}

impl Default for TrackingBehavior {
    fn default() -> Self {
        Self {
            tolerance_px: DEFAULT_TOLERANCE_PX,
            step: DEFAULT_CORRECTION_STEP,
            selection: SelectionPolicy::default(),
            polarity: PanPolarity::default(),
        }
    }
}

impl TrackingBehavior {
    /// Angle deltas for a target centered at `target` in a frame centered at
    /// `center`, horizontal first. Axes inside the deadband yield nothing.
    pub fn plan(&self, target: (u32, u32), center: (u32, u32)) -> Vec<(ErrorAxis, i64, f32)> {
        let dx = target.0 as i64 - center.0 as i64;
        let dy = target.1 as i64 - center.1 as i64;
        let tolerance = self.tolerance_px as i64;
        let mut plan = Vec::with_capacity(2);

        if dx.abs() > tolerance {
            let delta = if dx < 0 { -self.step } else { self.step };
            plan.push((ErrorAxis::Horizontal, dx, delta * self.polarity.sign()));
        }
        if dy.abs() > tolerance {
            // Image y grows downwards: above center is negative.
            let delta = if dy < 0 { self.step } else { -self.step };
            plan.push((ErrorAxis::Vertical, dy, delta));
        }
        plan
    }

    /// Track one batch against a `frame_width` x `frame_height` frame.
    ///
    /// Every planned correction is a separate, settled servo move from the
    /// angle the previous one reached. A failed move is logged and skipped.
    pub fn track(
        &self,
        batch: &DetectionBatch,
        frame_width: u32,
        frame_height: u32,
        actuation: &mut ActuationInterface,
    ) -> TrackOutcome {
        let Some(target) = self.selection.select(batch) else {
            return TrackOutcome::default();
        };
        let center = (frame_width / 2, frame_height / 2);
        let mut outcome = TrackOutcome {
            target_present: true,
            ..TrackOutcome::default()
        };

        for (axis, error_px, delta) in self.plan(target.bbox.center(), center) {
            let from = actuation.angle();
            let to = from.offset(delta);
            log::debug!("moving {} ({:+} px): {} -> {}", describe(axis, delta), error_px, from, to);
            match actuation.set_angle(to) {
                Ok(settled) => outcome.corrections.push(Correction {
                    axis,
                    error_px,
                    from,
                    to: settled.angle,
                }),
                Err(e) => {
                    outcome.failed += 1;
                    log::warn!("correction {:?} failed: {:#}", axis, e);
                }
            }
        }
        outcome
    }
}

fn describe(axis: ErrorAxis, delta: f32) -> &'static str {
    match (axis, delta < 0.0) {
        (ErrorAxis::Horizontal, true) => "left",
        (ErrorAxis::Horizontal, false) => "right",
        (ErrorAxis::Vertical, true) => "down",
        (ErrorAxis::Vertical, false) => "up",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuation::{ActuationSettings, SimIndicator, SimServo, SimTrace};
    use crate::detect::BoundingBox;
    use std::time::Duration;

    fn actuation_at(angle: f32) -> (ActuationInterface, SimTrace) {
        let trace = SimTrace::new();
        let actuation = ActuationInterface::open(
            Box::new(SimServo::new(trace.clone())),
            Box::new(SimIndicator::new(trace.clone())),
            ActuationSettings {
                settle: Duration::ZERO,
                initial_angle: Angle::new(angle),
            },
        )
        .unwrap();
        (actuation, trace)
    }

    fn det_at(cx: u32, cy: u32, score: f32) -> Detection {
        Detection::new(BoundingBox::centered_at(cx, cy, 40, 40), score, "obj")
    }

    fn batch(detections: Vec<Detection>) -> DetectionBatch {
        DetectionBatch::new(detections, 0)
    }

    #[test]
    fn inside_deadband_no_correction() {
        let (mut actuation, trace) = actuation_at(90.0);
        let outcome = TrackingBehavior::default()
            .track(&batch(vec![det_at(325, 240, 0.9)]), 640, 480, &mut actuation);

        assert!(outcome.target_present);
        assert!(outcome.corrections.is_empty());
        assert!(trace.servo_angles().is_empty());
    }

    #[test]
    fn right_of_center_moves_one_step_right() {
        let (mut actuation, trace) = actuation_at(90.0);
        let outcome = TrackingBehavior::default()
            .track(&batch(vec![det_at(345, 240, 0.9)]), 640, 480, &mut actuation);

        assert_eq!(outcome.corrections.len(), 1);
        let c = outcome.corrections[0];
        assert_eq!(c.axis, ErrorAxis::Horizontal);
        assert_eq!(c.error_px, 25);
        assert_eq!(c.to, Angle::new(95.0));
        assert_eq!(trace.servo_angles().len(), 1);
        assert_eq!(actuation.angle(), Angle::new(95.0));
    }

    #[test]
    fn deadband_edge_is_exclusive() {
        let behavior = TrackingBehavior::default();
        assert!(behavior.plan((340, 260), (320, 240)).is_empty());
        assert_eq!(behavior.plan((341, 240), (320, 240)).len(), 1);
    }

    #[test]
    fn polarity_flips_horizontal_only() {
        let behavior = TrackingBehavior {
            polarity: PanPolarity::Inverted,
            ..TrackingBehavior::default()
        };
        let plan = behavior.plan((200, 100), (320, 240));
        assert_eq!(
            plan,
            vec![
                (ErrorAxis::Horizontal, -120, 5.0),
                (ErrorAxis::Vertical, -140, 5.0)
            ]
        );
    }

    #[test]
    fn both_axes_act_on_the_same_angle() {
        let (mut actuation, trace) = actuation_at(90.0);
        // Left of center (-5) and below center (-5): the axes compound.
        let outcome = TrackingBehavior::default()
            .track(&batch(vec![det_at(100, 400, 0.9)]), 640, 480, &mut actuation);

        assert_eq!(outcome.corrections.len(), 2);
        assert_eq!(outcome.corrections[1].from, Angle::new(85.0));
        assert_eq!(actuation.angle(), Angle::new(80.0));
        assert_eq!(trace.servo_angles().len(), 2);

        // Left (-5) and above (+5): the axes cancel, but both moves are still made.
        let outcome = TrackingBehavior::default()
            .track(&batch(vec![det_at(100, 50, 0.9)]), 640, 480, &mut actuation);
        assert_eq!(outcome.corrections.len(), 2);
        assert_eq!(actuation.angle(), Angle::new(80.0));
    }

    #[test]
    fn selection_policy_picks_one_detection() {
        let b = batch(vec![
            det_at(100, 240, 0.95),
            det_at(500, 240, 0.70),
            det_at(320, 240, 0.80),
        ]);
        assert_eq!(SelectionPolicy::Last.select(&b).map(|d| d.score), Some(0.80));
        assert_eq!(
            SelectionPolicy::HighestScore.select(&b).map(|d| d.score),
            Some(0.95)
        );

        // Last detection is centered, so only it is acted on: no move at all.
        let (mut actuation, trace) = actuation_at(90.0);
        let outcome = TrackingBehavior::default().track(&b, 640, 480, &mut actuation);
        assert!(outcome.corrections.is_empty());
        assert!(trace.servo_angles().is_empty());
    }

    #[test]
    fn empty_batch_has_no_target() {
        let (mut actuation, _trace) = actuation_at(90.0);
        let outcome = TrackingBehavior::default().track(&batch(vec![]), 640, 480, &mut actuation);
        assert!(!outcome.target_present);
    }

    #[test]
    fn corrections_clamp_at_servo_limits() {
        let (mut actuation, _trace) = actuation_at(178.0);
        let outcome = TrackingBehavior::default()
            .track(&batch(vec![det_at(600, 240, 0.9)]), 640, 480, &mut actuation);
        assert_eq!(outcome.corrections[0].to, Angle::new(180.0));
    }

    #[test]
    fn failed_correction_is_counted_not_fatal() {
        let (mut actuation, trace) = actuation_at(90.0);
        trace.fail_servo(true);
        let outcome = TrackingBehavior::default()
            .track(&batch(vec![det_at(600, 240, 0.9)]), 640, 480, &mut actuation);
        assert_eq!(outcome.failed, 1);
        assert!(outcome.corrections.is_empty());
        assert_eq!(actuation.angle(), Angle::new(90.0));
    }
}
