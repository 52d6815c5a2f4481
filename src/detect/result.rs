use serde::{Deserialize, Serialize};

/// Axis-aligned box in frame-pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box of the given extent whose center lands on `(cx, cy)`.
    ///
    /// Saturates at the frame origin, so a box wider than `2 * cx` is shifted.
    pub fn centered_at(cx: u32, cy: u32, width: u32, height: u32) -> Self {
        Self {
            x: cx.saturating_sub(width / 2),
            y: cy.saturating_sub(height / 2),
            width,
            height,
        }
    }

    /// Center point. Integer division, matching detectors that report whole pixels.
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Shrink the box so it lies entirely within a `frame_width` x `frame_height` frame.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Self {
        let x = self.x.min(frame_width);
        let y = self.y.min(frame_height);
        Self {
            x,
            y,
            width: self.width.min(frame_width - x),
            height: self.height.min(frame_height - y),
        }
    }
}

/// One recognized object instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f32,
    /// Class label. Opaque to the controller.
    pub label: String,
}

impl Detection {
    pub fn new(bbox: BoundingBox, score: f32, label: impl Into<String>) -> Self {
        Self {
            bbox,
            score,
            label: label.into(),
        }
    }
}

/// All detections from one inference pass.
///
/// Not `Clone`: a batch moves from the detector into the mailbox and from the
/// mailbox into exactly one control cycle.
#[derive(Debug, Default, PartialEq)]
pub struct DetectionBatch {
    pub detections: Vec<Detection>,
    /// Capture timestamp of the frame this batch was inferred from.
    pub timestamp_ms: u64,
}

impl DetectionBatch {
    pub fn new(detections: Vec<Detection>, timestamp_ms: u64) -> Self {
        Self {
            detections,
            timestamp_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_uses_integer_half_extent() {
        let bbox = BoundingBox::new(100, 50, 41, 21);
        assert_eq!(bbox.center(), (120, 60));
    }

    #[test]
    fn centered_at_round_trips_for_even_extents() {
        let bbox = BoundingBox::centered_at(345, 240, 40, 40);
        assert_eq!(bbox.center(), (345, 240));
    }

    #[test]
    fn clamp_keeps_box_inside_frame() {
        let bbox = BoundingBox::new(600, 470, 100, 100).clamp_to(640, 480);
        assert_eq!(bbox, BoundingBox::new(600, 470, 40, 10));

        let outside = BoundingBox::new(700, 500, 10, 10).clamp_to(640, 480);
        assert_eq!(outside.width, 0);
        assert_eq!(outside.height, 0);
    }
}
