//! Captured frames.
//!
//! - `Frame`: RGB24 pixels plus dimensions and capture timestamp.
//!
//! Frames are produced by an ingest source, handed to the asynchronous detector by
//! value, and dropped by the detector worker once inference has run. The control
//! loop only ever sees the detector's results, never the pixels.

use anyhow::{anyhow, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Bytes per pixel for RGB24.
pub const RGB_CHANNELS: usize = 3;

/// One RGB24 frame.
///
/// Not `Clone`: frames move through the pipeline, they are not duplicated.
#[derive(Debug)]
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Capture time in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl Frame {
    /// Build a frame, checking that the pixel buffer matches the dimensions.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, timestamp_ms: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            timestamp_ms,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// RGB triple at `(x, y)`. Panics when out of bounds, like slice indexing.
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }

    /// Frame center, the target point for tracking.
    pub fn center(&self) -> (u32, u32) {
        (self.width / 2, self.height / 2)
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(RGB_CHANNELS))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

/// Milliseconds since the Unix epoch. Falls back to zero if the clock is before 1970.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_mismatched_buffer() {
        assert!(Frame::new(vec![0u8; 10], 2, 2, 0).is_err());
        assert!(Frame::new(vec![0u8; 12], 2, 2, 0).is_ok());
    }

    #[test]
    fn rgb_at_reads_row_major() -> Result<()> {
        let mut pixels = vec![0u8; 2 * 2 * 3];
        pixels[(2 + 1) * 3] = 200;
        let frame = Frame::new(pixels, 2, 2, 7)?;
        assert_eq!(frame.rgb_at(1, 1), [200, 0, 0]);
        assert_eq!(frame.rgb_at(0, 1), [0, 0, 0]);
        assert_eq!(frame.center(), (1, 1));
        Ok(())
    }
}
