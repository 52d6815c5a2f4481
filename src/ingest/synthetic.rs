//! Synthetic frame source (`stub://…`).
//!
//! Renders bright squares drifting over a dark background. The scene is a pure
//! function of the frame index, so runs are reproducible; optional sensor noise
//! is the only randomness. Pairs with the `cpu` bright-blob backend for bench
//! runs without a camera.

use anyhow::{anyhow, Result};
use rand::Rng;

use super::{FrameSource, SourceStats};
use crate::frame::{now_ms, Frame};

const BACKGROUND: u8 = 16;
const OBJECT: u8 = 240;
const NOISE_AMPLITUDE: i16 = 6;
const OBJECT_SIDE: u32 = 48;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Number of squares in the scene.
    pub objects: usize,
    /// Add per-pixel noise.
    pub noise: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 640,
            height: 480,
            objects: 2,
            noise: false,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if config.width < OBJECT_SIDE * 2 || config.height < OBJECT_SIDE * 2 {
            return Err(anyhow!(
                "synthetic frames must be at least {}x{}",
                OBJECT_SIDE * 2,
                OBJECT_SIDE * 2
            ));
        }
        Ok(Self {
            config,
            frame_count: 0,
            connected: false,
        })
    }

    /// Top-left corners of the squares in frame `index`.
    pub fn object_positions(&self, index: u64) -> Vec<(u32, u32)> {
        let span_x = (self.config.width - OBJECT_SIDE) as f32;
        let span_y = (self.config.height - OBJECT_SIDE) as f32;
        (0..self.config.objects)
            .map(|i| {
                let phase = index as f32 * 0.05 + i as f32 * 2.1;
                let x = (phase.sin() * 0.5 + 0.5) * span_x;
                let y = ((phase * 0.7).cos() * 0.25 + 0.5) * span_y;
                (x as u32, y as u32)
            })
            .collect()
    }

    fn render(&self, index: u64) -> Vec<u8> {
        let (w, h) = (self.config.width as usize, self.config.height as usize);
        let mut pixels = vec![BACKGROUND; w * h * 3];

        for (ox, oy) in self.object_positions(index) {
            for y in oy as usize..(oy + OBJECT_SIDE) as usize {
                let row = y * w * 3;
                pixels[row + ox as usize * 3..row + (ox + OBJECT_SIDE) as usize * 3].fill(OBJECT);
            }
        }

        if self.config.noise {
            let mut rng = rand::thread_rng();
            for p in pixels.iter_mut() {
                let n = rng.gen_range(-NOISE_AMPLITUDE..=NOISE_AMPLITUDE);
                *p = (*p as i16 + n).clamp(0, 255) as u8;
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{}, {} objects)",
            self.config.url,
            self.config.width,
            self.config.height,
            self.config.objects
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("synthetic source not connected"));
        }
        let pixels = self.render(self.frame_count);
        self.frame_count += 1;
        Frame::new(pixels, self.config.width, self.config.height, now_ms())
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            name: self.config.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_requires_connect() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig::default())?;
        assert!(source.next_frame().is_err());
        source.connect()?;
        let frame = source.next_frame()?;
        assert_eq!((frame.width, frame.height), (640, 480));
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn objects_are_rendered_bright_on_dark() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig::default())?;
        source.connect()?;
        let positions = source.object_positions(0);
        let frame = source.next_frame()?;

        for (x, y) in positions {
            let c = OBJECT_SIDE / 2;
            assert_eq!(frame.rgb_at(x + c, y + c), [OBJECT; 3]);
        }
        assert_eq!(frame.rgb_at(0, 0), [BACKGROUND; 3]);
        Ok(())
    }

    #[test]
    fn objects_stay_inside_frame() -> Result<()> {
        let source = SyntheticSource::new(SyntheticConfig {
            objects: 3,
            ..SyntheticConfig::default()
        })?;
        for index in 0..500 {
            for (x, y) in source.object_positions(index) {
                assert!(x + OBJECT_SIDE <= 640);
                assert!(y + OBJECT_SIDE <= 480);
            }
        }
        Ok(())
    }

    #[test]
    fn tiny_frames_are_rejected() {
        let config = SyntheticConfig {
            width: 32,
            height: 32,
            ..SyntheticConfig::default()
        };
        assert!(SyntheticSource::new(config).is_err());
    }
}
