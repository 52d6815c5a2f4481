//! Frame preprocessing.
//!
//! Converts captured buffers to RGB24 and brings frames to the geometry the
//! detector and the tracker expect: the configured resolution, upright.

use anyhow::{anyhow, Result};

use super::{FrameSource, SourceStats};
use crate::frame::{rgb_len, Frame, RGB_CHANNELS};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Nv12,
    Yuyv,
}

/// Convert a captured buffer to RGB24.
pub fn to_rgb(pixels: &[u8], width: u32, height: u32, format: PixelFormat) -> Result<Vec<u8>> {
    match format {
        PixelFormat::Rgb24 => {
            check_len(pixels, rgb_len(width, height)?, "RGB")?;
            Ok(pixels.to_vec())
        }
        PixelFormat::Bgr24 => {
            check_len(pixels, rgb_len(width, height)?, "BGR")?;
            let mut rgb = pixels.to_vec();
            swap_red_blue(&mut rgb);
            Ok(rgb)
        }
        PixelFormat::Nv12 => nv12_to_rgb(pixels, width, height),
        PixelFormat::Yuyv => yuyv_to_rgb(pixels, width, height),
    }
}

fn check_len(pixels: &[u8], expected: usize, what: &str) -> Result<()> {
    if pixels.len() != expected {
        return Err(anyhow!(
            "{} frame length mismatch: expected {}, got {}",
            what,
            expected,
            pixels.len()
        ));
    }
    Ok(())
}

/// Swap the first and third channel of every pixel in place (RGB <-> BGR).
pub fn swap_red_blue(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(RGB_CHANNELS) {
        px.swap(0, 2);
    }
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    [
        clamp_to_u8(y + 1.402 * v),
        clamp_to_u8(y - 0.344_136 * u - 0.714_136 * v),
        clamp_to_u8(y + 1.772 * u),
    ]
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    check_len(pixels, y_plane + y_plane / 2, "NV12")?;

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let px = yuv_to_rgb(pixels[j * w + i], pixels[uv_index], pixels[uv_index + 1]);
            let offset = (j * w + i) * 3;
            rgb[offset..offset + 3].copy_from_slice(&px);
        }
    }
    Ok(rgb)
}

fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    if width % 2 != 0 {
        return Err(anyhow!("YUYV frames need an even width, got {}", width));
    }
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(2))
        .ok_or_else(|| anyhow!("YUYV frame dimensions overflow"))?;
    check_len(pixels, expected, "YUYV")?;

    let mut rgb = Vec::with_capacity(expected / 2 * 3);
    for quad in pixels.chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Nearest-neighbor resize of an RGB24 buffer.
pub fn resize_nearest(pixels: &[u8], width: u32, height: u32, out_w: u32, out_h: u32) -> Vec<u8> {
    if (width, height) == (out_w, out_h) {
        return pixels.to_vec();
    }
    let mut out = Vec::with_capacity(out_w as usize * out_h as usize * RGB_CHANNELS);
    for y in 0..out_h as usize {
        let sy = y * height as usize / out_h as usize;
        for x in 0..out_w as usize {
            let sx = x * width as usize / out_w as usize;
            let idx = (sy * width as usize + sx) * RGB_CHANNELS;
            out.extend_from_slice(&pixels[idx..idx + RGB_CHANNELS]);
        }
    }
    out
}

/// Rotate an RGB24 buffer by 180 degrees in place (flip both axes).
pub fn rotate_180(pixels: &mut [u8]) {
    let n = pixels.len() / RGB_CHANNELS;
    for i in 0..n / 2 {
        let j = n - 1 - i;
        for c in 0..RGB_CHANNELS {
            pixels.swap(i * RGB_CHANNELS + c, j * RGB_CHANNELS + c);
        }
    }
}

/// Geometry applied to every captured frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Preprocess {
    pub width: u32,
    pub height: u32,
    /// The camera is mounted upside down.
    pub rotate_180: bool,
}

impl Preprocess {
    pub fn apply(&self, frame: Frame) -> Result<Frame> {
        if (frame.width, frame.height) == (self.width, self.height) && !self.rotate_180 {
            return Ok(frame);
        }
        let (w, h, ts) = (frame.width, frame.height, frame.timestamp_ms);
        let mut pixels = resize_nearest(&frame.into_pixels(), w, h, self.width, self.height);
        if self.rotate_180 {
            rotate_180(&mut pixels);
        }
        Frame::new(pixels, self.width, self.height, ts)
    }
}

/// Source wrapper that preprocesses every frame.
pub struct PreprocessedSource {
    inner: Box<dyn FrameSource>,
    preprocess: Preprocess,
}

impl PreprocessedSource {
    pub fn new(inner: Box<dyn FrameSource>, preprocess: Preprocess) -> Self {
        Self { inner, preprocess }
    }
}

impl FrameSource for PreprocessedSource {
    fn connect(&mut self) -> Result<()> {
        self.inner.connect()
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let frame = self.inner.next_frame()?;
        self.preprocess.apply(frame)
    }

    fn is_healthy(&self) -> bool {
        self.inner.is_healthy()
    }

    fn stats(&self) -> SourceStats {
        self.inner.stats()
    }
}
