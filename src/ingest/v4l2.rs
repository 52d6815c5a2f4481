//! V4L2 camera source.
//!
//! Captures from a local device node (e.g. `/dev/video0`) through memory-mapped
//! buffers. RGB3 is requested; YUYV and NV12 devices are converted to RGB24.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::preprocess::{to_rgb, PixelFormat};
use super::{FrameSource, SourceStats};
use crate::frame::{now_ms, Frame};

/// Configuration for a V4L2 source.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

impl V4l2Config {
    /// Config for camera index `id` (`/dev/video{id}`).
    pub fn for_camera(id: u32, width: u32, height: u32) -> Self {
        Self {
            device: format!("/dev/video{id}"),
            width,
            height,
            ..Self::default()
        }
    }
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

pub struct V4l2Source {
    config: V4l2Config,
    state: Option<DeviceState>,
    format: PixelFormat,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            format: PixelFormat::Rgb24,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}

fn pixel_format(fourcc: &v4l::FourCC) -> Result<PixelFormat> {
    match &fourcc.repr {
        b"RGB3" => Ok(PixelFormat::Rgb24),
        b"BGR3" => Ok(PixelFormat::Bgr24),
        b"YUYV" => Ok(PixelFormat::Yuyv),
        b"NV12" => Ok(PixelFormat::Nv12),
        other => Err(anyhow!(
            "unsupported v4l2 pixel format {}",
            String::from_utf8_lossy(other)
        )),
    }
}

impl FrameSource for V4l2Source {
    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        self.format = pixel_format(&format.fourcc)?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.last_error = None;

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: connected to {} ({}x{} {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (buf, _meta) = state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                anyhow::Error::new(err).context("capture v4l2 frame")
            })?;
        let rgb = to_rgb(buf, self.active_width, self.active_height, self.format)?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        self.last_error = None;

        Frame::new(rgb, self.active_width, self.active_height, now_ms())
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            name: self.config.device.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_index_maps_to_device_node() {
        let config = V4l2Config::for_camera(2, 320, 240);
        assert_eq!(config.device, "/dev/video2");
        assert_eq!((config.width, config.height), (320, 240));
    }

    #[test]
    fn known_fourccs_map_to_pixel_formats() {
        assert_eq!(
            pixel_format(&v4l::FourCC::new(b"YUYV")).unwrap(),
            PixelFormat::Yuyv
        );
        assert!(pixel_format(&v4l::FourCC::new(b"MJPG")).is_err());
    }

    #[test]
    fn unconnected_source_fails_to_capture() {
        let mut source = V4l2Source::new(V4l2Config::default());
        assert!(source.next_frame().is_err());
        assert!(source.is_healthy());
    }
}
