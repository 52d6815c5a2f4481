//! Frame ingestion sources.
//!
//! This module provides the sources the tracker can capture from:
//! - Synthetic scenes (`stub://…`, testing and bench runs)
//! - USB/CSI cameras through V4L2 (feature: ingest-v4l2)
//!
//! Every source yields RGB24 `Frame`s. `PreprocessedSource` brings them to the
//! configured resolution and orientation before they reach the detector.
//!
//! A failed capture is reported as an error from `next_frame`; the control loop
//! treats it as a skipped cycle, never as fatal.

pub mod preprocess;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

pub use preprocess::{Preprocess, PreprocessedSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

use crate::config::CameraSettings;
use crate::frame::Frame;

/// A camera or camera-like frame producer.
pub trait FrameSource {
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame.
    fn next_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub name: String,
}

/// Open (but do not connect) the source described by the camera settings.
///
/// `stub://` URLs select the synthetic source; anything else is camera index
/// `settings.id` through V4L2. The result is wrapped in preprocessing.
pub fn open_source(settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let inner: Box<dyn FrameSource> = if settings.source.starts_with("stub://") {
        Box::new(SyntheticSource::new(SyntheticConfig {
            url: settings.source.clone(),
            width: settings.width,
            height: settings.height,
            ..SyntheticConfig::default()
        })?)
    } else {
        #[cfg(feature = "ingest-v4l2")]
        {
            let mut config = V4l2Config::for_camera(settings.id, settings.width, settings.height);
            if settings.source.starts_with("/dev/") {
                config.device = settings.source.clone();
            }
            Box::new(V4l2Source::new(config))
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            anyhow::bail!(
                "camera source '{}' requires the ingest-v4l2 feature",
                settings.source
            )
        }
    };

    Ok(Box::new(PreprocessedSource::new(
        inner,
        Preprocess {
            width: settings.width,
            height: settings.height,
            rotate_180: settings.rotate_180,
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_camera(rotate_180: bool) -> CameraSettings {
        CameraSettings {
            id: 0,
            source: "stub://bench".to_string(),
            width: 320,
            height: 240,
            rotate_180,
        }
    }

    #[test]
    fn stub_url_opens_a_rotated_synthetic_source() -> Result<()> {
        let mut upright = open_source(&stub_camera(false))?;
        let mut rotated = open_source(&stub_camera(true))?;
        upright.connect()?;
        rotated.connect()?;

        let a = upright.next_frame()?;
        let b = rotated.next_frame()?;
        assert_eq!((b.width, b.height), (320, 240));
        assert_eq!(b.pixels().len(), 320 * 240 * 3);
        assert_ne!(a.pixels(), b.pixels());
        for (x, y) in [(0, 0), (100, 50), (319, 239), (200, 180)] {
            assert_eq!(b.rgb_at(x, y), a.rgb_at(319 - x, 239 - y));
        }
        assert_eq!(rotated.stats().name, "stub://bench");
        Ok(())
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn camera_source_needs_v4l2_feature() {
        let mut settings = stub_camera(false);
        settings.source = "v4l2".to_string();
        assert!(open_source(&settings).is_err());
    }
}
