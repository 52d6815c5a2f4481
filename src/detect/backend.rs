use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend runs one synchronous inference pass. The asynchronous contract
/// (fire-and-forget submission, callback delivery, dropped frames) is layered on
/// top by `AsyncDetector`, so backends stay simple and testable.
///
/// Backends are moved onto the detector worker thread and must be `Send`.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Returned boxes are in frame-pixel coordinates. Score filtering and the
    /// max-results cap are applied by the caller.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
