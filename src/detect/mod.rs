mod backend;
mod backends;
mod result;
mod worker;

use anyhow::{anyhow, Result};

pub use backend::DetectorBackend;
pub use backends::{BrightBlobBackend, ScriptedBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, Detection, DetectionBatch};
pub use worker::{AsyncDetector, DetectorOptions, DetectorStats, ResultCallback};

use crate::config::DetectorSettings;

/// Instantiate the backend named in the detector settings.
///
/// `width`/`height` are the frame size the backend will see.
pub fn build_backend(
    settings: &DetectorSettings,
    width: u32,
    height: u32,
) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend.as_str() {
        "cpu" => Ok(Box::new(BrightBlobBackend::new())),
        "stub" => Ok(Box::new(ScriptedBackend::new())),
        "tract" => {
            #[cfg(feature = "backend-tract")]
            {
                Ok(Box::new(TractBackend::new(&settings.model_path, width, height)?))
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                let _ = (width, height);
                Err(anyhow!(
                    "detector backend 'tract' requires the backend-tract feature"
                ))
            }
        }
        other => Err(anyhow!("unknown detector backend '{}'", other)),
    }
}
