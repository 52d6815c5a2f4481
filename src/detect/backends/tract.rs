#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Values per output row: `[x_min, y_min, x_max, y_max, score, class]`.
const ROW_LEN: usize = 6;

/// Tract-based backend for ONNX object detection models.
///
/// Expects a model taking a `1x3xHxW` float input in [0,1] and producing a
/// `1xNx6` tensor of normalized corner boxes with score and class index.
/// Rows below the model's own confidence floor are dropped here; the
/// configured score threshold is applied later by the detector worker.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    confidence_floor: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            confidence_floor: 0.05,
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        if frame.width != self.width || frame.height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            ));
        }

        let width = frame.width as usize;
        let pixels = frame.pixels();
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, frame.height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn extract_detections(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let values = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let flat: Vec<f32> = values.iter().copied().collect();
        if flat.len() % ROW_LEN != 0 {
            return Err(anyhow!(
                "model output length {} is not a multiple of {}",
                flat.len(),
                ROW_LEN
            ));
        }

        let (w, h) = (self.width as f32, self.height as f32);
        let detections = flat
            .chunks_exact(ROW_LEN)
            .filter(|row| row[4].is_finite() && row[4] >= self.confidence_floor)
            .map(|row| {
                let x_min = (row[0].clamp(0.0, 1.0) * w) as u32;
                let y_min = (row[1].clamp(0.0, 1.0) * h) as u32;
                let x_max = (row[2].clamp(0.0, 1.0) * w) as u32;
                let y_max = (row[3].clamp(0.0, 1.0) * h) as u32;
                let bbox = BoundingBox::new(
                    x_min,
                    y_min,
                    x_max.saturating_sub(x_min),
                    y_max.saturating_sub(y_min),
                );
                let class = row[5].max(0.0) as usize;
                Detection::new(bbox, row[4], format!("class_{class}"))
            })
            .collect();
        Ok(detections)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract_detections(outputs)
    }
}
