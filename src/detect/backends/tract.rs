#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;
use tract_onnx::tract_hir::infer::Factoid;
use tract_onnx::tract_hir::internal::DimLike;

use crate::detect::backend::DetectorBackend;
use crate::detect::nms::nms_filter;
use crate::detect::result::Detection;
use crate::settings::Thresholds;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract-based backend for ONNX object detection.
///
/// Loads a local model file and decodes YOLO-style output rows
/// `[cx, cy, w, h, objectness, class scores...]` into labeled detections,
/// applying the confidence filter and NMS per the supplied thresholds.
/// The input size is read from the model's declared input shape when the
/// model pins it; a configured fallback covers dynamic-shape exports.
pub struct TractBackend {
    model: RunnableModel,
    width: u32,
    height: u32,
    labels: Vec<String>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    ///
    /// `fallback_size` is only consulted when the model does not declare
    /// concrete input dimensions.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        labels: Vec<String>,
        fallback_size: (u32, u32),
    ) -> Result<Self> {
        if labels.is_empty() {
            return Err(anyhow!("detector requires at least one class label"));
        }
        let model_path = model_path.as_ref();
        let inference_model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?;

        let (width, height) = declared_input_size(&inference_model).unwrap_or(fallback_size);
        if width == 0 || height == 0 {
            return Err(anyhow!(
                "model input size resolved to {}x{}",
                width,
                height
            ));
        }

        let model = inference_model
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
            labels,
        })
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        if width != self.width || height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                width,
                height,
                self.width,
                self.height
            ));
        }

        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;

        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let width = width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, thresholds: Thresholds) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let raw: Vec<f32> = view.iter().copied().collect();

        let stride = 5 + self.labels.len();
        let num_preds = raw.len() / stride;
        let mut kept = Vec::new();

        for i in 0..num_preds {
            let base = i * stride;
            let cx = raw[base];
            let cy = raw[base + 1];
            let w = raw[base + 2];
            let h = raw[base + 3];
            let obj = raw[base + 4];

            let mut best_class = 0usize;
            let mut best_score = 0.0f32;
            for (c, &score) in raw[base + 5..base + stride].iter().enumerate() {
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }
            let confidence = obj * best_score;
            if confidence < thresholds.confidence {
                continue;
            }

            // Model rows are center-based with y growing downward; the
            // detection type carries a lower-left-origin box.
            let x = (cx - w / 2.0).clamp(0.0, 1.0);
            let y = (1.0 - (cy + h / 2.0)).clamp(0.0, 1.0);
            let w = w.clamp(0.0, 1.0 - x);
            let h = h.clamp(0.0, 1.0 - y);

            kept.push(Detection::new(
                self.labels[best_class].clone(),
                best_class,
                confidence,
                [x, y, w, h],
            ));
        }

        Ok(nms_filter(kept, thresholds.iou))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn detect(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        thresholds: Thresholds,
    ) -> Result<Vec<Detection>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, thresholds)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = vec![0u8; (self.width * self.height * 3) as usize];
        let input = self.build_input(&blank, self.width, self.height)?;
        self.model
            .run(tvec!(input.into()))
            .context("ONNX warm-up inference failed")?;
        Ok(())
    }
}

/// Read concrete NCHW input dimensions from the model, if declared.
fn declared_input_size(model: &InferenceModel) -> Option<(u32, u32)> {
    let fact = model.input_fact(0).ok()?;
    let dims: Vec<Option<usize>> = fact
        .shape
        .dims()
        .map(|dim| dim.concretize().and_then(|d| d.to_usize().ok()))
        .collect();
    if dims.len() != 4 {
        return None;
    }
    match (dims[2], dims[3]) {
        (Some(h), Some(w)) if h > 0 && w > 0 => Some((w as u32, h as u32)),
        _ => None,
    }
}
