//! Frame scaling to the detector's input dimensions.
//!
//! The scaler performs a direct resize (no letterboxing), matching the
//! scale-fill crop behavior the detection models are calibrated against.
//! Scaling failure is recoverable: the caller skips inference for that
//! frame but still publishes the raw frame to the preview.

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::frame::{RawFrame, ScaledFrame};

/// Scales raw frames to a fixed target size.
///
/// The target is supplied by the active detector backend's declared input
/// shape rather than hardcoded here.
#[derive(Clone, Copy, Debug)]
pub struct FrameScaler {
    width: u32,
    height: u32,
}

impl FrameScaler {
    pub fn new(input_size: (u32, u32)) -> Result<Self> {
        let (width, height) = input_size;
        if width == 0 || height == 0 {
            return Err(anyhow!(
                "scaler target size must be non-zero, got {}x{}",
                width,
                height
            ));
        }
        Ok(Self { width, height })
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Resize a raw frame to the target dimensions.
    pub fn scale(&self, frame: &RawFrame) -> Result<ScaledFrame> {
        let src = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .with_context(|| {
                format!(
                    "frame buffer does not match {}x{} RGB",
                    frame.width, frame.height
                )
            })?;

        let resized = if frame.width == self.width && frame.height == self.height {
            src
        } else {
            imageops::resize(&src, self.width, self.height, FilterType::Triangle)
        };

        Ok(ScaledFrame {
            data: resized.into_raw(),
            width: self.width,
            height: self.height,
        })
    }
}
