//! Threshold settings shared between the control API and the detector.
//!
//! Values arrive from the control surface as percentages (0-100) and are
//! normalized to [0,1] before storage. Each update overwrites the prior
//! value; no history is retained. Readers take a snapshot per inference.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use serde::Serialize;

/// Normalized detection thresholds, each in [0,1].
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Thresholds {
    /// Minimum score for a detection to be kept.
    pub confidence: f32,
    /// Overlap ratio above which duplicate detections are suppressed.
    pub iou: f32,
}

impl Thresholds {
    pub fn confidence_pct(&self) -> f64 {
        to_pct(self.confidence)
    }

    pub fn iou_pct(&self) -> f64 {
        to_pct(self.iou)
    }
}

/// Present a stored ratio as a percentage, rounded to two decimals so
/// f32 storage noise does not leak into the control surface.
fn to_pct(ratio: f32) -> f64 {
    (f64::from(ratio) * 100.0 * 100.0).round() / 100.0
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            confidence: 0.7,
            iou: 0.6,
        }
    }
}

/// Shared threshold store.
///
/// Written by the control API, read by every detector invocation.
pub struct ThresholdStore {
    inner: RwLock<Thresholds>,
}

impl ThresholdStore {
    /// Seed the store from percentage values (0-100).
    pub fn new(confidence_pct: f64, iou_pct: f64) -> Result<Self> {
        let thresholds = Thresholds {
            confidence: normalize_percent(confidence_pct, "confidence")?,
            iou: normalize_percent(iou_pct, "iou")?,
        };
        Ok(Self {
            inner: RwLock::new(thresholds),
        })
    }

    /// Snapshot for a single inference pass.
    pub fn snapshot(&self) -> Thresholds {
        *self.inner.read().expect("threshold store lock poisoned")
    }

    /// Apply new percentage values, overwriting the stored thresholds.
    ///
    /// Returns the normalized values now in effect.
    pub fn apply_percent(&self, confidence_pct: f64, iou_pct: f64) -> Result<Thresholds> {
        let thresholds = Thresholds {
            confidence: normalize_percent(confidence_pct, "confidence")?,
            iou: normalize_percent(iou_pct, "iou")?,
        };
        *self.inner.write().expect("threshold store lock poisoned") = thresholds;
        Ok(thresholds)
    }
}

impl Default for ThresholdStore {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Thresholds::default()),
        }
    }
}

fn normalize_percent(value: f64, name: &str) -> Result<f32> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(anyhow!(
            "{} threshold must be a percentage in 0-100, got {}",
            name,
            value
        ));
    }
    Ok((value / 100.0) as f32)
}
