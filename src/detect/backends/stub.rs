use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::coco_labels;
use crate::detect::nms::nms_filter;
use crate::detect::result::Detection;
use crate::settings::Thresholds;

/// Input size matching the 416x416 models the stub stands in for.
const STUB_INPUT: (u32, u32) = (416, 416);

/// Stub backend for tests and demos.
///
/// Emits deterministic synthetic detections derived from a pixel hash
/// whenever the frame content changes; a static scene produces none.
/// Thresholds are honored the same way a real backend honors them:
/// confidence filter first, then NMS.
pub struct StubBackend {
    last_hash: Option<[u8; 32]>,
    labels: Vec<String>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            last_hash: None,
            labels: coco_labels(),
        }
    }

    pub fn with_labels(labels: Vec<String>) -> Self {
        Self {
            last_hash: None,
            labels,
        }
    }

    fn synth_detection(&self, bytes: &[u8]) -> Detection {
        let w = 0.10 + f32::from(bytes[2]) / 255.0 * 0.25;
        let h = 0.10 + f32::from(bytes[3]) / 255.0 * 0.25;
        let x = f32::from(bytes[0]) / 255.0 * (1.0 - w);
        let y = f32::from(bytes[1]) / 255.0 * (1.0 - h);
        let confidence = 0.55 + f32::from(bytes[4]) / 255.0 * 0.44;
        let class_id = bytes[5] as usize % self.labels.len();
        Detection::new(
            self.labels[class_id].clone(),
            class_id,
            confidence,
            [x, y, w, h],
        )
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_size(&self) -> (u32, u32) {
        STUB_INPUT
    }

    fn detect(
        &mut self,
        pixels: &[u8],
        _width: u32,
        _height: u32,
        thresholds: Thresholds,
    ) -> Result<Vec<Detection>> {
        let current: [u8; 32] = Sha256::digest(pixels).into();
        let changed = match self.last_hash {
            Some(prev) => prev != current,
            None => false,
        };
        self.last_hash = Some(current);

        if !changed {
            return Ok(Vec::new());
        }

        let count = 1 + (current[0] as usize) % 2;
        let raw: Vec<Detection> = (0..count)
            .map(|i| self.synth_detection(&current[i * 8..i * 8 + 8]))
            .collect();

        let kept: Vec<Detection> = raw
            .into_iter()
            .filter(|d| d.confidence >= thresholds.confidence)
            .collect();
        Ok(nms_filter(kept, thresholds.iou))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_thresholds() -> Thresholds {
        Thresholds {
            confidence: 0.0,
            iou: 0.6,
        }
    }

    #[test]
    fn first_frame_produces_nothing() {
        let mut backend = StubBackend::new();
        let dets = backend.detect(b"frame1", 416, 416, open_thresholds()).unwrap();
        assert!(dets.is_empty());
    }

    #[test]
    fn changed_content_produces_detections() {
        let mut backend = StubBackend::new();
        backend.detect(b"frame1", 416, 416, open_thresholds()).unwrap();
        let dets = backend.detect(b"frame2", 416, 416, open_thresholds()).unwrap();
        assert!(!dets.is_empty());
        assert!(dets.len() <= 2);
        for d in &dets {
            assert!((0.0..=1.0).contains(&d.x));
            assert!((0.0..=1.0).contains(&d.y));
            assert!(d.x + d.w <= 1.0 + 1e-5);
            assert!(d.y + d.h <= 1.0 + 1e-5);
            assert!(d.confidence >= 0.55);
            assert!(!d.label.is_empty());
        }
    }

    #[test]
    fn static_scene_produces_nothing() {
        let mut backend = StubBackend::new();
        backend.detect(b"frame1", 416, 416, open_thresholds()).unwrap();
        backend.detect(b"frame2", 416, 416, open_thresholds()).unwrap();
        let dets = backend.detect(b"frame2", 416, 416, open_thresholds()).unwrap();
        assert!(dets.is_empty());
    }

    #[test]
    fn confidence_threshold_filters_everything_at_max() {
        let mut backend = StubBackend::new();
        backend.detect(b"frame1", 416, 416, open_thresholds()).unwrap();
        let strict = Thresholds {
            confidence: 1.0,
            iou: 0.6,
        };
        let dets = backend.detect(b"frame2", 416, 416, strict).unwrap();
        assert!(dets.is_empty());
    }

    #[test]
    fn detections_are_deterministic_for_identical_input() {
        let mut a = StubBackend::new();
        let mut b = StubBackend::new();
        for backend in [&mut a, &mut b] {
            backend.detect(b"frame1", 416, 416, open_thresholds()).unwrap();
        }
        let da = a.detect(b"frame2", 416, 416, open_thresholds()).unwrap();
        let db = b.detect(b"frame2", 416, 416, open_thresholds()).unwrap();
        assert_eq!(da.len(), db.len());
        for (x, y) in da.iter().zip(db.iter()) {
            assert_eq!(x.label, y.label);
            assert_eq!(x.confidence, y.confidence);
            assert_eq!(x.x, y.x);
        }
    }
}
