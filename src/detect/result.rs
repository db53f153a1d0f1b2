use serde::Serialize;

/// One model-produced labeled bounding box.
///
/// The box is normalized to [0,1] in model coordinates: `x`/`y` are the
/// lower-left corner with `y` measured upward from the bottom edge.
/// Screen-space conversion (including the vertical flip) happens in the
/// overlay renderer, not here.
#[derive(Clone, Debug, Serialize)]
pub struct Detection {
    pub label: String,
    pub class_id: usize,
    /// Score in [0,1]; backends only emit detections at or above the
    /// confidence threshold.
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Detection {
    pub fn new(label: impl Into<String>, class_id: usize, confidence: f32, bbox: [f32; 4]) -> Self {
        let [x, y, w, h] = bbox;
        Self {
            label: label.into(),
            class_id,
            confidence,
            x,
            y,
            w,
            h,
        }
    }
}
