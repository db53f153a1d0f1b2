//! Overlay projection and drawing.
//!
//! Detections carry normalized boxes in model coordinates (lower-left
//! origin). Screen space has its origin at the top-left, so projection
//! flips the vertical axis while scaling to the viewport. Each detection
//! pass builds a fresh `OverlaySet` that fully replaces the previous one;
//! clearing the overlay is building an empty set.

use image::{Rgba, RgbaImage};
use serde::Serialize;

use crate::detect::Detection;

const BOX_BORDER_PX: u32 = 3;
const LABEL_STRIP_PX: u32 = 14;
const BOX_COLOR: Rgba<u8> = Rgba([255, 255, 0, 200]);
const LABEL_COLOR: Rgba<u8> = Rgba([32, 32, 32, 220]);

/// Screen dimensions the overlay is projected into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A detection box in screen space (top-left origin, pixels).
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ScreenRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Project a normalized detection box into screen space.
///
/// Pure function of its inputs: converting the same detection twice with
/// the same viewport yields identical rectangles.
pub fn project(detection: &Detection, viewport: Viewport) -> ScreenRect {
    let vw = viewport.width as f32;
    let vh = viewport.height as f32;
    ScreenRect {
        x: detection.x * vw,
        y: vh - (detection.y + detection.h) * vh,
        width: detection.w * vw,
        height: detection.h * vh,
    }
}

/// One drawable layer: a box rectangle plus its label text.
#[derive(Clone, Debug, Serialize)]
pub struct OverlayLayer {
    pub rect: ScreenRect,
    pub text: String,
}

/// The full overlay for one detection pass.
#[derive(Clone, Debug, Serialize)]
pub struct OverlaySet {
    pub viewport: Viewport,
    pub layers: Vec<OverlayLayer>,
}

impl OverlaySet {
    pub fn empty(viewport: Viewport) -> Self {
        Self {
            viewport,
            layers: Vec::new(),
        }
    }

    /// Build the overlay for a detection pass. One layer per detection;
    /// the caller replaces any previous set with the result.
    pub fn build(detections: &[Detection], viewport: Viewport) -> Self {
        let layers = detections
            .iter()
            .map(|det| OverlayLayer {
                rect: project(det, viewport),
                text: label_text(&det.label, det.confidence),
            })
            .collect();
        Self { viewport, layers }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Draw box borders and label strips onto a preview image.
    ///
    /// The image is expected to match the overlay's viewport; rectangles
    /// are clamped to the image bounds either way.
    pub fn render_onto(&self, img: &mut RgbaImage) {
        for layer in &self.layers {
            if let Some(bounds) = clamp_rect(&layer.rect, img.dimensions()) {
                draw_border(img, bounds, BOX_COLOR, BOX_BORDER_PX);
                draw_label_strip(img, bounds, LABEL_COLOR);
            }
        }
    }
}

fn label_text(label: &str, confidence: f32) -> String {
    format!(
        "{}\nConfidence: {}%",
        label,
        (confidence * 100.0).round() as i32
    )
}

/// Clamp a screen rect to image bounds, returning integer corners
/// [x0, y0, x1, y1] or None when the rect lies fully outside.
fn clamp_rect(rect: &ScreenRect, dims: (u32, u32)) -> Option<[u32; 4]> {
    let (w, h) = dims;
    if w == 0 || h == 0 || rect.width <= 0.0 || rect.height <= 0.0 {
        return None;
    }
    let x0 = rect.x.max(0.0);
    let y0 = rect.y.max(0.0);
    let x1 = (rect.x + rect.width).min(w as f32 - 1.0);
    let y1 = (rect.y + rect.height).min(h as f32 - 1.0);
    if x1 < 0.0 || y1 < 0.0 || x0 > x1 || y0 > y1 {
        return None;
    }
    Some([x0 as u32, y0 as u32, x1 as u32, y1 as u32])
}

fn draw_border(img: &mut RgbaImage, bounds: [u32; 4], color: Rgba<u8>, thickness: u32) {
    let (w, h) = img.dimensions();
    let [x0, y0, x1, y1] = bounds;
    for t in 0..thickness {
        let xx0 = x0.saturating_add(t);
        let yy0 = y0.saturating_add(t);
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 >= w || yy0 >= h || xx0 > xx1 || yy0 > yy1 {
            continue;
        }
        for x in xx0..=xx1.min(w - 1) {
            img.put_pixel(x, yy0, color);
            if yy1 < h {
                img.put_pixel(x, yy1, color);
            }
        }
        for y in yy0..=yy1.min(h - 1) {
            img.put_pixel(xx0, y, color);
            if xx1 < w {
                img.put_pixel(xx1, y, color);
            }
        }
    }
}

fn draw_label_strip(img: &mut RgbaImage, bounds: [u32; 4], color: Rgba<u8>) {
    let (w, h) = img.dimensions();
    let [x0, y0, x1, _] = bounds;
    let strip_bottom = y0.saturating_add(LABEL_STRIP_PX).min(h.saturating_sub(1));
    for y in y0..=strip_bottom {
        for x in x0..=x1.min(w.saturating_sub(1)) {
            img.put_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;

    fn cup() -> Detection {
        Detection::new("cup", 41, 0.82, [0.4, 0.4, 0.2, 0.2])
    }

    #[test]
    fn projection_flips_vertical_axis() {
        let viewport = Viewport::new(1000, 2000);
        let rect = project(&cup(), viewport);
        assert_eq!(rect.x, 400.0);
        assert_eq!(rect.y, 800.0);
        assert_eq!(rect.width, 200.0);
        assert_eq!(rect.height, 400.0);
    }

    #[test]
    fn projection_is_idempotent_for_same_viewport() {
        let viewport = Viewport::new(750, 1334);
        let det = cup();
        assert_eq!(project(&det, viewport), project(&det, viewport));
    }

    #[test]
    fn one_layer_per_detection_with_label_text() {
        let viewport = Viewport::new(1000, 2000);
        let set = OverlaySet::build(&[cup()], viewport);
        assert_eq!(set.len(), 1);
        assert_eq!(set.layers[0].text, "cup\nConfidence: 82%");
    }

    #[test]
    fn zero_detections_yields_empty_overlay() {
        let viewport = Viewport::new(640, 480);
        let set = OverlaySet::build(&[], viewport);
        assert!(set.is_empty());

        // Replacing a populated set with the new pass clears everything.
        let prior = OverlaySet::build(&[cup()], viewport);
        assert_eq!(prior.len(), 1);
        let replaced = OverlaySet::build(&[], viewport);
        assert_eq!(replaced.len(), 0);
    }

    #[test]
    fn build_replaces_rather_than_merges() {
        let viewport = Viewport::new(640, 480);
        let two = vec![
            Detection::new("cup", 41, 0.9, [0.1, 0.1, 0.2, 0.2]),
            Detection::new("person", 0, 0.8, [0.6, 0.5, 0.3, 0.4]),
        ];
        let set = OverlaySet::build(&two, viewport);
        assert_eq!(set.len(), 2);
        let next = OverlaySet::build(&two[..1], viewport);
        assert_eq!(next.len(), 1);
    }

    #[test]
    fn render_marks_box_pixels() {
        let viewport = Viewport::new(100, 100);
        let det = Detection::new("cup", 41, 0.9, [0.2, 0.2, 0.4, 0.4]);
        let set = OverlaySet::build(&[det], viewport);

        let mut img = RgbaImage::new(100, 100);
        set.render_onto(&mut img);

        let rect = set.layers[0].rect;
        let border = img.get_pixel(rect.x as u32, rect.y as u32);
        assert_ne!(border, &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn render_clamps_out_of_bounds_rects() {
        let viewport = Viewport::new(100, 100);
        let det = Detection::new("cup", 41, 0.9, [0.9, 0.0, 0.5, 0.5]);
        let set = OverlaySet::build(&[det], viewport);
        let mut img = RgbaImage::new(100, 100);
        // Must not panic on rects spilling past the image edge.
        set.render_onto(&mut img);
    }

    #[test]
    fn confidence_percent_rounds() {
        assert_eq!(label_text("dog", 0.75), "dog\nConfidence: 75%");
        assert_eq!(label_text("dog", 1.0), "dog\nConfidence: 100%");
    }
}
