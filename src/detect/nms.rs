use crate::detect::result::Detection;

/// Intersection-over-union of two corner+size boxes.
pub fn iou(ax: f32, ay: f32, aw: f32, ah: f32, bx: f32, by: f32, bw: f32, bh: f32) -> f32 {
    let (ax2, ay2) = (ax + aw, ay + ah);
    let (bx2, by2) = (bx + bw, by + bh);

    let ix_a = ax.max(bx);
    let iy_a = ay.max(by);
    let ix_b = ax2.min(bx2);
    let iy_b = ay2.min(by2);

    let iw = (ix_b - ix_a).max(0.0);
    let ih = (iy_b - iy_a).max(0.0);
    let inter = iw * ih;
    let area_a = aw.max(0.0) * ah.max(0.0);
    let area_b = bw.max(0.0) * bh.max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedy non-max suppression.
///
/// Keeps the highest-confidence detection of each overlapping group,
/// suppressing any later box whose IoU with a kept box reaches `iou_th`.
pub fn nms_filter(mut dets: Vec<Detection>, iou_th: f32) -> Vec<Detection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut kept: Vec<Detection> = Vec::new();

    'outer: for d in dets {
        for k in &kept {
            if iou(d.x, d.y, d.w, d.h, k.x, k.y, k.w, k.h) >= iou_th {
                continue 'outer;
            }
        }
        kept.push(d);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(confidence: f32, x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection::new("person", 0, confidence, [x, y, w, h])
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let v = iou(0.1, 0.1, 0.5, 0.5, 0.1, 0.1, 0.5, 0.5);
        assert!((v - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(iou(0.0, 0.0, 0.2, 0.2, 0.5, 0.5, 0.2, 0.2), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        // Two 0.2x0.2 boxes offset by half a width: inter 0.02, union 0.06.
        let v = iou(0.0, 0.0, 0.2, 0.2, 0.1, 0.0, 0.2, 0.2);
        assert!((v - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn nms_suppresses_overlapping_keeps_highest() {
        let dets = vec![
            det(0.7, 0.40, 0.40, 0.20, 0.20),
            det(0.9, 0.41, 0.41, 0.20, 0.20),
            det(0.8, 0.05, 0.05, 0.10, 0.10),
        ];
        let kept = nms_filter(dets, 0.5);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.8);
    }

    #[test]
    fn nms_keeps_everything_below_threshold_overlap() {
        let dets = vec![
            det(0.9, 0.0, 0.0, 0.2, 0.2),
            det(0.8, 0.5, 0.5, 0.2, 0.2),
        ];
        let kept = nms_filter(dets, 0.5);
        assert_eq!(kept.len(), 2);
    }
}
