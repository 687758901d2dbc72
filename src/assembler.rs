//! Turns raw per-image score and box matrices into final per-class
//! detection lists: low-score gating, per-class NMS, and the cross-class
//! per-image cap.

use ndarray::Array2;

use crate::data::{BBox, Detection, DetectionTable, TestConfig};
use crate::error::DetectError;
use crate::nms::{nms, nms_filter};

/// Build per-class candidate lists from an R x K score matrix and an
/// R x 4K box matrix, then suppress within each class.
///
/// Returns K lists; index 0 (background) stays empty. Empty lists for any
/// class are normal.
pub fn assemble_image(
    scores: &Array2<f32>,
    boxes: &Array2<f32>,
    cfg: &TestConfig,
) -> Result<Vec<Vec<Detection>>, DetectError> {
    let num_classes = scores.ncols();
    if boxes.ncols() != 4 * num_classes {
        return Err(DetectError::ShapeError(format!(
            "box matrix has {} columns, expected {} for {} classes",
            boxes.ncols(),
            4 * num_classes,
            num_classes
        )));
    }
    if boxes.nrows() != scores.nrows() {
        return Err(DetectError::ShapeError(format!(
            "scores ({}) and boxes ({}) disagree on row count",
            scores.nrows(),
            boxes.nrows()
        )));
    }

    let mut per_class = vec![Vec::new(); num_classes];
    // Class 0 is background and never reported.
    for j in 1..num_classes {
        let mut candidates = Vec::new();
        for r in 0..scores.nrows() {
            let score = scores[[r, j]];
            if score > cfg.score_threshold {
                let bbox = BBox::new(
                    boxes[[r, 4 * j]],
                    boxes[[r, 4 * j + 1]],
                    boxes[[r, 4 * j + 2]],
                    boxes[[r, 4 * j + 3]],
                );
                candidates.push(Detection::new(bbox, score));
            }
        }
        per_class[j] = nms_filter(&candidates, cfg.nms_threshold);
    }
    Ok(per_class)
}

/// Enforce the cross-class cap on detections for one image.
///
/// When the union of all classes exceeds `max_per_image`, the
/// `max_per_image`-th highest score overall becomes a global threshold and
/// every class keeps only detections scoring at or above it. The comparison
/// is inclusive, so ties at the cutoff survive and the final count can
/// slightly exceed the cap. A cap of 0 disables the limit.
pub fn apply_image_cap(per_class: &mut [Vec<Detection>], max_per_image: usize) {
    if max_per_image == 0 {
        return;
    }
    let mut image_scores: Vec<f32> = per_class
        .iter()
        .skip(1)
        .flat_map(|dets| dets.iter().map(|d| d.score))
        .collect();
    if image_scores.len() <= max_per_image {
        return;
    }
    image_scores.sort_by(|a, b| b.total_cmp(a));
    let image_thresh = image_scores[max_per_image - 1];
    for dets in per_class.iter_mut().skip(1) {
        dets.retain(|d| d.score >= image_thresh);
    }
}

/// Re-run NMS over every cell of a persisted detection table.
pub fn apply_nms_to_table(table: &DetectionTable, iou_threshold: f32) -> DetectionTable {
    let mut out = DetectionTable::new(table.num_classes(), table.num_images());
    for cls in 0..table.num_classes() {
        for img in 0..table.num_images() {
            let dets = table.get(cls, img);
            if dets.is_empty() {
                continue;
            }
            let keep = nms(dets, iou_threshold);
            out.set(cls, img, keep.into_iter().map(|i| dets[i]).collect());
        }
    }
    out
}
