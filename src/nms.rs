//! Greedy non-maximum suppression over scored boxes.

use crate::data::Detection;

/// Run greedy NMS and return the indices of surviving detections, ordered
/// by descending score.
///
/// The highest-scoring remaining candidate is emitted, then every remaining
/// candidate overlapping it with IoU above `iou_threshold` is discarded.
/// Score ties keep original array order (stable sort), so the result is
/// deterministic for any input.
pub fn nms(dets: &[Detection], iou_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..dets.len()).collect();
    order.sort_by(|&a, &b| dets[b].score.total_cmp(&dets[a].score));

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];
    for pos in 0..order.len() {
        let i = order[pos];
        if suppressed[i] {
            continue;
        }
        keep.push(i);
        for &j in &order[pos + 1..] {
            if !suppressed[j] && dets[i].bbox.iou(&dets[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }
    keep
}

/// Convenience wrapper returning the surviving detections themselves.
pub fn nms_filter(dets: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    nms(dets, iou_threshold).into_iter().map(|i| dets[i]).collect()
}
