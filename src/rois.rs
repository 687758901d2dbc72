//! Projects region proposals from original image space into pyramid space
//! and collapses duplicate RoIs before they reach the network.

use ndarray::{s, Array2, ArrayView2, Axis};

/// Canonical RoI target area used for pyramid level assignment.
const LEVEL_TARGET_AREA: f32 = 224.0 * 224.0;

/// Field weights for the dedup hash; spacing of 1e3 keeps rounded fields
/// from bleeding into each other.
const DEDUP_WEIGHTS: [f64; 5] = [1.0, 1e3, 1e6, 1e9, 1e12];

/// Project R x 4 RoIs into pyramid coordinates.
///
/// With a single scale every RoI is multiplied through and tagged level 0.
/// With several, each RoI lands on the level whose scaled area is closest
/// to 224x224; ties go to the lowest level index.
pub fn project_rois(rois: ArrayView2<f32>, scales: &[f32]) -> (Array2<f32>, Vec<usize>) {
    let n = rois.nrows();
    let levels: Vec<usize> = if scales.len() > 1 {
        rois.axis_iter(Axis(0))
            .map(|roi| {
                let w = roi[2] - roi[0] + 1.0;
                let h = roi[3] - roi[1] + 1.0;
                let area = w * h;
                let mut best = 0usize;
                let mut best_diff = f32::INFINITY;
                for (i, s) in scales.iter().enumerate() {
                    let diff = (area * s * s - LEVEL_TARGET_AREA).abs();
                    if diff < best_diff {
                        best_diff = diff;
                        best = i;
                    }
                }
                best
            })
            .collect()
    } else {
        vec![0; n]
    };

    let mut projected = rois.to_owned();
    for (mut row, &level) in projected.axis_iter_mut(Axis(0)).zip(levels.iter()) {
        let scale = scales[level];
        row.mapv_inplace(|v| v * scale);
    }
    (projected, levels)
}

/// Prepend the pyramid level to each projected RoI, yielding the R x 5
/// (level, x1, y1, x2, y2) blob the network consumes.
pub fn rois_to_blob(projected: &Array2<f32>, levels: &[usize]) -> Array2<f32> {
    let n = projected.nrows();
    let mut blob = Array2::<f32>::zeros((n, 5));
    for i in 0..n {
        blob[[i, 0]] = levels[i] as f32;
        for j in 0..4 {
            blob[[i, j + 1]] = projected[[i, j]];
        }
    }
    blob
}

/// Mapping from a deduplicated RoI set back to the original ordering.
#[derive(Debug, Clone)]
pub struct DedupIndex {
    /// Original-row index of the first occurrence of each distinct key,
    /// ordered by ascending key.
    pub keep: Vec<usize>,
    /// For every original row, the position of its key within `keep`.
    pub inverse: Vec<usize>,
}

/// Collapse RoIs that become identical once rounded to `precision`.
///
/// Each R x 5 row is packed into a single scalar by weighting the rounded
/// fields with increasing powers of ten, then distinct scalars are kept
/// first-occurrence-wins. Rounding ties go to even.
pub fn dedup_rois(blob: &Array2<f32>, precision: f32) -> DedupIndex {
    let hashes: Vec<f64> = blob
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .zip(DEDUP_WEIGHTS.iter())
                .map(|(&v, &w)| ((v * precision).round_ties_even() as f64) * w)
                .sum()
        })
        .collect();

    let mut distinct = hashes.clone();
    distinct.sort_by(|a, b| a.total_cmp(b));
    distinct.dedup();

    let mut keep = vec![usize::MAX; distinct.len()];
    let mut inverse = Vec::with_capacity(hashes.len());
    for (i, h) in hashes.iter().enumerate() {
        // Every hash is present in the distinct set by construction.
        let k = match distinct.binary_search_by(|d| d.total_cmp(h)) {
            Ok(k) | Err(k) => k,
        };
        inverse.push(k);
        if keep[k] == usize::MAX {
            keep[k] = i;
        }
    }
    DedupIndex { keep, inverse }
}

/// Gather the given rows of a matrix, in order.
pub fn select_rows(matrix: &Array2<f32>, rows: &[usize]) -> Array2<f32> {
    let cols = matrix.ncols();
    let mut out = Array2::<f32>::zeros((rows.len(), cols));
    for (dst, &src) in rows.iter().enumerate() {
        out.slice_mut(s![dst, ..]).assign(&matrix.slice(s![src, ..]));
    }
    out
}

/// Expand per-unique-RoI predictions back to one row per original RoI;
/// duplicate originals share identical rows.
pub fn expand_rows(matrix: &Array2<f32>, inverse: &[usize]) -> Array2<f32> {
    select_rows(matrix, inverse)
}
