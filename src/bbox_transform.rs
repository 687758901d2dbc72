//! Pure box-geometry transforms: applying regression deltas, clipping to
//! image bounds, and replicating boxes across class columns.

use ndarray::Array2;

use crate::error::DetectError;

/// Apply regression deltas to base boxes.
///
/// `boxes` is R x 4 corner-form; `deltas` is R x 4K with one
/// (dx, dy, dw, dh) group per class. Each group is decoded independently:
/// the delta shifts the box center by a fraction of its size and rescales
/// width/height through `exp`. Widths and heights use the inclusive-pixel
/// convention.
pub fn bbox_transform_inv(
    boxes: &Array2<f32>,
    deltas: &Array2<f32>,
) -> Result<Array2<f32>, DetectError> {
    if boxes.nrows() != deltas.nrows() {
        return Err(DetectError::ShapeError(format!(
            "boxes ({}) and deltas ({}) disagree on row count",
            boxes.nrows(),
            deltas.nrows()
        )));
    }
    if boxes.ncols() != 4 || deltas.ncols() % 4 != 0 {
        return Err(DetectError::ShapeError(format!(
            "expected R x 4 boxes and R x 4K deltas, got R x {} and R x {}",
            boxes.ncols(),
            deltas.ncols()
        )));
    }

    let mut pred = Array2::<f32>::zeros(deltas.raw_dim());
    for r in 0..boxes.nrows() {
        let w = boxes[[r, 2]] - boxes[[r, 0]] + 1.0;
        let h = boxes[[r, 3]] - boxes[[r, 1]] + 1.0;
        let ctr_x = boxes[[r, 0]] + 0.5 * w;
        let ctr_y = boxes[[r, 1]] + 0.5 * h;

        for k in (0..deltas.ncols()).step_by(4) {
            let dx = deltas[[r, k]];
            let dy = deltas[[r, k + 1]];
            let dw = deltas[[r, k + 2]];
            let dh = deltas[[r, k + 3]];

            let pred_ctr_x = dx * w + ctr_x;
            let pred_ctr_y = dy * h + ctr_y;
            let pred_w = dw.exp() * w;
            let pred_h = dh.exp() * h;

            pred[[r, k]] = pred_ctr_x - 0.5 * pred_w;
            pred[[r, k + 1]] = pred_ctr_y - 0.5 * pred_h;
            pred[[r, k + 2]] = pred_ctr_x + 0.5 * pred_w;
            pred[[r, k + 3]] = pred_ctr_y + 0.5 * pred_h;
        }
    }
    Ok(pred)
}

/// Clamp every box corner into [0, width-1] x [0, height-1], in place.
/// Operates on R x 4K matrices, one corner group per class.
pub fn clip_boxes(boxes: &mut Array2<f32>, image_height: usize, image_width: usize) {
    let max_x = image_width as f32 - 1.0;
    let max_y = image_height as f32 - 1.0;
    for r in 0..boxes.nrows() {
        for k in (0..boxes.ncols()).step_by(4) {
            boxes[[r, k]] = boxes[[r, k]].clamp(0.0, max_x);
            boxes[[r, k + 1]] = boxes[[r, k + 1]].clamp(0.0, max_y);
            boxes[[r, k + 2]] = boxes[[r, k + 2]].clamp(0.0, max_x);
            boxes[[r, k + 3]] = boxes[[r, k + 3]].clamp(0.0, max_y);
        }
    }
}

/// Replicate R x 4 boxes once per class column group, for the path where
/// regression is disabled.
pub fn tile_boxes(boxes: &Array2<f32>, num_classes: usize) -> Array2<f32> {
    let mut tiled = Array2::<f32>::zeros((boxes.nrows(), 4 * num_classes));
    for r in 0..boxes.nrows() {
        for k in 0..num_classes {
            for j in 0..4 {
                tiled[[r, 4 * k + j]] = boxes[[r, j]];
            }
        }
    }
    tiled
}
