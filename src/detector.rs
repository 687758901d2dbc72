//! Per-image detection orchestration: build the input blob, hand it to the
//! network collaborator, optionally substitute fixed-point dump tensors for
//! the network's outputs, and post-process into score/box matrices.

use std::collections::HashMap;

use anyhow::{bail, Result};
use image::DynamicImage;
use ndarray::{s, Array2, Array4, ArrayD};

use crate::bbox_transform::{bbox_transform_inv, clip_boxes, tile_boxes};
use crate::data::TestConfig;
use crate::dump::DumpSession;
use crate::error::DetectError;
use crate::image_pyramid::image_to_blob;
use crate::rois::{dedup_rois, expand_rows, project_rois, rois_to_blob, select_rows};

/// Inputs handed to the network collaborator for one image.
#[derive(Debug, Clone)]
pub struct NetInputs {
    /// N x 3 x H x W pyramid blob.
    pub data: Array4<f32>,
    /// R x 5 (level, x1, y1, x2, y2) RoI blob, proposal mode only.
    pub rois: Option<Array2<f32>>,
    /// (blob height, blob width, scale), RPN mode only.
    pub im_info: Option<[f32; 3]>,
}

/// Named output tensors returned by the network collaborator.
#[derive(Debug, Clone, Default)]
pub struct NetOutputs {
    tensors: HashMap<String, ArrayD<f32>>,
}

impl NetOutputs {
    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.tensors.get(name)
    }
}

/// Opaque, blocking forward pass. Inference itself is outside this crate.
pub trait Network {
    fn forward(&mut self, inputs: NetInputs) -> Result<NetOutputs>;
}

/// Detect object classes in one image.
///
/// Returns `(scores, boxes)`: an R x K class-score matrix (class 0 is
/// background) and an R x 4K matrix of predicted boxes, one 4-column group
/// per class, with R matching the original proposal count even when
/// deduplication collapsed rows for inference.
///
/// When `dump` is given, the network's `rois`, `cls_prob` and `bbox_pred`
/// outputs are replaced by their fixed-point reference dumps for image
/// `img_idx`; a layer missing from every dump location aborts the run.
pub fn detect_image<N: Network>(
    net: &mut N,
    im: &DynamicImage,
    proposals: Option<&Array2<f32>>,
    img_idx: usize,
    cfg: &TestConfig,
    mut dump: Option<&mut DumpSession>,
) -> Result<(Array2<f32>, Array2<f32>)> {
    let blob = image_to_blob(im, &cfg.pyramid, cfg.pixel_means)?;

    let (mut boxes, roi_blob, dedup) = if cfg.has_rpn {
        (Array2::<f32>::zeros((0, 4)), None, None)
    } else {
        let Some(proposals) = proposals else {
            bail!("proposal-driven mode requires an external proposal set");
        };
        let mut boxes = proposals.to_owned();
        let (projected, levels) = project_rois(proposals.view(), &blob.scales);
        let mut rois = rois_to_blob(&projected, &levels);

        // Distinct image RoIs can alias to the same feature RoI; compute
        // features only on the unique subset.
        let mut dedup = None;
        if cfg.dedup_precision > 0.0 {
            let index = dedup_rois(&rois, cfg.dedup_precision);
            rois = select_rows(&rois, &index.keep);
            boxes = select_rows(&boxes, &index.keep);
            dedup = Some(index);
        }
        (boxes, Some(rois), dedup)
    };

    let im_info = if cfg.has_rpn {
        if blob.scales.len() != 1 {
            return Err(DetectError::MultiScaleRpn(blob.scales.len()).into());
        }
        let shape = blob.data.shape();
        Some([shape[2] as f32, shape[3] as f32, blob.scales[0]])
    } else {
        None
    };

    let outputs = net.forward(NetInputs {
        data: blob.data.clone(),
        rois: roi_blob,
        im_info,
    })?;

    if cfg.has_rpn {
        let Some(rois) = outputs.get("rois") else {
            bail!("network produced no `rois` output in RPN mode");
        };
        let mut rois = to_matrix(rois)?;
        if let Some(session) = dump.as_deref_mut() {
            let fixed = session.fetch_layer("roi", "output__rois", img_idx, rois.shape())?;
            rois = to_matrix(&fixed)?;
        }
        // Unscale RPN proposals back to raw image space.
        boxes = rois.slice(s![.., 1..5]).to_owned();
        boxes.mapv_inplace(|v| v / blob.scales[0]);
    }

    let score_name = if cfg.svm { "cls_score" } else { "cls_prob" };
    let Some(raw_scores) = outputs.get(score_name) else {
        bail!("network produced no `{score_name}` output");
    };
    let mut scores = to_matrix(raw_scores)?;
    if !cfg.svm {
        if let Some(session) = dump.as_deref_mut() {
            let fixed = session.fetch_layer("score", "cls_prob", img_idx, scores.shape())?;
            scores = to_matrix(&fixed)?;
        }
    }

    let mut pred_boxes = if cfg.bbox_reg {
        let Some(raw_deltas) = outputs.get("bbox_pred") else {
            bail!("network produced no `bbox_pred` output");
        };
        let mut deltas = to_matrix(raw_deltas)?;
        if let Some(session) = dump.as_deref_mut() {
            let fixed = session.fetch_layer("bbox", "bbox_pred", img_idx, deltas.shape())?;
            deltas = to_matrix(&fixed)?;
        }
        let mut pred = bbox_transform_inv(&boxes, &deltas)?;
        clip_boxes(&mut pred, im.height() as usize, im.width() as usize);
        pred
    } else {
        tile_boxes(&boxes, scores.ncols())
    };

    // Map predictions back onto the original proposal ordering; duplicate
    // proposals share identical rows.
    if let Some(index) = dedup {
        scores = expand_rows(&scores, &index.inverse);
        pred_boxes = expand_rows(&pred_boxes, &index.inverse);
    }

    Ok((scores, pred_boxes))
}

/// Collapse a dyn-shaped tensor into a 2-D matrix, folding trailing
/// dimensions into columns.
fn to_matrix(tensor: &ArrayD<f32>) -> Result<Array2<f32>, DetectError> {
    let rows = *tensor.shape().first().unwrap_or(&0);
    if rows == 0 {
        return Ok(Array2::zeros((0, 0)));
    }
    let cols = tensor.len() / rows;
    let flat: Vec<f32> = tensor.iter().copied().collect();
    Ok(Array2::from_shape_vec((rows, cols), flat)?)
}
