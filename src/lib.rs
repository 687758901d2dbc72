//! Post-processing pipeline for two-stage object detectors: image pyramid
//! construction, RoI projection and deduplication, box regression decoding,
//! per-class non-maximum suppression, and a fixed-point dump decoder for
//! bit-exact verification against a quantized reference implementation.
//!
//! The network forward pass, dataset semantics and evaluation metrics are
//! external collaborators reached through the [`detector::Network`],
//! [`driver::ImageDatabase`] and [`driver::Evaluator`] traits.

pub mod assembler;
pub mod bbox_transform;
pub mod data;
pub mod detector;
pub mod driver;
pub mod dump;
mod error;
pub mod image_pyramid;
pub mod nms;
pub mod rois;

pub use error::DetectError;

pub type Result<T, E = DetectError> = std::result::Result<T, E>;

pub use assembler::{apply_image_cap, apply_nms_to_table, assemble_image};
pub use bbox_transform::{bbox_transform_inv, clip_boxes, tile_boxes};
pub use data::{BBox, Detection, DetectionTable, PyramidPolicy, TestConfig};
pub use detector::{detect_image, NetInputs, NetOutputs, Network};
pub use driver::{test_net, Evaluator, ImageDatabase, DETECTIONS_FILE};
pub use dump::{DumpSession, LayerDumpMeta, LayerLayout};
pub use image_pyramid::{image_to_blob, ImageBlob};
pub use nms::{nms, nms_filter};
pub use rois::{dedup_rois, expand_rows, project_rois, rois_to_blob, DedupIndex};
