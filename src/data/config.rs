use serde::{Deserialize, Serialize};

/// How the pyramid builder maps an input image onto network input geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PyramidPolicy {
    /// Single scale chosen so the image fits inside a fixed canvas; the
    /// remainder of the canvas is zero-padded on the bottom/right. The
    /// network input is always exactly `height` x `width`.
    FixedCanvas { height: u32, width: u32 },
    /// One pyramid level per target short-side length, each capped so the
    /// long side never exceeds `max_size`. No per-level padding beyond
    /// batching to the largest level.
    ShortSide { targets: Vec<u32>, max_size: u32 },
}

/// Test-time configuration for the detection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    /// Per-channel pixel means, subtracted before resizing. Channel order
    /// matches the decoded image (RGB for images loaded via `image`).
    pub pixel_means: [f32; 3],
    pub pyramid: PyramidPolicy,
    /// Proposals come from an RPN head inside the network rather than from
    /// an external proposal file.
    pub has_rpn: bool,
    /// Apply bounding-box regression deltas; when false, proposal boxes are
    /// replicated once per class.
    pub bbox_reg: bool,
    /// Use raw SVM scores (`cls_score`) instead of softmax (`cls_prob`).
    pub svm: bool,
    /// Coordinate rounding precision for RoI deduplication; <= 0 disables.
    pub dedup_precision: f32,
    /// Low score gate applied before per-class NMS.
    pub score_threshold: f32,
    /// IoU threshold for per-class NMS.
    pub nms_threshold: f32,
    /// Cross-class cap on detections per image; 0 disables.
    pub max_per_image: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            pixel_means: [122.7717, 115.9465, 102.9801],
            pyramid: PyramidPolicy::FixedCanvas {
                height: 600,
                width: 1000,
            },
            has_rpn: false,
            bbox_reg: true,
            svm: false,
            dedup_precision: 1.0 / 16.0,
            score_threshold: 0.05,
            nms_threshold: 0.3,
            max_per_image: 100,
        }
    }
}

impl TestConfig {
    pub fn with_pyramid(mut self, pyramid: PyramidPolicy) -> Self {
        self.pyramid = pyramid;
        self
    }

    pub fn with_rpn(mut self, has_rpn: bool) -> Self {
        self.has_rpn = has_rpn;
        self
    }

    pub fn with_bbox_reg(mut self, bbox_reg: bool) -> Self {
        self.bbox_reg = bbox_reg;
        self
    }

    pub fn with_dedup_precision(mut self, precision: f32) -> Self {
        self.dedup_precision = precision;
        self
    }

    pub fn with_thresholds(mut self, score: f32, nms: f32) -> Self {
        self.score_threshold = score;
        self.nms_threshold = nms;
        self
    }

    pub fn with_max_per_image(mut self, max_per_image: usize) -> Self {
        self.max_per_image = max_per_image;
        self
    }
}
