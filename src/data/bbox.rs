use serde::{Deserialize, Serialize};

/// Axis-aligned box with inclusive integer-pixel corner convention:
/// a box covering a single pixel has `x1 == x2` and width 1.
#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Width under the inclusive-pixel convention.
    pub fn width(&self) -> f32 {
        self.x2 - self.x1 + 1.0
    }

    /// Height under the inclusive-pixel convention.
    pub fn height(&self) -> f32 {
        self.y2 - self.y1 + 1.0
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection area with another box, zero when disjoint.
    pub fn intersect(&self, other: &BBox) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1) + 1.0).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1) + 1.0).max(0.0);
        w * h
    }

    pub fn union(&self, other: &BBox) -> f32 {
        self.area() + other.area() - self.intersect(other)
    }

    /// Intersection over union.
    pub fn iou(&self, other: &BBox) -> f32 {
        self.intersect(other) / self.union(other)
    }
}

/// One scored box. The owning class is implied by the per-class list
/// (or `DetectionTable` cell) that holds it.
#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BBox,
    pub score: f32,
}

impl Detection {
    pub fn new(bbox: BBox, score: f32) -> Self {
        Self { bbox, score }
    }
}
