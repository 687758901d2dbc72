use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::Detection;
use crate::error::DetectError;

/// Dataset-wide detection results: one growable list of detections per
/// (class, image) cell. The grid is sized up front from the known class and
/// image counts and never reshaped afterwards; class 0 (background) rows
/// stay empty. Written once per dataset pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionTable {
    num_classes: usize,
    num_images: usize,
    cells: Vec<Vec<Vec<Detection>>>,
}

impl DetectionTable {
    pub fn new(num_classes: usize, num_images: usize) -> Self {
        Self {
            num_classes,
            num_images,
            cells: vec![vec![Vec::new(); num_images]; num_classes],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn num_images(&self) -> usize {
        self.num_images
    }

    pub fn get(&self, class: usize, image: usize) -> &[Detection] {
        &self.cells[class][image]
    }

    pub fn set(&mut self, class: usize, image: usize, dets: Vec<Detection>) {
        self.cells[class][image] = dets;
    }

    pub fn cell_mut(&mut self, class: usize, image: usize) -> &mut Vec<Detection> {
        &mut self.cells[class][image]
    }

    /// Serialize the whole table to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), DetectError> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, DetectError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
