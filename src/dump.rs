//! Decoder for quantized layer dumps written by a fixed-point reference
//! implementation of the network.
//!
//! Two naming conventions exist side by side in a dump directory:
//!
//! * `<layer>-mapdata.bin` — a 48+ byte header carrying layout, element
//!   width, quantization scale and (for detection-style layers) box counts,
//!   paired with `<layer>-<8-digit-index>.bin` raw dumps per image;
//! * `<layer>-elem.bin` — a short 3-field header (element type, element
//!   size, scale) paired with the same per-index dump files.
//!
//! [`DumpSession::fetch_layer`] hides both behind one ordered-fallback
//! lookup. Metadata is parsed once per layer name and cached for the
//! session; the dump directory is read-only for a run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::{ArrayD, IxDyn};

use crate::error::DetectError;

const MAPDATA_MIN_LEN: usize = 48;
const MAPDATA_SCALE_OFFSET: usize = 8;
const MAPDATA_BBOX_OFFSET: usize = 16;

const LAYOUT_CONTIGUOUS_3D: u8 = 0;
const LAYOUT_FEATURE_MAPS_3D: u8 = 1;
const LAYOUT_BBOX: u8 = 2;

/// Box-count block of a detection-style layer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BboxCounts {
    pub alloc_count: i32,
    pub valid_count: i32,
    pub bbox_scale: i32,
    pub confidence_scale: i32,
}

/// Tensor layout of a dumped layer. Each variant carries what its shape
/// derivation needs, so decoding is total over the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerLayout {
    /// maps x height x width volume, densely packed.
    Contiguous3d,
    /// maps x height x width volume, one plane per feature map.
    FeatureMaps3d,
    /// Flat list of 7-field detections (class, score, 4 coords, reserved).
    Bbox(BboxCounts),
}

/// Parsed `<layer>-mapdata.bin` header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerDumpMeta {
    pub layout: LayerLayout,
    pub element_type: u8,
    /// Element byte width, 1 or 2.
    pub element_size: u8,
    pub num_maps: usize,
    pub width: usize,
    pub height: usize,
    /// Fixed-point scale; raw integers divide by this to recover floats.
    pub scale: f32,
}

impl LayerDumpMeta {
    /// Logical (batch, channels, height, width) shape before any per-image
    /// batch inference.
    pub fn layer_shape(&self) -> [usize; 4] {
        match self.layout {
            LayerLayout::Bbox(counts) => [1, 1, counts.alloc_count.max(0) as usize, 7],
            LayerLayout::Contiguous3d | LayerLayout::FeatureMaps3d => {
                [1, self.num_maps, self.height, self.width]
            }
        }
    }
}

/// One verification session over a read-only dump directory. Owns the
/// per-layer metadata cache; metadata is never invalidated.
#[derive(Debug)]
pub struct DumpSession {
    dir: PathBuf,
    meta_cache: HashMap<String, LayerDumpMeta>,
}

impl DumpSession {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            meta_cache: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Parse (or fetch from cache) the mapdata header for a layer.
    /// Returns `Ok(None)` when the file is absent, too short, or carries an
    /// unrecognized layout tag.
    pub fn mapdata(&mut self, layer: &str) -> Result<Option<LayerDumpMeta>, DetectError> {
        if let Some(meta) = self.meta_cache.get(layer) {
            return Ok(Some(*meta));
        }
        let path = self.dir.join(format!("{layer}-mapdata.bin"));
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        if bytes.len() < MAPDATA_MIN_LEN {
            log::warn!(
                "mapdata header {} is {} bytes, need at least {MAPDATA_MIN_LEN}; skipping",
                path.display(),
                bytes.len()
            );
            return Ok(None);
        }

        let layout = match bytes[0] {
            LAYOUT_CONTIGUOUS_3D => LayerLayout::Contiguous3d,
            LAYOUT_FEATURE_MAPS_3D => LayerLayout::FeatureMaps3d,
            LAYOUT_BBOX => LayerLayout::Bbox(read_bbox_counts(&bytes[MAPDATA_BBOX_OFFSET..])),
            tag => {
                log::warn!("unrecognized layout tag {tag} in {}; skipping", path.display());
                return Ok(None);
            }
        };
        let meta = LayerDumpMeta {
            layout,
            element_type: bytes[1],
            element_size: bytes[2],
            num_maps: bytes[3] as usize,
            width: bytes[4] as usize,
            height: bytes[5] as usize,
            scale: read_f32_le(&bytes[MAPDATA_SCALE_OFFSET..]),
        };
        self.meta_cache.insert(layer.to_string(), meta);
        Ok(Some(meta))
    }

    /// Decode one per-image dump under the mapdata convention.
    ///
    /// `target_shape`, when supplied, overrides the header-derived shape;
    /// its leading (batch) dimension is recomputed from the element count so
    /// quantization packing mismatches reshape instead of failing.
    pub fn parse_layer_dump(
        &mut self,
        layer: &str,
        idx: usize,
        target_shape: Option<&[usize]>,
    ) -> Result<Option<ArrayD<f32>>, DetectError> {
        let path = self.dump_path(layer, idx);
        if !path.exists() {
            return Ok(None);
        }
        let meta = match self.mapdata(layer)? {
            Some(meta) => meta,
            None => return Ok(None),
        };

        let bytes = std::fs::read(&path)?;
        let (values, shape) = match meta.layout {
            LayerLayout::Bbox(_) => {
                // Detection layers dump full-precision 7-field rows.
                let values = read_f64_le(&bytes);
                let count = values.len() / 7;
                (values, vec![1, 1, count, 7])
            }
            LayerLayout::Contiguous3d | LayerLayout::FeatureMaps3d => {
                let volume = meta.num_maps * meta.height * meta.width;
                if volume == 0 {
                    log::warn!(
                        "layer {layer}: mapdata header describes an empty volume; skipping"
                    );
                    return Ok(None);
                }
                let Some(values) = read_quantized(&bytes, meta.element_size, meta.scale, &path)
                else {
                    return Ok(None);
                };
                let batch = values.len() / volume;
                (values, vec![batch, meta.num_maps, meta.height, meta.width])
            }
        };

        let shape = match target_shape {
            Some(target) => reconcile_shape(layer, values.len(), target, &shape),
            None => shape,
        };
        Ok(Some(reshape_best_effort(values, &shape)?))
    }

    /// Decode one per-image dump under the `<layer>-elem.bin` convention.
    /// Both the elem header and the dump file must exist.
    pub fn parse_elem_dump(
        &self,
        layer: &str,
        idx: usize,
        target_shape: &[usize],
    ) -> Result<Option<ArrayD<f32>>, DetectError> {
        let elem_path = self.dir.join(format!("{layer}-elem.bin"));
        let dump_path = self.dump_path(layer, idx);
        if !elem_path.exists() || !dump_path.exists() {
            return Ok(None);
        }

        let header = std::fs::read(&elem_path)?;
        if header.len() < 6 {
            log::warn!(
                "elem header {} is {} bytes, need at least 6; skipping",
                elem_path.display(),
                header.len()
            );
            return Ok(None);
        }
        let element_size = header[1];
        let scale = read_f32_le(&header[2..]);

        let bytes = std::fs::read(&dump_path)?;
        let Some(values) = read_quantized(&bytes, element_size, scale, &dump_path) else {
            return Ok(None);
        };
        let shape = reconcile_shape(layer, values.len(), target_shape, target_shape);
        Ok(Some(reshape_best_effort(values, &shape)?))
    }

    /// Unified lookup with ordered fallback: try the elem convention under
    /// `elem_layer` first, then the mapdata convention under `map_layer`.
    /// Exhausting both is fatal — verification has no partial-success
    /// meaning without the reference tensor.
    pub fn fetch_layer(
        &mut self,
        elem_layer: &str,
        map_layer: &str,
        idx: usize,
        target_shape: &[usize],
    ) -> Result<ArrayD<f32>, DetectError> {
        if let Some(tensor) = self.parse_elem_dump(elem_layer, idx, target_shape)? {
            return Ok(tensor);
        }
        if let Some(tensor) = self.parse_layer_dump(map_layer, idx, Some(target_shape))? {
            return Ok(tensor);
        }
        Err(DetectError::DumpMissing {
            layer: map_layer.to_string(),
        })
    }

    fn dump_path(&self, layer: &str, idx: usize) -> PathBuf {
        self.dir.join(format!("{layer}-{idx:08}.bin"))
    }
}

/// Recompute the leading (batch) dimension of `target` from the element
/// count. A disagreement with the expected batch is diagnostic only.
fn reconcile_shape(layer: &str, len: usize, target: &[usize], expected: &[usize]) -> Vec<usize> {
    let mut shape = target.to_vec();
    let trailing: usize = target.iter().skip(1).product();
    if trailing == 0 {
        return shape;
    }
    shape[0] = len / trailing;
    if shape[0] != expected[0] {
        log::warn!(
            "layer {layer}: reference and fixed-point shapes disagree, {expected:?} vs {shape:?}"
        );
    }
    shape
}

/// Best-effort reshape: surplus trailing elements from quantization
/// packing are dropped and shortfalls are zero-filled, with a diagnostic.
fn reshape_best_effort(mut values: Vec<f32>, shape: &[usize]) -> Result<ArrayD<f32>, DetectError> {
    let total: usize = shape.iter().product();
    if values.len() != total {
        log::warn!(
            "dump holds {} elements, reshaping to {shape:?} ({total} elements)",
            values.len()
        );
    }
    values.resize(total, 0.0);
    Ok(ArrayD::from_shape_vec(IxDyn(shape), values)?)
}

/// Decode packed signed integers and rescale to floats. An element width
/// other than 1 or 2 makes the dump unusable for this lookup.
fn read_quantized(bytes: &[u8], element_size: u8, scale: f32, path: &Path) -> Option<Vec<f32>> {
    match element_size {
        1 => Some(bytes.iter().map(|&b| b as i8 as f32 / scale).collect()),
        2 => Some(
            bytes
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / scale)
                .collect(),
        ),
        size => {
            log::warn!(
                "unsupported element size {size} in {}; skipping",
                path.display()
            );
            None
        }
    }
}

fn read_bbox_counts(bytes: &[u8]) -> BboxCounts {
    BboxCounts {
        alloc_count: read_i32_le(&bytes[0..]),
        valid_count: read_i32_le(&bytes[4..]),
        bbox_scale: read_i32_le(&bytes[8..]),
        confidence_scale: read_i32_le(&bytes[12..]),
    }
}

fn read_f32_le(bytes: &[u8]) -> f32 {
    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_i32_le(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_f64_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(8)
        .map(|c| {
            f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
        })
        .collect()
}
