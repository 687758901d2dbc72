//! Dataset-level orchestration: iterate an image collection, detect,
//! assemble, persist the detection table once, then hand it to the
//! evaluation collaborator.

use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use image::DynamicImage;
use ndarray::Array2;

use crate::assembler::{apply_image_cap, assemble_image};
use crate::data::{DetectionTable, TestConfig};
use crate::detector::{detect_image, Network};
use crate::dump::DumpSession;

/// Serialized detection table filename within the output directory.
pub const DETECTIONS_FILE: &str = "detections.json";

/// Image collection the driver iterates. Proposal filtering (e.g. dropping
/// ground-truth boxes from a training split) is the implementor's concern.
pub trait ImageDatabase {
    fn name(&self) -> &str;
    fn num_images(&self) -> usize;
    /// Class count including background as class 0.
    fn num_classes(&self) -> usize;
    fn image(&self, idx: usize) -> Result<DynamicImage>;
    /// R x 4 external proposals for one image; `None` in RPN mode.
    fn proposals(&self, idx: usize) -> Result<Option<Array2<f32>>>;
}

/// Dataset-specific metric computation, opaque to this crate.
pub trait Evaluator {
    fn evaluate(&mut self, detections: &DetectionTable, output_dir: &Path) -> Result<()>;
}

/// Run detection over a whole image database.
///
/// Detections are collected into a `class x image` table sized up front,
/// persisted once as JSON in `output_dir`, then passed to the evaluator.
pub fn test_net<N, D, E>(
    net: &mut N,
    imdb: &D,
    evaluator: &mut E,
    cfg: &TestConfig,
    output_dir: &Path,
    mut dump: Option<&mut DumpSession>,
) -> Result<DetectionTable>
where
    N: Network,
    D: ImageDatabase,
    E: Evaluator,
{
    let num_images = imdb.num_images();
    let num_classes = imdb.num_classes();
    let mut all_boxes = DetectionTable::new(num_classes, num_images);

    let mut detect_total = 0.0f64;
    let mut misc_total = 0.0f64;
    for i in 0..num_images {
        let im = imdb.image(i)?;
        let proposals = imdb.proposals(i)?;

        let detect_start = Instant::now();
        let (scores, boxes) =
            detect_image(net, &im, proposals.as_ref(), i, cfg, dump.as_deref_mut())?;
        detect_total += detect_start.elapsed().as_secs_f64();

        let misc_start = Instant::now();
        let mut per_class = assemble_image(&scores, &boxes, cfg)?;
        apply_image_cap(&mut per_class, cfg.max_per_image);
        for (j, dets) in per_class.into_iter().enumerate() {
            all_boxes.set(j, i, dets);
        }
        misc_total += misc_start.elapsed().as_secs_f64();

        log::info!(
            "detect: {}/{} {:.3}s {:.3}s",
            i + 1,
            num_images,
            detect_total / (i + 1) as f64,
            misc_total / (i + 1) as f64
        );
    }

    let det_file = output_dir.join(DETECTIONS_FILE);
    all_boxes.save(&det_file)?;
    log::info!("wrote detections for `{}` to {}", imdb.name(), det_file.display());

    log::info!("evaluating detections");
    evaluator.evaluate(&all_boxes, output_dir)?;
    Ok(all_boxes)
}
