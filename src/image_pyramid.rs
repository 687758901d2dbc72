//! Builds the network input blob from a raw image: per-channel mean
//! subtraction in float, bilinear rescale to the configured geometry, and
//! batching into an N x 3 x H x W tensor with the applied scale factors.

use fast_image_resize::{
    images::Image as FirImage, pixels::PixelType, FilterType, ResizeAlg, ResizeOptions, Resizer,
};
use image::DynamicImage;
use ndarray::Array4;

use crate::data::PyramidPolicy;
use crate::error::DetectError;

/// Batched pyramid levels plus the linear scale factor applied per level.
#[derive(Debug, Clone)]
pub struct ImageBlob {
    pub data: Array4<f32>,
    pub scales: Vec<f32>,
}

/// One mean-subtracted, rescaled pyramid level in HWC layout.
struct Level {
    pixels: Vec<f32>,
    width: usize,
    height: usize,
}

pub fn image_to_blob(
    im: &DynamicImage,
    policy: &PyramidPolicy,
    pixel_means: [f32; 3],
) -> Result<ImageBlob, DetectError> {
    let rgb = im.to_rgb8();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    if w == 0 || h == 0 {
        return Err(DetectError::ShapeError(format!(
            "input image has degenerate spatial dimensions {h}x{w}"
        )));
    }

    // Float arithmetic from here on; no clamping after mean subtraction.
    let mut pixels = Vec::with_capacity(w * h * 3);
    for px in rgb.pixels() {
        pixels.push(px.0[0] as f32 - pixel_means[0]);
        pixels.push(px.0[1] as f32 - pixel_means[1]);
        pixels.push(px.0[2] as f32 - pixel_means[2]);
    }

    match policy {
        PyramidPolicy::FixedCanvas { height, width } => {
            let (canvas_h, canvas_w) = (*height as usize, *width as usize);
            let scale = (canvas_h as f32 / h as f32).min(canvas_w as f32 / w as f32);
            let new_w = ((w as f32 * scale).round() as usize).min(canvas_w);
            let new_h = ((h as f32 * scale).round() as usize).min(canvas_h);
            let resized = resize_level(&pixels, w, h, new_w, new_h)?;

            // Scaled content sits at the top-left; bottom/right stays zero.
            let mut data = Array4::<f32>::zeros((1, 3, canvas_h, canvas_w));
            fill_level(&mut data, 0, &resized);
            Ok(ImageBlob {
                data,
                scales: vec![scale],
            })
        }
        PyramidPolicy::ShortSide { targets, max_size } => {
            let size_min = w.min(h) as f32;
            let size_max = w.max(h) as f32;
            let mut levels = Vec::with_capacity(targets.len());
            let mut scales = Vec::with_capacity(targets.len());
            for &target in targets {
                let mut scale = target as f32 / size_min;
                // Keep the long side under the configured maximum.
                if (scale * size_max).round() > *max_size as f32 {
                    scale = *max_size as f32 / size_max;
                }
                let new_w = (w as f32 * scale).round() as usize;
                let new_h = (h as f32 * scale).round() as usize;
                levels.push(resize_level(&pixels, w, h, new_w, new_h)?);
                scales.push(scale);
            }

            let blob_h = levels.iter().map(|l| l.height).max().unwrap_or(0);
            let blob_w = levels.iter().map(|l| l.width).max().unwrap_or(0);
            let mut data = Array4::<f32>::zeros((levels.len(), 3, blob_h, blob_w));
            for (n, level) in levels.iter().enumerate() {
                fill_level(&mut data, n, level);
            }
            Ok(ImageBlob { data, scales })
        }
    }
}

/// Bilinear resize of an HWC f32 image. Falls through untouched when the
/// geometry already matches.
fn resize_level(
    pixels: &[f32],
    w: usize,
    h: usize,
    new_w: usize,
    new_h: usize,
) -> Result<Level, DetectError> {
    if new_w == 0 || new_h == 0 {
        return Err(DetectError::ShapeError(format!(
            "resize target has degenerate dimensions {new_h}x{new_w}"
        )));
    }
    if new_w == w && new_h == h {
        return Ok(Level {
            pixels: pixels.to_vec(),
            width: w,
            height: h,
        });
    }

    let src = FirImage::from_vec_u8(
        w as u32,
        h as u32,
        f32s_to_bytes(pixels),
        PixelType::F32x3,
    )
    .map_err(|e| DetectError::ShapeError(e.to_string()))?;
    let mut dst = FirImage::new(new_w as u32, new_h as u32, PixelType::F32x3);

    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    let mut resizer = Resizer::new();
    resizer
        .resize(&src, &mut dst, &options)
        .map_err(|e| DetectError::ShapeError(e.to_string()))?;

    Ok(Level {
        pixels: bytes_to_f32s(dst.buffer()),
        width: new_w,
        height: new_h,
    })
}

/// Copy one HWC level into batch entry `n` of the CHW blob, top-left aligned.
fn fill_level(data: &mut Array4<f32>, n: usize, level: &Level) {
    for y in 0..level.height {
        for x in 0..level.width {
            let base = (y * level.width + x) * 3;
            data[[n, 0, y, x]] = level.pixels[base];
            data[[n, 1, y, x]] = level.pixels[base + 1];
            data[[n, 2, y, x]] = level.pixels[base + 2];
        }
    }
}

fn f32s_to_bytes(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for v in values {
        bytes.extend_from_slice(&v.to_ne_bytes());
    }
    bytes
}

fn bytes_to_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
