extern crate frcnn_detect;

use frcnn_detect::{image_to_blob, DetectError, PyramidPolicy};
use image::{DynamicImage, Rgb, RgbImage};

fn solid_image(width: u32, height: u32, value: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([value; 3])))
}

const MEANS: [f32; 3] = [40.0, 50.0, 60.0];

#[test]
fn fixed_canvas_scale_fills_exactly_when_aspect_matches() {
    // 300x500 image into a 600x1000 canvas: scale = min(2.0, 2.0) = 2.0
    // and the scaled content fills the canvas with no padding left over.
    let im = solid_image(500, 300, 100);
    let policy = PyramidPolicy::FixedCanvas {
        height: 600,
        width: 1000,
    };
    let blob = image_to_blob(&im, &policy, MEANS).unwrap();

    assert_eq!(blob.scales, vec![2.0]);
    assert_eq!(blob.data.shape(), &[1, 3, 600, 1000]);
    // Mean-subtracted constant content everywhere, per channel.
    for (c, mean) in MEANS.iter().enumerate() {
        let expected = 100.0 - mean;
        assert!((blob.data[[0, c, 0, 0]] - expected).abs() < 1e-3);
        assert!((blob.data[[0, c, 599, 999]] - expected).abs() < 1e-3);
    }
}

#[test]
fn fixed_canvas_pads_bottom_right_with_zeros() {
    // 300x400 image: scale = min(600/300, 1000/400) = 2.0, content spans
    // 600x800, columns 800.. stay zero.
    let im = solid_image(400, 300, 90);
    let policy = PyramidPolicy::FixedCanvas {
        height: 600,
        width: 1000,
    };
    let blob = image_to_blob(&im, &policy, MEANS).unwrap();

    assert_eq!(blob.data.shape(), &[1, 3, 600, 1000]);
    assert_eq!(blob.scales, vec![2.0]);
    for c in 0..3 {
        assert!((blob.data[[0, c, 100, 700]] - (90.0 - MEANS[c])).abs() < 1e-3);
        assert_eq!(blob.data[[0, c, 100, 850]], 0.0);
        assert_eq!(blob.data[[0, c, 599, 999]], 0.0);
    }
}

#[test]
fn fixed_canvas_output_geometry_is_independent_of_aspect_ratio() {
    let policy = PyramidPolicy::FixedCanvas {
        height: 600,
        width: 1000,
    };
    for (w, h) in [(100, 700), (1300, 80), (1000, 600)] {
        let blob = image_to_blob(&solid_image(w, h, 10), &policy, MEANS).unwrap();
        assert_eq!(blob.data.shape(), &[1, 3, 600, 1000]);
        assert_eq!(blob.scales.len(), 1);
    }
}

#[test]
fn short_side_mode_scales_each_target() {
    // 100x200 image, short side 100. Targets 50 and 200 with a generous cap.
    let im = solid_image(200, 100, 80);
    let policy = PyramidPolicy::ShortSide {
        targets: vec![50, 200],
        max_size: 1000,
    };
    let blob = image_to_blob(&im, &policy, MEANS).unwrap();

    assert_eq!(blob.scales, vec![0.5, 2.0]);
    // Batched to the largest level: 200x400.
    assert_eq!(blob.data.shape(), &[2, 3, 200, 400]);
    // Level 0 occupies only its own 50x100 corner.
    assert!((blob.data[[0, 0, 10, 10]] - (80.0 - MEANS[0])).abs() < 1e-3);
    assert_eq!(blob.data[[0, 0, 150, 300]], 0.0);
    assert!((blob.data[[1, 0, 150, 300]] - (80.0 - MEANS[0])).abs() < 1e-3);
}

#[test]
fn short_side_mode_caps_the_long_side() {
    // Target 600 on a 100x200 image would give scale 6.0 and long side
    // 1200; the 150 cap forces scale = 150/200.
    let im = solid_image(200, 100, 80);
    let policy = PyramidPolicy::ShortSide {
        targets: vec![600],
        max_size: 150,
    };
    let blob = image_to_blob(&im, &policy, MEANS).unwrap();

    assert_eq!(blob.scales, vec![0.75]);
    assert_eq!(blob.data.shape(), &[1, 3, 75, 150]);
}

#[test]
fn degenerate_image_is_a_shape_error() {
    let im = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
    let policy = PyramidPolicy::FixedCanvas {
        height: 600,
        width: 1000,
    };
    match image_to_blob(&im, &policy, MEANS) {
        Err(DetectError::ShapeError(_)) => {}
        other => panic!("expected ShapeError, got {other:?}"),
    }
}
