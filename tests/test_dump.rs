extern crate frcnn_detect;

use std::fs;
use std::path::Path;

use frcnn_detect::{DetectError, DumpSession, LayerLayout};
use tempfile::TempDir;

/// Build a 48-byte mapdata header for a 3D layout.
fn mapdata_3d(layout: u8, element_size: u8, maps: u8, width: u8, height: u8, scale: f32) -> Vec<u8> {
    let mut header = vec![0u8; 48];
    header[0] = layout;
    header[1] = 0; // element type tag, unused by the decoder
    header[2] = element_size;
    header[3] = maps;
    header[4] = width;
    header[5] = height;
    header[8..12].copy_from_slice(&scale.to_le_bytes());
    header
}

fn mapdata_bbox(alloc_count: i32, valid_count: i32) -> Vec<u8> {
    let mut header = vec![0u8; 48];
    header[0] = 2; // bbox layout
    header[16..20].copy_from_slice(&alloc_count.to_le_bytes());
    header[20..24].copy_from_slice(&valid_count.to_le_bytes());
    header
}

fn write_dump(dir: &Path, layer: &str, idx: usize, bytes: &[u8]) {
    fs::write(dir.join(format!("{layer}-{idx:08}.bin")), bytes).unwrap();
}

#[test]
fn quantized_8bit_round_trip_within_half_a_step() {
    let tmp = TempDir::new().unwrap();
    let scale = 10.0f32;
    let original: Vec<f32> = (0..24).map(|i| (i as f32 - 12.0) * 0.73).collect();

    fs::write(
        tmp.path().join("conv1-mapdata.bin"),
        mapdata_3d(0, 1, 2, 4, 3, scale),
    )
    .unwrap();
    let quantized: Vec<u8> = original
        .iter()
        .map(|v| ((v * scale).round() as i8) as u8)
        .collect();
    write_dump(tmp.path(), "conv1", 0, &quantized);

    let mut session = DumpSession::new(tmp.path());
    let tensor = session.parse_layer_dump("conv1", 0, None).unwrap().unwrap();

    assert_eq!(tensor.shape(), &[1, 2, 3, 4]);
    for (decoded, expected) in tensor.iter().zip(original.iter()) {
        assert!(
            (decoded - expected).abs() <= 0.5 / scale + 1e-6,
            "{decoded} vs {expected}"
        );
    }
}

#[test]
fn quantized_16bit_elements_decode_with_scale() {
    let tmp = TempDir::new().unwrap();
    let scale = 256.0f32;
    fs::write(
        tmp.path().join("fc7-mapdata.bin"),
        mapdata_3d(1, 2, 1, 2, 1, scale),
    )
    .unwrap();

    let raw: Vec<i16> = vec![-512, 1024];
    let mut bytes = Vec::new();
    for v in &raw {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    write_dump(tmp.path(), "fc7", 5, &bytes);

    let mut session = DumpSession::new(tmp.path());
    let tensor = session.parse_layer_dump("fc7", 5, None).unwrap().unwrap();
    assert_eq!(tensor.shape(), &[1, 1, 1, 2]);
    assert_eq!(tensor[[0, 0, 0, 0]], -2.0);
    assert_eq!(tensor[[0, 0, 0, 1]], 4.0);
}

#[test]
fn bbox_layout_derives_count_from_seven_field_rows() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("dets-mapdata.bin"), mapdata_bbox(64, 2)).unwrap();

    // Two 7-field detections as f64 values.
    let mut bytes = Vec::new();
    for v in 0..14 {
        bytes.extend_from_slice(&(v as f64 * 0.5).to_le_bytes());
    }
    write_dump(tmp.path(), "dets", 0, &bytes);

    let mut session = DumpSession::new(tmp.path());
    let meta = session.mapdata("dets").unwrap().unwrap();
    match meta.layout {
        LayerLayout::Bbox(counts) => {
            assert_eq!(counts.alloc_count, 64);
            assert_eq!(counts.valid_count, 2);
        }
        other => panic!("expected bbox layout, got {other:?}"),
    }
    assert_eq!(meta.layer_shape(), [1, 1, 64, 7]);

    let tensor = session.parse_layer_dump("dets", 0, None).unwrap().unwrap();
    assert_eq!(tensor.shape(), &[1, 1, 2, 7]);
    assert_eq!(tensor[[0, 0, 1, 0]], 3.5);
}

#[test]
fn caller_shape_overrides_and_recomputes_the_batch_dim() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("score-mapdata.bin"),
        mapdata_3d(0, 1, 1, 1, 1, 1.0),
    )
    .unwrap();
    // 12 elements against a target of [3, 6]: batch becomes 12 / 6 = 2,
    // reported as a diagnostic only.
    write_dump(tmp.path(), "score", 0, &[1u8; 12]);

    let mut session = DumpSession::new(tmp.path());
    let tensor = session
        .parse_layer_dump("score", 0, Some(&[3, 6]))
        .unwrap()
        .unwrap();
    assert_eq!(tensor.shape(), &[2, 6]);
}

#[test]
fn missing_artifacts_are_soft_per_location() {
    let tmp = TempDir::new().unwrap();
    let mut session = DumpSession::new(tmp.path());

    // No files at all.
    assert!(session.parse_layer_dump("conv1", 0, None).unwrap().is_none());

    // Dump present, metadata missing.
    write_dump(tmp.path(), "conv1", 0, &[0u8; 8]);
    assert!(session.parse_layer_dump("conv1", 0, None).unwrap().is_none());

    // Truncated metadata is also treated as absent.
    fs::write(tmp.path().join("conv2-mapdata.bin"), vec![0u8; 20]).unwrap();
    write_dump(tmp.path(), "conv2", 0, &[0u8; 8]);
    assert!(session.parse_layer_dump("conv2", 0, None).unwrap().is_none());
}

#[test]
fn unrecognized_layout_tag_is_treated_as_absent() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("odd-mapdata.bin"),
        mapdata_3d(9, 1, 1, 1, 1, 1.0),
    )
    .unwrap();
    let mut session = DumpSession::new(tmp.path());
    assert!(session.mapdata("odd").unwrap().is_none());
}

#[test]
fn elem_convention_decodes_with_its_three_field_header() {
    let tmp = TempDir::new().unwrap();
    let scale = 4.0f32;
    let mut header = vec![0u8, 1u8];
    header.extend_from_slice(&scale.to_le_bytes());
    fs::write(tmp.path().join("score-elem.bin"), header).unwrap();
    write_dump(tmp.path(), "score", 3, &[4u8, 8, 12, 16, 20, 24, 28, 32]);

    let session = DumpSession::new(tmp.path());
    let tensor = session.parse_elem_dump("score", 3, &[2, 4]).unwrap().unwrap();
    assert_eq!(tensor.shape(), &[2, 4]);
    assert_eq!(tensor[[0, 0]], 1.0);
    assert_eq!(tensor[[1, 3]], 8.0);
}

#[test]
fn fetch_layer_tries_elem_then_mapdata_then_fails_hard() {
    let tmp = TempDir::new().unwrap();
    let mut session = DumpSession::new(tmp.path());

    // Neither convention present: fatal.
    match session.fetch_layer("score", "cls_prob", 0, &[1, 4]) {
        Err(DetectError::DumpMissing { layer }) => assert_eq!(layer, "cls_prob"),
        other => panic!("expected DumpMissing, got {other:?}"),
    }

    // Mapdata fallback only.
    fs::write(
        tmp.path().join("cls_prob-mapdata.bin"),
        mapdata_3d(0, 1, 1, 2, 2, 1.0),
    )
    .unwrap();
    write_dump(tmp.path(), "cls_prob", 0, &[1u8, 2, 3, 4]);
    let tensor = session.fetch_layer("score", "cls_prob", 0, &[1, 4]).unwrap();
    assert_eq!(tensor.shape(), &[1, 4]);
    assert_eq!(tensor[[0, 2]], 3.0);

    // Elem convention, once present, wins the fallback order.
    let mut header = vec![0u8, 1u8];
    header.extend_from_slice(&1.0f32.to_le_bytes());
    fs::write(tmp.path().join("score-elem.bin"), header).unwrap();
    write_dump(tmp.path(), "score", 0, &[9u8, 9, 9, 9]);
    let tensor = session.fetch_layer("score", "cls_prob", 0, &[1, 4]).unwrap();
    assert_eq!(tensor[[0, 2]], 9.0);
}

#[test]
fn truncated_elem_header_still_falls_back_to_mapdata() {
    let tmp = TempDir::new().unwrap();
    // Three bytes cannot hold the elem header's scale field.
    fs::write(tmp.path().join("score-elem.bin"), vec![0u8, 1, 0]).unwrap();
    write_dump(tmp.path(), "score", 0, &[7u8; 4]);

    fs::write(
        tmp.path().join("cls_prob-mapdata.bin"),
        mapdata_3d(0, 1, 1, 2, 2, 1.0),
    )
    .unwrap();
    write_dump(tmp.path(), "cls_prob", 0, &[1u8, 2, 3, 4]);

    let mut session = DumpSession::new(tmp.path());
    let tensor = session.fetch_layer("score", "cls_prob", 0, &[1, 4]).unwrap();
    assert_eq!(tensor.shape(), &[1, 4]);
    assert_eq!(tensor[[0, 2]], 3.0);
}

#[test]
fn unsupported_element_size_is_treated_as_absent() {
    let tmp = TempDir::new().unwrap();

    // Elem convention claiming 4-byte elements.
    let mut header = vec![0u8, 4u8];
    header.extend_from_slice(&1.0f32.to_le_bytes());
    fs::write(tmp.path().join("score-elem.bin"), header).unwrap();
    write_dump(tmp.path(), "score", 0, &[1u8; 8]);

    // Mapdata convention with the same defect.
    fs::write(
        tmp.path().join("conv1-mapdata.bin"),
        mapdata_3d(0, 4, 1, 2, 2, 1.0),
    )
    .unwrap();
    write_dump(tmp.path(), "conv1", 0, &[1u8; 8]);

    let mut session = DumpSession::new(tmp.path());
    assert!(session.parse_elem_dump("score", 0, &[2, 4]).unwrap().is_none());
    assert!(session.parse_layer_dump("conv1", 0, None).unwrap().is_none());
}

#[test]
fn empty_volume_header_is_treated_as_absent() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("conv1-mapdata.bin"),
        mapdata_3d(0, 1, 0, 0, 0, 1.0),
    )
    .unwrap();
    write_dump(tmp.path(), "conv1", 0, &[1u8; 8]);

    let mut session = DumpSession::new(tmp.path());
    assert!(session.parse_layer_dump("conv1", 0, None).unwrap().is_none());

    // With no other location, the unified lookup exhausts and hard-fails.
    match session.fetch_layer("missing", "conv1", 0, &[1, 8]) {
        Err(DetectError::DumpMissing { layer }) => assert_eq!(layer, "conv1"),
        other => panic!("expected DumpMissing, got {other:?}"),
    }
}

#[test]
fn trailing_remainder_elements_are_dropped_best_effort() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("conv1-mapdata.bin"),
        mapdata_3d(0, 1, 1, 3, 1, 1.0),
    )
    .unwrap();
    // Ten elements over a volume of three: one trailing element beyond the
    // three full batch entries is dropped rather than rejected.
    write_dump(tmp.path(), "conv1", 0, &[5u8; 10]);

    let mut session = DumpSession::new(tmp.path());
    let tensor = session.parse_layer_dump("conv1", 0, None).unwrap().unwrap();
    assert_eq!(tensor.shape(), &[3, 1, 1, 3]);
    assert!(tensor.iter().all(|&v| v == 5.0));
}

#[test]
fn metadata_is_cached_per_layer_name() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("conv1-mapdata.bin"),
        mapdata_3d(0, 1, 1, 2, 2, 2.0),
    )
    .unwrap();

    let mut session = DumpSession::new(tmp.path());
    let first = session.mapdata("conv1").unwrap().unwrap();

    // Deleting the file no longer matters; the session cache answers.
    fs::remove_file(tmp.path().join("conv1-mapdata.bin")).unwrap();
    let second = session.mapdata("conv1").unwrap().unwrap();
    assert_eq!(first, second);
}
