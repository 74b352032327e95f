//! Frame extraction integration tests.

mod common;

use reelcut::{ImageFormat, ReelcutError, RunOptions, extract_frames};

use common::{BLUE, GREEN, RED, WHITE, assert_corners};

#[test]
fn extracts_png_frames_with_timestamped_names() {
    let mut source = common::clip_source();
    let frames = extract_frames(&mut source, &[0.0, 1.0, 2.0], ImageFormat::Png, &RunOptions::default())
        .expect("Failed to extract frames");

    assert_eq!(frames.len(), 3);
    let names: Vec<&str> = frames.iter().map(|frame| frame.filename.as_str()).collect();
    assert_eq!(names, ["frame_0.00s.png", "frame_1.00s.png", "frame_2.00s.png"]);
    for frame in &frames {
        assert!(!frame.bytes.is_empty());
        assert_eq!(frame.mime_type, "image/png");
        assert_eq!((frame.width, frame.height), (640, 480));
        assert!(frame.bytes.starts_with(b"\x89PNG"));
    }
}

#[test]
fn png_frames_decode_to_the_pattern() {
    let mut source = common::clip_source();
    let frames = extract_frames(&mut source, &[1.5], ImageFormat::Png, &RunOptions::default())
        .expect("Failed to extract frames");

    let image = image::load_from_memory(&frames[0].bytes)
        .expect("Extracted PNG is not decodable")
        .to_rgba8();
    assert_corners(&image, [RED, GREEN, BLUE, WHITE], 8, common::LOSSY_TOLERANCE);
}

#[test]
fn extracts_jpeg_frames() {
    let mut source = common::clip_source();
    let frames = extract_frames(&mut source, &[0.5, 4.5], ImageFormat::Jpeg, &RunOptions::default())
        .expect("Failed to extract frames");

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].filename, "frame_0.50s.jpg");
    assert_eq!(frames[0].mime_type, "image/jpeg");
    assert!(frames[0].bytes.starts_with(&[0xFF, 0xD8]));
}

#[test]
fn jpeg_quality_affects_size() {
    let mut source = common::clip_source();
    let low = extract_frames(
        &mut source,
        &[1.0],
        ImageFormat::Jpeg,
        &RunOptions::new().with_jpeg_quality(10),
    )
    .expect("Failed to extract low quality frame");
    let high = extract_frames(
        &mut source,
        &[1.0],
        ImageFormat::Jpeg,
        &RunOptions::new().with_jpeg_quality(100),
    )
    .expect("Failed to extract high quality frame");

    assert!(low[0].bytes.len() < high[0].bytes.len());
}

#[test]
fn duplicate_timestamps_yield_identical_frames() {
    let mut source = common::clip_source();
    let frames = extract_frames(&mut source, &[2.0, 2.0], ImageFormat::Png, &RunOptions::default())
        .expect("Failed to extract frames");

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].timestamp, frames[1].timestamp);
    assert_eq!(frames[0].bytes, frames[1].bytes);
}

#[test]
fn frames_record_requested_and_actual_time() {
    let mut source = common::clip_source();
    let frames = extract_frames(&mut source, &[1.01], ImageFormat::Png, &RunOptions::default())
        .expect("Failed to extract frames");

    assert_eq!(frames[0].requested, 1.01);
    assert!((frames[0].timestamp - 1.0).abs() < 1e-6);
    assert_eq!(frames[0].filename, "frame_1.01s.png");
}

#[test]
fn unsorted_timestamps_are_rejected() {
    let mut source = common::clip_source();
    let error = extract_frames(&mut source, &[2.0, 1.0], ImageFormat::Png, &RunOptions::default())
        .unwrap_err();
    assert!(matches!(error, ReelcutError::InvalidArgument(_)));
    assert!(!source.is_disposed());
}

#[test]
fn no_frames_leak_after_extraction() {
    let mut source = common::clip_source();
    let _frames = extract_frames(&mut source, &[0.0, 3.0], ImageFormat::Png, &RunOptions::default())
        .expect("Failed to extract frames");
    assert_eq!(source.live_samples(), 0);
}
