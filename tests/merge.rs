//! Merge (concatenation) integration tests.

mod common;

use reelcut::{
    MediaSource, MergeOptions, MergeStrategy, OutputFormat, ReelcutError, RunOptions, Size,
    merge, plan_merge,
};

use common::{BLUE, GREEN, LOSSY_TOLERANCE, RED, WHITE, assert_corners, frame_at};

fn mp4_source(name: &str) -> MediaSource {
    MediaSource::from_bytes(common::clip_bytes(), name).expect("Failed to open fixture")
}

fn mjpeg_source(name: &str) -> MediaSource {
    MediaSource::from_bytes(common::mjpeg_clip_bytes(), name).expect("Failed to open MJPEG fixture")
}

fn probe_duration(bytes: Vec<u8>) -> f64 {
    MediaSource::from_bytes(bytes, "merged.mp4")
        .expect("Merged output is not readable")
        .metadata()
        .unwrap()
        .duration
        .as_secs_f64()
}

// ── strategy selection ─────────────────────────────────────────────

#[test]
fn matching_codecs_plan_a_copy() {
    let sources = vec![mp4_source("a.mp4"), mp4_source("b.mp4")];
    let strategy = plan_merge(&sources, &MergeOptions::default()).expect("Failed to plan");
    assert_eq!(strategy, MergeStrategy::Copy);
}

#[test]
fn different_codecs_plan_a_reencode() {
    let sources = vec![mp4_source("a.mp4"), mjpeg_source("b.mkv")];
    let strategy = plan_merge(&sources, &MergeOptions::default()).expect("Failed to plan");
    assert_eq!(strategy, MergeStrategy::Reencode);
}

#[test]
fn resizing_or_forcing_plans_a_reencode() {
    let sources = vec![mp4_source("a.mp4"), mp4_source("b.mp4")];
    let resized = MergeOptions::default().with_target_size(Size::new(320, 240));
    assert_eq!(plan_merge(&sources, &resized).unwrap(), MergeStrategy::Reencode);

    let forced = MergeOptions::default().with_force_reencode(true);
    assert_eq!(plan_merge(&sources, &forced).unwrap(), MergeStrategy::Reencode);
}

#[test]
fn audio_mismatch_plans_a_reencode_unless_muted() {
    let sources = vec![
        mp4_source("a.mp4"),
        MediaSource::from_bytes(common::clip_with_tone_bytes(), "b.mp4").unwrap(),
    ];
    assert_eq!(
        plan_merge(&sources, &MergeOptions::default()).unwrap(),
        MergeStrategy::Reencode
    );
    assert_eq!(
        plan_merge(&sources, &MergeOptions::default().with_mute(true)).unwrap(),
        MergeStrategy::Copy
    );
}

// ── copy path ──────────────────────────────────────────────────────

#[test]
fn copy_merge_concatenates_without_reencoding() {
    let input_size = common::clip_bytes().len();
    let mut sources = vec![mp4_source("first.mp4"), mp4_source("second.mp4")];
    let result = merge(&mut sources, &MergeOptions::default(), &RunOptions::default())
        .expect("Failed to merge");

    assert_eq!(result.filename, "first_merged.mp4");
    assert_eq!(result.mime_type, "video/mp4");
    assert_eq!((result.width, result.height), (640, 480));
    assert!((result.duration.as_secs_f64() - 10.0).abs() < 0.1);

    // Copied packets: the output is the two inputs plus container overhead.
    let expected = 2 * input_size;
    let slack = expected / 10 + 4096;
    assert!(
        result.bytes.len().abs_diff(expected) <= slack,
        "merged {} bytes, inputs {expected}",
        result.bytes.len()
    );
    assert!((probe_duration(result.bytes.clone()) - 10.0).abs() < 0.15);

    let late = frame_at(result.bytes, "merged.mp4", 7.5);
    assert_corners(&late, [RED, GREEN, BLUE, WHITE], 8, LOSSY_TOLERANCE);
}

#[test]
fn copy_merge_keeps_matching_audio() {
    let mut sources = vec![
        MediaSource::from_bytes(common::clip_with_tone_bytes(), "a.mp4").unwrap(),
        MediaSource::from_bytes(common::clip_with_tone_bytes(), "b.mp4").unwrap(),
    ];
    let result = merge(&mut sources, &MergeOptions::default(), &RunOptions::default())
        .expect("Failed to merge");

    let output = MediaSource::from_bytes(result.bytes, "merged.mp4").unwrap();
    let audio = reelcut::primary_audio_track(&output)
        .unwrap()
        .expect("Audio was dropped");
    assert!((audio.duration.as_secs_f64() - 10.0).abs() < 0.2);
}

// ── re-encode path ─────────────────────────────────────────────────

#[test]
fn reencode_merge_joins_different_codecs() {
    let mut sources = vec![mp4_source("a.mp4"), mjpeg_source("b.mkv")];
    let result = merge(&mut sources, &MergeOptions::default(), &RunOptions::default())
        .expect("Re-encoding merge failed");

    assert_eq!(result.filename, "a_merged.mp4");
    assert_eq!((result.width, result.height), (640, 480));
    assert!((result.duration.as_secs_f64() - 7.0).abs() < 0.1);
    assert!((probe_duration(result.bytes.clone()) - 7.0).abs() < 0.15);

    let from_second = frame_at(result.bytes, "merged.mp4", 6.0);
    assert_corners(&from_second, [RED, GREEN, BLUE, WHITE], 8, LOSSY_TOLERANCE);
}

#[test]
fn reencode_merge_scales_to_the_target() {
    let mut sources = vec![mp4_source("a.mp4"), mjpeg_source("b.mkv")];
    let options = MergeOptions::new(OutputFormat::Mkv).with_target_size(Size::new(320, 240));
    let result = merge(&mut sources, &options, &RunOptions::default()).expect("Failed to merge");

    assert_eq!(result.filename, "a_merged.mkv");
    assert_eq!((result.width, result.height), (320, 240));
    let frame = frame_at(result.bytes, "merged.mkv", 1.0);
    assert_eq!(frame.dimensions(), (320, 240));
}

// ── invalid requests ───────────────────────────────────────────────

#[test]
fn single_source_is_rejected() {
    let mut sources = vec![mp4_source("a.mp4")];
    let error = merge(&mut sources, &MergeOptions::default(), &RunOptions::default()).unwrap_err();
    assert!(matches!(error, ReelcutError::InvalidArgument(_)));
}

#[test]
fn gif_and_audio_targets_are_rejected() {
    let sources = vec![mp4_source("a.mp4"), mp4_source("b.mp4")];
    for format in [OutputFormat::Gif, OutputFormat::Wav] {
        let error = plan_merge(&sources, &MergeOptions::new(format)).unwrap_err();
        assert!(matches!(error, ReelcutError::InvalidArgument(_)), "{format}");
    }
}

#[test]
fn disposed_source_is_rejected() {
    let mut second = mp4_source("b.mp4");
    second.dispose();
    let mut sources = vec![mp4_source("a.mp4"), second];
    let error = merge(&mut sources, &MergeOptions::default(), &RunOptions::default()).unwrap_err();
    assert!(matches!(error, ReelcutError::InvalidState(_)));
}
