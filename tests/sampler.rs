//! Frame sampler integration tests.

mod common;

use reelcut::{
    CancellationToken, FrameRequest, ReelcutError, primary_audio_track, primary_video_track,
    samples_at_timestamps,
};

use common::{BLUE, GREEN, HEIGHT, LOSSY_TOLERANCE, RED, WHITE, WIDTH, assert_corners};

// ── FrameRequest ───────────────────────────────────────────────────

#[test]
fn request_accepts_ascending_duplicates() {
    let request = FrameRequest::new(vec![0.0, 1.5, 1.5, 4.0]).expect("Valid request rejected");
    assert_eq!(request.len(), 4);
    assert_eq!(request.timestamps(), &[0.0, 1.5, 1.5, 4.0]);
}

#[test]
fn request_rejects_bad_timestamps() {
    assert!(matches!(
        FrameRequest::new(vec![1.0, 0.5]),
        Err(ReelcutError::InvalidArgument(_))
    ));
    assert!(matches!(
        FrameRequest::new(vec![-0.1]),
        Err(ReelcutError::InvalidArgument(_))
    ));
    assert!(matches!(
        FrameRequest::new(vec![f64::NAN]),
        Err(ReelcutError::InvalidArgument(_))
    ));
}

#[test]
fn empty_request_yields_nothing() {
    let mut source = common::clip_source();
    let track = primary_video_track(&source).unwrap().unwrap();
    let request = FrameRequest::new(Vec::new()).unwrap();
    let samples = samples_at_timestamps(&mut source, &track, &request)
        .expect("Failed to start sampling")
        .collect_exact()
        .expect("Failed to sample");
    assert!(samples.is_empty());
}

// ── sampling ───────────────────────────────────────────────────────

#[test]
fn yields_one_sample_per_request_in_order() {
    let mut source = common::clip_source();
    let track = primary_video_track(&source).unwrap().unwrap();
    let request = FrameRequest::new(vec![0.0, 1.0, 1.0, 2.5, 4.9]).unwrap();

    let samples = samples_at_timestamps(&mut source, &track, &request)
        .expect("Failed to start sampling")
        .collect_exact()
        .expect("Failed to sample");

    assert_eq!(samples.len(), 5);
    for (sample, requested) in samples.iter().zip(request.timestamps()) {
        assert_eq!(sample.requested(), *requested);
        assert!(
            (sample.timestamp() - requested).abs() <= 0.021,
            "requested {requested}s, got {}s",
            sample.timestamp()
        );
        assert_eq!((sample.width(), sample.height()), (WIDTH, HEIGHT));
    }
    assert_eq!(samples[1].timestamp(), samples[2].timestamp());
}

#[test]
fn picks_nearest_frame() {
    let mut source = common::clip_source();
    let track = primary_video_track(&source).unwrap().unwrap();
    // Frames sit every 40 ms.
    let request = FrameRequest::new(vec![0.01, 0.03, 1.01, 1.03]).unwrap();

    let times: Vec<f64> = samples_at_timestamps(&mut source, &track, &request)
        .unwrap()
        .map(|sample| sample.expect("Failed to sample").timestamp())
        .collect();

    assert!((times[0] - 0.0).abs() < 1e-6);
    assert!((times[1] - 0.04).abs() < 1e-6);
    assert!((times[2] - 1.0).abs() < 1e-6);
    assert!((times[3] - 1.04).abs() < 1e-6);
}

#[test]
fn midpoint_between_frames_picks_the_earlier_one() {
    let mut source = common::clip_source();
    let track = primary_video_track(&source).unwrap().unwrap();
    // 0.02 s is exactly halfway between the frames at 0.00 s and 0.04 s.
    let request = FrameRequest::new(vec![0.02]).unwrap();

    let samples = samples_at_timestamps(&mut source, &track, &request)
        .unwrap()
        .collect_exact()
        .expect("Failed to sample");

    assert_eq!(samples[0].requested(), 0.02);
    assert!(
        samples[0].timestamp().abs() < 1e-6,
        "expected the frame at 0s, got {}s",
        samples[0].timestamp()
    );
}

#[test]
fn requests_past_the_end_use_the_last_frame() {
    let mut source = common::clip_source();
    let track = primary_video_track(&source).unwrap().unwrap();
    let request = FrameRequest::new(vec![4.96, 30.0]).unwrap();

    let samples = samples_at_timestamps(&mut source, &track, &request)
        .unwrap()
        .collect_exact()
        .expect("Failed to sample past the end");

    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].timestamp(), samples[1].timestamp());
    assert!(samples[1].timestamp() < 5.0);
}

#[test]
fn far_apart_requests_seek() {
    let mut source = common::clip_source();
    let track = primary_video_track(&source).unwrap().unwrap();
    let request = FrameRequest::new(vec![0.2, 4.2]).unwrap();

    let samples = samples_at_timestamps(&mut source, &track, &request)
        .unwrap()
        .collect_exact()
        .expect("Failed to sample across a seek");

    assert!((samples[0].timestamp() - 0.2).abs() < 0.021);
    assert!((samples[1].timestamp() - 4.2).abs() < 0.021);
}

#[test]
fn decoded_pixels_match_the_pattern() {
    let mut source = common::clip_source();
    let track = primary_video_track(&source).unwrap().unwrap();
    let request = FrameRequest::new(vec![2.0]).unwrap();

    let sample = samples_at_timestamps(&mut source, &track, &request)
        .unwrap()
        .next()
        .expect("No sample yielded")
        .expect("Failed to sample");

    assert_corners(sample.image(), [RED, GREEN, BLUE, WHITE], 8, LOSSY_TOLERANCE);
}

// ── sample lifetime ────────────────────────────────────────────────

#[test]
fn live_samples_track_ownership() {
    let mut source = common::clip_source();
    let track = primary_video_track(&source).unwrap().unwrap();
    let request = FrameRequest::new(vec![0.0, 1.0]).unwrap();

    let samples = samples_at_timestamps(&mut source, &track, &request)
        .unwrap()
        .collect_exact()
        .unwrap();
    assert_eq!(source.live_samples(), 2);

    drop(samples);
    assert_eq!(source.live_samples(), 0);
}

#[test]
fn remaining_counts_down() {
    let mut source = common::clip_source();
    let track = primary_video_track(&source).unwrap().unwrap();
    let request = FrameRequest::new(vec![0.0, 0.5, 1.0]).unwrap();

    let mut samples = samples_at_timestamps(&mut source, &track, &request).unwrap();
    assert_eq!(samples.remaining(), 3);
    let first = samples.next().unwrap().unwrap();
    drop(first);
    assert_eq!(samples.remaining(), 2);
}

#[test]
fn cancelled_sampling_stops() {
    let mut source = common::clip_source();
    let track = primary_video_track(&source).unwrap().unwrap();
    let request = FrameRequest::new(vec![0.0, 1.0, 2.0]).unwrap();
    let token = CancellationToken::new();

    let mut samples = samples_at_timestamps(&mut source, &track, &request)
        .unwrap()
        .with_cancellation(token.clone());
    let first = samples.next().unwrap();
    assert!(first.is_ok());
    drop(first);

    token.cancel();
    assert!(matches!(samples.next(), Some(Err(ReelcutError::Cancelled))));
    assert!(samples.next().is_none());
    drop(samples);
    assert_eq!(source.live_samples(), 0);
}

// ── track selection ────────────────────────────────────────────────

#[test]
fn audio_track_is_rejected() {
    let mut source = common::clip_with_tone_source();
    let audio = primary_audio_track(&source).unwrap().expect("Fixture has audio");
    let request = FrameRequest::new(vec![0.0]).unwrap();

    assert!(matches!(
        samples_at_timestamps(&mut source, &audio, &request),
        Err(ReelcutError::InvalidArgument(_))
    ));
}

#[test]
fn disposed_source_is_rejected() {
    let mut source = common::clip_source();
    let track = primary_video_track(&source).unwrap().unwrap();
    source.dispose();
    let request = FrameRequest::new(vec![0.0]).unwrap();

    assert!(matches!(
        samples_at_timestamps(&mut source, &track, &request),
        Err(ReelcutError::InvalidState(_))
    ));
}
