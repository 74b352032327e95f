//! Audio extraction integration tests.

mod common;

use reelcut::{AudioFormat, MediaSource, ReelcutError, RunOptions, TimeWindow, extract_audio};

#[test]
fn extracts_wav() {
    let mut source = common::clip_with_tone_source();
    let result = extract_audio(&mut source, AudioFormat::Wav, TimeWindow::full(), &RunOptions::default())
        .expect("Failed to extract audio");

    assert_eq!(result.mime_type, "audio/wav");
    assert_eq!(result.filename, "tone_extracted.wav");
    assert_eq!((result.width, result.height), (0, 0));
    assert!(result.bytes.starts_with(b"RIFF"));
    assert!((result.duration.as_secs_f64() - 5.0).abs() < 0.1);

    let output = MediaSource::from_bytes(result.bytes, "out.wav").expect("WAV is not readable");
    let audio = reelcut::primary_audio_track(&output).unwrap().expect("WAV has no audio");
    assert_eq!(audio.codec, "pcm_s16le");
    assert_eq!(audio.channels, 1);
    assert!((output.metadata().unwrap().duration.as_secs_f64() - 5.0).abs() < 0.1);
}

#[test]
fn window_limits_extracted_audio() {
    let mut source = common::clip_with_tone_source();
    let result = extract_audio(
        &mut source,
        AudioFormat::Wav,
        TimeWindow::between(1.0, 2.5),
        &RunOptions::default(),
    )
    .expect("Failed to extract audio");

    assert!((result.duration.as_secs_f64() - 1.5).abs() < 0.05);
    let output = MediaSource::from_bytes(result.bytes, "out.wav").unwrap();
    assert!((output.metadata().unwrap().duration.as_secs_f64() - 1.5).abs() < 0.05);
}

#[test]
fn reported_duration_matches_the_encoded_audio() {
    for window in [TimeWindow::full(), TimeWindow::between(0.75, 3.2)] {
        let mut source = common::clip_with_tone_source();
        let result = extract_audio(&mut source, AudioFormat::Wav, window, &RunOptions::default())
            .expect("Failed to extract audio");
        let reported = result.duration.as_secs_f64();
        let output = MediaSource::from_bytes(result.bytes, "out.wav").unwrap();
        let encoded = output.metadata().unwrap().duration.as_secs_f64();
        assert!(
            (reported - encoded).abs() < 0.002,
            "reported {reported}s but the WAV holds {encoded}s"
        );
    }
}

#[test]
fn source_without_audio_is_reported() {
    let mut source = common::clip_source();
    let error = extract_audio(&mut source, AudioFormat::Wav, TimeWindow::full(), &RunOptions::default())
        .unwrap_err();
    assert!(matches!(error, ReelcutError::NoAudioStream));
}

#[test]
fn inverted_window_is_rejected() {
    let mut source = common::clip_with_tone_source();
    let error = extract_audio(
        &mut source,
        AudioFormat::Wav,
        TimeWindow::between(3.0, 1.0),
        &RunOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(error, ReelcutError::InvalidArgument(_)));
}

#[test]
fn mp3_extraction_succeeds_or_reports_a_missing_encoder() {
    let mut source = common::clip_with_tone_source();
    match extract_audio(&mut source, AudioFormat::Mp3, TimeWindow::full(), &RunOptions::default()) {
        Ok(result) => {
            assert_eq!(result.mime_type, "audio/mpeg");
            assert_eq!(result.filename, "tone_extracted.mp3");
            assert!(!result.bytes.is_empty());
        }
        // FFmpeg builds without libmp3lame cannot produce MP3.
        Err(error) => assert!(matches!(error, ReelcutError::Encode { .. }), "{error}"),
    }
}
