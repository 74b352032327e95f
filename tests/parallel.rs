//! Bounded parallel batch conversion tests.

#![cfg(feature = "rayon")]

mod common;

use reelcut::{
    ConversionJob, ConversionOptions, MediaSource, OutputFormat, ReelcutError, RunOptions, Size,
    TimeWindow, VideoCodec, convert_all,
};

fn job(name: &str, options: ConversionOptions) -> ConversionJob {
    let source = MediaSource::from_bytes(common::clip_bytes(), name).expect("Failed to open fixture");
    ConversionJob::new(source, options)
}

fn short_mp4() -> ConversionOptions {
    ConversionOptions::new(OutputFormat::Mp4)
        .with_codec(VideoCodec::Mpeg4)
        .with_window(TimeWindow::ending_at(1.0))
}

#[test]
fn results_come_back_in_job_order() {
    let jobs = vec![
        job("a.mp4", short_mp4()),
        job("b.mp4", short_mp4().with_target_size(Size::new(320, 240))),
        job("c.mp4", short_mp4()),
    ];
    let results = convert_all(jobs, 2, &RunOptions::default()).expect("Failed to run batch");

    let names: Vec<String> = results
        .into_iter()
        .map(|result| result.expect("Job failed").filename)
        .collect();
    assert_eq!(names, ["a_trimmed.mp4", "b_resized.mp4", "c_trimmed.mp4"]);
}

#[test]
fn one_failing_job_does_not_stop_the_rest() {
    let jobs = vec![
        job("good.mp4", short_mp4()),
        job("bad.mp4", short_mp4().with_speed(0.0)),
    ];
    let results = convert_all(jobs, 2, &RunOptions::default()).expect("Failed to run batch");

    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(ReelcutError::InvalidArgument(_))));
}

#[test]
fn zero_parallelism_is_rejected() {
    let error = convert_all(vec![job("a.mp4", short_mp4())], 0, &RunOptions::default()).unwrap_err();
    assert!(matches!(error, ReelcutError::InvalidArgument(_)));
}
