//! Async conversion tests.

#![cfg(feature = "async")]

mod common;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use reelcut::{
    CancellationToken, ConversionOptions, OutputFormat, ProgressEvent, ReelcutError, RunOptions,
    VideoCodec, spawn_conversion,
};
use tokio_stream::StreamExt;

fn mp4() -> ConversionOptions {
    ConversionOptions::new(OutputFormat::Mp4).with_codec(VideoCodec::Mpeg4)
}

#[tokio::test(flavor = "multi_thread")]
async fn spawned_conversion_streams_progress() {
    let source = common::clip_source();
    let (mut progress, result) = spawn_conversion(source, mp4(), RunOptions::new()).into_parts();

    let mut percents = Vec::new();
    while let Some(event) = progress.next().await {
        percents.push(event.percent);
    }
    let output = result.await.expect("Spawned conversion failed");

    assert_eq!(percents.first(), Some(&0));
    assert_eq!(percents.last(), Some(&100));
    assert!(percents.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(output.filename, "clip_converted.mp4");
}

#[tokio::test(flavor = "multi_thread")]
async fn existing_sink_still_receives_events() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let run = RunOptions::new().with_progress(Arc::new(move |_: &ProgressEvent| {
        counter.fetch_add(1, Ordering::Relaxed);
    }));

    let output = spawn_conversion(common::clip_source(), mp4(), run)
        .finish()
        .await
        .expect("Spawned conversion failed");

    assert!(!output.bytes.is_empty());
    assert!(seen.load(Ordering::Relaxed) >= 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_spawn_resolves_to_cancelled() {
    let token = CancellationToken::new();
    token.cancel();
    let run = RunOptions::new().with_cancellation(token);

    let error = spawn_conversion(common::clip_source(), mp4(), run)
        .finish()
        .await
        .unwrap_err();
    assert!(matches!(error, ReelcutError::Cancelled));
}
