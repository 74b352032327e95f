//! Async conversion tasks.
//!
//! [`spawn_conversion`] moves a conversion onto Tokio's blocking pool and
//! hands back a [`ConversionTask`]: a [`ProgressStream`] of percentage
//! events plus a [`ConversionFuture`] resolving to the result. FFmpeg work
//! never runs on the async executor itself.
//!
//! # Example
//!
//! ```no_run
//! use tokio_stream::StreamExt;
//!
//! use reelcut::{ConversionOptions, MediaSource, OutputFormat, ReelcutError, RunOptions, spawn_conversion};
//!
//! # async fn example() -> Result<(), ReelcutError> {
//! let source = MediaSource::open("input.mp4")?;
//! let options = ConversionOptions::new(OutputFormat::WebM);
//! let (mut progress, result) = spawn_conversion(source, options, RunOptions::new()).into_parts();
//!
//! while let Some(event) = progress.next().await {
//!     println!("{}%", event.percent);
//! }
//! let output = result.await?;
//! println!("{} ({} bytes)", output.filename, output.bytes.len());
//! # Ok(())
//! # }
//! ```

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures_core::Stream;
use tokio::{
    sync::mpsc::{UnboundedReceiver, unbounded_channel},
    task::JoinHandle,
};

use crate::{
    error::ReelcutError,
    options::{ConversionOptions, RunOptions},
    pipeline::{ConversionResult, convert},
    progress::ProgressEvent,
    source::MediaSource,
};

/// Progress events of one spawned run.
///
/// Ends once the run has finished, whatever its outcome.
pub struct ProgressStream {
    receiver: UnboundedReceiver<ProgressEvent>,
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Resolves to the result of a spawned run.
///
/// A panicked or aborted worker resolves to [`ReelcutError::Cancelled`].
pub struct ConversionFuture {
    handle: JoinHandle<Result<ConversionResult, ReelcutError>>,
}

impl Future for ConversionFuture {
    type Output = Result<ConversionResult, ReelcutError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| {
            joined.unwrap_or_else(|error| {
                log::warn!("Conversion worker did not complete: {error}");
                Err(ReelcutError::Cancelled)
            })
        })
    }
}

/// A conversion running on a blocking thread.
pub struct ConversionTask {
    progress: ProgressStream,
    result: ConversionFuture,
}

impl ConversionTask {
    /// Split into the progress stream and the result future.
    pub fn into_parts(self) -> (ProgressStream, ConversionFuture) {
        (self.progress, self.result)
    }

    /// Ignore progress and wait for the result.
    pub async fn finish(self) -> Result<ConversionResult, ReelcutError> {
        self.result.await
    }
}

/// Run [`convert`] for `source` on Tokio's blocking pool.
///
/// Events are delivered to the returned stream and to any sink already
/// set on `run`. Must be called from within a Tokio runtime.
pub fn spawn_conversion(
    mut source: MediaSource,
    options: ConversionOptions,
    run: RunOptions,
) -> ConversionTask {
    let (sender, receiver) = unbounded_channel();
    let downstream = Arc::clone(&run.progress);
    let run = run.with_progress(Arc::new(move |event: &ProgressEvent| {
        downstream.on_progress(event);
        let _ = sender.send(event.clone());
    }));

    let handle = tokio::task::spawn_blocking(move || convert(&mut source, &options, &run));
    ConversionTask {
        progress: ProgressStream { receiver },
        result: ConversionFuture { handle },
    }
}
