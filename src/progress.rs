//! Progress reporting and cancellation support.
//!
//! This module provides [`ProgressSink`] for monitoring a run,
//! [`CancellationToken`] for cooperative cancellation, [`ProgressEvent`]
//! for progress snapshots and [`progress_channel`] for consuming events
//! from another thread.
//!
//! Percentages are integers in `0..=100`, never decrease within a run, and
//! `100` is reported exactly once, after the output has been finalized.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use reelcut::{
//!     ConversionOptions, MediaSource, OutputFormat, ProgressEvent, ProgressSink,
//!     ReelcutError, RunOptions,
//! };
//!
//! struct PrintProgress;
//!
//! impl ProgressSink for PrintProgress {
//!     fn on_progress(&self, event: &ProgressEvent) {
//!         println!("[{:?}] {}%", event.operation, event.percent);
//!     }
//! }
//!
//! let mut source = MediaSource::open("input.mp4")?;
//! let run = RunOptions::new().with_progress(Arc::new(PrintProgress));
//! let result = reelcut::convert(&mut source, &ConversionOptions::new(OutputFormat::WebM), &run)?;
//! # Ok::<(), ReelcutError>(())
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
    },
    time::{Duration, Instant},
};

/// The kind of run currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Operation {
    /// Transcoding a source into a video container.
    Conversion,
    /// Extracting still frames.
    FrameExtraction,
    /// Extracting the audio track.
    AudioExtraction,
    /// Concatenating several sources.
    Merge,
}

/// A progress snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// What kind of work is being performed.
    pub operation: Operation,
    /// Completion percentage, `0..=100`.
    pub percent: u8,
    /// Wall-clock time elapsed since the run started.
    pub elapsed: Duration,
}

/// Trait for receiving progress updates.
///
/// Implementations must be [`Send`] and [`Sync`] because runs may execute
/// on worker threads.
///
/// Progress sinks are **infallible**: they observe but cannot halt the
/// run. Use [`CancellationToken`] for cooperative cancellation.
pub trait ProgressSink: Send + Sync {
    /// Called whenever the integer percentage advances.
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Discards all progress notifications.
///
/// This is the default when no sink is configured.
pub(crate) struct NoOpProgress;

impl ProgressSink for NoOpProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// A [`ProgressSink`] that forwards events into a channel.
///
/// Created by [`progress_channel`]. Events sent after the receiver has been
/// dropped are discarded.
#[derive(Debug)]
pub struct ChannelProgress {
    sender: Sender<ProgressEvent>,
}

impl ProgressSink for ChannelProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        let _ = self.sender.send(event.clone());
    }
}

/// Create a single-consumer progress channel.
///
/// Hand the sink to [`RunOptions::with_progress`](crate::RunOptions::with_progress)
/// and read events from the receiver, typically on another thread. The
/// receiver's iterator ends once the run has finished and the sink has
/// been dropped.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use reelcut::{RunOptions, progress_channel};
///
/// let (sink, events) = progress_channel();
/// let run = RunOptions::new().with_progress(Arc::new(sink));
/// drop(run);
/// assert!(events.iter().next().is_none());
/// ```
pub fn progress_channel() -> (ChannelProgress, Receiver<ProgressEvent>) {
    let (sender, receiver) = mpsc::channel();
    (ChannelProgress { sender }, receiver)
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone this token and share it between threads; call
/// [`cancel`](CancellationToken::cancel) from any thread to request
/// cancellation of the associated run. Pipelines check
/// [`is_cancelled`](CancellationToken::is_cancelled) between every sample,
/// packet and encode step.
///
/// # Example
///
/// ```
/// use reelcut::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    ///
    /// All clones of this token observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns completed work units into monotonic integer percentages.
pub(crate) struct ProgressTracker {
    sink: Arc<dyn ProgressSink>,
    operation: Operation,
    total: u64,
    current: u64,
    step: u8,
    last_reported: Option<u8>,
    start_time: Instant,
}

impl ProgressTracker {
    /// `step` is the minimum percentage delta between two reports.
    pub(crate) fn new(
        sink: Arc<dyn ProgressSink>,
        operation: Operation,
        total: u64,
        step: u8,
    ) -> Self {
        Self {
            sink,
            operation,
            total: total.max(1),
            current: 0,
            step: step.clamp(1, 100),
            last_reported: None,
            start_time: Instant::now(),
        }
    }

    /// Report the start of the run (0%).
    pub(crate) fn start(&mut self) {
        self.emit(0);
    }

    /// Record `units` completed work units.
    pub(crate) fn advance(&mut self, units: u64) {
        self.current = (self.current + units).min(self.total);
        // 100 is reserved for `finish`, once the output exists.
        let percent = ((self.current * 100) / self.total).min(99) as u8;
        let due = match self.last_reported {
            Some(last) => percent >= last.saturating_add(self.step),
            None => true,
        };
        if due {
            self.emit(percent);
        }
    }

    /// Report completion (100%). Only the first call emits.
    pub(crate) fn finish(&mut self) {
        self.current = self.total;
        self.emit(100);
    }

    fn emit(&mut self, percent: u8) {
        if self.last_reported.is_some_and(|last| percent <= last) {
            return;
        }
        self.last_reported = Some(percent);
        let event = ProgressEvent {
            operation: self.operation,
            percent,
            elapsed: self.start_time.elapsed(),
        };
        log::trace!("{:?} progress {}%", event.operation, event.percent);
        self.sink.on_progress(&event);
    }
}
