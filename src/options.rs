//! Conversion and run configuration.
//!
//! [`ConversionOptions`] describes *what* a conversion produces: target
//! container, geometry, time window, playback rate and overlays.
//! [`RunOptions`] carries the operational settings of one run (progress
//! sink, cancellation token, JPEG quality, progress granularity) so they
//! do not have to be threaded through every signature.
//!
//! Options are only checked when a run starts; every problem is reported
//! as [`ReelcutError::InvalidArgument`](crate::ReelcutError::InvalidArgument)
//! before any decoding happens.
//!
//! # Example
//!
//! ```
//! use reelcut::{ConversionOptions, FlipAxis, OutputFormat, Rect, Size, TimeWindow};
//!
//! let options = ConversionOptions::new(OutputFormat::WebM)
//!     .with_crop(Rect::new(0, 0, 320, 240))
//!     .with_target_size(Size::new(160, 120))
//!     .with_flip(FlipAxis::Horizontal)
//!     .with_window(TimeWindow::between(1.0, 3.0))
//!     .with_speed(2.0);
//! assert_eq!(options.format(), OutputFormat::WebM);
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use crate::{
    compositor::{Compositor, Overlay},
    error::ReelcutError,
    format::{OutputFormat, VideoCodec},
    geometry::{FlipAxis, Rect, Size},
    image_encoder::{DEFAULT_JPEG_QUALITY, ImageEncoderOptions},
    progress::{CancellationToken, NoOpProgress, Operation, ProgressSink, ProgressTracker},
};

/// A span of source time in seconds.
///
/// Either bound may be open: an open start means the beginning of the
/// source, an open end means its end.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeWindow {
    /// First source second kept.
    pub start: Option<f64>,
    /// Source second at which output stops (exclusive).
    pub end: Option<f64>,
}

impl TimeWindow {
    /// The whole source.
    pub const fn full() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// From `start` to the end of the source.
    pub const fn starting_at(start: f64) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// From the beginning of the source up to `end`.
    pub const fn ending_at(end: f64) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    /// From `start` up to `end`.
    pub const fn between(start: f64, end: f64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Whether neither bound is set.
    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// What a conversion produces.
#[derive(Debug, Clone)]
#[must_use]
pub struct ConversionOptions {
    pub(crate) format: OutputFormat,
    pub(crate) target_size: Option<Size>,
    pub(crate) window: TimeWindow,
    pub(crate) crop: Option<Rect>,
    pub(crate) flip: Option<FlipAxis>,
    pub(crate) speed: f64,
    pub(crate) overlays: Vec<Overlay>,
    pub(crate) frames_per_second: Option<u32>,
    pub(crate) codec: Option<VideoCodec>,
    pub(crate) mute: bool,
    pub(crate) tag: Option<String>,
}

impl ConversionOptions {
    /// Convert to `format` without any other change.
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            target_size: None,
            window: TimeWindow::full(),
            crop: None,
            flip: None,
            speed: 1.0,
            overlays: Vec::new(),
            frames_per_second: None,
            codec: None,
            mute: false,
            tag: None,
        }
    }

    /// Target container.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Playback-rate multiplier.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Change the target container.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Scale every frame (after cropping) to exactly `size`.
    pub fn with_target_size(mut self, size: Size) -> Self {
        self.target_size = Some(size);
        self
    }

    /// Keep only `window` of the source.
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    /// Crop to `rect`, given in original source coordinates.
    pub fn with_crop(mut self, rect: Rect) -> Self {
        self.crop = Some(rect);
        self
    }

    /// Mirror the output along `axis`.
    pub fn with_flip(mut self, axis: FlipAxis) -> Self {
        self.flip = Some(axis);
        self
    }

    /// Play back `rate` times faster (`rate < 1` slows down).
    pub fn with_speed(mut self, rate: f64) -> Self {
        self.speed = rate;
        self
    }

    /// Draw `overlay` above previously added overlays.
    pub fn with_overlay(mut self, overlay: Overlay) -> Self {
        self.overlays.push(overlay);
        self
    }

    /// Override the output frame rate (defaults to the source's).
    pub fn with_frames_per_second(mut self, frames_per_second: u32) -> Self {
        self.frames_per_second = Some(frames_per_second);
        self
    }

    /// Force a video codec instead of the format's candidates.
    pub fn with_codec(mut self, codec: VideoCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Drop the audio track.
    pub fn with_mute(mut self, mute: bool) -> Self {
        self.mute = mute;
        self
    }

    /// Use `tag` in the suggested filename instead of the derived one.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// The compositor implementing this conversion's frame transforms.
    pub(crate) fn compositor(&self) -> Compositor {
        let mut compositor = Compositor::new();
        if let Some(crop) = self.crop {
            compositor = compositor.with_crop(crop);
        }
        if let Some(size) = self.target_size {
            compositor = compositor.with_target_size(size);
        }
        if let Some(axis) = self.flip {
            compositor = compositor.with_flip(axis);
        }
        for overlay in &self.overlays {
            compositor = compositor.with_overlay(overlay.clone());
        }
        compositor
    }
}

/// Operational settings of one run.
///
/// A default-constructed value reports no progress and is never cancelled.
#[derive(Clone)]
pub struct RunOptions {
    pub(crate) progress: Arc<dyn ProgressSink>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) jpeg_quality: u8,
    pub(crate) progress_step: u8,
}

impl Debug for RunOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RunOptions")
            .field("has_progress", &true)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("jpeg_quality", &self.jpeg_quality)
            .field("progress_step", &self.progress_step)
            .finish()
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl RunOptions {
    /// Defaults: no progress sink, no cancellation, JPEG quality 92,
    /// progress reported on every whole percent.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            progress_step: 1,
        }
    }

    /// Receive [`ProgressEvent`](crate::ProgressEvent)s.
    #[must_use]
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// Stop with [`ReelcutError::Cancelled`] once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// JPEG quality for extracted frames, clamped to `1..=100`.
    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Minimum percentage change between two progress events (at least 1).
    #[must_use]
    pub fn with_progress_step(mut self, step: u8) -> Self {
        self.progress_step = step.clamp(1, 100);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), ReelcutError> {
        if self.is_cancelled() {
            Err(ReelcutError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn tracker(&self, operation: Operation, total: u64) -> ProgressTracker {
        ProgressTracker::new(Arc::clone(&self.progress), operation, total, self.progress_step)
    }

    pub(crate) fn image_options(&self) -> ImageEncoderOptions {
        ImageEncoderOptions::default().with_jpeg_quality(self.jpeg_quality)
    }
}
