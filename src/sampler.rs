//! Lazy, pull-based frame sampler.
//!
//! [`SampleIterator`] decodes just enough packets to answer each requested
//! timestamp with the nearest decoded frame. It holds at most the frame
//! at or before the current request plus one look-ahead frame, so memory
//! stays flat regardless of how many timestamps are requested.
//!
//! # Example
//!
//! ```no_run
//! use reelcut::{FrameRequest, MediaSource, ReelcutError, primary_video_track, samples_at_timestamps};
//!
//! let mut source = MediaSource::open("input.mp4")?;
//! let track = primary_video_track(&source)?.ok_or(ReelcutError::NoVideoStream)?;
//! let request = FrameRequest::new(vec![0.0, 1.5, 3.0])?;
//!
//! for sample in samples_at_timestamps(&mut source, &track, &request)? {
//!     let sample = sample?;
//!     println!("{:.3}s -> {:.3}s", sample.requested(), sample.timestamp());
//! }
//! # Ok::<(), ReelcutError>(())
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::Pixel,
    frame::Video as VideoFrame,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::RgbaImage;

use crate::{
    conversion::{frame_to_buffer, relative_seconds, seconds_to_seek_timestamp},
    error::{ReelcutError, Stage},
    memory_io::Demuxer,
    metadata::Track,
    progress::CancellationToken,
    source::MediaSource,
};

/// Consecutive undecodable packets tolerated before giving up.
const MAX_CONSECUTIVE_FAILURES: u32 = 8;

/// Forward distance (seconds) beyond which the sampler seeks instead of
/// decoding through.
const SEEK_THRESHOLD_SECONDS: f64 = 3.0;

/// Ordered list of timestamps (seconds) to sample.
///
/// Timestamps must be finite, non-negative and ascending. Duplicates are
/// allowed and yield the same frame twice.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRequest {
    timestamps: Vec<f64>,
}

impl FrameRequest {
    /// Validate and wrap a list of timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`ReelcutError::InvalidArgument`] for negative, non-finite or
    /// descending timestamps.
    pub fn new(timestamps: impl Into<Vec<f64>>) -> Result<Self, ReelcutError> {
        let timestamps = timestamps.into();
        for (index, &time) in timestamps.iter().enumerate() {
            if !time.is_finite() || time < 0.0 {
                return Err(ReelcutError::invalid(format!(
                    "timestamp #{index} ({time}) must be a finite, non-negative number of seconds"
                )));
            }
            if index > 0 && time < timestamps[index - 1] {
                return Err(ReelcutError::invalid(format!(
                    "timestamps must be ascending: #{index} ({time}) comes after {}",
                    timestamps[index - 1]
                )));
            }
        }
        Ok(Self { timestamps })
    }

    /// The requested timestamps in order.
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    /// Number of requested timestamps.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether no timestamps were requested.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Decrements the source's live-sample counter when dropped.
#[derive(Debug)]
struct SampleGuard(Arc<AtomicUsize>);

impl SampleGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for SampleGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// One decoded video frame converted to RGBA.
///
/// Every live sample is counted in
/// [`MediaSource::live_samples`](crate::MediaSource::live_samples) until it
/// is dropped.
#[derive(Debug)]
pub struct Sample {
    timestamp: f64,
    requested: f64,
    image: RgbaImage,
    _guard: SampleGuard,
}

impl Sample {
    /// Presentation time (seconds from stream start) of the frame chosen.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// The timestamp that was asked for.
    pub fn requested(&self) -> f64 {
        self.requested
    }

    /// Display width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Display height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// RGBA pixels of the frame.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Take the pixels, releasing the sample.
    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

struct DecodedFrame {
    time: f64,
    frame: VideoFrame,
}

struct RgbaConverter {
    context: ScalingContext,
    format: Pixel,
    width: u32,
    height: u32,
}

/// A lazy iterator yielding one [`Sample`] per requested timestamp.
///
/// Created by [`samples_at_timestamps`]. Yields exactly as many items as
/// were requested, in request order, unless an error occurs: the error is
/// yielded for the failing request and the iterator then fuses. It cannot
/// be restarted.
pub struct SampleIterator {
    demuxer: Demuxer,
    decoder: VideoDecoder,
    converter: Option<RgbaConverter>,
    stream_index: usize,
    time_base: Rational,
    stream_start: i64,
    frame_interval: f64,
    requests: Vec<f64>,
    next_request: usize,
    previous: Option<DecodedFrame>,
    lookahead: Option<DecodedFrame>,
    counter: Arc<AtomicUsize>,
    cancellation: Option<CancellationToken>,
    consecutive_failures: u32,
    eof_sent: bool,
    fused: bool,
}

/// Sample `track` of `source` at each timestamp of `request`.
///
/// Each timestamp resolves to the decoded frame whose presentation time is
/// nearest to it; on a tie the earlier frame wins. Timestamps before the
/// first frame resolve to the first frame and timestamps past the last
/// frame resolve to the last frame.
///
/// # Errors
///
/// Returns [`ReelcutError::InvalidState`] if the source has been disposed,
/// [`ReelcutError::InvalidArgument`] if `track` is not a video track of
/// this source, or a decode error if no decoder exists for the codec.
pub fn samples_at_timestamps(
    source: &mut MediaSource,
    track: &Track,
    request: &FrameRequest,
) -> Result<SampleIterator, ReelcutError> {
    SampleIterator::new(source, track, request.timestamps().to_vec())
}

impl SampleIterator {
    pub(crate) fn new(
        source: &mut MediaSource,
        track: &Track,
        requests: Vec<f64>,
    ) -> Result<Self, ReelcutError> {
        if !track.is_video() {
            return Err(ReelcutError::invalid(format!(
                "stream {} is not a video track",
                track.stream_index
            )));
        }

        let counter = source.sample_counter();
        let demuxer = source.demuxer()?;
        let stream = demuxer.stream(track.stream_index).ok_or_else(|| {
            ReelcutError::invalid(format!(
                "stream {} does not exist in '{}'",
                track.stream_index,
                source.name()
            ))
        })?;
        let time_base = stream.time_base();
        let stream_start = stream.start_time();

        let decoder_context = CodecContext::from_parameters(stream.parameters())
            .map_err(|error| ReelcutError::decode(Stage::Decode, error.to_string()))?;
        let decoder = decoder_context.decoder().video().map_err(|error| {
            ReelcutError::UnsupportedFormat(format!(
                "no decoder for video codec '{}': {error}",
                track.codec
            ))
        })?;

        let frame_interval = if track.frames_per_second > 0.0 {
            1.0 / track.frames_per_second
        } else {
            1.0 / 25.0
        };

        log::debug!(
            "Sampling stream {} of '{}' at {} timestamps",
            track.stream_index,
            source.name(),
            requests.len()
        );

        Ok(Self {
            demuxer,
            decoder,
            converter: None,
            stream_index: track.stream_index,
            time_base,
            stream_start,
            frame_interval,
            requests,
            next_request: 0,
            previous: None,
            lookahead: None,
            counter,
            cancellation: None,
            consecutive_failures: 0,
            eof_sent: false,
            fused: false,
        })
    }

    /// Stop with [`ReelcutError::Cancelled`] once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Number of requests not yet answered.
    pub fn remaining(&self) -> usize {
        if self.fused {
            0
        } else {
            self.requests.len() - self.next_request
        }
    }

    /// Drain the iterator, failing unless every request produced a sample.
    ///
    /// # Errors
    ///
    /// Propagates the first error yielded, or returns a decode error if
    /// fewer samples than requests were produced.
    pub fn collect_exact(self) -> Result<Vec<Sample>, ReelcutError> {
        let expected = self.requests.len();
        let samples = self.collect::<Result<Vec<_>, _>>()?;
        if samples.len() != expected {
            return Err(ReelcutError::decode(
                Stage::Decode,
                format!("produced {} samples for {expected} requests", samples.len()),
            ));
        }
        Ok(samples)
    }

    fn resolve(&mut self, target: f64) -> Result<Sample, ReelcutError> {
        self.seek_if_far(target);

        loop {
            if self.lookahead.is_none() {
                self.lookahead = self.decode_next()?;
            }

            let Some(lookahead) = self.lookahead.as_ref() else {
                // End of stream: the last frame answers everything after it.
                let previous = self.previous.as_ref().ok_or_else(|| {
                    ReelcutError::decode(Stage::Decode, "stream contains no decodable frames")
                })?;
                let time = previous.time;
                return self.emit(target, time, false);
            };

            if lookahead.time <= target {
                self.previous = self.lookahead.take();
                continue;
            }

            let lookahead_time = lookahead.time;
            let use_previous = match self.previous.as_ref() {
                Some(previous) => target - previous.time <= lookahead_time - target,
                None => false,
            };
            let time = if use_previous {
                self.previous.as_ref().map_or(lookahead_time, |frame| frame.time)
            } else {
                lookahead_time
            };
            return self.emit(target, time, !use_previous);
        }
    }

    fn emit(&mut self, requested: f64, time: f64, from_lookahead: bool) -> Result<Sample, ReelcutError> {
        log::trace!("Request {requested:.3}s resolved to frame at {time:.3}s");
        let candidate = if from_lookahead {
            self.lookahead.as_ref()
        } else {
            self.previous.as_ref()
        };
        let Some(candidate) = candidate else {
            return Err(ReelcutError::decode(Stage::Decode, "sampler lost its frame"));
        };
        let image = convert_to_rgba(&mut self.converter, &candidate.frame)?;
        Ok(Sample {
            timestamp: time,
            requested,
            image,
            _guard: SampleGuard::acquire(&self.counter),
        })
    }

    /// Seek to the keyframe before `target` when it is far ahead of the
    /// decoder's position.
    fn seek_if_far(&mut self, target: f64) {
        let position = self
            .lookahead
            .as_ref()
            .or(self.previous.as_ref())
            .map(|frame| frame.time)
            .unwrap_or(0.0);
        let ahead_of_lookahead = self
            .lookahead
            .as_ref()
            .is_some_and(|frame| frame.time > target);
        if ahead_of_lookahead || target - position <= SEEK_THRESHOLD_SECONDS {
            return;
        }

        let seek_timestamp = seconds_to_seek_timestamp(target);
        match self.demuxer.seek(seek_timestamp, ..seek_timestamp) {
            Ok(()) => {
                log::debug!("Seeked from {position:.3}s towards {target:.3}s");
                self.decoder.flush();
                self.previous = None;
                self.lookahead = None;
                self.eof_sent = false;
            }
            Err(error) => {
                log::debug!("Seek to {target:.3}s failed ({error}); decoding through");
            }
        }
    }

    /// Decode the next frame of the stream, or `None` at end of stream.
    fn decode_next(&mut self) -> Result<Option<DecodedFrame>, ReelcutError> {
        loop {
            let mut frame = VideoFrame::empty();
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => {
                    let time = match frame.timestamp().or(frame.pts()) {
                        Some(pts) => relative_seconds(pts, self.stream_start, self.time_base),
                        None => self
                            .previous
                            .as_ref()
                            .map_or(0.0, |previous| previous.time + self.frame_interval),
                    };
                    return Ok(Some(DecodedFrame { time, frame }));
                }
                Err(FfmpegError::Eof) => return Ok(None),
                // The decoder wants another packet.
                Err(FfmpegError::Other { errno }) if errno == ffmpeg_sys_next::EAGAIN => {
                    if self.eof_sent {
                        return Ok(None);
                    }
                }
                Err(error) => {
                    return Err(ReelcutError::decode(
                        Stage::Decode,
                        format!("decoder failed: {error}"),
                    ));
                }
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.demuxer) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    match self.decoder.send_packet(&packet) {
                        Ok(()) => self.consecutive_failures = 0,
                        Err(error) => self.record_failure(Stage::Decode, error)?,
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.decoder
                        .send_eof()
                        .map_err(|error| ReelcutError::decode(Stage::Decode, error.to_string()))?;
                    self.eof_sent = true;
                }
                Err(error) => self.record_failure(Stage::Demux, error)?,
            }
        }
    }

    fn record_failure(&mut self, stage: Stage, error: FfmpegError) -> Result<(), ReelcutError> {
        self.consecutive_failures += 1;
        if self.consecutive_failures > MAX_CONSECUTIVE_FAILURES {
            return Err(ReelcutError::decode(
                stage,
                format!("{} consecutive corrupt packets, last: {error}", self.consecutive_failures),
            ));
        }
        log::warn!("Skipping corrupt packet during {stage}: {error}");
        Ok(())
    }
}

impl Iterator for SampleIterator {
    type Item = Result<Sample, ReelcutError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused || self.next_request >= self.requests.len() {
            return None;
        }

        if self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
            self.fused = true;
            self.previous = None;
            self.lookahead = None;
            return Some(Err(ReelcutError::Cancelled));
        }

        let target = self.requests[self.next_request];
        match self.resolve(target) {
            Ok(sample) => {
                self.next_request += 1;
                Some(Ok(sample))
            }
            Err(error) => {
                self.fused = true;
                Some(Err(error))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

/// Convert a decoded frame to a tightly packed RGBA image, reusing the
/// scaler while the frame geometry stays the same.
fn convert_to_rgba(
    converter: &mut Option<RgbaConverter>,
    frame: &VideoFrame,
) -> Result<RgbaImage, ReelcutError> {
    let (format, width, height) = (frame.format(), frame.width(), frame.height());
    if width == 0 || height == 0 {
        return Err(ReelcutError::decode(Stage::Decode, "decoded frame has zero area"));
    }

    let stale = converter
        .as_ref()
        .is_none_or(|c| c.format != format || c.width != width || c.height != height);
    if stale {
        let context = ScalingContext::get(
            format,
            width,
            height,
            Pixel::RGBA,
            width,
            height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| ReelcutError::decode(Stage::Decode, format!("scaler setup: {error}")))?;
        *converter = Some(RgbaConverter {
            context,
            format,
            width,
            height,
        });
    }

    let Some(active) = converter.as_mut() else {
        return Err(ReelcutError::decode(Stage::Decode, "scaler unavailable"));
    };
    let mut rgba = VideoFrame::empty();
    active
        .context
        .run(frame, &mut rgba)
        .map_err(|error| ReelcutError::decode(Stage::Decode, format!("pixel conversion: {error}")))?;

    let buffer = frame_to_buffer(&rgba, width, height, 4);
    RgbaImage::from_raw(width, height, buffer).ok_or_else(|| {
        ReelcutError::decode(
            Stage::Decode,
            "failed to construct RGBA image from decoded frame data",
        )
    })
}
