//! Internal utility functions.
//!
//! Helpers for pixel-data copying and timestamp conversion shared by the
//! sampler, the encode stages and the merge copier.

use std::time::Duration;

use ffmpeg_next::{Rational, format::Pixel, frame::Video as VideoFrame};
use image::RgbaImage;

/// FFmpeg's `AV_NOPTS_VALUE`.
pub(crate) const NO_PTS: i64 = i64::MIN;

/// Copy pixel data from an FFmpeg video frame into a tightly-packed buffer.
///
/// `bytes_per_pixel` is the number of bytes per pixel of the frame's
/// (packed) format, e.g. 4 for RGBA.
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let expected_stride = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == expected_stride {
        data[..expected_stride * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(expected_stride * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + expected_stride]);
        }
        buffer
    }
}

/// Copy an RGBA image into a freshly allocated RGBA FFmpeg frame,
/// honouring the frame's row stride.
pub(crate) fn image_to_rgba_frame(image: &RgbaImage) -> VideoFrame {
    let width = image.width();
    let height = image.height();
    let mut frame = VideoFrame::new(Pixel::RGBA, width, height);
    let stride = frame.stride(0);
    let row_len = (width as usize) * 4;
    let source = image.as_raw();
    let destination = frame.data_mut(0);
    for y in 0..height as usize {
        let src_start = y * row_len;
        let dst_start = y * stride;
        destination[dst_start..dst_start + row_len]
            .copy_from_slice(&source[src_start..src_start + row_len]);
    }
    frame
}

/// Rescale a PTS value from stream time base to seconds.
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    if time_base.denominator() == 0 {
        return 0.0;
    }
    pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}

/// Presentation time of `pts` relative to the stream's start time, in
/// seconds and never negative.
pub(crate) fn relative_seconds(pts: i64, stream_start: i64, time_base: Rational) -> f64 {
    let origin = if stream_start == NO_PTS { 0 } else { stream_start };
    pts_to_seconds(pts.saturating_sub(origin), time_base).max(0.0)
}

/// Convert seconds to a timestamp in the given time base.
pub(crate) fn seconds_to_stream_timestamp(seconds: f64, time_base: Rational) -> i64 {
    let numerator = time_base.numerator() as f64;
    let denominator = time_base.denominator() as f64;
    if numerator == 0.0 {
        return 0;
    }
    (seconds * denominator / numerator).round() as i64
}

/// Convert seconds to a container-level seek timestamp in AV_TIME_BASE
/// (microseconds).
///
/// `input_context.seek()` (via `avformat_seek_file` with
/// `stream_index = -1`) expects timestamps in AV_TIME_BASE, not in the
/// stream's own time base.
pub(crate) fn seconds_to_seek_timestamp(seconds: f64) -> i64 {
    (seconds.max(0.0) * 1_000_000.0) as i64
}

/// Convert a container duration in AV_TIME_BASE units to a [`Duration`].
pub(crate) fn container_duration(microseconds: i64) -> Duration {
    if microseconds > 0 {
        Duration::from_micros(microseconds as u64)
    } else {
        Duration::ZERO
    }
}

/// Frames per second of a rational frame rate, or `0.0` when unknown.
pub(crate) fn rational_to_f64(rate: Rational) -> f64 {
    if rate.denominator() == 0 {
        0.0
    } else {
        rate.numerator() as f64 / rate.denominator() as f64
    }
}
