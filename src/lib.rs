//! # reelcut
//!
//! Convert, trim, resize, crop, flip, speed up, watermark and merge media
//! held in memory, and extract frames at exact timestamps.
//!
//! `reelcut` works on byte blobs (or files) through FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate. Every run
//! produces its output in memory and hands it back as a
//! [`ConversionResult`] with a MIME type and a suggested filename; nothing
//! is written to disk by the library.
//!
//! ## Quick Start
//!
//! ### Convert and trim
//!
//! ```no_run
//! use reelcut::{ConversionOptions, MediaSource, OutputFormat, RunOptions, TimeWindow, convert};
//!
//! let bytes = std::fs::read("input.mov").unwrap();
//! let mut source = MediaSource::from_bytes(bytes, "input.mov").unwrap();
//! let options = ConversionOptions::new(OutputFormat::Mp4).with_window(TimeWindow::between(2.0, 7.5));
//! let result = convert(&mut source, &options, &RunOptions::default()).unwrap();
//! assert_eq!(result.filename, "input_trimmed.mp4");
//! ```
//!
//! ### Extract frames
//!
//! ```no_run
//! use reelcut::{ImageFormat, MediaSource, RunOptions, extract_frames};
//!
//! let mut source = MediaSource::open("input.mp4").unwrap();
//! for frame in extract_frames(&mut source, &[0.0, 1.0, 2.0], ImageFormat::Png, &RunOptions::default()).unwrap() {
//!     std::fs::write(&frame.filename, &frame.bytes).unwrap();
//! }
//! ```
//!
//! ### Sample decoded frames directly
//!
//! ```no_run
//! use reelcut::{FrameRequest, MediaSource, primary_video_track, samples_at_timestamps};
//!
//! let mut source = MediaSource::open("input.mp4").unwrap();
//! let track = primary_video_track(&source).unwrap().expect("no video");
//! let request = FrameRequest::new([0.5, 1.5, 1.5, 4.0]).unwrap();
//! for sample in samples_at_timestamps(&mut source, &track, &request).unwrap() {
//!     let sample = sample.unwrap();
//!     println!("{} -> {} ({}x{})", sample.requested(), sample.timestamp(), sample.width(), sample.height());
//! }
//! ```
//!
//! ## Features
//!
//! - **Transcoding**: mp4, mov, webm, mkv and animated GIF output with
//!   crop, fill-scale, flip, time window and playback-rate change
//! - **Watermarks**: image overlays with optional time windows and opacity
//! - **Frame extraction**: nearest-frame sampling at exact timestamps to
//!   PNG or JPEG
//! - **Audio extraction**: mp3 and wav
//! - **Merging**: packet copy when codecs match, re-encode otherwise
//! - **Progress & cancellation**: monotonic percentage events and
//!   `CancellationToken`
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `gif` | Animated GIF output (default) |
//! | `async` | `spawn_conversion` runs conversions on Tokio's blocking pool |
//! | `rayon` | `convert_all` runs a batch with bounded parallelism |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed. Output formats whose
//! preferred encoders (libx264, libvpx, libopus, libmp3lame) are missing
//! fall back to the next candidate or fail with an encode error.

pub mod audio;
pub mod compositor;
mod conversion;
pub mod encode;
pub mod error;
pub mod ffmpeg;
pub mod format;
pub mod geometry;
#[cfg(feature = "gif")]
mod gif;
pub mod image_encoder;
mod memory_io;
pub mod merge;
pub mod metadata;
mod muxer;
pub mod naming;
pub mod options;
#[cfg(feature = "rayon")]
pub mod parallel;
pub mod pipeline;
pub mod progress;
pub mod sampler;
pub mod source;
#[cfg(feature = "async")]
pub mod stream;
pub mod track;
mod validation;

pub use audio::AudioFormat;
pub use compositor::{Compositor, FrameArena, Overlay};
pub use encode::{ClipEncoder, DEFAULT_FRAMES_PER_SECOND};
pub use error::{ReelcutError, Stage};
pub use ffmpeg::{DEFAULT_FFMPEG_LOG_LEVEL, FfmpegLogLevel, set_ffmpeg_log_level};
pub use format::{AudioCodec, FormatDescriptor, OutputFormat, VideoCodec};
pub use geometry::{FlipAxis, Rect, Size};
pub use image_encoder::{DEFAULT_JPEG_QUALITY, ImageEncoderOptions, ImageFormat, encode_image};
pub use merge::{MergeOptions, MergeStrategy, merge, plan_merge};
pub use metadata::{MediaMetadata, Track, TrackKind};
pub use naming::{frame_filename, output_filename};
pub use options::{ConversionOptions, RunOptions, TimeWindow};
#[cfg(feature = "rayon")]
pub use parallel::{ConversionJob, convert_all};
pub use pipeline::{ConversionResult, ExtractedFrame, convert, extract_audio, extract_frames};
pub use progress::{
    CancellationToken, ChannelProgress, Operation, ProgressEvent, ProgressSink, progress_channel,
};
pub use sampler::{FrameRequest, Sample, SampleIterator, samples_at_timestamps};
pub use source::MediaSource;
#[cfg(feature = "async")]
pub use stream::{ConversionFuture, ConversionTask, ProgressStream, spawn_conversion};
pub use track::{primary_audio_track, primary_video_track};
