//! The conversion pipeline.
//!
//! [`convert`] runs trim → crop/scale/flip → overlays → encode over a
//! source and returns the finished container. Output frame `k` is the
//! source frame nearest to `start + k · rate / fps`, so a playback-rate
//! change duplicates frames when slowing down and skips frames when
//! speeding up. Audio is decoded in step with the video and encoded into
//! the same container.
//!
//! [`extract_frames`] and [`extract_audio`] are the frame-extraction and
//! audio-only paths.
//!
//! Every run checks its [`CancellationToken`](crate::CancellationToken)
//! between samples and encode steps. A cancelled run drops its partial
//! output, releases every sample and disposes the source.

use std::time::Duration;

use image::RgbaImage;

use crate::{
    audio::{AudioFormat, AudioTranscoder},
    compositor::FrameArena,
    encode::VideoEncodeStage,
    error::{ReelcutError, Stage},
    ffmpeg::ensure_initialized,
    format::OutputFormat,
    geometry::Size,
    image_encoder::{ImageFormat, encode_image},
    metadata::Track,
    muxer::ContainerWriter,
    naming::{EXTRACTED_TAG, frame_filename, operation_tag, output_filename},
    options::{ConversionOptions, RunOptions, TimeWindow},
    progress::Operation,
    sampler::{FrameRequest, SampleIterator, samples_at_timestamps},
    source::MediaSource,
    track::{primary_audio_track, primary_video_track},
    validation::{ConversionPlan, plan_conversion, resolve_window},
};

/// Audio extraction reports progress once per this many seconds of output.
const AUDIO_PROGRESS_INTERVAL: f64 = 0.1;

/// The output of a conversion, merge or audio extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    /// The finished file.
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`.
    pub mime_type: &'static str,
    /// Suggested filename, `<stem>_<tag>.<ext>`.
    pub filename: String,
    /// Container of `bytes`.
    pub format: OutputFormat,
    /// Playback duration of the output.
    pub duration: Duration,
    /// Encoded video width (0 for audio-only output).
    pub width: u32,
    /// Encoded video height (0 for audio-only output).
    pub height: u32,
}

impl ConversionResult {
    /// Take the output bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// One still image produced by [`extract_frames`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFrame {
    /// The timestamp that was asked for.
    pub requested: f64,
    /// Presentation time of the frame actually used.
    pub timestamp: f64,
    /// Image width.
    pub width: u32,
    /// Image height.
    pub height: u32,
    /// Encoded image.
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`.
    pub mime_type: &'static str,
    /// Suggested filename, `frame_<t>s.<ext>`.
    pub filename: String,
}

/// Dispose the source when a run was cancelled.
fn settle<T>(source: &mut MediaSource, outcome: Result<T, ReelcutError>) -> Result<T, ReelcutError> {
    if matches!(outcome, Err(ReelcutError::Cancelled)) {
        log::info!("Run on '{}' cancelled; disposing source", source.name());
        source.dispose();
    }
    outcome
}

/// Convert `source` according to `options`.
///
/// Options are validated against the source's primary tracks before any
/// decoding starts.
///
/// # Errors
///
/// - [`ReelcutError::InvalidArgument`] for invalid options,
/// - [`ReelcutError::NoVideoStream`] if the source has no video,
/// - [`ReelcutError::InvalidState`] if the source was disposed,
/// - [`ReelcutError::Cancelled`] if the run was cancelled (the source is
///   disposed),
/// - decode or encode errors, which abort the run.
///
/// # Example
///
/// ```no_run
/// use reelcut::{ConversionOptions, MediaSource, OutputFormat, RunOptions, Size, convert};
///
/// let mut source = MediaSource::open("input.mp4")?;
/// let options = ConversionOptions::new(OutputFormat::WebM).with_target_size(Size::new(640, 360));
/// let result = convert(&mut source, &options, &RunOptions::default())?;
/// std::fs::write(&result.filename, &result.bytes)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn convert(
    source: &mut MediaSource,
    options: &ConversionOptions,
    run: &RunOptions,
) -> Result<ConversionResult, ReelcutError> {
    ensure_initialized()?;
    let video = primary_video_track(source)?;
    let audio = primary_audio_track(source)?;
    let container_duration = source.metadata()?.duration.as_secs_f64();
    let plan = plan_conversion(options, video, audio, container_duration)?;

    log::info!(
        "Converting '{}' to {} ({} frames)",
        source.name(),
        options.format,
        plan.output_frames
    );
    let outcome = run_conversion(source, options, &plan, run);
    settle(source, outcome)
}

fn run_conversion(
    source: &mut MediaSource,
    options: &ConversionOptions,
    plan: &ConversionPlan,
    run: &RunOptions,
) -> Result<ConversionResult, ReelcutError> {
    run.check_cancelled()?;
    let compositor = options.compositor();
    let requests = (0..plan.output_frames)
        .map(|index| plan.source_time(index))
        .collect();
    let mut samples = SampleIterator::new(source, &plan.video, requests)?;
    if let Some(token) = &run.cancellation {
        samples = samples.with_cancellation(token.clone());
    }
    let mut sink = VideoSink::open(source, options, plan)?;

    let mut tracker = run.tracker(Operation::Conversion, plan.output_frames);
    tracker.start();
    let mut arena = FrameArena::new();
    let mut produced = 0u64;
    for sample in samples {
        run.check_cancelled()?;
        let sample = sample?;
        log::trace!(
            "Output frame {produced}: requested {:.3}s, using {:.3}s",
            sample.requested(),
            sample.timestamp()
        );
        let canvas = compositor.composite(&mut arena, sample.image(), plan.output_time(produced))?;
        produced += 1;
        sink.push(canvas, plan.output_time(produced))?;
        tracker.advance(1);
    }
    if produced != plan.output_frames {
        return Err(ReelcutError::decode(
            Stage::Decode,
            format!("produced {produced} of {} frames", plan.output_frames),
        ));
    }

    run.check_cancelled()?;
    let (bytes, size) = sink.finish()?;
    tracker.finish();

    let duration = Duration::from_secs_f64(produced as f64 / f64::from(plan.frames_per_second));
    log::info!(
        "Converted '{}': {} bytes, {size}, {:.3}s (arena reallocated {} times)",
        source.name(),
        bytes.len(),
        duration.as_secs_f64(),
        arena.reallocations()
    );
    Ok(ConversionResult {
        bytes,
        mime_type: options.format.mime_type(),
        filename: output_filename(source.name(), &operation_tag(options), options.format.extension()),
        format: options.format,
        duration,
        width: size.width,
        height: size.height,
    })
}

/// Where composited frames go.
enum VideoSink {
    Container {
        writer: ContainerWriter,
        video: VideoEncodeStage,
        audio: Option<AudioTranscoder>,
    },
    #[cfg(feature = "gif")]
    Gif(crate::gif::GifWriter),
}

impl VideoSink {
    fn open(
        source: &mut MediaSource,
        options: &ConversionOptions,
        plan: &ConversionPlan,
    ) -> Result<Self, ReelcutError> {
        if options.format == OutputFormat::Gif {
            return Self::open_gif(plan);
        }

        let descriptor = options.format.descriptor();
        let candidates = options
            .codec
            .as_ref()
            .map_or(descriptor.video_codecs, std::slice::from_ref);
        let mut writer = ContainerWriter::new(options.format)?;
        let video = VideoEncodeStage::open(&mut writer, candidates, plan.canvas, plan.frames_per_second)?;
        let audio = match &plan.audio {
            Some(track) => Some(AudioTranscoder::open(
                source,
                track,
                &mut writer,
                descriptor.audio_codecs,
                plan.start,
                plan.end,
                plan.speed,
            )?),
            None => None,
        };
        writer.write_header()?;
        log::debug!(
            "Encoding video as {}{}",
            video.codec(),
            if audio.is_some() { " with audio" } else { "" }
        );
        Ok(VideoSink::Container {
            writer,
            video,
            audio,
        })
    }

    #[cfg(feature = "gif")]
    fn open_gif(plan: &ConversionPlan) -> Result<Self, ReelcutError> {
        let writer = crate::gif::GifWriter::new(plan.canvas, f64::from(plan.frames_per_second))?;
        Ok(VideoSink::Gif(writer))
    }

    #[cfg(not(feature = "gif"))]
    fn open_gif(_plan: &ConversionPlan) -> Result<Self, ReelcutError> {
        Err(ReelcutError::UnsupportedFormat(
            "GIF output requires the `gif` feature".to_string(),
        ))
    }

    /// Encode one frame, then bring audio up to `output_time`.
    fn push(&mut self, canvas: &RgbaImage, output_time: f64) -> Result<(), ReelcutError> {
        match self {
            VideoSink::Container {
                writer,
                video,
                audio,
            } => {
                video.push(canvas, writer)?;
                if let Some(audio) = audio.as_mut() {
                    audio.pump_until(writer, output_time)?;
                }
                Ok(())
            }
            #[cfg(feature = "gif")]
            VideoSink::Gif(gif) => gif.push(canvas),
        }
    }

    /// Flush every stage and return the bytes and encoded size.
    fn finish(self) -> Result<(Vec<u8>, Size), ReelcutError> {
        match self {
            VideoSink::Container {
                mut writer,
                mut video,
                audio,
            } => {
                video.finish(&mut writer)?;
                if let Some(audio) = audio {
                    audio.finish(&mut writer)?;
                }
                let size = video.size();
                Ok((writer.finish()?, size))
            }
            #[cfg(feature = "gif")]
            VideoSink::Gif(gif) => {
                let size = gif.size();
                Ok((gif.finish()?, size))
            }
        }
    }
}

/// Extract one still image per timestamp from the primary video track.
///
/// `timestamps` must be ascending; duplicates are allowed. Each image is
/// the frame nearest to its timestamp and is named
/// `frame_<timestamp>s.<ext>` after the requested time.
///
/// # Errors
///
/// - [`ReelcutError::InvalidArgument`] for unsorted, negative or
///   non-finite timestamps,
/// - [`ReelcutError::NoVideoStream`] if the source has no video,
/// - [`ReelcutError::Cancelled`] if the run was cancelled (the source is
///   disposed),
/// - decode or image encode errors.
pub fn extract_frames(
    source: &mut MediaSource,
    timestamps: &[f64],
    format: ImageFormat,
    run: &RunOptions,
) -> Result<Vec<ExtractedFrame>, ReelcutError> {
    ensure_initialized()?;
    source.ensure_usable()?;
    let request = FrameRequest::new(timestamps)?;
    let track = primary_video_track(source)?.ok_or(ReelcutError::NoVideoStream)?;

    log::info!(
        "Extracting {} {} frames from '{}'",
        request.len(),
        format.extension(),
        source.name()
    );
    let outcome = run_frame_extraction(source, &track, &request, format, run);
    settle(source, outcome)
}

fn run_frame_extraction(
    source: &mut MediaSource,
    track: &Track,
    request: &FrameRequest,
    format: ImageFormat,
    run: &RunOptions,
) -> Result<Vec<ExtractedFrame>, ReelcutError> {
    run.check_cancelled()?;
    let mut samples = samples_at_timestamps(source, track, request)?;
    if let Some(token) = &run.cancellation {
        samples = samples.with_cancellation(token.clone());
    }

    let image_options = run.image_options();
    let mut tracker = run.tracker(Operation::FrameExtraction, request.len() as u64);
    tracker.start();
    let mut frames = Vec::with_capacity(request.len());
    for sample in samples {
        run.check_cancelled()?;
        let sample = sample?;
        let bytes = encode_image(sample.image(), format, &image_options)?;
        frames.push(ExtractedFrame {
            requested: sample.requested(),
            timestamp: sample.timestamp(),
            width: sample.width(),
            height: sample.height(),
            bytes,
            mime_type: format.mime_type(),
            filename: frame_filename(sample.requested(), format),
        });
        tracker.advance(1);
    }
    if frames.len() != request.len() {
        return Err(ReelcutError::decode(
            Stage::Decode,
            format!("extracted {} of {} frames", frames.len(), request.len()),
        ));
    }
    tracker.finish();
    Ok(frames)
}

/// Extract the primary audio track, optionally limited to `window`.
///
/// # Errors
///
/// - [`ReelcutError::InvalidArgument`] for an invalid window,
/// - [`ReelcutError::NoAudioStream`] if the source has no audio,
/// - [`ReelcutError::Cancelled`] if the run was cancelled (the source is
///   disposed),
/// - decode or encode errors (for example when no MP3 encoder is built
///   into FFmpeg).
pub fn extract_audio(
    source: &mut MediaSource,
    format: AudioFormat,
    window: TimeWindow,
    run: &RunOptions,
) -> Result<ConversionResult, ReelcutError> {
    ensure_initialized()?;
    let track = primary_audio_track(source)?.ok_or(ReelcutError::NoAudioStream)?;
    let duration = if track.duration.as_secs_f64() > 0.0 {
        track.duration.as_secs_f64()
    } else {
        source.metadata()?.duration.as_secs_f64()
    };
    let (start, end) = resolve_window(&window, duration)?;

    log::info!(
        "Extracting audio from '{}' as {format} ({start:.3}s..{end:.3}s)",
        source.name()
    );
    let outcome = run_audio_extraction(source, &track, format, start, end, run);
    settle(source, outcome)
}

fn run_audio_extraction(
    source: &mut MediaSource,
    track: &Track,
    format: AudioFormat,
    start: f64,
    end: f64,
    run: &RunOptions,
) -> Result<ConversionResult, ReelcutError> {
    run.check_cancelled()?;
    let output_format = format.output_format();
    let mut writer = ContainerWriter::new(output_format)?;
    let mut audio = AudioTranscoder::open(
        source,
        track,
        &mut writer,
        output_format.descriptor().audio_codecs,
        start,
        end,
        1.0,
    )?;
    writer.write_header()?;

    let steps = ((end - start) / AUDIO_PROGRESS_INTERVAL).ceil().max(1.0) as u64;
    let mut tracker = run.tracker(Operation::AudioExtraction, steps);
    tracker.start();
    for step in 1..=steps {
        run.check_cancelled()?;
        audio.pump_until(&mut writer, step as f64 * AUDIO_PROGRESS_INTERVAL)?;
        tracker.advance(1);
    }
    run.check_cancelled()?;
    let seconds = audio.finish(&mut writer)?;
    let bytes = writer.finish()?;
    tracker.finish();

    log::info!(
        "Extracted {seconds:.3}s of audio from '{}': {} bytes",
        source.name(),
        bytes.len()
    );
    Ok(ConversionResult {
        bytes,
        mime_type: output_format.mime_type(),
        filename: output_filename(source.name(), EXTRACTED_TAG, output_format.extension()),
        format: output_format,
        duration: Duration::from_secs_f64(seconds),
        width: 0,
        height: 0,
    })
}
