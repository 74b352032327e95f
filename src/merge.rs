//! Concatenating several sources into one output.
//!
//! [`merge`] joins sources in caller order. When every source carries the
//! same video codec and dimensions (and, if they all have audio, the same
//! audio codec, rate and channel count) and the target container accepts
//! those codecs, packets are copied without decoding: each source's
//! timestamps are shifted by the accumulated end time of the sources
//! before it. Otherwise every source is decoded, scaled to a common size
//! and re-encoded at a common frame rate.
//!
//! # Example
//!
//! ```no_run
//! use reelcut::{MediaSource, MergeOptions, MergeStrategy, RunOptions, merge, plan_merge};
//!
//! let mut sources = vec![
//!     MediaSource::open("intro.mp4")?,
//!     MediaSource::open("main.mp4")?,
//! ];
//! let options = MergeOptions::default();
//! if plan_merge(&sources, &options)? == MergeStrategy::Copy {
//!     println!("fast path");
//! }
//! let merged = merge(&mut sources, &options, &RunOptions::default())?;
//! # Ok::<(), reelcut::ReelcutError>(())
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    time::Duration,
};

use ffmpeg_next::{Error as FfmpegError, Packet, Rational, codec::Id};

use crate::{
    audio::{AudioEncodeStage, AudioInput},
    compositor::{Compositor, FrameArena},
    conversion::{NO_PTS, pts_to_seconds, seconds_to_stream_timestamp},
    encode::{DEFAULT_FRAMES_PER_SECOND, VideoEncodeStage},
    error::{ReelcutError, Stage},
    ffmpeg::ensure_initialized,
    format::OutputFormat,
    geometry::Size,
    metadata::Track,
    muxer::ContainerWriter,
    naming::{MERGED_TAG, output_filename},
    options::RunOptions,
    pipeline::ConversionResult,
    progress::Operation,
    sampler::SampleIterator,
    source::MediaSource,
    track::{primary_audio_track, primary_video_track},
};

/// Consecutive unreadable packets tolerated per source on the copy path.
const MAX_CONSECUTIVE_FAILURES: u32 = 8;

/// How [`merge`] joins its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeStrategy {
    /// Packets are copied; nothing is decoded.
    Copy,
    /// Every source is decoded and encoded again.
    Reencode,
}

impl Display for MergeStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MergeStrategy::Copy => f.write_str("copy"),
            MergeStrategy::Reencode => f.write_str("re-encode"),
        }
    }
}

/// Settings for [`merge`].
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct MergeOptions {
    pub(crate) format: OutputFormat,
    pub(crate) target_size: Option<Size>,
    pub(crate) frames_per_second: Option<u32>,
    pub(crate) force_reencode: bool,
    pub(crate) mute: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self::new(OutputFormat::Mp4)
    }
}

impl MergeOptions {
    /// Merge into `format`.
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            target_size: None,
            frames_per_second: None,
            force_reencode: false,
            mute: false,
        }
    }

    /// Re-encode at `size` instead of the first source's dimensions.
    /// Implies re-encoding unless every source already has that size.
    pub fn with_target_size(mut self, size: Size) -> Self {
        self.target_size = Some(size);
        self
    }

    /// Re-encode at `frames_per_second` instead of the first source's rate.
    pub fn with_frames_per_second(mut self, frames_per_second: u32) -> Self {
        self.frames_per_second = Some(frames_per_second);
        self
    }

    /// Always decode and re-encode, even when packets could be copied.
    pub fn with_force_reencode(mut self, force: bool) -> Self {
        self.force_reencode = force;
        self
    }

    /// Drop audio from the output.
    pub fn with_mute(mut self, mute: bool) -> Self {
        self.mute = mute;
        self
    }
}

/// Primary tracks of one source.
struct Inputs {
    video: Track,
    audio: Option<Track>,
}

fn collect_inputs(sources: &[MediaSource]) -> Result<Vec<Inputs>, ReelcutError> {
    sources
        .iter()
        .map(|source| {
            let video = primary_video_track(source)?.ok_or(ReelcutError::NoVideoStream)?;
            let audio = primary_audio_track(source)?;
            Ok(Inputs { video, audio })
        })
        .collect()
}

fn validate(sources: &[MediaSource], options: &MergeOptions) -> Result<(), ReelcutError> {
    if sources.len() < 2 {
        return Err(ReelcutError::invalid(format!(
            "merge needs at least two sources, got {}",
            sources.len()
        )));
    }
    if !options.format.is_video() || options.format == OutputFormat::Gif {
        return Err(ReelcutError::invalid(format!(
            "cannot merge into {}; choose a video container",
            options.format
        )));
    }
    if options.target_size.is_some_and(|size| size.is_empty()) {
        return Err(ReelcutError::invalid("merge target size must be positive"));
    }
    if options
        .frames_per_second
        .is_some_and(|fps| fps == 0 || fps > 120)
    {
        return Err(ReelcutError::invalid("merge frame rate must be within 1..=120"));
    }
    Ok(())
}

/// Whether every source's audio is missing, or all match.
fn audio_matches(inputs: &[Inputs]) -> bool {
    let first = inputs[0].audio.as_ref();
    inputs.iter().all(|input| match (first, input.audio.as_ref()) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            a.codec == b.codec && a.sample_rate == b.sample_rate && a.channels == b.channels
        }
        _ => false,
    })
}

fn codec_id(name: &str) -> Option<Id> {
    ffmpeg_next::decoder::find_by_name(name).map(|codec| codec.id())
}

fn choose_strategy(inputs: &[Inputs], options: &MergeOptions) -> Result<MergeStrategy, ReelcutError> {
    if options.force_reencode {
        return Ok(MergeStrategy::Reencode);
    }
    let first = &inputs[0].video;
    let same_video = inputs.iter().all(|input| {
        input.video.codec == first.codec
            && input.video.width == first.width
            && input.video.height == first.height
    });
    let size_kept = options
        .target_size
        .is_none_or(|size| size == Size::new(first.width, first.height));
    if !(same_video && size_kept && (options.mute || audio_matches(inputs))) {
        return Ok(MergeStrategy::Reencode);
    }

    let writer = ContainerWriter::new(options.format)?;
    let mut codecs = vec![codec_id(&first.codec)];
    if !options.mute {
        if let Some(audio) = &inputs[0].audio {
            codecs.push(codec_id(&audio.codec));
        }
    }
    let accepted = codecs
        .into_iter()
        .all(|id| id.is_some_and(|id| writer.accepts_codec(id)));
    Ok(if accepted {
        MergeStrategy::Copy
    } else {
        MergeStrategy::Reencode
    })
}

/// Decide how [`merge`] would join `sources` without touching their
/// packets.
///
/// # Errors
///
/// Returns [`ReelcutError::InvalidArgument`] for fewer than two sources or
/// a non-video target, [`ReelcutError::NoVideoStream`] if a source has no
/// video and [`ReelcutError::InvalidState`] for a disposed source.
pub fn plan_merge(sources: &[MediaSource], options: &MergeOptions) -> Result<MergeStrategy, ReelcutError> {
    ensure_initialized()?;
    validate(sources, options)?;
    let inputs = collect_inputs(sources)?;
    choose_strategy(&inputs, options)
}

/// Concatenate `sources` in order.
///
/// The suggested filename is derived from the first source with the
/// `merged` tag.
///
/// # Errors
///
/// Everything [`plan_merge`] reports, plus decode and encode errors and
/// [`ReelcutError::Cancelled`] (all sources are then disposed).
pub fn merge(
    sources: &mut [MediaSource],
    options: &MergeOptions,
    run: &RunOptions,
) -> Result<ConversionResult, ReelcutError> {
    ensure_initialized()?;
    validate(sources, options)?;
    let inputs = collect_inputs(sources)?;
    let strategy = choose_strategy(&inputs, options)?;
    log::info!(
        "Merging {} sources into {} ({strategy})",
        sources.len(),
        options.format
    );

    let outcome = match strategy {
        MergeStrategy::Copy => merge_copy(sources, &inputs, options, run),
        MergeStrategy::Reencode => merge_reencode(sources, &inputs, options, run),
    };
    if matches!(outcome, Err(ReelcutError::Cancelled)) {
        log::info!("Merge cancelled; disposing sources");
        for source in sources.iter_mut() {
            source.dispose();
        }
    }
    let (bytes, size, seconds) = outcome?;

    let filename = output_filename(sources[0].name(), MERGED_TAG, options.format.extension());
    log::info!(
        "Merged into {filename}: {} bytes, {size}, {seconds:.3}s",
        bytes.len()
    );
    Ok(ConversionResult {
        bytes,
        mime_type: options.format.mime_type(),
        filename,
        format: options.format,
        duration: Duration::from_secs_f64(seconds.max(0.0)),
        width: size.width,
        height: size.height,
    })
}

/// Copied stream of one source: input index and time base, output index.
struct CopyRoute {
    input: usize,
    time_base: Rational,
    start: i64,
    output: usize,
}

type MergeOutput = (Vec<u8>, Size, f64);

fn merge_copy(
    sources: &mut [MediaSource],
    inputs: &[Inputs],
    options: &MergeOptions,
    run: &RunOptions,
) -> Result<MergeOutput, ReelcutError> {
    let first = &inputs[0];
    let mut writer = ContainerWriter::new(options.format)?;
    let mut outputs = Vec::new();
    {
        let template = sources[0].demuxer()?;
        let mut tracks = vec![&first.video];
        if !options.mute {
            tracks.extend(first.audio.as_ref());
        }
        for track in tracks {
            let stream = template.stream(track.stream_index).ok_or_else(|| {
                ReelcutError::decode(Stage::Demux, format!("stream {} vanished", track.stream_index))
            })?;
            let mut output = writer
                .output_mut()
                .add_stream(ffmpeg_next::encoder::find(Id::None))
                .map_err(|error| ReelcutError::encode(Stage::Mux, format!("cannot add stream: {error}")))?;
            output.set_parameters(stream.parameters());
            // Let the muxer pick its own tag for the codec.
            // SAFETY: the parameters pointer belongs to the stream just added
            // to the output context, which `writer` owns for the rest of this
            // function. `codec_tag` is a plain integer and the header has not
            // been written, so no muxer code reads it concurrently.
            unsafe {
                (*output.parameters().as_mut_ptr()).codec_tag = 0;
            }
            outputs.push(output.index());
        }
    }
    writer.write_header()?;

    let total_bytes = sources.iter().map(MediaSource::byte_length).sum();
    let mut tracker = run.tracker(Operation::Merge, total_bytes);
    tracker.start();

    let mut last_dts = vec![i64::MIN; outputs.len()];
    let mut offset = 0.0;
    for (source, input) in sources.iter_mut().zip(inputs) {
        let mut demuxer = source.demuxer()?;
        let mut routes = Vec::new();
        let mut tracks = vec![&input.video];
        if !options.mute {
            tracks.extend(input.audio.as_ref());
        }
        for (track, &output) in tracks.into_iter().zip(&outputs) {
            if let Some(stream) = demuxer.stream(track.stream_index) {
                let start = stream.start_time();
                routes.push(CopyRoute {
                    input: track.stream_index,
                    time_base: stream.time_base(),
                    start: if start == NO_PTS { 0 } else { start },
                    output,
                });
            }
        }

        let mut source_end: f64 = 0.0;
        let mut failures = 0u32;
        let mut packet = Packet::empty();
        loop {
            run.check_cancelled()?;
            match packet.read(&mut demuxer) {
                Ok(()) => failures = 0,
                Err(FfmpegError::Eof) => break,
                Err(error) => {
                    failures += 1;
                    if failures > MAX_CONSECUTIVE_FAILURES {
                        return Err(ReelcutError::decode(
                            Stage::Demux,
                            format!("cannot read packets from '{}': {error}", source.name()),
                        ));
                    }
                    log::warn!("Skipping unreadable packet in '{}': {error}", source.name());
                    continue;
                }
            }
            let size = packet.size() as u64;
            let Some((route_index, route)) = routes
                .iter()
                .enumerate()
                .find(|(_, route)| route.input == packet.stream())
            else {
                tracker.advance(size);
                continue;
            };

            let shift = seconds_to_stream_timestamp(offset, route.time_base) - route.start;
            let pts = packet.pts().map(|pts| pts + shift);
            let dts = packet.dts().map(|dts| dts + shift).or(pts);
            packet.set_pts(pts);
            packet.set_dts(dts);
            if let Some(pts) = pts {
                let end = pts.max(dts.unwrap_or(pts)) + packet.duration().max(0);
                source_end = source_end.max(pts_to_seconds(end, route.time_base) - offset);
            }

            let output_time_base = writer.stream_time_base(route.output)?;
            packet.rescale_ts(route.time_base, output_time_base);
            // Muxers need strictly increasing dts across the seam.
            let slot = &mut last_dts[route_index];
            if let Some(dts) = packet.dts() {
                let dts = if dts <= *slot { *slot + 1 } else { dts };
                packet.set_dts(Some(dts));
                if packet.pts().is_some_and(|pts| pts < dts) {
                    packet.set_pts(Some(dts));
                }
                *slot = dts;
            }
            writer.write_packet(&mut packet, route.output, output_time_base)?;
            tracker.advance(size);
        }

        let duration = if source_end > 0.0 {
            source_end
        } else {
            input.video.duration.as_secs_f64()
        };
        log::debug!("Copied '{}' at offset {offset:.3}s ({duration:.3}s)", source.name());
        offset += duration;
    }

    run.check_cancelled()?;
    let bytes = writer.finish()?;
    tracker.finish();
    Ok((bytes, Size::new(first.video.width, first.video.height), offset))
}

fn merge_reencode(
    sources: &mut [MediaSource],
    inputs: &[Inputs],
    options: &MergeOptions,
    run: &RunOptions,
) -> Result<MergeOutput, ReelcutError> {
    let first = &inputs[0].video;
    let canvas = options
        .target_size
        .unwrap_or(Size::new(first.width, first.height));
    let frames_per_second = options.frames_per_second.unwrap_or(if first.frames_per_second > 0.0 {
        (first.frames_per_second.round() as u32).clamp(1, 120)
    } else {
        DEFAULT_FRAMES_PER_SECOND
    });
    let with_audio = !options.mute
        && options.format.supports_audio()
        && inputs.iter().all(|input| input.audio.is_some());
    if !options.mute && !with_audio && inputs.iter().any(|input| input.audio.is_some()) {
        log::warn!("Not every source has audio; the merged output will be silent");
    }

    let frame_counts: Vec<u64> = inputs
        .iter()
        .map(|input| {
            let seconds = input.video.duration.as_secs_f64();
            ((seconds * f64::from(frames_per_second)).round() as u64).max(1)
        })
        .collect();
    let mut tracker = run.tracker(Operation::Merge, frame_counts.iter().sum());
    tracker.start();

    let mut writer = ContainerWriter::new(options.format)?;
    let mut video = VideoEncodeStage::open(
        &mut writer,
        options.format.descriptor().video_codecs,
        canvas,
        frames_per_second,
    )?;
    let mut audio = if with_audio {
        let first_audio = inputs[0].audio.as_ref().ok_or(ReelcutError::NoAudioStream)?;
        Some(AudioEncodeStage::open(
            &mut writer,
            options.format.descriptor().audio_codecs,
            first_audio.channels,
            first_audio.sample_rate.max(1),
        )?)
    } else {
        None
    };
    writer.write_header()?;
    log::debug!(
        "Re-encoding merge as {} at {canvas}, {frames_per_second} fps",
        video.codec()
    );

    let compositor = Compositor::new().with_target_size(canvas);
    let mut arena = FrameArena::new();
    let mut encoded: u64 = 0;
    for ((source, input), &frames) in sources.iter_mut().zip(inputs).zip(&frame_counts) {
        let seconds = frames as f64 / f64::from(frames_per_second);
        let mut audio_input = match (&mut audio, &input.audio) {
            (Some(stage), Some(track)) => {
                let audio_input = AudioInput::open(source, track, 0.0, seconds, 1.0)?;
                stage.limit((seconds * f64::from(stage.rate())).round() as u64);
                Some(audio_input)
            }
            _ => None,
        };

        let requests = (0..frames)
            .map(|index| index as f64 / f64::from(frames_per_second))
            .collect();
        let mut samples = SampleIterator::new(source, &input.video, requests)?;
        if let Some(token) = &run.cancellation {
            samples = samples.with_cancellation(token.clone());
        }
        for sample in samples {
            run.check_cancelled()?;
            let sample = sample?;
            let canvas_image = compositor.composite(&mut arena, sample.image(), 0.0)?;
            video.push(canvas_image, &mut writer)?;
            encoded += 1;
            if let (Some(stage), Some(audio_input)) = (audio.as_mut(), audio_input.as_mut()) {
                let until = encoded as f64 / f64::from(frames_per_second);
                while !audio_input.is_done() && stage.seconds_written() < until {
                    audio_input.step(stage, &mut writer)?;
                }
            }
            tracker.advance(1);
        }
        advance_audio_to(&mut audio, audio_input.as_mut(), encoded, frames_per_second, &mut writer)?;
        log::debug!("Re-encoded '{}' ({frames} frames)", source.name());
    }

    let expected: u64 = frame_counts.iter().sum();
    if encoded != expected {
        return Err(ReelcutError::decode(
            Stage::Decode,
            format!("produced {encoded} of {expected} frames"),
        ));
    }
    run.check_cancelled()?;
    video.finish(&mut writer)?;
    if let Some(stage) = audio.as_mut() {
        stage.finish(&mut writer)?;
    }
    let size = video.size();
    let bytes = writer.finish()?;
    tracker.finish();
    Ok((bytes, size, encoded as f64 / f64::from(frames_per_second)))
}

/// Decode the rest of a source's audio, then pad with silence so the next
/// source starts in sync with its video.
fn advance_audio_to(
    stage: &mut Option<AudioEncodeStage>,
    input: Option<&mut AudioInput>,
    encoded_frames: u64,
    frames_per_second: u32,
    writer: &mut ContainerWriter,
) -> Result<(), ReelcutError> {
    let (Some(stage), Some(input)) = (stage.as_mut(), input) else {
        return Ok(());
    };
    input.drain(stage, writer)?;
    let seconds = encoded_frames as f64 / f64::from(frames_per_second);
    stage.pad_to((seconds * f64::from(stage.rate())).round() as u64, writer)
}
