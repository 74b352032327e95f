//! Audio decode and encode stages.
//!
//! [`AudioEncodeStage`] resamples arbitrary PCM frames into the encoder's
//! sample format, rate and layout, re-chunks them to the encoder's frame
//! size and writes the packets to a [`ContainerWriter`].
//! [`AudioInput`] feeds it from a source's audio track: it reads through
//! its own demuxer, trims to a time window and applies a playback rate by
//! resampling the audio as if it had been recorded at
//! `rate × sample_rate` (pitch follows speed). [`AudioTranscoder`] pairs
//! one input with one stage.

use std::fmt::{Display, Formatter, Result as FmtResult};

use ffmpeg_next::{
    ChannelLayout, Error as FfmpegError, Packet, Rational,
    codec::context::Context as CodecContext,
    decoder::Audio as AudioDecoder,
    encoder::Audio as AudioEncoder,
    format::{Sample, sample::Type as SampleType},
    frame::Audio as AudioFrame,
    software::resampling::Context as ResamplingContext,
};

use crate::{
    conversion::{relative_seconds, seconds_to_seek_timestamp},
    error::{ReelcutError, Stage},
    format::{AudioCodec, OutputFormat},
    memory_io::Demuxer,
    metadata::Track,
    muxer::ContainerWriter,
    source::MediaSource,
};

/// Samples per chunk for encoders that accept any frame size.
const VARIABLE_FRAME_CHUNK: usize = 1024;

/// Consecutive undecodable audio packets tolerated before giving up.
const MAX_CONSECUTIVE_FAILURES: u32 = 8;

/// Audio-only output format for [`extract_audio`](crate::extract_audio).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    /// MPEG-1 Layer III (requires libmp3lame).
    Mp3,
    /// 16-bit PCM in a RIFF/WAV container.
    Wav,
}

impl AudioFormat {
    /// The container format produced.
    pub fn output_format(self) -> OutputFormat {
        match self {
            AudioFormat::Mp3 => OutputFormat::Mp3,
            AudioFormat::Wav => OutputFormat::Wav,
        }
    }
}

impl Display for AudioFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.output_format().extension())
    }
}

fn layout_for(channels: u16) -> ChannelLayout {
    match channels {
        1 => ChannelLayout::MONO,
        2 => ChannelLayout::STEREO,
        other => ChannelLayout::default(i32::from(other)),
    }
}

struct Resampler {
    context: ResamplingContext,
    format: Sample,
    channels: u16,
    rate: u32,
}

/// Encodes PCM frames into one audio stream of a container.
pub(crate) struct AudioEncodeStage {
    encoder: AudioEncoder,
    stream_index: usize,
    time_base: Rational,
    format: Sample,
    channels: u16,
    rate: u32,
    frame_size: usize,
    fixed_frame_size: bool,
    resampler: Option<Resampler>,
    /// Pending samples per plane (one plane when the format is packed).
    planes: Vec<Vec<u8>>,
    buffered: usize,
    skip: u64,
    budget: Option<u64>,
    accepted: u64,
    next_pts: i64,
}

impl AudioEncodeStage {
    /// Open the first candidate codec this FFmpeg build can encode with and
    /// add its stream to `writer`. Output is mono for mono input and stereo
    /// otherwise; the rate closest to `preferred_rate` the codec supports
    /// is used.
    pub(crate) fn open(
        writer: &mut ContainerWriter,
        candidates: &[AudioCodec],
        channels: u16,
        preferred_rate: u32,
    ) -> Result<Self, ReelcutError> {
        let channels = channels.clamp(1, 2);
        let global_header = writer.needs_global_header();

        let mut failures = Vec::new();
        for &codec in candidates {
            match open_audio_encoder(codec, channels, preferred_rate, global_header) {
                Ok((encoder, format, rate)) => {
                    let time_base = Rational(1, rate as i32);
                    let stream_index = {
                        let mut stream = writer.output_mut().add_stream(codec.id()).map_err(
                            |error| ReelcutError::encode(Stage::Mux, format!("cannot add stream: {error}")),
                        )?;
                        stream.set_parameters(&encoder);
                        stream.set_time_base(time_base);
                        stream.index()
                    };

                    let reported_frame_size = encoder.frame_size() as usize;
                    let fixed_frame_size = reported_frame_size > 0;
                    let frame_size = if fixed_frame_size {
                        reported_frame_size
                    } else {
                        VARIABLE_FRAME_CHUNK
                    };
                    let plane_count = if format.is_planar() {
                        usize::from(channels)
                    } else {
                        1
                    };

                    log::debug!(
                        "Audio encoder: {codec} {rate} Hz {channels} ch {format:?}, frame size {frame_size}"
                    );
                    return Ok(Self {
                        encoder,
                        stream_index,
                        time_base,
                        format,
                        channels,
                        rate,
                        frame_size,
                        fixed_frame_size,
                        resampler: None,
                        planes: vec![Vec::new(); plane_count],
                        buffered: 0,
                        skip: 0,
                        budget: None,
                        accepted: 0,
                        next_pts: 0,
                    });
                }
                Err(reason) => {
                    log::debug!("Audio codec {codec} unavailable: {reason}");
                    failures.push(format!("{codec}: {reason}"));
                }
            }
        }

        Err(ReelcutError::encode(
            Stage::Encode,
            format!(
                "no usable audio encoder for {} ({})",
                writer.format(),
                failures.join("; ")
            ),
        ))
    }

    /// Output sample rate.
    pub(crate) fn rate(&self) -> u32 {
        self.rate
    }

    /// Drop the next `samples` output samples.
    pub(crate) fn skip(&mut self, samples: u64) {
        self.skip += samples;
    }

    /// Accept at most `samples` more output samples.
    pub(crate) fn limit(&mut self, samples: u64) {
        self.budget = Some(self.accepted + samples);
    }

    /// Append silence until `samples` output samples have been accepted in
    /// total. Ignores the budget.
    pub(crate) fn pad_to(
        &mut self,
        samples: u64,
        writer: &mut ContainerWriter,
    ) -> Result<(), ReelcutError> {
        let missing = samples.saturating_sub(self.accepted) as usize;
        if missing == 0 {
            return Ok(());
        }
        log::debug!("Padding audio with {missing} samples of silence");
        let bytes = missing * self.bytes_per_plane_sample();
        for plane in &mut self.planes {
            plane.resize(plane.len() + bytes, 0);
        }
        self.buffered += missing;
        self.accepted += missing as u64;
        self.encode_buffered(writer, false)
    }

    /// Whether the sample budget is used up.
    pub(crate) fn is_saturated(&self) -> bool {
        self.budget.is_some_and(|budget| self.accepted >= budget)
    }

    /// Output duration encoded so far, in seconds.
    pub(crate) fn seconds_written(&self) -> f64 {
        self.next_pts as f64 / f64::from(self.rate)
    }

    fn bytes_per_plane_sample(&self) -> usize {
        let bytes = self.format.bytes();
        if self.format.is_planar() {
            bytes
        } else {
            bytes * usize::from(self.channels)
        }
    }

    /// Resample `frame` (interpreted as having `input_rate` samples per
    /// second) and encode every complete encoder frame.
    pub(crate) fn push(
        &mut self,
        frame: &mut AudioFrame,
        input_rate: u32,
        writer: &mut ContainerWriter,
    ) -> Result<(), ReelcutError> {
        if frame.samples() == 0 {
            return Ok(());
        }
        let input_format = frame.format();
        let input_channels = frame.channels().max(1);
        let mut input_layout = frame.channel_layout();
        if input_layout.channels() != i32::from(input_channels) {
            input_layout = layout_for(input_channels);
            frame.set_channel_layout(input_layout);
        }
        frame.set_rate(input_rate);

        let stale = self.resampler.as_ref().is_none_or(|resampler| {
            resampler.format != input_format
                || resampler.channels != input_channels
                || resampler.rate != input_rate
        });
        if stale {
            let context = ResamplingContext::get(
                input_format,
                input_layout,
                input_rate,
                self.format,
                layout_for(self.channels),
                self.rate,
            )
            .map_err(|error| {
                ReelcutError::encode(Stage::Encode, format!("cannot create resampler: {error}"))
            })?;
            self.resampler = Some(Resampler {
                context,
                format: input_format,
                channels: input_channels,
                rate: input_rate,
            });
        }

        let Some(resampler) = self.resampler.as_mut() else {
            return Err(ReelcutError::encode(Stage::Encode, "resampler unavailable"));
        };
        let mut resampled = AudioFrame::empty();
        resampler
            .context
            .run(frame, &mut resampled)
            .map_err(|error| ReelcutError::encode(Stage::Encode, format!("resampling failed: {error}")))?;

        self.enqueue(&resampled);
        self.encode_buffered(writer, false)
    }

    /// Flush the resampler and encoder and write the remaining packets.
    pub(crate) fn finish(&mut self, writer: &mut ContainerWriter) -> Result<(), ReelcutError> {
        if let Some(resampler) = self.resampler.as_mut() {
            let mut tail = AudioFrame::empty();
            match resampler.context.flush(&mut tail) {
                Ok(_) => self.enqueue(&tail),
                Err(error) => log::debug!("Resampler flush produced nothing: {error}"),
            }
        }
        self.encode_buffered(writer, true)?;
        self.encoder
            .send_eof()
            .map_err(|error| ReelcutError::encode(Stage::Encode, format!("send_eof failed: {error}")))?;
        self.drain(writer)
    }

    /// Append resampled samples to the FIFO, honouring skip and budget.
    fn enqueue(&mut self, resampled: &AudioFrame) {
        let available = resampled.samples();
        if available == 0 {
            return;
        }
        let dropped = self.skip.min(available as u64) as usize;
        self.skip -= dropped as u64;
        let mut kept = available - dropped;
        if let Some(budget) = self.budget {
            kept = kept.min(budget.saturating_sub(self.accepted) as usize);
        }
        if kept == 0 {
            return;
        }

        let stride = self.bytes_per_plane_sample();
        for (index, plane) in self.planes.iter_mut().enumerate() {
            let data = resampled.data(index);
            plane.extend_from_slice(&data[dropped * stride..(dropped + kept) * stride]);
        }
        self.buffered += kept;
        self.accepted += kept as u64;
    }

    /// Encode complete frames from the FIFO; with `flush`, also the last
    /// partial frame (padded with silence for fixed-size encoders).
    fn encode_buffered(&mut self, writer: &mut ContainerWriter, flush: bool) -> Result<(), ReelcutError> {
        let stride = self.bytes_per_plane_sample();
        while self.buffered >= self.frame_size || (flush && self.buffered > 0) {
            let taken = self.buffered.min(self.frame_size);
            let frame_samples = if self.fixed_frame_size {
                self.frame_size
            } else {
                taken
            };

            let mut frame = AudioFrame::new(self.format, frame_samples, layout_for(self.channels));
            frame.set_rate(self.rate);
            for (index, plane) in self.planes.iter_mut().enumerate() {
                let destination = frame.data_mut(index);
                destination[..taken * stride].copy_from_slice(&plane[..taken * stride]);
                destination[taken * stride..frame_samples * stride].fill(0);
                plane.drain(..taken * stride);
            }
            self.buffered -= taken;
            frame.set_pts(Some(self.next_pts));
            self.next_pts += frame_samples as i64;

            self.encoder
                .send_frame(&frame)
                .map_err(|error| ReelcutError::encode(Stage::Encode, format!("send_frame failed: {error}")))?;
            self.drain(writer)?;
        }
        Ok(())
    }

    fn drain(&mut self, writer: &mut ContainerWriter) -> Result<(), ReelcutError> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            writer.write_packet(&mut packet, self.stream_index, self.time_base)?;
        }
        Ok(())
    }
}

/// Configure and open an audio encoder, returning it with the sample format
/// and rate it runs at.
fn open_audio_encoder(
    codec: AudioCodec,
    channels: u16,
    preferred_rate: u32,
    global_header: bool,
) -> Result<(AudioEncoder, Sample, u32), String> {
    let capabilities = ffmpeg_next::encoder::find(codec.id())
        .ok_or_else(|| "no encoder in this FFmpeg build".to_string())?
        .audio()
        .map_err(|error| format!("not an audio encoder: {error}"))?;

    let format = capabilities
        .formats()
        .and_then(|mut formats| formats.next())
        .unwrap_or(Sample::I16(SampleType::Packed));
    let rate = match capabilities.rates() {
        Some(rates) => rates
            .filter(|&rate| rate > 0)
            .min_by_key(|&rate| (i64::from(rate) - i64::from(preferred_rate)).abs())
            .map_or(preferred_rate, |rate| rate as u32),
        None => preferred_rate,
    }
    .max(1);

    let mut encoder = CodecContext::new()
        .encoder()
        .audio()
        .map_err(|error| format!("cannot create codec context: {error}"))?;
    encoder.set_rate(rate as i32);
    encoder.set_channel_layout(layout_for(channels));
    encoder.set_format(format);
    encoder.set_time_base(Rational(1, rate as i32));
    if let Some(bit_rate) = codec.bit_rate() {
        encoder.set_bit_rate(bit_rate);
    }
    if global_header {
        // SAFETY: `as_mut_ptr` points at the AVCodecContext this wrapper
        // owns and keeps alive. `flags` is a plain integer that FFmpeg only
        // reads at `avcodec_open2`, which has not run yet, and nothing else
        // holds a reference to the context.
        unsafe {
            (*encoder.as_mut_ptr()).flags |= ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
        }
    }

    let encoder = encoder
        .open_as(codec.id())
        .map_err(|error| format!("cannot open encoder: {error}"))?;
    Ok((encoder, format, rate))
}

/// Decodes one source's audio track, trimmed to a window and retimed by a
/// playback rate, into an [`AudioEncodeStage`].
pub(crate) struct AudioInput {
    demuxer: Demuxer,
    stream_index: usize,
    decoder: AudioDecoder,
    time_base: Rational,
    stream_start: i64,
    window_start: f64,
    window_end: f64,
    speed: f64,
    next_input_time: f64,
    started: bool,
    done: bool,
    consecutive_failures: u32,
}

impl AudioInput {
    /// Open `track` of `source` through a fresh demuxer.
    ///
    /// Only source audio inside `[window_start, window_end)` is decoded; it
    /// is played back `speed` times faster.
    pub(crate) fn open(
        source: &mut MediaSource,
        track: &Track,
        window_start: f64,
        window_end: f64,
        speed: f64,
    ) -> Result<Self, ReelcutError> {
        let mut demuxer = source.demuxer()?;
        let stream = demuxer
            .stream(track.stream_index)
            .ok_or(ReelcutError::NoAudioStream)?;
        let time_base = stream.time_base();
        let stream_start = stream.start_time();
        let decoder = CodecContext::from_parameters(stream.parameters())
            .map_err(|error| ReelcutError::decode(Stage::Decode, error.to_string()))?
            .decoder()
            .audio()
            .map_err(|error| {
                ReelcutError::UnsupportedFormat(format!(
                    "no decoder for audio codec '{}': {error}",
                    track.codec
                ))
            })?;

        if window_start > 0.0 {
            let seek_timestamp = seconds_to_seek_timestamp(window_start);
            if let Err(error) = demuxer.seek(seek_timestamp, ..seek_timestamp) {
                log::debug!("Audio seek to {window_start:.3}s failed ({error}); decoding from start");
            }
        }

        log::debug!(
            "Audio track {} of '{}': {} Hz {} ch ({window_start:.3}s..{window_end:.3}s at {speed}x)",
            track.stream_index,
            source.name(),
            decoder.rate(),
            decoder.channels(),
        );

        Ok(Self {
            demuxer,
            stream_index: track.stream_index,
            decoder,
            time_base,
            stream_start,
            window_start,
            window_end,
            speed,
            next_input_time: 0.0,
            started: false,
            done: false,
            consecutive_failures: 0,
        })
    }

    pub(crate) fn rate(&self) -> u32 {
        self.decoder.rate().max(1)
    }

    pub(crate) fn channels(&self) -> u16 {
        self.decoder.channels().max(1)
    }

    /// Whether the window has been fully decoded.
    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    /// Read one packet and push whatever it decodes to into `stage`.
    pub(crate) fn step(
        &mut self,
        stage: &mut AudioEncodeStage,
        writer: &mut ContainerWriter,
    ) -> Result<(), ReelcutError> {
        let mut packet = Packet::empty();
        match packet.read(&mut self.demuxer) {
            Ok(()) => {
                if packet.stream() != self.stream_index {
                    return Ok(());
                }
                match self.decoder.send_packet(&packet) {
                    Ok(()) => self.consecutive_failures = 0,
                    Err(error) => return self.record_failure(Stage::Decode, error),
                }
                self.receive_frames(stage, writer)
            }
            Err(FfmpegError::Eof) => {
                if let Err(error) = self.decoder.send_eof() {
                    log::debug!("Audio decoder rejected EOF: {error}");
                }
                self.receive_frames(stage, writer)?;
                self.done = true;
                Ok(())
            }
            Err(error) => self.record_failure(Stage::Demux, error),
        }
    }

    /// Decode the rest of the window.
    pub(crate) fn drain(
        &mut self,
        stage: &mut AudioEncodeStage,
        writer: &mut ContainerWriter,
    ) -> Result<(), ReelcutError> {
        while !self.done {
            self.step(stage, writer)?;
        }
        Ok(())
    }

    fn receive_frames(
        &mut self,
        stage: &mut AudioEncodeStage,
        writer: &mut ContainerWriter,
    ) -> Result<(), ReelcutError> {
        let mut frame = AudioFrame::empty();
        while !self.done {
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => {}
                Err(FfmpegError::Eof) => break,
                Err(FfmpegError::Other { errno }) if errno == ffmpeg_sys_next::EAGAIN => break,
                Err(error) => {
                    return Err(ReelcutError::decode(
                        Stage::Decode,
                        format!("audio decoder failed: {error}"),
                    ));
                }
            }
            let rate = frame.rate().max(1);
            let start = match frame.timestamp().or(frame.pts()) {
                Some(pts) => relative_seconds(pts, self.stream_start, self.time_base),
                None => self.next_input_time,
            };
            let end = start + frame.samples() as f64 / f64::from(rate);
            self.next_input_time = end;

            if end <= self.window_start {
                continue;
            }
            if start >= self.window_end {
                self.done = true;
                break;
            }
            if !self.started {
                self.started = true;
                if start < self.window_start {
                    let lead_in = (self.window_start - start) / self.speed;
                    stage.skip((lead_in * f64::from(stage.rate())).round() as u64);
                }
            }

            let effective_rate = (f64::from(rate) * self.speed).round().max(1.0) as u32;
            stage.push(&mut frame, effective_rate, writer)?;
            if stage.is_saturated() {
                self.done = true;
            }
        }
        Ok(())
    }

    fn record_failure(&mut self, stage: Stage, error: FfmpegError) -> Result<(), ReelcutError> {
        self.consecutive_failures += 1;
        if self.consecutive_failures > MAX_CONSECUTIVE_FAILURES {
            return Err(ReelcutError::decode(
                stage,
                format!(
                    "{} consecutive corrupt audio packets, last: {error}",
                    self.consecutive_failures
                ),
            ));
        }
        log::warn!("Skipping corrupt audio packet during {stage}: {error}");
        Ok(())
    }
}

/// One source's audio window encoded into its own output stream.
pub(crate) struct AudioTranscoder {
    input: AudioInput,
    stage: AudioEncodeStage,
}

impl AudioTranscoder {
    /// Open `track` and add an encoded audio stream to `writer`. Output is
    /// limited to the window's length divided by `speed`.
    pub(crate) fn open(
        source: &mut MediaSource,
        track: &Track,
        writer: &mut ContainerWriter,
        candidates: &[AudioCodec],
        window_start: f64,
        window_end: f64,
        speed: f64,
    ) -> Result<Self, ReelcutError> {
        let input = AudioInput::open(source, track, window_start, window_end, speed)?;
        let mut stage = AudioEncodeStage::open(writer, candidates, input.channels(), input.rate())?;
        let output_seconds = (window_end - window_start).max(0.0) / speed;
        stage.limit((output_seconds * f64::from(stage.rate())).round() as u64);
        Ok(Self { input, stage })
    }

    /// Encode audio until `output_seconds` of output exist or the window is
    /// exhausted.
    pub(crate) fn pump_until(
        &mut self,
        writer: &mut ContainerWriter,
        output_seconds: f64,
    ) -> Result<(), ReelcutError> {
        while !self.input.is_done() && self.stage.seconds_written() < output_seconds {
            self.input.step(&mut self.stage, writer)?;
        }
        Ok(())
    }

    /// Encode the rest of the window, flush the encoder and return the
    /// encoded duration in seconds.
    pub(crate) fn finish(mut self, writer: &mut ContainerWriter) -> Result<f64, ReelcutError> {
        self.input.drain(&mut self.stage, writer)?;
        self.stage.finish(writer)?;
        Ok(self.stage.seconds_written())
    }
}
