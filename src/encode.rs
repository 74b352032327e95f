//! Video encoding.
//!
//! [`VideoEncodeStage`] turns composited RGBA canvases into encoded packets
//! for a [`ContainerWriter`]. [`ClipEncoder`] is the public front end: it
//! encodes a sequence of RGBA frames (plus an optional test tone) into any
//! video [`OutputFormat`] entirely in memory.
//!
//! # Example
//!
//! ```no_run
//! use image::{Rgba, RgbaImage};
//! use reelcut::{ClipEncoder, OutputFormat, ReelcutError, VideoCodec};
//!
//! let frames: Vec<RgbaImage> = (0..25)
//!     .map(|i| RgbaImage::from_pixel(320, 240, Rgba([i * 10, 0, 0, 255])))
//!     .collect();
//! let mp4 = ClipEncoder::new(OutputFormat::Mp4)
//!     .with_codec(VideoCodec::Mpeg4)
//!     .encode(&frames)?;
//! # Ok::<(), ReelcutError>(())
//! ```

use ffmpeg_next::{
    ChannelLayout, Packet, Rational,
    codec::context::Context as CodecContext,
    encoder::Video as VideoEncoder,
    format::{Pixel, Sample, sample::Type as SampleType},
    frame::{Audio as AudioFrame, Video as VideoFrame},
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::RgbaImage;

use crate::{
    audio::AudioEncodeStage,
    conversion::image_to_rgba_frame,
    error::{ReelcutError, Stage},
    ffmpeg::ensure_initialized,
    format::{OutputFormat, VideoCodec},
    geometry::Size,
    muxer::ContainerWriter,
};

/// Default output frame rate when the source does not declare one.
pub const DEFAULT_FRAMES_PER_SECOND: u32 = 25;

/// Encodes composited RGBA canvases into one video stream of a container.
pub(crate) struct VideoEncodeStage {
    encoder: VideoEncoder,
    scaler: ScalingContext,
    codec: VideoCodec,
    stream_index: usize,
    time_base: Rational,
    canvas: Size,
    size: Size,
    next_pts: i64,
}

impl VideoEncodeStage {
    /// Open the first candidate codec this FFmpeg build can encode with and
    /// add its stream to `writer`.
    ///
    /// `canvas` is the size of the frames that will be pushed; the encoder
    /// itself runs at `canvas` rounded down to even dimensions.
    pub(crate) fn open(
        writer: &mut ContainerWriter,
        candidates: &[VideoCodec],
        canvas: Size,
        frames_per_second: u32,
    ) -> Result<Self, ReelcutError> {
        if canvas.is_empty() {
            return Err(ReelcutError::invalid(format!(
                "cannot encode {canvas} frames"
            )));
        }
        let size = canvas.even();
        if size != canvas {
            log::warn!("Encoding {canvas} canvas at {size}: 4:2:0 encoders need even dimensions");
        }
        let frames_per_second = frames_per_second.max(1);
        let time_base = Rational(1, frames_per_second as i32);
        let global_header = writer.needs_global_header();

        let mut failures = Vec::new();
        for &codec in candidates {
            match open_video_encoder(codec, size, frames_per_second, global_header) {
                Ok(encoder) => {
                    let stream_index = {
                        let mut stream = writer.output_mut().add_stream(codec.id()).map_err(
                            |error| ReelcutError::encode(Stage::Mux, format!("cannot add stream: {error}")),
                        )?;
                        stream.set_parameters(&encoder);
                        stream.set_time_base(time_base);
                        stream.index()
                    };

                    let pixel_format = pixel_format_for(codec);
                    let scaler = ScalingContext::get(
                        Pixel::RGBA,
                        canvas.width,
                        canvas.height,
                        pixel_format,
                        size.width,
                        size.height,
                        ScalingFlags::BILINEAR,
                    )
                    .map_err(|error| {
                        ReelcutError::encode(Stage::Encode, format!("cannot create scaler: {error}"))
                    })?;

                    log::debug!(
                        "Video encoder: {codec} {size} @ {frames_per_second} fps ({pixel_format:?}) for {}",
                        writer.format()
                    );
                    return Ok(Self {
                        encoder,
                        scaler,
                        codec,
                        stream_index,
                        time_base,
                        canvas,
                        size,
                        next_pts: 0,
                    });
                }
                Err(reason) => {
                    log::debug!("Video codec {codec} unavailable: {reason}");
                    failures.push(format!("{codec}: {reason}"));
                }
            }
        }

        Err(ReelcutError::encode(
            Stage::Encode,
            format!(
                "no usable video encoder for {} ({})",
                writer.format(),
                failures.join("; ")
            ),
        ))
    }

    pub(crate) fn codec(&self) -> VideoCodec {
        self.codec
    }

    /// Dimensions of the encoded video.
    pub(crate) fn size(&self) -> Size {
        self.size
    }

    /// Encode one canvas as the next frame.
    pub(crate) fn push(
        &mut self,
        canvas: &RgbaImage,
        writer: &mut ContainerWriter,
    ) -> Result<(), ReelcutError> {
        if canvas.dimensions() != (self.canvas.width, self.canvas.height) {
            return Err(ReelcutError::encode(
                Stage::Encode,
                format!(
                    "canvas changed from {} to {}x{} mid-stream",
                    self.canvas,
                    canvas.width(),
                    canvas.height()
                ),
            ));
        }

        let source_frame = image_to_rgba_frame(canvas);
        let mut converted = VideoFrame::empty();
        self.scaler
            .run(&source_frame, &mut converted)
            .map_err(|error| ReelcutError::encode(Stage::Encode, format!("scaling failed: {error}")))?;
        converted.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder
            .send_frame(&converted)
            .map_err(|error| ReelcutError::encode(Stage::Encode, format!("send_frame failed: {error}")))?;
        self.drain(writer)
    }

    /// Flush the encoder and write its remaining packets.
    pub(crate) fn finish(&mut self, writer: &mut ContainerWriter) -> Result<(), ReelcutError> {
        self.encoder
            .send_eof()
            .map_err(|error| ReelcutError::encode(Stage::Encode, format!("send_eof failed: {error}")))?;
        self.drain(writer)
    }

    fn drain(&mut self, writer: &mut ContainerWriter) -> Result<(), ReelcutError> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            writer.write_packet(&mut packet, self.stream_index, self.time_base)?;
        }
        Ok(())
    }
}

fn pixel_format_for(codec: VideoCodec) -> Pixel {
    match codec {
        VideoCodec::Mjpeg => Pixel::YUVJ420P,
        _ => Pixel::YUV420P,
    }
}

/// Configure and open an encoder for `codec`.
fn open_video_encoder(
    codec: VideoCodec,
    size: Size,
    frames_per_second: u32,
    global_header: bool,
) -> Result<VideoEncoder, String> {
    if ffmpeg_next::encoder::find(codec.id()).is_none() {
        return Err("no encoder in this FFmpeg build".to_string());
    }

    let mut encoder = CodecContext::new()
        .encoder()
        .video()
        .map_err(|error| format!("cannot create codec context: {error}"))?;

    encoder.set_width(size.width);
    encoder.set_height(size.height);
    encoder.set_format(pixel_format_for(codec));
    encoder.set_time_base(Rational(1, frames_per_second as i32));
    encoder.set_frame_rate(Some(Rational(frames_per_second as i32, 1)));
    encoder.set_gop(frames_per_second);
    encoder.set_max_b_frames(0);
    // Roughly 0.2 bits per pixel keeps flat test patterns and real footage
    // visually clean at every size.
    let bit_rate = (u64::from(size.width) * u64::from(size.height) * u64::from(frames_per_second)) / 5;
    encoder.set_bit_rate(bit_rate.clamp(200_000, 20_000_000) as usize);

    if global_header {
        // SAFETY: `as_mut_ptr` points at the AVCodecContext this wrapper
        // owns and keeps alive. `flags` is a plain integer that FFmpeg only
        // reads at `avcodec_open2`, which has not run yet, and nothing else
        // holds a reference to the context.
        unsafe {
            (*encoder.as_mut_ptr()).flags |= ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
        }
    }

    encoder
        .open_as(codec.id())
        .map_err(|error| format!("cannot open encoder: {error}"))
}

/// Encodes RGBA frames into a complete in-memory video file.
///
/// The default frame rate is 25 fps and the codec is the first one the
/// format's descriptor lists that this FFmpeg build can open.
#[derive(Debug, Clone)]
#[must_use]
pub struct ClipEncoder {
    format: OutputFormat,
    frames_per_second: u32,
    codec: Option<VideoCodec>,
    tone_frequency: Option<f32>,
}

impl ClipEncoder {
    /// Create an encoder for `format`.
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            frames_per_second: DEFAULT_FRAMES_PER_SECOND,
            codec: None,
            tone_frequency: None,
        }
    }

    /// Set the frame rate.
    pub fn with_frames_per_second(mut self, frames_per_second: u32) -> Self {
        self.frames_per_second = frames_per_second.max(1);
        self
    }

    /// Force a specific video codec instead of the format's candidates.
    pub fn with_codec(mut self, codec: VideoCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Add a mono sine tone of `frequency` hertz lasting as long as the
    /// video. Ignored for formats without audio.
    pub fn with_sine_tone(mut self, frequency: f32) -> Self {
        self.tone_frequency = Some(frequency);
        self
    }

    /// Encode `frames` (all the same size) and return the container bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ReelcutError::InvalidArgument`] for an empty frame list,
    /// mismatched frame sizes or an audio-only format, and an encode error
    /// if no encoder for the format is available.
    pub fn encode<'a, I>(&self, frames: I) -> Result<Vec<u8>, ReelcutError>
    where
        I: IntoIterator<Item = &'a RgbaImage>,
    {
        ensure_initialized()?;
        if !self.format.is_video() {
            return Err(ReelcutError::invalid(format!(
                "{} is not a video format",
                self.format
            )));
        }

        let frames: Vec<&RgbaImage> = frames.into_iter().collect();
        let Some(first) = frames.first() else {
            return Err(ReelcutError::invalid("no frames to encode"));
        };
        let canvas = Size::new(first.width(), first.height());
        if frames
            .iter()
            .any(|frame| frame.dimensions() != (canvas.width, canvas.height))
        {
            return Err(ReelcutError::invalid("all frames must have the same size"));
        }

        log::info!(
            "Encoding {} frames ({canvas}) to {} at {} fps",
            frames.len(),
            self.format,
            self.frames_per_second
        );

        if self.format == OutputFormat::Gif {
            return encode_gif(&frames, canvas, self.frames_per_second);
        }

        let candidates = match &self.codec {
            Some(codec) => std::slice::from_ref(codec),
            None => self.format.descriptor().video_codecs,
        };

        let mut writer = ContainerWriter::new(self.format)?;
        let mut video =
            VideoEncodeStage::open(&mut writer, candidates, canvas, self.frames_per_second)?;
        let mut audio = match self.tone_frequency {
            Some(_) if self.format.supports_audio() => Some(AudioEncodeStage::open(
                &mut writer,
                self.format.descriptor().audio_codecs,
                1,
                TONE_SAMPLE_RATE,
            )?),
            _ => None,
        };
        writer.write_header()?;

        let samples_per_frame = TONE_SAMPLE_RATE as usize / self.frames_per_second as usize;
        let frequency = self.tone_frequency.unwrap_or(440.0);
        for (index, frame) in frames.iter().enumerate() {
            video.push(frame, &mut writer)?;
            if let Some(audio) = audio.as_mut() {
                let mut tone = sine_frame(frequency, index * samples_per_frame, samples_per_frame);
                audio.push(&mut tone, TONE_SAMPLE_RATE, &mut writer)?;
            }
        }
        video.finish(&mut writer)?;
        if let Some(audio) = audio.as_mut() {
            audio.finish(&mut writer)?;
        }
        writer.finish()
    }
}

const TONE_SAMPLE_RATE: u32 = 48_000;

#[cfg(feature = "gif")]
fn encode_gif(
    frames: &[&RgbaImage],
    canvas: Size,
    frames_per_second: u32,
) -> Result<Vec<u8>, ReelcutError> {
    let mut writer = crate::gif::GifWriter::new(canvas, f64::from(frames_per_second))?;
    for frame in frames {
        writer.push(frame)?;
    }
    writer.finish()
}

#[cfg(not(feature = "gif"))]
fn encode_gif(
    _frames: &[&RgbaImage],
    _canvas: Size,
    _frames_per_second: u32,
) -> Result<Vec<u8>, ReelcutError> {
    Err(ReelcutError::UnsupportedFormat(
        "GIF output requires the `gif` feature".to_string(),
    ))
}

/// `count` samples of a mono sine wave starting at sample `offset`, as a
/// packed f32 frame.
fn sine_frame(frequency: f32, offset: usize, count: usize) -> AudioFrame {
    let mut frame = AudioFrame::new(Sample::F32(SampleType::Packed), count, ChannelLayout::MONO);
    frame.set_rate(TONE_SAMPLE_RATE);
    let data = frame.data_mut(0);
    for (index, bytes) in data.chunks_exact_mut(4).take(count).enumerate() {
        let t = (offset + index) as f32 / TONE_SAMPLE_RATE as f32;
        let value = 0.4 * (std::f32::consts::TAU * frequency * t).sin();
        bytes.copy_from_slice(&value.to_le_bytes());
    }
    frame
}
