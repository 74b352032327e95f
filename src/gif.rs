//! Animated GIF output.
//!
//! GIF is produced with the `gif` crate rather than FFmpeg's muxer: each
//! composited RGBA frame is quantized to its own 256-colour palette and
//! written with a per-frame delay in hundredths of a second. Delays are
//! accumulated so the total duration tracks the requested frame rate even
//! when `100 / fps` is not an integer.

use gif::{Encoder, Frame, Repeat};
use image::RgbaImage;

use crate::{
    error::{ReelcutError, Stage},
    geometry::Size,
};

/// Quantizer speed passed to `Frame::from_rgba_speed` (1 = best, 30 = fastest).
const QUANTIZER_SPEED: i32 = 10;

/// Streams RGBA frames into an in-memory looping GIF.
pub(crate) struct GifWriter {
    encoder: Encoder<Vec<u8>>,
    size: Size,
    frame_interval: f64,
    elapsed_centis: f64,
    written_centis: u64,
    frames: u64,
}

impl GifWriter {
    pub(crate) fn new(size: Size, frames_per_second: f64) -> Result<Self, ReelcutError> {
        let (Ok(width), Ok(height)) = (u16::try_from(size.width), u16::try_from(size.height)) else {
            return Err(ReelcutError::InvalidArgument(format!(
                "{size} exceeds the GIF canvas limit of 65535x65535"
            )));
        };
        if size.is_empty() {
            return Err(ReelcutError::InvalidArgument(format!(
                "cannot write a {size} GIF"
            )));
        }
        if !(frames_per_second.is_finite() && frames_per_second > 0.0) {
            return Err(ReelcutError::InvalidArgument(format!(
                "GIF frame rate must be positive, got {frames_per_second}"
            )));
        }

        let mut encoder = Encoder::new(Vec::new(), width, height, &[]).map_err(|error| {
            ReelcutError::encode(Stage::Encode, format!("cannot create GIF encoder: {error}"))
        })?;
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|error| ReelcutError::encode(Stage::Mux, format!("cannot set GIF repeat: {error}")))?;

        log::debug!("GIF writer: {size} at {frames_per_second} fps");
        Ok(Self {
            encoder,
            size,
            frame_interval: 100.0 / frames_per_second,
            elapsed_centis: 0.0,
            written_centis: 0,
            frames: 0,
        })
    }

    pub(crate) fn size(&self) -> Size {
        self.size
    }

    /// Append one frame. It must match the canvas size.
    pub(crate) fn push(&mut self, image: &RgbaImage) -> Result<(), ReelcutError> {
        if image.dimensions() != (self.size.width, self.size.height) {
            return Err(ReelcutError::InvalidArgument(format!(
                "GIF frame is {}x{}, canvas is {}",
                image.width(),
                image.height(),
                self.size
            )));
        }

        self.elapsed_centis += self.frame_interval;
        let target = self.elapsed_centis.round() as u64;
        let delay = target.saturating_sub(self.written_centis).clamp(1, u64::from(u16::MAX));
        self.written_centis += delay;

        let mut pixels = image.as_raw().clone();
        let mut frame = Frame::from_rgba_speed(
            self.size.width as u16,
            self.size.height as u16,
            &mut pixels,
            QUANTIZER_SPEED,
        );
        frame.delay = delay as u16;

        self.encoder
            .write_frame(&frame)
            .map_err(|error| ReelcutError::encode(Stage::Encode, format!("cannot write GIF frame: {error}")))?;
        self.frames += 1;
        Ok(())
    }

    /// Write the trailer and return the GIF bytes.
    pub(crate) fn finish(self) -> Result<Vec<u8>, ReelcutError> {
        if self.frames == 0 {
            return Err(ReelcutError::encode(Stage::Encode, "GIF has no frames"));
        }
        let frames = self.frames;
        let bytes = self
            .encoder
            .into_inner()
            .map_err(|error| ReelcutError::encode(Stage::Mux, format!("cannot finish GIF: {error}")))?;
        log::debug!("Finished GIF: {frames} frames, {} bytes", bytes.len());
        Ok(bytes)
    }
}
