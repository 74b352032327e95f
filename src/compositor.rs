//! Frame compositing.
//!
//! [`Compositor`] applies the per-frame transform chain with
//! [`image::imageops`]: crop in source coordinates, a triangle-filtered
//! fill-scale to the target size, then an in-place flip. [`Overlay`]s are
//! drawn on top with straight-alpha "source over" blending. The result
//! lands in a [`FrameArena`], the canvas one run reuses for every frame.
//!
//! # Example
//!
//! ```
//! use image::{Rgba, RgbaImage};
//! use reelcut::{Compositor, FrameArena, Overlay, Rect, Size};
//!
//! let frame = RgbaImage::from_pixel(64, 48, Rgba([0, 0, 255, 255]));
//! let badge = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
//!
//! let compositor = Compositor::new()
//!     .with_target_size(Size::new(32, 24))
//!     .with_overlay(Overlay::new(badge, Rect::new(0, 0, 4, 4)).unwrap());
//! let mut arena = FrameArena::new();
//!
//! let canvas = compositor.composite(&mut arena, &frame, 0.0).unwrap();
//! assert_eq!(canvas.dimensions(), (32, 24));
//! assert_eq!(canvas.get_pixel(1, 1).0, [255, 255, 255, 255]);
//! assert!(canvas.get_pixel(20, 20)[2] >= 253);
//! ```

use image::{
    RgbaImage,
    imageops::{self, FilterType},
};

use crate::{
    error::{ReelcutError, Stage},
    geometry::{FlipAxis, Rect, Size},
};

/// An image drawn over every frame (or over frames inside a time window).
///
/// The image is scaled to its destination rectangle once, at construction.
#[derive(Debug, Clone)]
pub struct Overlay {
    image: RgbaImage,
    rect: Rect,
    window: Option<(f64, f64)>,
    opacity: f32,
}

impl Overlay {
    /// Place `image` at `rect` (canvas coordinates), scaling it to the
    /// rectangle's size.
    ///
    /// # Errors
    ///
    /// Returns [`ReelcutError::InvalidArgument`] if the rectangle or the
    /// image has zero area.
    pub fn new(image: RgbaImage, rect: Rect) -> Result<Self, ReelcutError> {
        if rect.size().is_empty() {
            return Err(ReelcutError::invalid(format!(
                "overlay rectangle {rect} must have a positive width and height"
            )));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(ReelcutError::invalid("overlay image is empty"));
        }
        let image = if image.dimensions() == (rect.width, rect.height) {
            image
        } else {
            imageops::resize(&image, rect.width, rect.height, FilterType::Triangle)
        };
        Ok(Self {
            image,
            rect,
            window: None,
            opacity: 1.0,
        })
    }

    /// Only draw the overlay for output times within `[start, end]`
    /// (seconds).
    ///
    /// # Errors
    ///
    /// Returns [`ReelcutError::InvalidArgument`] if `start > end` or either
    /// bound is negative or not finite.
    pub fn with_window(mut self, start: f64, end: f64) -> Result<Self, ReelcutError> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 || start > end {
            return Err(ReelcutError::invalid(format!(
                "overlay window [{start}, {end}] must satisfy 0 <= start <= end"
            )));
        }
        self.window = Some((start, end));
        Ok(self)
    }

    /// Multiply the overlay's alpha by `opacity` (clamped to `0.0..=1.0`).
    #[must_use]
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = if opacity.is_nan() {
            1.0
        } else {
            opacity.clamp(0.0, 1.0)
        };
        self
    }

    /// Destination rectangle on the canvas.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Whether the overlay is drawn at output time `time`.
    pub fn is_active(&self, time: f64) -> bool {
        self.window
            .is_none_or(|(start, end)| time >= start && time <= end)
    }

    fn draw(&self, canvas: &mut RgbaImage) {
        let opacity = (self.opacity * 255.0).round() as u16;
        if opacity == 0 {
            return;
        }
        let (canvas_width, canvas_height) = canvas.dimensions();
        if self.rect.left >= canvas_width || self.rect.top >= canvas_height {
            return;
        }
        let visible_width = self.rect.width.min(canvas_width - self.rect.left) as usize;
        let visible_height = self.rect.height.min(canvas_height - self.rect.top) as usize;

        let source = self.image.as_raw();
        let source_stride = self.rect.width as usize * 4;
        let canvas_stride = canvas_width as usize * 4;
        let destination: &mut [u8] = canvas;

        for row in 0..visible_height {
            let source_row = &source[row * source_stride..][..visible_width * 4];
            let canvas_offset =
                (self.rect.top as usize + row) * canvas_stride + self.rect.left as usize * 4;
            let canvas_row = &mut destination[canvas_offset..][..visible_width * 4];
            for (dst, src) in canvas_row.chunks_exact_mut(4).zip(source_row.chunks_exact(4)) {
                blend_over(dst, src, opacity);
            }
        }
    }
}

/// Per-run scratch canvas.
///
/// The buffer is reallocated only when the canvas size changes.
#[derive(Debug, Default)]
pub struct FrameArena {
    canvas: RgbaImage,
    reallocations: usize,
}

impl FrameArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times the canvas buffer has been (re)allocated.
    pub fn reallocations(&self) -> usize {
        self.reallocations
    }

    /// The most recently composited canvas.
    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    fn prepare(&mut self, size: Size) {
        if self.canvas.dimensions() != (size.width, size.height) {
            log::trace!("Allocating {size} compositing canvas");
            self.canvas = RgbaImage::new(size.width, size.height);
            self.reallocations += 1;
        }
    }
}

/// Applies the geometric transform chain and overlays to decoded frames.
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    crop: Option<Rect>,
    target: Option<Size>,
    flip: Option<FlipAxis>,
    overlays: Vec<Overlay>,
}

impl Compositor {
    /// A compositor that passes frames through unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Crop each frame to `rect`, given in source frame coordinates.
    #[must_use]
    pub fn with_crop(mut self, rect: Rect) -> Self {
        self.crop = Some(rect);
        self
    }

    /// Scale each frame (after cropping) to exactly `size`, without
    /// preserving the aspect ratio.
    #[must_use]
    pub fn with_target_size(mut self, size: Size) -> Self {
        self.target = Some(size);
        self
    }

    /// Mirror each frame after scaling.
    #[must_use]
    pub fn with_flip(mut self, axis: FlipAxis) -> Self {
        self.flip = Some(axis);
        self
    }

    /// Draw `overlay` above previously added overlays.
    #[must_use]
    pub fn with_overlay(mut self, overlay: Overlay) -> Self {
        self.overlays.push(overlay);
        self
    }

    /// Canvas size produced for frames of `source` size.
    pub fn output_size(&self, source: Size) -> Size {
        self.target
            .or(self.crop.map(|crop| crop.size()))
            .unwrap_or(source)
    }

    /// Whether frames pass through without any geometric change.
    fn is_identity(&self, source: Size) -> bool {
        self.flip.is_none()
            && self.crop.is_none_or(|crop| crop == Rect::full(source))
            && self.target.is_none_or(|target| target == source)
    }

    /// Composite `frame` into `arena` for output time `time` (seconds) and
    /// return the finished canvas.
    ///
    /// # Errors
    ///
    /// Returns a [`Stage::Composite`] error if the frame is empty or the
    /// crop rectangle does not intersect it.
    pub fn composite<'a>(
        &self,
        arena: &'a mut FrameArena,
        frame: &RgbaImage,
        time: f64,
    ) -> Result<&'a RgbaImage, ReelcutError> {
        let source = Size::new(frame.width(), frame.height());
        if source.is_empty() {
            return Err(ReelcutError::encode(Stage::Composite, "frame has zero area"));
        }
        let output = self.output_size(source);
        arena.prepare(output);

        if self.is_identity(source) {
            arena.canvas.copy_from_slice(frame.as_raw());
        } else {
            let crop = self.effective_crop(source)?;
            let cropped;
            let region = if crop == Rect::full(source) {
                frame
            } else {
                cropped = imageops::crop_imm(frame, crop.left, crop.top, crop.width, crop.height)
                    .to_image();
                &cropped
            };
            if crop.size() == output {
                arena.canvas.copy_from_slice(region.as_raw());
            } else {
                let scaled = imageops::resize(region, output.width, output.height, FilterType::Triangle);
                arena.canvas.copy_from_slice(scaled.as_raw());
            }
            match self.flip {
                Some(FlipAxis::Horizontal) => imageops::flip_horizontal_in_place(&mut arena.canvas),
                Some(FlipAxis::Vertical) => imageops::flip_vertical_in_place(&mut arena.canvas),
                Some(FlipAxis::Both) => imageops::rotate180_in_place(&mut arena.canvas),
                None => {}
            }
        }

        for overlay in self.overlays.iter().filter(|overlay| overlay.is_active(time)) {
            overlay.draw(&mut arena.canvas);
        }
        Ok(&arena.canvas)
    }

    fn effective_crop(&self, source: Size) -> Result<Rect, ReelcutError> {
        let Some(crop) = self.crop else {
            return Ok(Rect::full(source));
        };
        if crop.fits_within(source) {
            return Ok(crop);
        }
        // Frames smaller than the declared track size: keep the overlap.
        if crop.left >= source.width || crop.top >= source.height {
            return Err(ReelcutError::encode(
                Stage::Composite,
                format!("crop {crop} lies outside the {source} frame"),
            ));
        }
        Ok(Rect::new(
            crop.left,
            crop.top,
            crop.width.min(source.width - crop.left),
            crop.height.min(source.height - crop.top),
        ))
    }
}

/// Straight-alpha "source over" of one RGBA pixel, with the source alpha
/// scaled by `opacity` (0..=255).
fn blend_over(destination: &mut [u8], source: &[u8], opacity: u16) {
    let source_alpha = mul_div255(u16::from(source[3]), opacity);
    if source_alpha == 0 {
        return;
    }
    let destination_alpha = mul_div255(u16::from(destination[3]), 255 - u16::from(source_alpha));
    let out_alpha = u32::from(source_alpha) + u32::from(destination_alpha);

    for channel in 0..3 {
        let weighted = u32::from(source[channel]) * u32::from(source_alpha)
            + u32::from(destination[channel]) * u32::from(destination_alpha);
        destination[channel] = ((weighted + out_alpha / 2) / out_alpha).min(255) as u8;
    }
    destination[3] = out_alpha.min(255) as u8;
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}
