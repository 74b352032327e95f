//! Option validation and plan resolution.
//!
//! Every check here runs before a demuxer or decoder is opened, so a bad
//! option never costs any decoding work. The result is a
//! [`ConversionPlan`]: the options resolved against the source's tracks
//! (clamped window, canvas size, output frame rate and frame count).

use crate::{
    encode::DEFAULT_FRAMES_PER_SECOND,
    error::ReelcutError,
    format::OutputFormat,
    geometry::Size,
    metadata::Track,
    options::{ConversionOptions, TimeWindow},
};

/// Highest output frame rate accepted.
const MAX_FRAMES_PER_SECOND: u32 = 120;

/// A conversion resolved against a concrete source.
#[derive(Debug, Clone)]
pub(crate) struct ConversionPlan {
    pub(crate) video: Track,
    pub(crate) audio: Option<Track>,
    pub(crate) start: f64,
    pub(crate) end: f64,
    pub(crate) speed: f64,
    pub(crate) canvas: Size,
    pub(crate) frames_per_second: u32,
    pub(crate) output_frames: u64,
}

impl ConversionPlan {
    /// Output duration in seconds.
    pub(crate) fn output_duration(&self) -> f64 {
        (self.end - self.start) / self.speed
    }

    /// Source timestamp sampled for output frame `index`.
    pub(crate) fn source_time(&self, index: u64) -> f64 {
        let time = self.start + index as f64 * self.speed / f64::from(self.frames_per_second);
        time.min(self.end)
    }

    /// Presentation time of output frame `index`, in output seconds.
    pub(crate) fn output_time(&self, index: u64) -> f64 {
        index as f64 / f64::from(self.frames_per_second)
    }
}

/// Resolve `window` against a source lasting `duration` seconds.
///
/// An open start is 0 and an open end is the source end. An end past the
/// source end is clamped. A duration of 0 means unknown: nothing is
/// clamped and only an open end is rejected.
pub(crate) fn resolve_window(window: &TimeWindow, duration: f64) -> Result<(f64, f64), ReelcutError> {
    let start = window.start.unwrap_or(0.0);
    if !start.is_finite() || start < 0.0 {
        return Err(ReelcutError::invalid(format!(
            "window start must be a non-negative number of seconds, got {start}"
        )));
    }
    if let Some(end) = window.end {
        if !end.is_finite() || end <= 0.0 {
            return Err(ReelcutError::invalid(format!(
                "window end must be a positive number of seconds, got {end}"
            )));
        }
        if end <= start {
            return Err(ReelcutError::invalid(format!(
                "window [{start}, {end}) is empty: end must be after start"
            )));
        }
    }

    let known = duration > 0.0;
    if known && start >= duration {
        return Err(ReelcutError::invalid(format!(
            "window start {start:.3}s is at or past the source end ({duration:.3}s)"
        )));
    }

    let end = match (window.end, known) {
        (Some(end), true) if end > duration => {
            log::warn!("Window end {end:.3}s clamped to source duration {duration:.3}s");
            duration
        }
        (Some(end), _) => end,
        (None, true) => duration,
        (None, false) => {
            return Err(ReelcutError::invalid(
                "source duration is unknown; give the window an explicit end",
            ));
        }
    };
    Ok((start, end))
}

/// Check a playback-rate multiplier.
pub(crate) fn validate_speed(speed: f64) -> Result<(), ReelcutError> {
    if speed.is_finite() && speed > 0.0 {
        Ok(())
    } else {
        Err(ReelcutError::invalid(format!(
            "playback rate must be a positive finite number, got {speed}"
        )))
    }
}

/// Validate `options` for `video` (the primary video track) and resolve
/// the plan.
pub(crate) fn plan_conversion(
    options: &ConversionOptions,
    video: Option<Track>,
    audio: Option<Track>,
    container_duration: f64,
) -> Result<ConversionPlan, ReelcutError> {
    if !options.format.is_video() {
        return Err(ReelcutError::invalid(format!(
            "{} is audio-only; use extract_audio instead",
            options.format
        )));
    }
    if options.format == OutputFormat::Gif && !cfg!(feature = "gif") {
        return Err(ReelcutError::UnsupportedFormat(
            "GIF output requires the `gif` feature".to_string(),
        ));
    }
    let video = video.ok_or(ReelcutError::NoVideoStream)?;

    validate_speed(options.speed)?;

    let source_size = Size::new(video.width, video.height);
    if source_size.is_empty() {
        return Err(ReelcutError::UnsupportedFormat(format!(
            "video track {} has no dimensions",
            video.stream_index
        )));
    }
    if let Some(size) = options.target_size {
        if size.is_empty() {
            return Err(ReelcutError::invalid(format!(
                "target size {size} must have a positive width and height"
            )));
        }
    }
    if let Some(crop) = options.crop {
        if crop.size().is_empty() {
            return Err(ReelcutError::invalid(format!(
                "crop {crop} must have a positive width and height"
            )));
        }
        if !crop.fits_within(source_size) {
            return Err(ReelcutError::invalid(format!(
                "crop {crop} exceeds the {source_size} source frame"
            )));
        }
    }

    let frames_per_second = match options.frames_per_second {
        Some(fps) if fps == 0 || fps > MAX_FRAMES_PER_SECOND => {
            return Err(ReelcutError::invalid(format!(
                "frame rate must be within 1..={MAX_FRAMES_PER_SECOND}, got {fps}"
            )));
        }
        Some(fps) => fps,
        None if video.frames_per_second > 0.0 => {
            (video.frames_per_second.round() as u32).clamp(1, MAX_FRAMES_PER_SECOND)
        }
        None => DEFAULT_FRAMES_PER_SECOND,
    };

    let duration = if video.duration.as_secs_f64() > 0.0 {
        video.duration.as_secs_f64()
    } else {
        container_duration
    };
    let (start, end) = resolve_window(&options.window, duration)?;

    let canvas = options.compositor().output_size(source_size);
    for overlay in &options.overlays {
        let rect = overlay.rect();
        if rect.left >= canvas.width || rect.top >= canvas.height {
            log::warn!("Overlay at {rect} lies outside the {canvas} canvas and will not be visible");
        }
    }

    let output_seconds = (end - start) / options.speed;
    let output_frames = ((output_seconds * f64::from(frames_per_second)).round() as u64).max(1);

    let audio = audio.filter(|_| options.format.supports_audio() && !options.mute);

    let plan = ConversionPlan {
        video,
        audio,
        start,
        end,
        speed: options.speed,
        canvas,
        frames_per_second,
        output_frames,
    };
    log::debug!(
        "Plan: {:.3}s..{:.3}s at {}x -> {} frames of {} at {} fps, audio {}",
        plan.start,
        plan.end,
        plan.speed,
        plan.output_frames,
        plan.canvas,
        plan.frames_per_second,
        if plan.audio.is_some() { "kept" } else { "dropped" },
    );
    Ok(plan)
}
