//! Suggested output filenames.
//!
//! Converted files are named `<stem>_<tag>.<ext>`, where the tag names the
//! most significant operation applied. Extracted frames are named
//! `frame_<seconds with two decimals>s.<ext>`.

use std::path::Path;

use crate::{image_encoder::ImageFormat, options::ConversionOptions};

/// Tag for merged outputs.
pub const MERGED_TAG: &str = "merged";
/// Tag for audio extracted from a video.
pub const EXTRACTED_TAG: &str = "extracted";

/// `<stem>_<tag>.<extension>` for a source called `source_name`.
///
/// The stem is the file name without its directory and last extension;
/// an empty stem becomes `output`.
///
/// ```
/// use reelcut::output_filename;
///
/// assert_eq!(output_filename("clips/holiday.mov", "trimmed", "mp4"), "holiday_trimmed.mp4");
/// assert_eq!(output_filename("", "merged", "mkv"), "output_merged.mkv");
/// ```
pub fn output_filename(source_name: &str, tag: &str, extension: &str) -> String {
    let stem = Path::new(source_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("output");
    format!("{stem}_{tag}.{extension}")
}

/// Filename for a frame extracted at `timestamp` seconds.
///
/// ```
/// use reelcut::{ImageFormat, frame_filename};
///
/// assert_eq!(frame_filename(1.0, ImageFormat::Png), "frame_1.00s.png");
/// assert_eq!(frame_filename(2.346, ImageFormat::Jpeg), "frame_2.35s.jpg");
/// ```
pub fn frame_filename(timestamp: f64, format: ImageFormat) -> String {
    format!("frame_{timestamp:.2}s.{}", format.extension())
}

/// Operation tag for a conversion.
///
/// An explicit tag wins. Otherwise the first applicable of speed change,
/// crop, resize, flip, trim and watermark is used, falling back to
/// `converted`.
pub(crate) fn operation_tag(options: &ConversionOptions) -> String {
    if let Some(tag) = options.tag.as_deref().filter(|tag| !tag.is_empty()) {
        return tag.to_string();
    }
    if options.speed != 1.0 {
        return speed_tag(options.speed);
    }
    if options.crop.is_some() {
        return "cropped".to_string();
    }
    if options.target_size.is_some() {
        return "resized".to_string();
    }
    if options.flip.is_some() {
        return "flipped".to_string();
    }
    if !options.window.is_full() {
        return "trimmed".to_string();
    }
    if !options.overlays.is_empty() {
        return "watermarked".to_string();
    }
    "converted".to_string()
}

/// `<rate>x_fast` or `<rate>x_slow`, with the rate printed without
/// trailing zeros.
fn speed_tag(speed: f64) -> String {
    let rate = format!("{speed:.2}");
    let rate = rate.trim_end_matches('0').trim_end_matches('.');
    let direction = if speed > 1.0 { "fast" } else { "slow" };
    format!("{rate}x_{direction}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        format::OutputFormat,
        geometry::{FlipAxis, Rect, Size},
        options::TimeWindow,
    };

    #[test]
    fn speed_tags_drop_trailing_zeros() {
        assert_eq!(speed_tag(2.0), "2x_fast");
        assert_eq!(speed_tag(0.5), "0.5x_slow");
        assert_eq!(speed_tag(1.25), "1.25x_fast");
    }

    #[test]
    fn speed_outranks_every_other_operation() {
        let options = ConversionOptions::new(OutputFormat::Mp4)
            .with_crop(Rect::new(0, 0, 10, 10))
            .with_target_size(Size::new(20, 20))
            .with_speed(2.0);
        assert_eq!(operation_tag(&options), "2x_fast");
    }

    #[test]
    fn tag_priority_follows_operation_order() {
        let base = ConversionOptions::new(OutputFormat::Mp4);
        assert_eq!(operation_tag(&base), "converted");
        assert_eq!(
            operation_tag(&base.clone().with_window(TimeWindow::ending_at(2.0))),
            "trimmed"
        );
        assert_eq!(
            operation_tag(
                &base
                    .clone()
                    .with_window(TimeWindow::ending_at(2.0))
                    .with_flip(FlipAxis::Vertical)
            ),
            "flipped"
        );
        assert_eq!(
            operation_tag(
                &base
                    .clone()
                    .with_flip(FlipAxis::Vertical)
                    .with_target_size(Size::new(8, 8))
            ),
            "resized"
        );
        assert_eq!(operation_tag(&base.with_tag("custom")), "custom");
    }
}
