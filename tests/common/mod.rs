//! Synthetic fixtures shared by the integration tests.
//!
//! Clips are encoded in-process with [`ClipEncoder`] so the tests never
//! depend on files on disk. Every clip shows four solid quadrants:
//! red (top left), green (top right), blue (bottom left) and white
//! (bottom right).

#![allow(dead_code)]

use std::sync::OnceLock;

use image::{Rgba, RgbaImage};
use reelcut::{
    ClipEncoder, FrameRequest, MediaSource, OutputFormat, VideoCodec, primary_video_track,
    samples_at_timestamps,
};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;
pub const FRAMES_PER_SECOND: u32 = 25;
pub const SECONDS: u32 = 5;

pub const RED: [u8; 3] = [255, 0, 0];
pub const GREEN: [u8; 3] = [0, 255, 0];
pub const BLUE: [u8; 3] = [0, 0, 255];
pub const WHITE: [u8; 3] = [255, 255, 255];

/// Channel tolerance for colours that went through a lossy codec.
pub const LOSSY_TOLERANCE: u8 = 48;

pub fn quadrant_frame(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let color = match (x < width / 2, y < height / 2) {
            (true, true) => RED,
            (false, true) => GREEN,
            (true, false) => BLUE,
            (false, false) => WHITE,
        };
        Rgba([color[0], color[1], color[2], 255])
    })
}

fn encode_clip(encoder: ClipEncoder, width: u32, height: u32, seconds: u32) -> Vec<u8> {
    let frame = quadrant_frame(width, height);
    let count = (seconds * FRAMES_PER_SECOND) as usize;
    encoder
        .with_frames_per_second(FRAMES_PER_SECOND)
        .encode(std::iter::repeat_n(&frame, count))
        .expect("Failed to encode fixture clip")
}

/// 5 s, 640x480, 25 fps MPEG-4 in MP4 without audio.
pub fn clip_bytes() -> Vec<u8> {
    static CLIP: OnceLock<Vec<u8>> = OnceLock::new();
    CLIP.get_or_init(|| {
        encode_clip(
            ClipEncoder::new(OutputFormat::Mp4).with_codec(VideoCodec::Mpeg4),
            WIDTH,
            HEIGHT,
            SECONDS,
        )
    })
    .clone()
}

/// Same as [`clip_bytes`] with a 440 Hz AAC tone.
pub fn clip_with_tone_bytes() -> Vec<u8> {
    static CLIP: OnceLock<Vec<u8>> = OnceLock::new();
    CLIP.get_or_init(|| {
        encode_clip(
            ClipEncoder::new(OutputFormat::Mp4)
                .with_codec(VideoCodec::Mpeg4)
                .with_sine_tone(440.0),
            WIDTH,
            HEIGHT,
            SECONDS,
        )
    })
    .clone()
}

/// 2 s, 640x480 Motion JPEG in Matroska.
pub fn mjpeg_clip_bytes() -> Vec<u8> {
    static CLIP: OnceLock<Vec<u8>> = OnceLock::new();
    CLIP.get_or_init(|| {
        encode_clip(
            ClipEncoder::new(OutputFormat::Mkv).with_codec(VideoCodec::Mjpeg),
            WIDTH,
            HEIGHT,
            2,
        )
    })
    .clone()
}

pub fn clip_source() -> MediaSource {
    MediaSource::from_bytes(clip_bytes(), "clip.mp4").expect("Failed to open fixture clip")
}

pub fn clip_with_tone_source() -> MediaSource {
    MediaSource::from_bytes(clip_with_tone_bytes(), "tone.mp4")
        .expect("Failed to open fixture clip with audio")
}

/// Decode the frame of `bytes` nearest to `time`.
pub fn frame_at(bytes: Vec<u8>, name: &str, time: f64) -> RgbaImage {
    let mut source = MediaSource::from_bytes(bytes, name).expect("Failed to open output");
    let track = primary_video_track(&source)
        .expect("Failed to read tracks")
        .expect("Output has no video");
    let request = FrameRequest::new(vec![time]).expect("Invalid request");
    let mut samples = samples_at_timestamps(&mut source, &track, &request)
        .expect("Failed to start sampling")
        .collect_exact()
        .expect("Failed to sample output");
    samples.remove(0).into_image()
}

pub fn assert_color(image: &RgbaImage, x: u32, y: u32, expected: [u8; 3], tolerance: u8) {
    let pixel = image.get_pixel(x, y);
    for channel in 0..3 {
        let difference = pixel[channel].abs_diff(expected[channel]);
        assert!(
            difference <= tolerance,
            "pixel ({x}, {y}) is {:?}, expected {expected:?} within {tolerance}",
            pixel.0
        );
    }
}

/// Check the four corners of a canvas against the quadrant pattern,
/// sampling `inset` pixels in from each edge.
pub fn assert_corners(image: &RgbaImage, corners: [[u8; 3]; 4], inset: u32, tolerance: u8) {
    let (width, height) = image.dimensions();
    let right = width - 1 - inset;
    let bottom = height - 1 - inset;
    assert_color(image, inset, inset, corners[0], tolerance);
    assert_color(image, right, inset, corners[1], tolerance);
    assert_color(image, inset, bottom, corners[2], tolerance);
    assert_color(image, right, bottom, corners[3], tolerance);
}
