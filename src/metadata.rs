//! Media metadata types.
//!
//! This module defines the metadata structures returned by
//! [`MediaSource::metadata`](crate::MediaSource::metadata). Metadata is
//! probed once when the source is opened and cached for the lifetime of
//! the source.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    time::Duration,
};

/// What a [`Track`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// A video stream.
    Video,
    /// An audio stream.
    Audio,
}

impl Display for TrackKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TrackKind::Video => f.write_str("video"),
            TrackKind::Audio => f.write_str("audio"),
        }
    }
}

/// One elementary stream of a source, as declared by its container.
///
/// Video-only fields are zero on audio tracks and vice versa.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct Track {
    /// Whether this is a video or audio track.
    pub kind: TrackKind,
    /// Index of the stream inside the container.
    pub stream_index: usize,
    /// Codec name (e.g. `"h264"`, `"mpeg4"`, `"aac"`).
    pub codec: String,
    /// Track duration; falls back to the container duration when the
    /// stream does not declare its own.
    pub duration: Duration,
    /// Display width in pixels.
    pub width: u32,
    /// Display height in pixels.
    pub height: u32,
    /// Frames per second (may be approximate for variable-frame-rate
    /// content).
    pub frames_per_second: f64,
    /// Sample rate in hertz.
    pub sample_rate: u32,
    /// Number of audio channels.
    pub channels: u16,
    /// Bit rate in bits per second, `0` when unknown.
    pub bit_rate: u64,
}

impl Track {
    /// Whether this is a video track.
    pub fn is_video(&self) -> bool {
        self.kind == TrackKind::Video
    }

    /// Whether this is an audio track.
    pub fn is_audio(&self) -> bool {
        self.kind == TrackKind::Audio
    }
}

/// Complete metadata for a media source.
///
/// # Example
///
/// ```no_run
/// use reelcut::MediaSource;
///
/// let source = MediaSource::open("input.mp4").unwrap();
/// let metadata = source.metadata().unwrap();
/// println!("{} tracks, {:?}", metadata.tracks.len(), metadata.duration);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct MediaMetadata {
    /// Video and audio tracks in container declaration order.
    pub tracks: Vec<Track>,
    /// Total duration of the media.
    pub duration: Duration,
    /// Container format name (e.g. `"mov,mp4,m4a,3gp,3g2,mj2"`,
    /// `"matroska,webm"`).
    pub format: String,
    /// Size of the underlying blob in bytes.
    pub byte_length: u64,
}

impl MediaMetadata {
    /// Video tracks in declaration order.
    pub fn video_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|track| track.is_video())
    }

    /// Audio tracks in declaration order.
    pub fn audio_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|track| track.is_audio())
    }

    /// Whether the source has at least one video track.
    pub fn has_video(&self) -> bool {
        self.video_tracks().next().is_some()
    }

    /// Whether the source has at least one audio track.
    pub fn has_audio(&self) -> bool {
        self.audio_tracks().next().is_some()
    }
}
