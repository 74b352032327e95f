//! Primary track selection.
//!
//! The primary track of a kind is the first one in container declaration
//! order. A source without a track of the requested kind is not an error;
//! callers decide whether they need it.

use crate::{
    error::ReelcutError,
    metadata::{Track, TrackKind},
    source::MediaSource,
};

/// The first video track of `source`, if any.
///
/// # Errors
///
/// Returns [`ReelcutError::InvalidState`] if the source has been disposed.
///
/// # Example
///
/// ```no_run
/// use reelcut::{MediaSource, ReelcutError, primary_video_track};
///
/// let source = MediaSource::open("input.mp4")?;
/// if let Some(track) = primary_video_track(&source)? {
///     println!("{}x{} {}", track.width, track.height, track.codec);
/// }
/// # Ok::<(), ReelcutError>(())
/// ```
pub fn primary_video_track(source: &MediaSource) -> Result<Option<Track>, ReelcutError> {
    primary_track(source, TrackKind::Video)
}

/// The first audio track of `source`, if any.
///
/// # Errors
///
/// Returns [`ReelcutError::InvalidState`] if the source has been disposed.
pub fn primary_audio_track(source: &MediaSource) -> Result<Option<Track>, ReelcutError> {
    primary_track(source, TrackKind::Audio)
}

fn primary_track(source: &MediaSource, kind: TrackKind) -> Result<Option<Track>, ReelcutError> {
    let track = source
        .metadata()?
        .tracks
        .iter()
        .find(|track| track.kind == kind)
        .cloned();
    log::trace!(
        "Primary {kind} track of '{}': {:?}",
        source.name(),
        track.as_ref().map(|track| track.stream_index)
    );
    Ok(track)
}
