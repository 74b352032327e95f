//! Error types for the `reelcut` crate.
//!
//! This module defines [`ReelcutError`], the unified error type returned by
//! every fallible operation in the crate, and [`Stage`], which names the
//! pipeline step an error came from so callers can show a meaningful
//! message without inspecting FFmpeg internals.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    io::Error as IoError,
};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The pipeline step an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Stage {
    /// Opening and probing the input blob.
    Ingestion,
    /// Reading packets from the container.
    Demux,
    /// Decoding packets into frames or samples.
    Decode,
    /// Drawing frames and overlays onto the canvas.
    Composite,
    /// Encoding frames, samples or images.
    Encode,
    /// Writing encoded packets into the output container.
    Mux,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Stage::Ingestion => "ingestion",
            Stage::Demux => "demux",
            Stage::Decode => "decode",
            Stage::Composite => "composite",
            Stage::Encode => "encode",
            Stage::Mux => "mux",
        };
        f.write_str(name)
    }
}

/// The unified error type for all `reelcut` operations.
///
/// Validation problems ([`InvalidArgument`](ReelcutError::InvalidArgument))
/// are always reported before any decoding starts. Decode and encode
/// failures abort the whole run; partially written output is never
/// returned alongside them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReelcutError {
    /// No demuxer recognises the container, or a codec is not supported.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The blob or file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Caller-supplied options are invalid.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A frame or audio packet could not be decoded.
    #[error("Decode error during {stage}: {reason}")]
    Decode {
        /// Step that failed.
        stage: Stage,
        /// Underlying reason.
        reason: String,
    },

    /// The target format could not be produced.
    #[error("Encode error during {stage}: {reason}")]
    Encode {
        /// Step that failed.
        stage: Stage,
        /// Underlying reason.
        reason: String,
    },

    /// An operation was attempted on a disposed or already-finalized
    /// resource.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The run was cancelled through a
    /// [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// The source has no video track but the operation needs one.
    #[error("No video stream found in source")]
    NoVideoStream,

    /// The source has no audio track but the operation needs one.
    #[error("No audio stream found in source")]
    NoAudioStream,

    /// An error from the `image` crate while encoding a still image.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),
}

impl ReelcutError {
    pub(crate) fn decode(stage: Stage, reason: impl Into<String>) -> Self {
        ReelcutError::Decode {
            stage,
            reason: reason.into(),
        }
    }

    pub(crate) fn encode(stage: Stage, reason: impl Into<String>) -> Self {
        ReelcutError::Encode {
            stage,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        ReelcutError::InvalidArgument(reason.into())
    }

    /// The stage a decode or encode error came from, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ReelcutError::Decode { stage, .. } | ReelcutError::Encode { stage, .. } => {
                Some(*stage)
            }
            ReelcutError::UnsupportedFormat(_) | ReelcutError::Io(_) => Some(Stage::Ingestion),
            _ => None,
        }
    }

    /// Whether re-selecting the input could make the operation succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReelcutError::Io(_))
    }
}

impl From<FfmpegError> for ReelcutError {
    fn from(error: FfmpegError) -> Self {
        ReelcutError::decode(Stage::Decode, error.to_string())
    }
}
