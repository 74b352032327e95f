//! Core [`MediaSource`] implementation.
//!
//! `MediaSource` is the main entry point for the crate. It wraps a media
//! blob held in memory (or, for convenience, a file on disk), probes its
//! container once, caches the resulting [`MediaMetadata`] and hands out
//! demuxer contexts to the stages that read from it.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use ffmpeg_next::{format::context::Input, media::Type};

use crate::{
    conversion::{NO_PTS, container_duration, pts_to_seconds, rational_to_f64},
    error::ReelcutError,
    ffmpeg::ensure_initialized,
    memory_io::Demuxer,
    metadata::{MediaMetadata, Track, TrackKind},
};

enum Origin {
    Bytes(Arc<[u8]>),
    Path(PathBuf),
}

/// A probed media source.
///
/// Created via [`MediaSource::from_bytes`] or [`MediaSource::open`]. The
/// source owns its bytes and cached metadata; decoders are only created
/// when a pipeline stage starts reading a track. A pipeline run borrows the
/// source mutably for its whole duration.
///
/// After [`dispose`](MediaSource::dispose) every operation fails with
/// [`ReelcutError::InvalidState`].
///
/// # Example
///
/// ```no_run
/// use reelcut::{MediaSource, ReelcutError};
///
/// let bytes = std::fs::read("input.mp4")?;
/// let source = MediaSource::from_bytes(bytes, "input.mp4")?;
/// println!("{:?}", source.metadata()?.duration);
/// # Ok::<(), ReelcutError>(())
/// ```
pub struct MediaSource {
    origin: Origin,
    name: String,
    metadata: MediaMetadata,
    /// Demuxer left over from probing, handed to the first consumer.
    probe_demuxer: Option<Demuxer>,
    live_samples: Arc<AtomicUsize>,
    disposed: bool,
}

impl Debug for MediaSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MediaSource")
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .field("live_samples", &self.live_samples())
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl MediaSource {
    /// Probe an in-memory media blob.
    ///
    /// `name` is the display name used to derive output filenames (for
    /// example the original upload's filename).
    ///
    /// # Errors
    ///
    /// Returns [`ReelcutError::UnsupportedFormat`] if no demuxer recognises
    /// the container.
    pub fn from_bytes(
        bytes: impl Into<Arc<[u8]>>,
        name: impl Into<String>,
    ) -> Result<Self, ReelcutError> {
        ensure_initialized()?;
        let bytes: Arc<[u8]> = bytes.into();
        let name = name.into();

        log::debug!("Probing in-memory source '{}' ({} bytes)", name, bytes.len());
        let demuxer = Demuxer::from_bytes(Arc::clone(&bytes))?;
        let metadata = probe(&demuxer, bytes.len() as u64);

        Ok(Self::assemble(Origin::Bytes(bytes), name, metadata, demuxer))
    }

    /// Probe a media file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ReelcutError::Io`] if the file cannot be read, or
    /// [`ReelcutError::UnsupportedFormat`] if no demuxer recognises it.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use reelcut::{MediaSource, ReelcutError};
    ///
    /// let source = MediaSource::open("video.mp4")?;
    /// # Ok::<(), ReelcutError>(())
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ReelcutError> {
        ensure_initialized()?;
        let path = path.as_ref();
        let byte_length = std::fs::metadata(path)?.len();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "media".to_string());

        log::debug!("Probing media file: {}", path.display());
        let demuxer = Demuxer::from_path(path)?;
        let metadata = probe(&demuxer, byte_length);

        Ok(Self::assemble(
            Origin::Path(path.to_path_buf()),
            name,
            metadata,
            demuxer,
        ))
    }

    fn assemble(origin: Origin, name: String, metadata: MediaMetadata, demuxer: Demuxer) -> Self {
        log::info!(
            "Opened source '{}' (format={}, duration={:.2}s, video_tracks={}, audio_tracks={})",
            name,
            metadata.format,
            metadata.duration.as_secs_f64(),
            metadata.video_tracks().count(),
            metadata.audio_tracks().count(),
        );

        Self {
            origin,
            name,
            metadata,
            probe_demuxer: Some(demuxer),
            live_samples: Arc::new(AtomicUsize::new(0)),
            disposed: false,
        }
    }

    /// Cached container metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ReelcutError::InvalidState`] once the source is disposed.
    pub fn metadata(&self) -> Result<&MediaMetadata, ReelcutError> {
        self.ensure_usable()?;
        Ok(&self.metadata)
    }

    /// Display name used for output filenames.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the underlying blob in bytes.
    pub fn byte_length(&self) -> u64 {
        self.metadata.byte_length
    }

    /// In-memory blobs and regular files are always randomly accessible.
    pub fn is_seekable(&self) -> bool {
        true
    }

    /// Number of decoded samples drawn from this source that are still
    /// alive.
    pub fn live_samples(&self) -> usize {
        self.live_samples.load(Ordering::Acquire)
    }

    /// Whether [`dispose`](MediaSource::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Release every resource derived from this source.
    ///
    /// Idempotent. Afterwards all operations fail with
    /// [`ReelcutError::InvalidState`].
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.probe_demuxer = None;
        self.disposed = true;
        log::debug!("Disposed source '{}'", self.name);
    }

    pub(crate) fn ensure_usable(&self) -> Result<(), ReelcutError> {
        if self.disposed {
            Err(ReelcutError::InvalidState(format!(
                "source '{}' has been disposed",
                self.name
            )))
        } else {
            Ok(())
        }
    }

    /// Open a demuxer over this source for one consumer.
    ///
    /// The first call reuses the context created while probing; later
    /// calls open independent contexts over the same bytes.
    pub(crate) fn demuxer(&mut self) -> Result<Demuxer, ReelcutError> {
        self.ensure_usable()?;
        if let Some(demuxer) = self.probe_demuxer.take() {
            return Ok(demuxer);
        }
        match &self.origin {
            Origin::Bytes(bytes) => Demuxer::from_bytes(Arc::clone(bytes)),
            Origin::Path(path) => Demuxer::from_path(path),
        }
    }

    pub(crate) fn sample_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.live_samples)
    }
}

/// Read the stream table of an opened container without creating decoders.
fn probe(input: &Input, byte_length: u64) -> MediaMetadata {
    let duration = container_duration(input.duration());
    let format = input.format().name().to_string();

    let mut tracks = Vec::new();
    for stream in input.streams() {
        let parameters = stream.parameters();
        let kind = match parameters.medium() {
            Type::Video => TrackKind::Video,
            Type::Audio => TrackKind::Audio,
            _ => continue,
        };

        // SAFETY: `parameters` borrows the stream's codec parameters, which
        // live as long as `input`.
        let raw = unsafe { &*parameters.as_ptr() };

        let stream_duration = stream.duration();
        let track_duration = if stream_duration > 0 && stream_duration != NO_PTS {
            Duration::from_secs_f64(pts_to_seconds(stream_duration, stream.time_base()).max(0.0))
        } else {
            duration
        };

        let codec = {
            let name = parameters.id().name();
            if name.is_empty() {
                "unknown".to_string()
            } else {
                name.to_string()
            }
        };

        let mut track = Track {
            kind,
            stream_index: stream.index(),
            codec,
            duration: track_duration,
            width: 0,
            height: 0,
            frames_per_second: 0.0,
            sample_rate: 0,
            channels: 0,
            bit_rate: raw.bit_rate.max(0) as u64,
        };

        match kind {
            TrackKind::Video => {
                track.width = raw.width.max(0) as u32;
                track.height = raw.height.max(0) as u32;
                let average = rational_to_f64(stream.avg_frame_rate());
                track.frames_per_second = if average > 0.0 {
                    average
                } else {
                    rational_to_f64(stream.rate())
                };
            }
            TrackKind::Audio => {
                track.sample_rate = raw.sample_rate.max(0) as u32;
                track.channels = raw.ch_layout.nb_channels.max(0) as u16;
            }
        }

        log::debug!(
            "Track {}: {} codec={} {}x{} {:.2} fps {} Hz {} ch",
            track.stream_index,
            track.kind,
            track.codec,
            track.width,
            track.height,
            track.frames_per_second,
            track.sample_rate,
            track.channels,
        );
        tracks.push(track);
    }

    MediaMetadata {
        tracks,
        duration,
        format,
        byte_length,
    }
}
