//! Output formats and their container/codec descriptors.
//!
//! Each [`OutputFormat`] maps to a static [`FormatDescriptor`] naming its
//! file extension, MIME type, FFmpeg muxer and the ordered codec
//! candidates tried when encoding. Encoders are chosen at run time: the
//! first candidate this FFmpeg build can open wins.

use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
    sync::LazyLock,
};

use ffmpeg_next::codec::Id;

/// Video codecs the engine can encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    /// H.264 / AVC (usually libx264).
    H264,
    /// MPEG-4 Part 2, built into FFmpeg.
    Mpeg4,
    /// VP8 (libvpx).
    Vp8,
    /// VP9 (libvpx-vp9).
    Vp9,
    /// Motion JPEG, built into FFmpeg.
    Mjpeg,
}

impl VideoCodec {
    pub(crate) fn id(self) -> Id {
        match self {
            VideoCodec::H264 => Id::H264,
            VideoCodec::Mpeg4 => Id::MPEG4,
            VideoCodec::Vp8 => Id::VP8,
            VideoCodec::Vp9 => Id::VP9,
            VideoCodec::Mjpeg => Id::MJPEG,
        }
    }

    /// FFmpeg codec name (matches [`Track::codec`](crate::Track::codec)).
    pub fn name(self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::Mpeg4 => "mpeg4",
            VideoCodec::Vp8 => "vp8",
            VideoCodec::Vp9 => "vp9",
            VideoCodec::Mjpeg => "mjpeg",
        }
    }
}

impl Display for VideoCodec {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

/// Audio codecs the engine can encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    /// AAC, built into FFmpeg.
    Aac,
    /// FLAC, built into FFmpeg.
    Flac,
    /// Opus (libopus).
    Opus,
    /// Vorbis (libvorbis).
    Vorbis,
    /// MP3 (libmp3lame).
    Mp3,
    /// Signed 16-bit little-endian PCM.
    PcmS16le,
}

impl AudioCodec {
    pub(crate) fn id(self) -> Id {
        match self {
            AudioCodec::Aac => Id::AAC,
            AudioCodec::Flac => Id::FLAC,
            AudioCodec::Opus => Id::OPUS,
            AudioCodec::Vorbis => Id::VORBIS,
            AudioCodec::Mp3 => Id::MP3,
            AudioCodec::PcmS16le => Id::PCM_S16LE,
        }
    }

    /// FFmpeg codec name.
    pub fn name(self) -> &'static str {
        match self {
            AudioCodec::Aac => "aac",
            AudioCodec::Flac => "flac",
            AudioCodec::Opus => "opus",
            AudioCodec::Vorbis => "vorbis",
            AudioCodec::Mp3 => "mp3",
            AudioCodec::PcmS16le => "pcm_s16le",
        }
    }

    /// Target bit rate for lossy codecs.
    pub(crate) fn bit_rate(self) -> Option<usize> {
        match self {
            AudioCodec::Aac | AudioCodec::Mp3 | AudioCodec::Vorbis => Some(128_000),
            AudioCodec::Opus => Some(96_000),
            AudioCodec::Flac | AudioCodec::PcmS16le => None,
        }
    }
}

impl Display for AudioCodec {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

/// Output containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// MPEG-4 Part 14.
    Mp4,
    /// QuickTime.
    Mov,
    /// WebM.
    WebM,
    /// Matroska.
    Mkv,
    /// Animated GIF (no audio).
    Gif,
    /// MP3 audio only.
    Mp3,
    /// WAV audio only.
    Wav,
}

/// Static description of an [`OutputFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    /// File extension without the dot.
    pub extension: &'static str,
    /// MIME type of the produced bytes.
    pub mime_type: &'static str,
    /// FFmpeg muxer name.
    pub muxer: &'static str,
    /// Video codecs in order of preference; empty for audio-only formats.
    pub video_codecs: &'static [VideoCodec],
    /// Audio codecs in order of preference; empty when audio is not
    /// carried.
    pub audio_codecs: &'static [AudioCodec],
}

const MP4: FormatDescriptor = FormatDescriptor {
    extension: "mp4",
    mime_type: "video/mp4",
    muxer: "mp4",
    video_codecs: &[VideoCodec::H264, VideoCodec::Mpeg4],
    audio_codecs: &[AudioCodec::Aac],
};

const MOV: FormatDescriptor = FormatDescriptor {
    extension: "mov",
    mime_type: "video/quicktime",
    muxer: "mov",
    video_codecs: &[VideoCodec::H264, VideoCodec::Mpeg4],
    audio_codecs: &[AudioCodec::Aac],
};

const WEBM: FormatDescriptor = FormatDescriptor {
    extension: "webm",
    mime_type: "video/webm",
    muxer: "webm",
    video_codecs: &[VideoCodec::Vp9, VideoCodec::Vp8],
    audio_codecs: &[AudioCodec::Opus, AudioCodec::Vorbis],
};

const MKV: FormatDescriptor = FormatDescriptor {
    extension: "mkv",
    mime_type: "video/x-matroska",
    muxer: "matroska",
    video_codecs: &[VideoCodec::H264, VideoCodec::Mpeg4],
    audio_codecs: &[AudioCodec::Aac, AudioCodec::Flac],
};

const GIF: FormatDescriptor = FormatDescriptor {
    extension: "gif",
    mime_type: "image/gif",
    muxer: "gif",
    video_codecs: &[],
    audio_codecs: &[],
};

const MP3: FormatDescriptor = FormatDescriptor {
    extension: "mp3",
    mime_type: "audio/mpeg",
    muxer: "mp3",
    video_codecs: &[],
    audio_codecs: &[AudioCodec::Mp3],
};

const WAV: FormatDescriptor = FormatDescriptor {
    extension: "wav",
    mime_type: "audio/wav",
    muxer: "wav",
    video_codecs: &[],
    audio_codecs: &[AudioCodec::PcmS16le],
};

static BY_EXTENSION: LazyLock<HashMap<&'static str, OutputFormat>> = LazyLock::new(|| {
    let mut table = HashMap::new();
    for format in OutputFormat::ALL {
        table.insert(format.descriptor().extension, format);
    }
    table.insert("m4v", OutputFormat::Mp4);
    table.insert("qt", OutputFormat::Mov);
    table.insert("mka", OutputFormat::Mkv);
    table
});

impl OutputFormat {
    /// Every output format.
    pub const ALL: [OutputFormat; 7] = [
        OutputFormat::Mp4,
        OutputFormat::Mov,
        OutputFormat::WebM,
        OutputFormat::Mkv,
        OutputFormat::Gif,
        OutputFormat::Mp3,
        OutputFormat::Wav,
    ];

    /// The static descriptor for this format.
    pub fn descriptor(self) -> &'static FormatDescriptor {
        match self {
            OutputFormat::Mp4 => &MP4,
            OutputFormat::Mov => &MOV,
            OutputFormat::WebM => &WEBM,
            OutputFormat::Mkv => &MKV,
            OutputFormat::Gif => &GIF,
            OutputFormat::Mp3 => &MP3,
            OutputFormat::Wav => &WAV,
        }
    }

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        self.descriptor().extension
    }

    /// MIME type of the produced bytes.
    pub fn mime_type(self) -> &'static str {
        self.descriptor().mime_type
    }

    /// Look up a format by file extension, ignoring case and a leading dot.
    ///
    /// ```
    /// use reelcut::OutputFormat;
    ///
    /// assert_eq!(OutputFormat::from_extension(".MKV"), Some(OutputFormat::Mkv));
    /// assert_eq!(OutputFormat::from_extension("avi"), None);
    /// ```
    pub fn from_extension(extension: &str) -> Option<Self> {
        let normalized = extension.trim_start_matches('.').to_ascii_lowercase();
        BY_EXTENSION.get(normalized.as_str()).copied()
    }

    /// Whether the format carries a video track.
    pub fn is_video(self) -> bool {
        !self.descriptor().video_codecs.is_empty() || self == OutputFormat::Gif
    }

    /// Whether the format carries audio.
    pub fn supports_audio(self) -> bool {
        !self.descriptor().audio_codecs.is_empty()
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.extension())
    }
}
