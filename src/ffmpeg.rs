//! FFmpeg initialisation and console verbosity.
//!
//! Every entry point calls [`ensure_initialized`] before touching FFmpeg.
//! The first call initialises the libraries and, unless the caller already
//! picked a level with [`set_ffmpeg_log_level`], lowers FFmpeg's own
//! stderr output to [`DEFAULT_FFMPEG_LOG_LEVEL`]: corrupt-packet chatter
//! from a conversion is reported through `log` and [`ReelcutError`]
//! instead.
//!
//! ```no_run
//! use reelcut::FfmpegLogLevel;
//!
//! let level: FfmpegLogLevel = "warning".parse().unwrap();
//! reelcut::set_ffmpeg_log_level(level);
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
    sync::{
        OnceLock,
        atomic::{AtomicBool, Ordering},
    },
};

use ffmpeg_next::util::log::{self as ffmpeg_log, Level};

use crate::error::ReelcutError;

/// FFmpeg console verbosity, from silent to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    Quiet,
    Panic,
    Fatal,
    Error,
    Warning,
    Info,
    Verbose,
    Debug,
    Trace,
}

/// Level applied at initialisation when none was requested.
pub const DEFAULT_FFMPEG_LOG_LEVEL: FfmpegLogLevel = FfmpegLogLevel::Error;

impl From<FfmpegLogLevel> for Level {
    fn from(level: FfmpegLogLevel) -> Self {
        match level {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = ReelcutError;

    /// Parse a level name, case-insensitively (`warn` is accepted too).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" => Ok(FfmpegLogLevel::Quiet),
            "panic" => Ok(FfmpegLogLevel::Panic),
            "fatal" => Ok(FfmpegLogLevel::Fatal),
            "error" => Ok(FfmpegLogLevel::Error),
            "warning" | "warn" => Ok(FfmpegLogLevel::Warning),
            "info" => Ok(FfmpegLogLevel::Info),
            "verbose" => Ok(FfmpegLogLevel::Verbose),
            "debug" => Ok(FfmpegLogLevel::Debug),
            "trace" => Ok(FfmpegLogLevel::Trace),
            _ => Err(ReelcutError::invalid(format!("unknown FFmpeg log level '{value}'"))),
        }
    }
}

impl Display for FfmpegLogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            FfmpegLogLevel::Quiet => "quiet",
            FfmpegLogLevel::Panic => "panic",
            FfmpegLogLevel::Fatal => "fatal",
            FfmpegLogLevel::Error => "error",
            FfmpegLogLevel::Warning => "warning",
            FfmpegLogLevel::Info => "info",
            FfmpegLogLevel::Verbose => "verbose",
            FfmpegLogLevel::Debug => "debug",
            FfmpegLogLevel::Trace => "trace",
        };
        f.write_str(name)
    }
}

static INIT: OnceLock<Result<(), String>> = OnceLock::new();
static LEVEL_CHOSEN: AtomicBool = AtomicBool::new(false);

/// Set FFmpeg's console verbosity. Takes precedence over
/// [`DEFAULT_FFMPEG_LOG_LEVEL`] whether called before or after the first
/// conversion. Does not affect this crate's `log` output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    LEVEL_CHOSEN.store(true, Ordering::SeqCst);
    ffmpeg_log::set_level(level.into());
    log::debug!("FFmpeg log level set to {level}");
}

/// Initialise FFmpeg once per process.
pub(crate) fn ensure_initialized() -> Result<(), ReelcutError> {
    INIT.get_or_init(|| {
        ffmpeg_next::init().map_err(|error| format!("FFmpeg initialisation failed: {error}"))?;
        if !LEVEL_CHOSEN.load(Ordering::SeqCst) {
            ffmpeg_log::set_level(DEFAULT_FFMPEG_LOG_LEVEL.into());
        }
        log::debug!("FFmpeg initialised");
        Ok(())
    })
    .clone()
    .map_err(ReelcutError::UnsupportedFormat)
}
