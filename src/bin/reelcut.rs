use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use reelcut::{
    AudioFormat, ConversionOptions, FfmpegLogLevel, FlipAxis, ImageFormat, MediaSource,
    MergeOptions, OutputFormat, Overlay, ProgressEvent, Rect, RunOptions, Size, TimeWindow,
};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  reelcut probe input.mov --json\n  reelcut convert input.mov --format webm --start 2 --end 0:07.5 --size 640x360\n  reelcut extract-frames input.mp4 --at 0 --at 1.5 --at 3 --out frames\n  reelcut extract-audio input.mp4 --format wav\n  reelcut merge a.mp4 b.mp4 c.mp4 --out joined.mp4\n  reelcut completions zsh > _reelcut";

#[derive(Debug, Parser)]
#[command(
    name = "reelcut",
    version,
    about = "Convert, trim, watermark and merge media, and extract frames at exact timestamps",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show a progress bar.
    #[arg(long)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,

    /// JPEG quality (1-100) for extracted frames.
    #[arg(long)]
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the tracks of a media file.
    #[command(
        about = "Print media tracks",
        visible_alias = "info",
        after_help = "Examples:\n  reelcut probe input.mp4\n  reelcut probe input.mp4 --json"
    )]
    Probe {
        /// Input media path.
        input: PathBuf,

        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Convert a file into another container with optional edits.
    #[command(
        about = "Convert, trim, crop, resize, flip, speed up or watermark",
        after_help = "Examples:\n  reelcut convert input.mov --format mp4\n  reelcut convert input.mp4 --format gif --start 1 --end 4 --size 320x180 --fps 12\n  reelcut convert input.mp4 --crop 0,0,320,240 --flip horizontal --speed 2"
    )]
    Convert {
        /// Input media path.
        input: PathBuf,
        /// Output format: mp4 | mov | webm | mkv | gif.
        #[arg(long, default_value = "mp4")]
        format: String,
        /// Output file path (defaults to a name derived from the input).
        #[arg(long)]
        out: Option<PathBuf>,
        /// Window start (seconds or [hh:]mm:ss).
        #[arg(long)]
        start: Option<String>,
        /// Window end (seconds or [hh:]mm:ss).
        #[arg(long)]
        end: Option<String>,
        /// Output canvas as WIDTHxHEIGHT.
        #[arg(long)]
        size: Option<String>,
        /// Crop rectangle as LEFT,TOP,WIDTH,HEIGHT in source pixels.
        #[arg(long)]
        crop: Option<String>,
        /// Mirror axis: horizontal | vertical | both.
        #[arg(long)]
        flip: Option<String>,
        /// Playback rate (2 = twice as fast).
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        /// Output frame rate.
        #[arg(long)]
        fps: Option<u32>,
        /// Watermark image drawn over every frame.
        #[arg(long)]
        watermark: Option<PathBuf>,
        /// Watermark placement as LEFT,TOP,WIDTH,HEIGHT on the output canvas.
        #[arg(long, requires = "watermark")]
        watermark_rect: Option<String>,
        /// Watermark opacity (0.0 to 1.0).
        #[arg(long, default_value_t = 1.0)]
        watermark_opacity: f32,
        /// Drop the audio track.
        #[arg(long)]
        mute: bool,
    },

    /// Extract still frames at exact timestamps.
    #[command(
        about = "Extract frames at timestamps",
        after_help = "Examples:\n  reelcut extract-frames input.mp4 --at 0 --at 2.5 --out frames\n  reelcut extract-frames input.mp4 --at 0:10 --ext jpg --out stills"
    )]
    ExtractFrames {
        /// Input media path.
        input: PathBuf,
        /// Timestamp to sample (repeatable).
        #[arg(long = "at", required = true)]
        at: Vec<String>,
        /// Output directory for the images.
        #[arg(long)]
        out: PathBuf,
        /// Output image extension (png, jpg, jpeg).
        #[arg(long, default_value = "png")]
        ext: String,
    },

    /// Extract the audio track.
    #[command(
        about = "Extract audio track",
        after_help = "Examples:\n  reelcut extract-audio input.mp4 --format mp3\n  reelcut extract-audio input.mp4 --format wav --out clip.wav --start 1:00 --end 1:30"
    )]
    ExtractAudio {
        /// Input media path.
        input: PathBuf,
        /// Output format: mp3 | wav.
        #[arg(long, default_value = "mp3")]
        format: String,
        /// Output file path (defaults to a name derived from the input).
        #[arg(long)]
        out: Option<PathBuf>,
        /// Optional start time.
        #[arg(long)]
        start: Option<String>,
        /// Optional end time.
        #[arg(long)]
        end: Option<String>,
    },

    /// Concatenate several files.
    #[command(
        about = "Merge files end to end",
        after_help = "Examples:\n  reelcut merge a.mp4 b.mp4\n  reelcut merge a.mov b.mp4 --size 1280x720 --out joined.mp4"
    )]
    Merge {
        /// Input media paths, in playback order.
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
        /// Output format: mp4 | mov | webm | mkv.
        #[arg(long, default_value = "mp4")]
        format: String,
        /// Output file path (defaults to a name derived from the first input).
        #[arg(long)]
        out: Option<PathBuf>,
        /// Canvas for re-encoded output as WIDTHxHEIGHT.
        #[arg(long)]
        size: Option<String>,
        /// Re-encode even when packets could be copied.
        #[arg(long)]
        reencode: bool,
        /// Drop audio.
        #[arg(long)]
        mute: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_output_format(value: &str) -> Option<OutputFormat> {
    OutputFormat::from_extension(value).filter(|format| format.is_video())
}

fn parse_audio_format(value: &str) -> Option<AudioFormat> {
    match value.to_ascii_lowercase().as_str() {
        "mp3" => Some(AudioFormat::Mp3),
        "wav" | "wave" => Some(AudioFormat::Wav),
        _ => None,
    }
}

fn parse_flip(value: &str) -> Option<FlipAxis> {
    match value.to_ascii_lowercase().as_str() {
        "horizontal" | "h" | "x" => Some(FlipAxis::Horizontal),
        "vertical" | "v" | "y" => Some(FlipAxis::Vertical),
        "both" | "hv" | "xy" => Some(FlipAxis::Both),
        _ => None,
    }
}

fn parse_size(value: &str) -> Result<Size, Box<dyn std::error::Error>> {
    let (width, height) = value
        .to_ascii_lowercase()
        .split_once('x')
        .map(|(w, h)| (w.trim().to_string(), h.trim().to_string()))
        .ok_or(format!("invalid size (expected WIDTHxHEIGHT): {value}"))?;
    Ok(Size::new(width.parse()?, height.parse()?))
}

fn parse_rect(value: &str) -> Result<Rect, Box<dyn std::error::Error>> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [left, top, width, height] => Ok(Rect::new(*left, *top, *width, *height)),
        _ => Err(format!("invalid rectangle (expected LEFT,TOP,WIDTH,HEIGHT): {value}").into()),
    }
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(Duration::from_secs_f64(seconds.max(0.0)));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    Ok(Duration::from_secs_f64(total_seconds.max(0.0)))
}

fn parse_window(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<TimeWindow, Box<dyn std::error::Error>> {
    let start = start.map(parse_timecode).transpose()?;
    let end = end.map(parse_timecode).transpose()?;
    Ok(TimeWindow {
        start: start.map(|value| value.as_secs_f64()),
        end: end.map(|value| value.as_secs_f64()),
    })
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn progress_bar(label: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::with_template("{msg:>10} [{bar:40.cyan/blue}] {pos:>3}% {elapsed}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(label);
    bar
}

fn run_options(
    global: &GlobalOptions,
    label: &'static str,
) -> (RunOptions, Option<ProgressBar>) {
    let mut options = RunOptions::new();
    if let Some(quality) = global.jpeg_quality {
        options = options.with_jpeg_quality(quality);
    }
    if !global.progress {
        return (options, None);
    }

    let bar = progress_bar(label);
    let sink = bar.clone();
    options = options.with_progress(Arc::new(move |event: &ProgressEvent| {
        sink.set_position(u64::from(event.percent));
    }));
    (options, Some(bar))
}

fn write_output(
    path: &Path,
    bytes: &[u8],
    overwrite: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    ensure_writable_path(path, overwrite)?;
    fs::write(path, bytes)?;
    println!(
        "{} {} ({} bytes)",
        "saved".green().bold(),
        path.display(),
        bytes.len()
    );
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if let Some(level) = &cli.global.log_level {
        reelcut::set_ffmpeg_log_level(level.parse::<FfmpegLogLevel>()?);
    }

    match cli.command {
        Commands::Probe { input, json } => {
            let source = MediaSource::open(&input)?;
            let metadata = source.metadata()?;
            if json {
                let tracks: Vec<_> = metadata
                    .tracks
                    .iter()
                    .map(|track| {
                        json!({
                            "kind": track.kind.to_string(),
                            "stream_index": track.stream_index,
                            "codec": track.codec,
                            "duration_seconds": track.duration.as_secs_f64(),
                            "width": track.width,
                            "height": track.height,
                            "fps": track.frames_per_second,
                            "sample_rate": track.sample_rate,
                            "channels": track.channels,
                            "bit_rate": track.bit_rate,
                        })
                    })
                    .collect();
                let payload = json!({
                    "name": source.name(),
                    "format": metadata.format,
                    "byte_length": metadata.byte_length,
                    "duration_seconds": metadata.duration.as_secs_f64(),
                    "tracks": tracks,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Format: {}", metadata.format);
                println!("Duration: {:.3}s", metadata.duration.as_secs_f64());
                println!("Size: {} bytes", metadata.byte_length);
                for track in &metadata.tracks {
                    if track.is_video() {
                        println!(
                            "#{} video: {}x{} @ {:.2} fps [{}]",
                            track.stream_index,
                            track.width,
                            track.height,
                            track.frames_per_second,
                            track.codec,
                        );
                    } else {
                        println!(
                            "#{} audio: {} Hz, {} ch [{}]",
                            track.stream_index, track.sample_rate, track.channels, track.codec,
                        );
                    }
                }
            }
        }
        Commands::Convert {
            input,
            format,
            out,
            start,
            end,
            size,
            crop,
            flip,
            speed,
            fps,
            watermark,
            watermark_rect,
            watermark_opacity,
            mute,
        } => {
            let format = parse_output_format(&format)
                .ok_or(format!("unsupported --format: {format}"))?;
            let mut options = ConversionOptions::new(format)
                .with_window(parse_window(start.as_deref(), end.as_deref())?)
                .with_speed(speed)
                .with_mute(mute);
            if let Some(size) = &size {
                options = options.with_target_size(parse_size(size)?);
            }
            if let Some(crop) = &crop {
                options = options.with_crop(parse_rect(crop)?);
            }
            if let Some(flip) = &flip {
                options = options.with_flip(parse_flip(flip).ok_or(format!("unsupported --flip: {flip}"))?);
            }
            if let Some(fps) = fps {
                options = options.with_frames_per_second(fps);
            }
            if let Some(path) = &watermark {
                let image = image::open(path)?.to_rgba8();
                let rect = match &watermark_rect {
                    Some(rect) => parse_rect(rect)?,
                    None => Rect::new(0, 0, image.width(), image.height()),
                };
                options = options.with_overlay(Overlay::new(image, rect)?.with_opacity(watermark_opacity));
            }

            let mut source = MediaSource::open(&input)?;
            let (run, bar) = run_options(&cli.global, "convert");
            let result = reelcut::convert(&mut source, &options, &run);
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }
            let result = result?;
            let path = out.unwrap_or_else(|| PathBuf::from(&result.filename));
            write_output(&path, &result.bytes, cli.global.overwrite)?;
            println!(
                "{}x{}, {:.2}s, {}",
                result.width,
                result.height,
                result.duration.as_secs_f64(),
                result.mime_type
            );
        }
        Commands::ExtractFrames { input, at, out, ext } => {
            let format = ImageFormat::from_extension(&ext)
                .ok_or(format!("unsupported --ext: {ext}"))?;
            let timestamps = at
                .iter()
                .map(|value| parse_timecode(value).map(|time| time.as_secs_f64()))
                .collect::<Result<Vec<_>, _>>()?;

            if out.exists() && !out.is_dir() {
                return Err(format!("output path is not a directory: {}", out.display()).into());
            }
            fs::create_dir_all(&out)?;

            let mut source = MediaSource::open(&input)?;
            let (run, bar) = run_options(&cli.global, "frames");
            let frames = reelcut::extract_frames(&mut source, &timestamps, format, &run);
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }
            for frame in frames? {
                let path = out.join(&frame.filename);
                ensure_writable_path(&path, cli.global.overwrite)?;
                fs::write(&path, &frame.bytes)?;
                println!(
                    "{} {} (requested {:.3}s, shown {:.3}s)",
                    "saved".green().bold(),
                    path.display(),
                    frame.requested,
                    frame.timestamp
                );
            }
        }
        Commands::ExtractAudio {
            input,
            format,
            out,
            start,
            end,
        } => {
            let format = parse_audio_format(&format)
                .ok_or(format!("unsupported --format: {format}"))?;
            let window = parse_window(start.as_deref(), end.as_deref())?;

            let mut source = MediaSource::open(&input)?;
            let (run, bar) = run_options(&cli.global, "audio");
            let result = reelcut::extract_audio(&mut source, format, window, &run);
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }
            let result = result?;
            let path = out.unwrap_or_else(|| PathBuf::from(&result.filename));
            write_output(&path, &result.bytes, cli.global.overwrite)?;
        }
        Commands::Merge {
            inputs,
            format,
            out,
            size,
            reencode,
            mute,
        } => {
            let format = parse_output_format(&format)
                .ok_or(format!("unsupported --format: {format}"))?;
            let mut options = MergeOptions::new(format)
                .with_force_reencode(reencode)
                .with_mute(mute);
            if let Some(size) = &size {
                options = options.with_target_size(parse_size(size)?);
            }

            let mut sources = inputs
                .iter()
                .map(MediaSource::open)
                .collect::<Result<Vec<_>, _>>()?;
            let strategy = reelcut::plan_merge(&sources, &options)?;
            eprintln!("{} {strategy}", "strategy".cyan().bold());

            let (run, bar) = run_options(&cli.global, "merge");
            let result = reelcut::merge(&mut sources, &options, &run);
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }
            let result = result?;
            let path = out.unwrap_or_else(|| PathBuf::from(&result.filename));
            write_output(&path, &result.bytes, cli.global.overwrite)?;
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "reelcut", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{
        Cli, Commands, parse_audio_format, parse_flip, parse_output_format, parse_rect,
        parse_size, parse_timecode, parse_window,
    };
    use reelcut::{AudioFormat, FlipAxis, OutputFormat, Rect, Size};

    #[test]
    fn parse_output_format_accepts_video_containers_only() {
        assert_eq!(parse_output_format("mp4"), Some(OutputFormat::Mp4));
        assert_eq!(parse_output_format("WEBM"), Some(OutputFormat::WebM));
        assert_eq!(parse_output_format("gif"), Some(OutputFormat::Gif));
        assert_eq!(parse_output_format("wav"), None);
        assert_eq!(parse_output_format("avi"), None);
    }

    #[test]
    fn parse_audio_format_aliases() {
        assert_eq!(parse_audio_format("mp3"), Some(AudioFormat::Mp3));
        assert_eq!(parse_audio_format("WAV"), Some(AudioFormat::Wav));
        assert_eq!(parse_audio_format("wave"), Some(AudioFormat::Wav));
        assert_eq!(parse_audio_format("flac"), None);
    }

    #[test]
    fn parse_flip_aliases() {
        assert_eq!(parse_flip("h"), Some(FlipAxis::Horizontal));
        assert_eq!(parse_flip("Vertical"), Some(FlipAxis::Vertical));
        assert_eq!(parse_flip("both"), Some(FlipAxis::Both));
        assert_eq!(parse_flip("diagonal"), None);
    }

    #[test]
    fn parse_geometry() {
        assert_eq!(parse_size("640x360").unwrap(), Size::new(640, 360));
        assert_eq!(parse_size("1280X720").unwrap(), Size::new(1280, 720));
        assert!(parse_size("640").is_err());
        assert_eq!(parse_rect("10, 20, 300, 200").unwrap(), Rect::new(10, 20, 300, 200));
        assert!(parse_rect("10,20,300").is_err());
        assert!(parse_rect("a,b,c,d").is_err());
    }

    #[test]
    fn parse_timecode_formats() {
        let seconds = parse_timecode("75").unwrap();
        assert_eq!(seconds.as_secs(), 75);

        let mm_ss = parse_timecode("01:15").unwrap();
        assert_eq!(mm_ss.as_secs(), 75);

        let hh_mm_ss = parse_timecode("00:01:15.5").unwrap();
        assert_eq!(hh_mm_ss.as_millis(), 75_500);

        assert!(parse_timecode("").is_err());
        assert!(parse_timecode("1:2:3:4").is_err());
    }

    #[test]
    fn parse_window_keeps_open_ends() {
        let window = parse_window(Some("2"), None).unwrap();
        assert_eq!(window.start, Some(2.0));
        assert_eq!(window.end, None);
    }

    #[test]
    fn merge_requires_two_inputs() {
        assert!(Cli::try_parse_from(["reelcut", "merge", "a.mp4"]).is_err());
        let cli = Cli::try_parse_from(["reelcut", "merge", "a.mp4", "b.mp4", "--reencode"])
            .unwrap();
        match cli.command {
            Commands::Merge { inputs, reencode, .. } => {
                assert_eq!(inputs.len(), 2);
                assert!(reencode);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn extract_frames_collects_repeated_timestamps() {
        let cli = Cli::try_parse_from([
            "reelcut",
            "extract-frames",
            "in.mp4",
            "--at",
            "0",
            "--at",
            "1.5",
            "--out",
            "frames",
        ])
        .unwrap();
        match cli.command {
            Commands::ExtractFrames { at, ext, .. } => {
                assert_eq!(at, vec!["0".to_string(), "1.5".to_string()]);
                assert_eq!(ext, "png");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
