//! Benchmarks for compositing, sampling, conversion and merging.
//!
//! Run with: cargo bench
//! Run with all features: cargo bench --all-features
//!
//! Fixtures are encoded in memory before the first benchmark runs.

use std::{sync::OnceLock, time::Duration};

use criterion::{BenchmarkId, Criterion};
use image::{Rgba, RgbaImage};
use reelcut::{
    ClipEncoder, Compositor, ConversionOptions, FfmpegLogLevel, FlipAxis, FrameArena,
    FrameRequest, ImageFormat, MediaSource, MergeOptions, OutputFormat, Overlay, Rect,
    RunOptions, Size, TimeWindow, VideoCodec, convert, extract_frames, merge,
    primary_video_track, samples_at_timestamps,
};

fn test_pattern(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
    })
}

fn clip() -> &'static [u8] {
    static CLIP: OnceLock<Vec<u8>> = OnceLock::new();
    CLIP.get_or_init(|| {
        reelcut::set_ffmpeg_log_level(FfmpegLogLevel::Error);
        let frame = test_pattern(640, 480);
        ClipEncoder::new(OutputFormat::Mp4)
            .with_codec(VideoCodec::Mpeg4)
            .encode(std::iter::repeat_n(&frame, 125))
            .expect("Failed to encode benchmark clip")
    })
}

fn source() -> MediaSource {
    MediaSource::from_bytes(clip().to_vec(), "bench.mp4").expect("Failed to open benchmark clip")
}

fn benchmark_compositing(criterion: &mut Criterion) {
    let frame = test_pattern(1280, 720);
    let watermark = Overlay::new(test_pattern(64, 64), Rect::new(16, 16, 128, 128))
        .expect("Invalid overlay")
        .with_opacity(0.6);

    let mut group = criterion.benchmark_group("composite 1280x720");
    let cases = [
        ("identity", Compositor::new()),
        ("scale to 640x360", Compositor::new().with_target_size(Size::new(640, 360))),
        (
            "crop + scale + flip",
            Compositor::new()
                .with_crop(Rect::new(320, 180, 640, 360))
                .with_target_size(Size::new(1280, 720))
                .with_flip(FlipAxis::Horizontal),
        ),
        ("watermark", Compositor::new().with_overlay(watermark)),
    ];
    for (name, compositor) in cases {
        let mut arena = FrameArena::new();
        group.bench_function(BenchmarkId::from_parameter(name), |bencher| {
            bencher.iter(|| {
                compositor.composite(&mut arena, &frame, 0.0).unwrap();
            });
        });
    }
    group.finish();
}

fn benchmark_sampling(criterion: &mut Criterion) {
    criterion.bench_function("sample 10 timestamps", |bencher| {
        let request = FrameRequest::new((0..10).map(|index| index as f64 * 0.45).collect::<Vec<_>>())
            .unwrap();
        bencher.iter(|| {
            let mut source = source();
            let track = primary_video_track(&source).unwrap().unwrap();
            let _samples = samples_at_timestamps(&mut source, &track, &request)
                .unwrap()
                .collect_exact()
                .unwrap();
        });
    });

    criterion.bench_function("extract 3 png frames", |bencher| {
        bencher.iter(|| {
            let mut source = source();
            let _frames =
                extract_frames(&mut source, &[0.0, 2.0, 4.0], ImageFormat::Png, &RunOptions::default())
                    .unwrap();
        });
    });
}

fn benchmark_conversion(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("convert 1s");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(20));

    let base = ConversionOptions::new(OutputFormat::Mp4)
        .with_codec(VideoCodec::Mpeg4)
        .with_window(TimeWindow::ending_at(1.0));
    let cases = [
        ("mp4 passthrough", base.clone()),
        ("mp4 resized", base.clone().with_target_size(Size::new(320, 240))),
        ("mp4 2x speed", base.clone().with_speed(2.0)),
        (
            "gif 320x240",
            base.with_format(OutputFormat::Gif)
                .with_target_size(Size::new(320, 240))
                .with_frames_per_second(10),
        ),
    ];
    for (name, options) in cases {
        group.bench_function(BenchmarkId::from_parameter(name), |bencher| {
            bencher.iter(|| {
                let mut source = source();
                convert(&mut source, &options, &RunOptions::default()).unwrap();
            });
        });
    }
    group.finish();
}

fn benchmark_merge(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("merge two 5s clips");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(20));

    for (name, force) in [("copy", false), ("reencode", true)] {
        let options = MergeOptions::default().with_force_reencode(force);
        group.bench_function(BenchmarkId::from_parameter(name), |bencher| {
            bencher.iter(|| {
                let mut sources = vec![source(), source()];
                merge(&mut sources, &options, &RunOptions::default()).unwrap();
            });
        });
    }
    group.finish();
}

criterion::criterion_group!(
    benches,
    benchmark_compositing,
    benchmark_sampling,
    benchmark_conversion,
    benchmark_merge,
);
criterion::criterion_main!(benches);
