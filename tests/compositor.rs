//! Compositor and geometry tests. These run on synthetic buffers and do
//! not touch FFmpeg.

mod common;

use image::{Rgba, RgbaImage};
use reelcut::{Compositor, FlipAxis, FrameArena, Overlay, Rect, Size};

use common::{BLUE, GREEN, RED, WHITE, assert_color, assert_corners, quadrant_frame};

/// Rounding slack of the triangle filter on solid regions.
const SCALE_TOLERANCE: u8 = 2;

// ── geometry ───────────────────────────────────────────────────────

#[test]
fn rect_edges_and_fit() {
    let rect = Rect::new(10, 20, 30, 40);
    assert_eq!(rect.right(), 40);
    assert_eq!(rect.bottom(), 60);
    assert_eq!(rect.size(), Size::new(30, 40));
    assert!(rect.fits_within(Size::new(40, 60)));
    assert!(!rect.fits_within(Size::new(39, 60)));
    assert_eq!(rect.to_string(), "30x40+10+20");
}

#[test]
fn letterbox_centres_the_fit() {
    assert_eq!(
        Rect::letterbox(Size::new(1920, 1080), Size::new(640, 640)),
        Rect::new(0, 140, 640, 360)
    );
    assert_eq!(
        Rect::letterbox(Size::new(480, 640), Size::new(640, 480)),
        Rect::new(140, 0, 360, 480)
    );
}

#[test]
fn even_rounds_down() {
    assert_eq!(Size::new(161, 121).even(), Size::new(160, 120));
    assert_eq!(Size::new(1, 1).even(), Size::new(2, 2));
    assert_eq!(Size::new(640, 480).even(), Size::new(640, 480));
}

// ── transforms ─────────────────────────────────────────────────────

#[test]
fn identity_passes_pixels_through() {
    let frame = quadrant_frame(64, 48);
    let mut arena = FrameArena::new();
    let canvas = Compositor::new()
        .composite(&mut arena, &frame, 0.0)
        .expect("Failed to composite");
    assert_eq!(canvas, &frame);
}

#[test]
fn crop_then_scale_uses_source_coordinates() {
    let frame = quadrant_frame(640, 480);
    let compositor = Compositor::new()
        .with_crop(Rect::new(0, 0, 320, 240))
        .with_target_size(Size::new(160, 120));
    let mut arena = FrameArena::new();
    let canvas = compositor.composite(&mut arena, &frame, 0.0).unwrap();

    assert_eq!(canvas.dimensions(), (160, 120));
    assert_corners(canvas, [RED, RED, RED, RED], 0, SCALE_TOLERANCE);

    let centred = Compositor::new()
        .with_crop(Rect::new(160, 120, 320, 240))
        .with_target_size(Size::new(160, 120));
    let canvas = centred.composite(&mut arena, &frame, 0.0).unwrap();
    assert_corners(canvas, [RED, GREEN, BLUE, WHITE], 0, SCALE_TOLERANCE);
}

#[test]
fn crop_without_scale_copies_the_region() {
    let frame = quadrant_frame(64, 48);
    let mut arena = FrameArena::new();
    let canvas = Compositor::new()
        .with_crop(Rect::new(32, 24, 32, 24))
        .composite(&mut arena, &frame, 0.0)
        .unwrap();
    assert_eq!(canvas.dimensions(), (32, 24));
    assert_corners(canvas, [WHITE, WHITE, WHITE, WHITE], 0, 0);
}

#[test]
fn scale_fills_without_preserving_aspect() {
    let frame = quadrant_frame(640, 480);
    let compositor = Compositor::new().with_target_size(Size::new(100, 300));
    assert_eq!(compositor.output_size(Size::new(640, 480)), Size::new(100, 300));

    let mut arena = FrameArena::new();
    let canvas = compositor.composite(&mut arena, &frame, 0.0).unwrap();
    assert_eq!(canvas.dimensions(), (100, 300));
    assert_corners(canvas, [RED, GREEN, BLUE, WHITE], 0, SCALE_TOLERANCE);
}

#[test]
fn flips_mirror_the_canvas() {
    let frame = quadrant_frame(64, 64);
    let mut arena = FrameArena::new();
    for (axis, corners) in [
        (FlipAxis::Horizontal, [GREEN, RED, WHITE, BLUE]),
        (FlipAxis::Vertical, [BLUE, WHITE, RED, GREEN]),
        (FlipAxis::Both, [WHITE, BLUE, GREEN, RED]),
    ] {
        let canvas = Compositor::new()
            .with_flip(axis)
            .composite(&mut arena, &frame, 0.0)
            .unwrap();
        assert_corners(canvas, corners, 0, 0);
    }
}

#[test]
fn flip_commutes_with_crop_and_scale() {
    let frame = quadrant_frame(640, 480);
    let mut arena = FrameArena::new();
    let canvas = Compositor::new()
        .with_crop(Rect::new(160, 120, 320, 240))
        .with_target_size(Size::new(80, 60))
        .with_flip(FlipAxis::Horizontal)
        .composite(&mut arena, &frame, 0.0)
        .unwrap();
    assert_corners(canvas, [GREEN, RED, WHITE, BLUE], 0, SCALE_TOLERANCE);
}

#[test]
fn compositors_sharing_an_arena_keep_their_own_transforms() {
    let frame = quadrant_frame(640, 480);
    let target = Size::new(160, 120);
    let horizontal = Compositor::new()
        .with_target_size(target)
        .with_flip(FlipAxis::Horizontal);
    let vertical = Compositor::new()
        .with_target_size(target)
        .with_flip(FlipAxis::Vertical);
    let mut arena = FrameArena::new();

    let canvas = horizontal.composite(&mut arena, &frame, 0.0).unwrap();
    assert_corners(canvas, [GREEN, RED, WHITE, BLUE], 0, SCALE_TOLERANCE);
    let canvas = vertical.composite(&mut arena, &frame, 0.0).unwrap();
    assert_corners(canvas, [BLUE, WHITE, RED, GREEN], 0, SCALE_TOLERANCE);

    let left = Compositor::new()
        .with_crop(Rect::new(0, 0, 320, 480))
        .with_target_size(target);
    let right = Compositor::new()
        .with_crop(Rect::new(320, 0, 320, 480))
        .with_target_size(target);
    let canvas = left.composite(&mut arena, &frame, 0.0).unwrap();
    assert_corners(canvas, [RED, RED, BLUE, BLUE], 0, SCALE_TOLERANCE);
    let canvas = right.composite(&mut arena, &frame, 0.0).unwrap();
    assert_corners(canvas, [GREEN, GREEN, WHITE, WHITE], 0, SCALE_TOLERANCE);
    assert_eq!(arena.reallocations(), 1);
}

// ── overlays ───────────────────────────────────────────────────────

#[test]
fn overlays_draw_in_order() {
    let frame = RgbaImage::from_pixel(32, 32, Rgba([255, 255, 255, 255]));
    let black = RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 255]));
    let red = RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255]));
    let compositor = Compositor::new()
        .with_overlay(Overlay::new(black, Rect::new(0, 0, 16, 16)).unwrap())
        .with_overlay(Overlay::new(red, Rect::new(8, 8, 8, 8)).unwrap());

    let mut arena = FrameArena::new();
    let canvas = compositor.composite(&mut arena, &frame, 0.0).unwrap();
    assert_color(canvas, 2, 2, [0, 0, 0], 0);
    assert_color(canvas, 12, 12, RED, 0);
    assert_color(canvas, 20, 20, WHITE, 0);
}

#[test]
fn overlay_is_scaled_to_its_rectangle() {
    let mark = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255]));
    let overlay = Overlay::new(mark, Rect::new(4, 4, 10, 6)).unwrap();
    assert_eq!(overlay.rect(), Rect::new(4, 4, 10, 6));

    let frame = RgbaImage::from_pixel(32, 32, Rgba([255, 255, 255, 255]));
    let mut arena = FrameArena::new();
    let canvas = Compositor::new()
        .with_overlay(overlay)
        .composite(&mut arena, &frame, 0.0)
        .unwrap();
    assert_color(canvas, 13, 9, BLUE, 2);
    assert_color(canvas, 14, 10, WHITE, 0);
}

#[test]
fn overlay_opacity_blends() {
    let frame = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]));
    let black = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
    let overlay = Overlay::new(black, Rect::new(0, 0, 8, 8))
        .unwrap()
        .with_opacity(0.5);

    let mut arena = FrameArena::new();
    let canvas = Compositor::new()
        .with_overlay(overlay)
        .composite(&mut arena, &frame, 0.0)
        .unwrap();
    assert_color(canvas, 4, 4, [127, 127, 127], 2);
    assert_eq!(canvas.get_pixel(4, 4)[3], 255);
}

#[test]
fn overlay_window_limits_when_it_is_drawn() {
    let frame = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]));
    let black = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
    let overlay = Overlay::new(black, Rect::new(0, 0, 8, 8))
        .unwrap()
        .with_window(1.0, 2.0)
        .unwrap();
    assert!(!overlay.is_active(0.5));
    assert!(overlay.is_active(1.0));
    assert!(overlay.is_active(2.0));
    assert!(!overlay.is_active(2.5));

    let compositor = Compositor::new().with_overlay(overlay);
    let mut arena = FrameArena::new();
    let before = compositor.composite(&mut arena, &frame, 0.5).unwrap();
    assert_color(before, 0, 0, WHITE, 0);
    let during = compositor.composite(&mut arena, &frame, 1.5).unwrap();
    assert_color(during, 0, 0, [0, 0, 0], 0);
}

#[test]
fn overlay_outside_the_canvas_is_clipped() {
    let frame = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]));
    let black = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
    let compositor = Compositor::new()
        .with_overlay(Overlay::new(black.clone(), Rect::new(4, 4, 8, 8)).unwrap())
        .with_overlay(Overlay::new(black, Rect::new(100, 100, 8, 8)).unwrap());

    let mut arena = FrameArena::new();
    let canvas = compositor.composite(&mut arena, &frame, 0.0).unwrap();
    assert_color(canvas, 7, 7, [0, 0, 0], 0);
    assert_color(canvas, 3, 3, WHITE, 0);
}

#[test]
fn invalid_overlays_are_rejected() {
    let image = RgbaImage::new(4, 4);
    assert!(Overlay::new(image.clone(), Rect::new(0, 0, 0, 4)).is_err());
    assert!(Overlay::new(RgbaImage::new(0, 0), Rect::new(0, 0, 4, 4)).is_err());
    let overlay = Overlay::new(image, Rect::new(0, 0, 4, 4)).unwrap();
    assert!(overlay.clone().with_window(2.0, 1.0).is_err());
    assert!(overlay.with_window(-1.0, 1.0).is_err());
}

// ── arena reuse ────────────────────────────────────────────────────

#[test]
fn arena_reallocates_only_on_size_change() {
    let compositor = Compositor::new();
    let mut arena = FrameArena::new();
    let small = quadrant_frame(32, 32);
    let large = quadrant_frame(64, 32);

    for _ in 0..5 {
        compositor.composite(&mut arena, &small, 0.0).unwrap();
    }
    assert_eq!(arena.reallocations(), 1);

    compositor.composite(&mut arena, &large, 0.0).unwrap();
    compositor.composite(&mut arena, &large, 0.0).unwrap();
    assert_eq!(arena.reallocations(), 2);
    assert_eq!(arena.canvas().dimensions(), (64, 32));
}

#[test]
fn fixed_target_keeps_one_canvas_across_source_sizes() {
    let compositor = Compositor::new().with_target_size(Size::new(40, 30));
    let mut arena = FrameArena::new();
    compositor.composite(&mut arena, &quadrant_frame(64, 48), 0.0).unwrap();
    compositor.composite(&mut arena, &quadrant_frame(128, 96), 0.0).unwrap();
    assert_eq!(arena.reallocations(), 1);
}

#[test]
fn empty_frame_is_an_error() {
    let mut arena = FrameArena::new();
    let error = Compositor::new()
        .composite(&mut arena, &RgbaImage::new(0, 0), 0.0)
        .unwrap_err();
    assert!(matches!(error, reelcut::ReelcutError::Encode { .. }));
}
