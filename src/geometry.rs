//! Rectangles, sizes and flip axes for the compositor.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Create a size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Round both dimensions down to even numbers (minimum 2), as 4:2:0
    /// chroma subsampling requires.
    pub fn even(&self) -> Self {
        Self {
            width: (self.width & !1).max(2),
            height: (self.height & !1).max(2),
        }
    }
}

impl Display for Size {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    /// Left edge.
    pub left: u32,
    /// Top edge.
    pub top: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Create a rectangle.
    pub const fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Rectangle covering a whole canvas of `size`.
    pub const fn full(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u64 {
        u64::from(self.left) + u64::from(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u64 {
        u64::from(self.top) + u64::from(self.height)
    }

    /// Size of the rectangle.
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Whether the rectangle lies entirely within a canvas of `bounds`.
    pub fn fits_within(&self, bounds: Size) -> bool {
        self.right() <= u64::from(bounds.width) && self.bottom() <= u64::from(bounds.height)
    }

    /// Largest rectangle with `source`'s aspect ratio that fits inside
    /// `target`, centred (letterboxing or pillarboxing the remainder).
    ///
    /// # Example
    ///
    /// ```
    /// use reelcut::{Rect, Size};
    ///
    /// let fit = Rect::letterbox(Size::new(1920, 1080), Size::new(640, 640));
    /// assert_eq!(fit, Rect::new(0, 140, 640, 360));
    /// ```
    pub fn letterbox(source: Size, target: Size) -> Rect {
        if source.is_empty() || target.is_empty() {
            return Rect::full(target);
        }
        let scale = f64::min(
            f64::from(target.width) / f64::from(source.width),
            f64::from(target.height) / f64::from(source.height),
        );
        let width = ((f64::from(source.width) * scale).round() as u32).clamp(1, target.width);
        let height = ((f64::from(source.height) * scale).round() as u32).clamp(1, target.height);
        Rect::new(
            (target.width - width) / 2,
            (target.height - height) / 2,
            width,
            height,
        )
    }
}

impl Display for Rect {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.left, self.top)
    }
}

/// Mirror axis for the flip transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlipAxis {
    /// Mirror left ↔ right.
    Horizontal,
    /// Mirror top ↔ bottom.
    Vertical,
    /// Both mirrors (a 180° rotation).
    Both,
}
