use serde::{Deserialize, Serialize};

/// A DOM bounding box in CSS pixels, as reported by `getBoundingClientRect()`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Zero (or negative, or NaN) extent on either axis; unusable as a scale reference.
    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Per-axis factor mapping DOM units to screenshot pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub x: f64,
    pub y: f64,
}

impl Scale {
    pub const IDENTITY: Scale = Scale { x: 1.0, y: 1.0 };
}

/// A rectangle in screenshot pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    /// Integer corners `(x1, y1, x2, y2)` of the outline, inclusive.
    pub fn corners(&self) -> (i32, i32, i32, i32) {
        let x1 = self.x.round() as i32;
        let y1 = self.y.round() as i32;
        let x2 = (self.x + self.width).round() as i32;
        let y2 = (self.y + self.height).round() as i32;
        (x1, y1, x2, y2)
    }
}
