use crate::errors::{ScribeError, ScribeResult};
use crate::perception::types::{ElementRect, PixelRect, Scale};

/// Per-axis scale from DOM units to image pixels. The two axes are
/// independent so non-uniform zoom is preserved.
pub fn scale(reference: &ElementRect, image_width: u32, image_height: u32) -> ScribeResult<Scale> {
    if reference.is_degenerate() {
        return Err(ScribeError::DegenerateGeometry {
            width: reference.width,
            height: reference.height,
        });
    }
    Ok(Scale {
        x: image_width as f64 / reference.width,
        y: image_height as f64 / reference.height,
    })
}

pub fn project(rect: &ElementRect, scale: Scale) -> PixelRect {
    PixelRect {
        x: rect.x * scale.x,
        y: rect.y * scale.y,
        width: rect.width * scale.x,
        height: rect.height * scale.y,
    }
}
