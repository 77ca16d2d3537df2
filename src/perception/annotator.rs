//! Draw the highlight outline onto a screenshot and shrink it for transport.

use image::{DynamicImage, Rgba, RgbaImage};

use crate::config::AnnotationConfig;
use crate::errors::{ScribeError, ScribeResult};
use crate::perception::types::PixelRect;

/// Outline style applied by [`annotate`].
#[derive(Debug, Clone, Copy)]
pub struct Highlight {
    pub color: [u8; 3],
    pub stroke_width: u32,
}

impl Default for Highlight {
    fn default() -> Self {
        Self {
            color: [255, 0, 0],
            stroke_width: 5,
        }
    }
}

impl From<&AnnotationConfig> for Highlight {
    fn from(cfg: &AnnotationConfig) -> Self {
        Self {
            color: cfg.color,
            stroke_width: cfg.stroke_width.max(1),
        }
    }
}

/// Return a copy of `src` with an outline drawn at `rect`. The stroke grows
/// inward from the rect edges. Parts of the outline outside the image are clipped.
pub fn annotate(src: &DynamicImage, rect: &PixelRect, style: Highlight) -> DynamicImage {
    let mut canvas = src.to_rgba8();
    let (x1, y1, x2, y2) = rect.corners();
    let [r, g, b] = style.color;
    draw_rect(&mut canvas, x1, y1, x2, y2, Rgba([r, g, b, 255]), style.stroke_width as i32);
    tracing::debug!(x1, y1, x2, y2, stroke = style.stroke_width, "highlight drawn");
    DynamicImage::ImageRgba8(canvas)
}

/// Downscale so the longer side equals `max_dimension`, keeping aspect ratio.
/// Images already within bounds are returned as-is.
pub fn resize_for_transport(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (w, h) = (image.width(), image.height());
    if w <= max_dimension && h <= max_dimension {
        return image;
    }

    let (new_w, new_h) = if w > h {
        (max_dimension, (h as u64 * max_dimension as u64 / w as u64) as u32)
    } else {
        ((w as u64 * max_dimension as u64 / h as u64) as u32, max_dimension)
    };
    let (new_w, new_h) = (new_w.max(1), new_h.max(1));

    let resized = image.resize_exact(new_w, new_h, image::imageops::FilterType::Lanczos3);
    tracing::info!(from_w = w, from_h = h, to_w = new_w, to_h = new_h, "image resized for transport");
    resized
}

pub fn encode_png(image: &DynamicImage) -> ScribeResult<Vec<u8>> {
    let mut out = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| ScribeError::Image(format!("PNG encode: {e}")))?;
    Ok(out)
}

fn draw_rect(canvas: &mut RgbaImage, x1: i32, y1: i32, x2: i32, y2: i32, col: Rgba<u8>, thickness: i32) {
    if thickness <= 0 || x2 < x1 || y2 < y1 {
        return;
    }
    // Widened so stroke offsets on saturated corners cannot overflow.
    let (x1, y1, x2, y2) = (x1 as i64, y1 as i64, x2 as i64, y2 as i64);
    let inner = thickness as i64 - 1;

    // Top & bottom edges
    fill_clipped(canvas, x1, x2, y1, (y1 + inner).min(y2), col);
    fill_clipped(canvas, x1, x2, (y2 - inner).max(y1), y2, col);
    // Left & right edges
    fill_clipped(canvas, x1, (x1 + inner).min(x2), y1, y2, col);
    fill_clipped(canvas, (x2 - inner).max(x1), x2, y1, y2, col);
}

/// Fill the inclusive box `[xa, xb] × [ya, yb]` intersected with the canvas.
fn fill_clipped(canvas: &mut RgbaImage, xa: i64, xb: i64, ya: i64, yb: i64, col: Rgba<u8>) {
    let (w, h) = canvas.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let (xa, xb) = (xa.max(0), xb.min(w as i64 - 1));
    let (ya, yb) = (ya.max(0), yb.min(h as i64 - 1));
    if xa > xb || ya > yb {
        return;
    }
    for y in ya..=yb {
        for x in xa..=xb {
            canvas.put_pixel(x as u32, y as u32, col);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn blank(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, WHITE))
    }

    #[test]
    fn draws_outline_and_leaves_interior() {
        let src = blank(600, 400);
        let rect = PixelRect { x: 300.0, y: 200.0, width: 60.0, height: 20.0 };
        let out = annotate(&src, &rect, Highlight::default()).to_rgba8();

        assert_eq!(*out.get_pixel(300, 200), RED);
        assert_eq!(*out.get_pixel(360, 220), RED);
        assert_eq!(*out.get_pixel(304, 210), RED);
        assert_eq!(*out.get_pixel(330, 210), WHITE);
        assert_eq!(*out.get_pixel(10, 10), WHITE);
    }

    #[test]
    fn source_image_is_untouched() {
        let src = blank(100, 100);
        let rect = PixelRect { x: 10.0, y: 10.0, width: 20.0, height: 20.0 };
        let _ = annotate(&src, &rect, Highlight::default());
        assert_eq!(*src.to_rgba8().get_pixel(10, 10), WHITE);
    }

    #[test]
    fn clips_outline_outside_image() {
        let src = blank(50, 50);
        let rect = PixelRect { x: -20.0, y: 40.0, width: 100.0, height: 100.0 };
        let out = annotate(&src, &rect, Highlight::default()).to_rgba8();
        assert_eq!(*out.get_pixel(0, 40), RED);
        assert_eq!(out.dimensions(), (50, 50));
    }

    #[test]
    fn zero_area_highlight_is_allowed() {
        let src = blank(20, 20);
        let rect = PixelRect { x: 5.0, y: 5.0, width: 0.0, height: 0.0 };
        let out = annotate(&src, &rect, Highlight { color: [0, 0, 255], stroke_width: 1 }).to_rgba8();
        assert_eq!(*out.get_pixel(5, 5), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn huge_rect_is_clipped_to_canvas() {
        let src = blank(10, 10);
        let rect = PixelRect { x: 0.0, y: -1e10, width: 5.0, height: 2e10 };
        let out = annotate(&src, &rect, Highlight::default()).to_rgba8();
        // Only the left and right edges cross the canvas.
        assert_eq!(*out.get_pixel(0, 0), RED);
        assert_eq!(*out.get_pixel(4, 9), RED);
        assert_eq!(*out.get_pixel(9, 5), WHITE);
    }

    #[test]
    fn far_off_screen_rect_draws_nothing() {
        let src = blank(10, 10);
        for rect in [
            PixelRect { x: 3e9, y: 0.0, width: 1.0, height: 1.0 },
            PixelRect { x: -3e9, y: -3e9, width: 1.0, height: 1.0 },
            PixelRect { x: 0.0, y: 1e12, width: 1e12, height: 1e12 },
        ] {
            let out = annotate(&src, &rect, Highlight::default()).to_rgba8();
            assert!(out.pixels().all(|p| *p == WHITE), "{rect:?}");
        }
    }

    #[test]
    fn thick_stroke_stays_inside_rect() {
        let src = blank(20, 20);
        let rect = PixelRect { x: 5.0, y: 5.0, width: 2.0, height: 2.0 };
        let out = annotate(&src, &rect, Highlight { color: [255, 0, 0], stroke_width: 10 }).to_rgba8();
        assert_eq!(*out.get_pixel(6, 6), RED);
        assert_eq!(*out.get_pixel(8, 6), WHITE);
        assert_eq!(*out.get_pixel(6, 4), WHITE);
    }

    #[test]
    fn resize_landscape_to_bound() {
        let out = resize_for_transport(blank(2000, 1000), 1024);
        assert_eq!((out.width(), out.height()), (1024, 512));
    }

    #[test]
    fn resize_portrait_to_bound() {
        let out = resize_for_transport(blank(1000, 3000), 1024);
        assert_eq!((out.width(), out.height()), (341, 1024));
    }

    #[test]
    fn small_image_is_unchanged() {
        let out = resize_for_transport(blank(800, 600), 1024);
        assert_eq!((out.width(), out.height()), (800, 600));
    }

    #[test]
    fn png_roundtrip_keeps_dimensions() {
        let bytes = encode_png(&blank(32, 16)).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
    }
}
