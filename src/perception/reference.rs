//! Choosing which captured DOM rect defines the DOM → pixel scale.
//!
//! The document root is normally first in the element chain, but when the
//! clicked element lives inside a modal the root can come back zero-sized
//! (or as the inert backdrop). Scanning forward finds the first usable box.

use crate::perception::transform;
use crate::perception::types::{ElementRect, Scale};

/// Outcome of reference selection. `Fallback` means no rect had positive
/// width and height and the identity scale was used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceChoice {
    Selected { index: usize, rect: ElementRect },
    Fallback,
}

impl ReferenceChoice {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ReferenceChoice::Fallback)
    }
}

/// Return the first non-degenerate rect in sequence order.
pub fn select_reference<'a, I>(rects: I) -> ReferenceChoice
where
    I: IntoIterator<Item = &'a ElementRect>,
{
    rects
        .into_iter()
        .enumerate()
        .find(|(_, r)| !r.is_degenerate())
        .map(|(index, rect)| ReferenceChoice::Selected { index, rect: *rect })
        .unwrap_or(ReferenceChoice::Fallback)
}

/// Select a reference and compute the scale against an image of
/// `image_width` × `image_height` pixels, falling back to identity.
pub fn reference_scale<'a, I>(rects: I, image_width: u32, image_height: u32) -> (Scale, ReferenceChoice)
where
    I: IntoIterator<Item = &'a ElementRect>,
{
    let choice = select_reference(rects);
    match choice {
        ReferenceChoice::Selected { index, rect } => match transform::scale(&rect, image_width, image_height) {
            Ok(scale) => {
                tracing::debug!(
                    index,
                    ref_width = rect.width,
                    ref_height = rect.height,
                    scale_x = scale.x,
                    scale_y = scale.y,
                    "reference rect selected"
                );
                (scale, choice)
            }
            Err(e) => {
                tracing::warn!(error = %e, "reference rect rejected; using identity scale");
                (Scale::IDENTITY, ReferenceChoice::Fallback)
            }
        },
        ReferenceChoice::Fallback => {
            tracing::warn!("no non-degenerate reference rect; using identity scale");
            (Scale::IDENTITY, choice)
        }
    }
}
