//! Inbound step payload: a data-URI screenshot plus the captured element chain.

use std::collections::HashMap;

use base64::Engine as _;
use image::DynamicImage;
use serde::Deserialize;

use crate::errors::{ScribeError, ScribeResult};
use crate::perception::types::ElementRect;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPayload {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub element_ids: Vec<String>,
    #[serde(default)]
    pub attributes: HashMap<String, ElementAttributes>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElementAttributes {
    #[serde(default)]
    pub metadata: Option<ElementMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElementMetadata {
    #[serde(rename = "domRect", default)]
    pub dom_rect: Option<ElementRect>,
}

impl StepPayload {
    pub fn from_json(value: serde_json::Value) -> ScribeResult<Self> {
        serde_json::from_value(value).map_err(|e| ScribeError::InputValidation(format!("malformed payload: {e}")))
    }

    /// The screenshot string, required for the describe path.
    pub fn image(&self) -> ScribeResult<&str> {
        match self.image.as_deref() {
            Some(s) if !s.trim().is_empty() => Ok(s),
            _ => Err(ScribeError::InputValidation("missing image".into())),
        }
    }
}

/// Ordered element chain with a rect for every identifier. The root is the
/// first entry, the clicked element the last.
#[derive(Debug, Clone)]
pub struct ElementGraph {
    ids: Vec<String>,
    rects: Vec<ElementRect>,
}

impl ElementGraph {
    pub fn from_payload(payload: &StepPayload) -> ScribeResult<Self> {
        if payload.element_ids.is_empty() {
            return Err(ScribeError::InputValidation("missing elementIds".into()));
        }
        let rects = payload
            .element_ids
            .iter()
            .map(|id| {
                payload
                    .attributes
                    .get(id)
                    .and_then(|a| a.metadata.as_ref())
                    .and_then(|m| m.dom_rect)
                    .ok_or_else(|| {
                        ScribeError::InputValidation(format!("element '{id}' has no attributes.metadata.domRect"))
                    })
            })
            .collect::<ScribeResult<Vec<_>>>()?;
        Ok(Self {
            ids: payload.element_ids.clone(),
            rects,
        })
    }

    pub fn rects(&self) -> &[ElementRect] {
        &self.rects
    }

    pub fn root_id(&self) -> &str {
        &self.ids[0]
    }

    pub fn clicked_id(&self) -> &str {
        &self.ids[self.ids.len() - 1]
    }

    pub fn clicked_rect(&self) -> ElementRect {
        self.rects[self.rects.len() - 1]
    }
}

/// Decode a bare base64 string or a `data:<mime>;base64,<payload>` URI.
pub fn decode_image(image: &str) -> ScribeResult<DynamicImage> {
    let encoded = match image.split_once(',') {
        Some((_, rest)) => rest,
        None => image,
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ScribeError::Decode(format!("base64: {e}")))?;
    image::load_from_memory(&bytes).map_err(|e| ScribeError::Decode(format!("image: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use crate::perception::annotator::encode_png;
    use image::RgbaImage;

    fn payload(json: serde_json::Value) -> StepPayload {
        StepPayload::from_json(json).unwrap()
    }

    #[test]
    fn graph_orders_root_and_clicked() {
        let p = payload(serde_json::json!({
            "elementIds": ["html", "menu-btn"],
            "attributes": {
                "html": {"metadata": {"domRect": {"x": 0, "y": 0, "width": 1200, "height": 800}}},
                "menu-btn": {"metadata": {"domRect": {"x": 600, "y": 400, "width": 120, "height": 40, "top": 400}}}
            }
        }));
        let graph = ElementGraph::from_payload(&p).unwrap();
        assert_eq!(graph.root_id(), "html");
        assert_eq!(graph.clicked_id(), "menu-btn");
        assert_eq!(graph.clicked_rect(), ElementRect::new(600.0, 400.0, 120.0, 40.0));
        assert_eq!(graph.rects().len(), 2);
    }

    #[test]
    fn missing_element_ids_is_input_error() {
        let p = payload(serde_json::json!({"image": "abc"}));
        assert!(matches!(
            ElementGraph::from_payload(&p),
            Err(ScribeError::InputValidation(_))
        ));
    }

    #[test]
    fn id_without_rect_is_input_error() {
        let p = payload(serde_json::json!({
            "elementIds": ["root", "ghost"],
            "attributes": {"root": {"metadata": {"domRect": {"x": 0, "y": 0, "width": 10, "height": 10}}}}
        }));
        match ElementGraph::from_payload(&p) {
            Err(ScribeError::InputValidation(msg)) => assert!(msg.contains("ghost")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn wrong_types_are_input_errors() {
        let err = StepPayload::from_json(serde_json::json!({"elementIds": "not-a-list"})).unwrap_err();
        assert!(matches!(err, ScribeError::InputValidation(_)));
    }

    #[test]
    fn missing_image_is_input_error() {
        let p = payload(serde_json::json!({"elementIds": ["a"]}));
        assert!(matches!(p.image(), Err(ScribeError::InputValidation(_))));
    }

    #[test]
    fn decodes_data_uri_and_bare_base64() {
        let png = encode_png(&DynamicImage::ImageRgba8(RgbaImage::new(6, 4))).unwrap();
        let b64 = base64::engine::general_purpose::STANDARD.encode(&png);

        let from_uri = decode_image(&format!("data:image/png;base64,{b64}")).unwrap();
        assert_eq!((from_uri.width(), from_uri.height()), (6, 4));

        let bare = decode_image(&b64).unwrap();
        assert_eq!((bare.width(), bare.height()), (6, 4));
    }

    #[test]
    fn garbage_is_decode_error() {
        assert!(matches!(decode_image("data:image/png;base64,!!!"), Err(ScribeError::Decode(_))));
        let not_an_image = base64::engine::general_purpose::STANDARD.encode(b"hello");
        assert!(matches!(decode_image(&not_an_image), Err(ScribeError::Decode(_))));
    }
}
