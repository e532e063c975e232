//! Annotation model and the analysis wire format.
//!
//! The analysis endpoint speaks JSON:
//! - request: `{ "image": "data:image/jpeg;base64,..." }`
//! - response: `{ "bounding_boxes": [ { "x", "y", "width", "height", "mood" } ] }`
//!
//! `Annotation` is the local, label-generic form that the renderer consumes.

use serde::{Deserialize, Serialize};

/// A labeled rectangular region in frame pixel coordinates.
///
/// No identity is carried across frames; each response is a fresh list.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub label: String,
}

impl Annotation {
    pub fn new(x: f64, y: f64, width: f64, height: f64, label: impl Into<String>) -> Self {
        Self {
            x,
            y,
            width,
            height,
            label: label.into(),
        }
    }
}

/// Request body sent to the analysis endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct AnalysisRequest {
    /// Data URL of a JPEG frame.
    pub image: String,
}

/// Response body returned by the analysis endpoint.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct AnalysisResponse {
    pub bounding_boxes: Vec<BoundingBox>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub mood: String,
}

impl From<BoundingBox> for Annotation {
    fn from(b: BoundingBox) -> Self {
        Annotation {
            x: b.x,
            y: b.y,
            width: b.width,
            height: b.height,
            label: b.mood,
        }
    }
}

impl AnalysisResponse {
    /// Convert the response into annotations, preserving response order.
    pub fn into_annotations(self) -> Vec<Annotation> {
        self.bounding_boxes.into_iter().map(Annotation::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_maps_mood_to_label_in_order() {
        let body = r#"{"bounding_boxes":[
            {"x":10,"y":10,"width":50,"height":50,"mood":"happy"},
            {"x":100,"y":20,"width":40,"height":45,"mood":"sad"}
        ]}"#;
        let response: AnalysisResponse = serde_json::from_str(body).unwrap();
        let annotations = response.into_annotations();
        assert_eq!(
            annotations,
            vec![
                Annotation::new(10.0, 10.0, 50.0, 50.0, "happy"),
                Annotation::new(100.0, 20.0, 40.0, 45.0, "sad"),
            ]
        );
    }

    #[test]
    fn empty_box_list_is_valid() {
        let response: AnalysisResponse = serde_json::from_str(r#"{"bounding_boxes":[]}"#).unwrap();
        assert!(response.into_annotations().is_empty());
    }

    #[test]
    fn error_body_is_not_a_response() {
        let parsed = serde_json::from_str::<AnalysisResponse>(r#"{"error":"boom"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn request_serializes_image_field() {
        let req = AnalysisRequest {
            image: "data:image/jpeg;base64,AAAA".to_string(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["image"], "data:image/jpeg;base64,AAAA");
    }
}
