use crate::annotation::{AnalysisRequest, AnalysisResponse, BoundingBox};
use crate::frame::{decode_data_url, Frame};

use super::{AnalysisError, AnalysisTransport};

/// Offline transport for demos: reports one "neutral" region in the middle of
/// the frame.
pub struct StubTransport {
    label: String,
}

impl StubTransport {
    pub fn new() -> Self {
        Self {
            label: "neutral".to_string(),
        }
    }

    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Default for StubTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisTransport for StubTransport {
    fn name(&self) -> &str {
        "stub"
    }

    fn submit(&mut self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        let jpeg = decode_data_url(&request.image)
            .map_err(|e| AnalysisError::Malformed(format!("{:#}", e)))?;
        let frame = Frame::decode(&jpeg).map_err(|e| AnalysisError::Malformed(format!("{:#}", e)))?;
        let (w, h) = (frame.width() as f64, frame.height() as f64);
        Ok(AnalysisResponse {
            bounding_boxes: vec![BoundingBox {
                x: (w / 4.0).floor(),
                y: (h / 4.0).floor(),
                width: (w / 2.0).floor(),
                height: (h / 2.0).floor(),
                mood: self.label.clone(),
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_centered_region() {
        let frame = Frame::from_rgb(40, 20, vec![0; 40 * 20 * 3]).unwrap();
        let request = AnalysisRequest {
            image: frame.to_data_url(80).unwrap(),
        };
        let response = StubTransport::with_label("happy").submit(&request).unwrap();
        assert_eq!(
            response.bounding_boxes,
            vec![BoundingBox {
                x: 10.0,
                y: 5.0,
                width: 20.0,
                height: 10.0,
                mood: "happy".to_string(),
            }]
        );
    }

    #[test]
    fn garbage_image_is_malformed() {
        let request = AnalysisRequest {
            image: "data:image/jpeg;base64,!!!".to_string(),
        };
        assert!(matches!(
            StubTransport::new().submit(&request),
            Err(AnalysisError::Malformed(_))
        ));
    }
}
