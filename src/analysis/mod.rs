//! Remote frame analysis.
//!
//! `AnnotationClient` turns a frame into annotations by way of an
//! `AnalysisTransport`. Failures never reach the capture loop: `analyze`
//! logs them and substitutes an empty annotation list so the frame is simply
//! shown unannotated.

mod http;
mod stub;

use std::time::Duration;

use anyhow::{anyhow, Result};
use thiserror::Error;
use url::Url;

use crate::annotation::{AnalysisRequest, AnalysisResponse, Annotation};
use crate::frame::{Frame, DEFAULT_JPEG_QUALITY};

pub use http::HttpTransport;
pub use stub::StubTransport;

/// Longest slice of an error body kept in `AnalysisError::Status`.
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis transport failed: {0}")]
    Transport(String),

    #[error("analysis endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed analysis response: {0}")]
    Malformed(String),

    #[error("frame encode failed: {0}")]
    Encode(String),
}

impl AnalysisError {
    pub(crate) fn status(status: u16, body: &str) -> Self {
        AnalysisError::Status {
            status,
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        }
    }
}

/// Delivers one analysis request and returns the parsed response.
pub trait AnalysisTransport: Send {
    /// Transport identifier, for logs.
    fn name(&self) -> &str;

    fn submit(&mut self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError>;
}

/// Build a transport for an analysis URL.
///
/// `stub://` selects the offline stub; `http(s)://` posts JSON to the URL.
pub fn transport_for_url(
    url: &str,
    timeout: Option<Duration>,
) -> Result<Box<dyn AnalysisTransport>> {
    if url.starts_with("stub://") {
        return Ok(Box::new(StubTransport::new()));
    }
    let parsed = Url::parse(url).map_err(|e| anyhow!("invalid analysis url '{}': {}", url, e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(Box::new(HttpTransport::new(url, timeout))),
        other => Err(anyhow!(
            "unsupported analysis url scheme '{}'; expected http(s) or stub",
            other
        )),
    }
}

pub struct AnnotationClient {
    transport: Box<dyn AnalysisTransport>,
    jpeg_quality: u8,
    requests: u64,
    failures: u64,
}

impl AnnotationClient {
    pub fn new(transport: Box<dyn AnalysisTransport>) -> Self {
        Self {
            transport,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            requests: 0,
            failures: 0,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Analyze a frame, propagating failures.
    pub fn try_analyze(&mut self, frame: &Frame) -> Result<Vec<Annotation>, AnalysisError> {
        let image = frame
            .to_data_url(self.jpeg_quality)
            .map_err(|e| AnalysisError::Encode(format!("{:#}", e)))?;
        let response = self.transport.submit(&AnalysisRequest { image })?;
        Ok(response.into_annotations())
    }

    /// Analyze a frame. Any failure is logged and yields no annotations.
    pub fn analyze(&mut self, frame: &Frame) -> Vec<Annotation> {
        self.requests += 1;
        match self.try_analyze(frame) {
            Ok(annotations) => {
                log::debug!(
                    "{} returned {} annotation(s)",
                    self.transport.name(),
                    annotations.len()
                );
                annotations
            }
            Err(err) => {
                self.failures += 1;
                log::warn!("frame analysis via {} failed: {}", self.transport.name(), err);
                Vec::new()
            }
        }
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Calls that fell back to an empty result.
    pub fn failures(&self) -> u64 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::BoundingBox;

    struct Scripted(Option<Result<AnalysisResponse, AnalysisError>>);

    impl AnalysisTransport for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn submit(&mut self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
            assert!(request.image.starts_with("data:image/jpeg;base64,"));
            self.0.take().expect("one scripted reply")
        }
    }

    fn frame() -> Frame {
        Frame::from_rgb(16, 16, vec![90; 16 * 16 * 3]).unwrap()
    }

    #[test]
    fn success_maps_boxes() {
        let reply = AnalysisResponse {
            bounding_boxes: vec![BoundingBox {
                x: 10.0,
                y: 10.0,
                width: 50.0,
                height: 50.0,
                mood: "happy".to_string(),
            }],
        };
        let mut client = AnnotationClient::new(Box::new(Scripted(Some(Ok(reply)))));
        let annotations = client.analyze(&frame());
        assert_eq!(annotations, vec![Annotation::new(10.0, 10.0, 50.0, 50.0, "happy")]);
        assert_eq!(client.failures(), 0);
    }

    #[test]
    fn every_failure_kind_falls_back_to_empty() {
        let failures = [
            AnalysisError::Transport("connection refused".into()),
            AnalysisError::status(500, r#"{"error":"boom"}"#),
            AnalysisError::Malformed("expected value".into()),
        ];
        for failure in failures {
            let mut client = AnnotationClient::new(Box::new(Scripted(Some(Err(failure)))));
            assert!(client.analyze(&frame()).is_empty());
            assert_eq!(client.requests(), 1);
            assert_eq!(client.failures(), 1);
        }
    }

    #[test]
    fn status_error_body_is_truncated() {
        let long = "x".repeat(1000);
        match AnalysisError::status(502, &long) {
            AnalysisError::Status { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body.len(), MAX_ERROR_BODY_CHARS);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn transport_selection_by_url() {
        assert_eq!(transport_for_url("stub://", None).unwrap().name(), "stub");
        assert!(transport_for_url("http://127.0.0.1:5000/process_frame", None).is_ok());
        assert!(transport_for_url("ftp://host/x", None).is_err());
        assert!(transport_for_url("not a url", None).is_err());
    }
}
