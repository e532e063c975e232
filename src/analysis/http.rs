//! JSON-over-HTTP analysis transport.

use std::time::Duration;

use crate::annotation::{AnalysisRequest, AnalysisResponse};

use super::{AnalysisError, AnalysisTransport};

/// Posts `{ "image": ... }` to the analysis endpoint.
pub struct HttpTransport {
    url: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    /// `timeout` bounds the whole request. `None` waits indefinitely, which
    /// lets a stalled service stall the loop.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            url: url.into(),
            agent: builder.build(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl AnalysisTransport for HttpTransport {
    fn name(&self) -> &str {
        &self.url
    }

    fn submit(&mut self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        let response = match self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_json(request)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(AnalysisError::status(status, &body));
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(AnalysisError::Transport(transport.to_string()));
            }
        };

        let status = response.status();
        if !(200..300).contains(&status) {
            let body = response.into_string().unwrap_or_default();
            return Err(AnalysisError::status(status, &body));
        }
        serde_json::from_reader(response.into_reader()).map_err(|e| {
            if e.is_io() {
                AnalysisError::Transport(format!("read response body: {}", e))
            } else {
                AnalysisError::Malformed(e.to_string())
            }
        })
    }
}
