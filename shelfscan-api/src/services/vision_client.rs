//! Vision inference API client
//!
//! Thin HTTP client for the external spine-detection endpoint. The
//! endpoint itself is an opaque collaborator; this client only owns the
//! wire call, its timeout, and response parsing.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use shelfscan_common::types::BoundingBox;

/// Vision client errors
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Vision API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// One raw detection as the vision endpoint reports it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionDetection {
    pub title: Option<String>,
    pub author: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

/// Vision endpoint response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionResponse {
    #[serde(default)]
    pub detections: Vec<VisionDetection>,
    /// Quality problem codes flagged by the model ("blur", "glare", ...)
    #[serde(default)]
    pub quality_issues: Vec<String>,
}

/// Vision inference client with a call-level timeout
///
/// A call exceeding the timeout is a failure, never a hang.
pub struct VisionClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl VisionClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, VisionError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| VisionError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    /// Submit one image for spine detection
    pub async fn analyze(&self, image: &[u8]) -> Result<VisionResponse, VisionError> {
        tracing::debug!(bytes = image.len(), "Submitting image for spine detection");

        let mut request = self
            .http_client
            .post(&self.endpoint)
            .header("content-type", "application/octet-stream")
            .body(image.to_vec());

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VisionError::Network(e.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(VisionError::Api(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| VisionError::Parse(e.to_string()))
    }
}
