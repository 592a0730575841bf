//! HTTP client for the external render API.

use crate::errors::ProviderError;
use crate::render::{PollResponse, RenderApi};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const PROVIDER: &str = "render";

/// Render API client over HTTP.
///
/// Submission posts the prompt to `{base}/videos` and receives an opaque
/// operation id; status lives at `{base}/operations/{id}` as a long-running
/// operation (`done` flag plus either a video URI or an error message).
#[derive(Debug, Clone)]
pub struct HttpRenderApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct SubmitBody {
    operation_id: String,
}

#[derive(Deserialize)]
struct OperationBody {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    video_uri: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpRenderApi {
    /// Creates a client for the given API base URL.
    ///
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be constructed.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderError::terminal(PROVIDER, err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl RenderApi for HttpRenderApi {
    async fn submit(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/videos", self.base_url);
        let body: SubmitBody = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await
            .map_err(|err| ProviderError::from_reqwest(PROVIDER, &err))?
            .error_for_status()
            .map_err(|err| ProviderError::from_reqwest(PROVIDER, &err))?
            .json()
            .await
            .map_err(|err| ProviderError::terminal(PROVIDER, err.to_string()))?;
        Ok(body.operation_id)
    }

    async fn get(&self, operation_id: &str) -> Result<PollResponse, ProviderError> {
        let url = format!("{}/operations/{operation_id}", self.base_url);
        let body: OperationBody = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| ProviderError::from_reqwest(PROVIDER, &err))?
            .error_for_status()
            .map_err(|err| ProviderError::from_reqwest(PROVIDER, &err))?
            .json()
            .await
            .map_err(|err| ProviderError::terminal(PROVIDER, err.to_string()))?;

        if !body.done {
            return Ok(PollResponse::running(operation_id, body.metadata));
        }
        match (body.video_uri, body.error) {
            (Some(uri), _) => Ok(PollResponse::completed(operation_id, uri)),
            (None, Some(message)) => Ok(PollResponse::failed(operation_id, message)),
            (None, None) => Ok(PollResponse::failed(
                operation_id,
                "operation finished but no video was returned",
            )),
        }
    }

    async fn download(&self, result_ref: &str) -> Result<Vec<u8>, ProviderError> {
        let bytes = self
            .client
            .get(result_ref)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| ProviderError::from_reqwest(PROVIDER, &err))?
            .error_for_status()
            .map_err(|err| ProviderError::from_reqwest(PROVIDER, &err))?
            .bytes()
            .await
            .map_err(|err| ProviderError::from_reqwest(PROVIDER, &err))?;
        Ok(bytes.to_vec())
    }
}
