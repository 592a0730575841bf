//! HTTP embedding provider.

use crate::errors::ProviderError;
use crate::retrieval::EmbeddingProvider;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const PROVIDER: &str = "embedding";

/// Embedding client for an OpenAI-style `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct EmbeddingsBody {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl HttpEmbeddingProvider {
    /// Creates a provider for the given endpoint and model.
    ///
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be constructed.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
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
            model: model.into(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::terminal(
                PROVIDER,
                "cannot embed empty text",
            ));
        }
        let url = format!("{}/embeddings", self.base_url);
        let body: EmbeddingsBody = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "input": text }))
            .send()
            .await
            .map_err(|err| ProviderError::from_reqwest(PROVIDER, &err))?
            .error_for_status()
            .map_err(|err| ProviderError::from_reqwest(PROVIDER, &err))?
            .json()
            .await
            .map_err(|err| ProviderError::terminal(PROVIDER, err.to_string()))?;

        body.data
            .into_iter()
            .next()
            .map(|datum| datum.embedding)
            .ok_or_else(|| ProviderError::terminal(PROVIDER, "response carried no embedding"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_text_fails_without_a_network_call() {
        let provider = HttpEmbeddingProvider::new(
            "https://embeddings.example.com",
            "key",
            "text-embedding-3-small",
            Duration::from_secs(5),
        )
        .expect("client");

        let err = provider.embed("  ").await.expect_err("should fail");
        assert!(!err.is_transient());
    }

    #[test]
    fn embeddings_body_deserializes() {
        let body: EmbeddingsBody = serde_json::from_value(serde_json::json!({
            "data": [{ "embedding": [0.1, 0.2, 0.3] }]
        }))
        .expect("deserialize");
        assert_eq!(body.data[0].embedding.len(), 3);
    }
}
