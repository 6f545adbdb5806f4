use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Batch text embeddings against the OpenAI-compatible API.
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    pub model: String,
}

impl EmbeddingClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Embed a batch of texts. Output order matches input order.
    pub async fn embed(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let request_body = EmbeddingRequest {
            model: self.model.clone(),
            input,
        };

        info!(model = %self.model, batch = input.len(), "calling embeddings API");

        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "embeddings returned non-200: {}", body);
            bail!("embedding request failed with status {status}");
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        // The API does not guarantee order; index is authoritative.
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: String,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}
