use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// REST client for one Pinecone index, addressed by its data-plane host.
/// Vectors for a template live in a namespace named after the template id.
pub struct PineconeClient {
    http: reqwest::Client,
    host: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Value,
}

#[derive(Debug, Deserialize)]
pub struct ScoredMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<ScoredMatch>,
}

impl PineconeClient {
    pub fn new(
        http: reqwest::Client,
        host: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            host: host.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host.trim_end_matches('/'), path)
    }

    pub async fn upsert(&self, namespace: &str, vectors: &[VectorRecord]) -> Result<()> {
        if vectors.is_empty() {
            return Ok(());
        }
        let body = serde_json::json!({ "vectors": vectors, "namespace": namespace });
        let response = self
            .http
            .post(self.url("/vectors/upsert"))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("vector upsert failed with status {status}: {text}");
        }
        info!(namespace, count = vectors.len(), "vectors upserted");
        Ok(())
    }

    pub async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>> {
        let body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "namespace": namespace,
            "includeMetadata": true,
        });
        let response = self
            .http
            .post(self.url("/query"))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("vector query failed with status {status}: {text}");
        }
        let parsed: QueryResponse = response.json().await?;
        Ok(parsed.matches)
    }
}

/// Chunk text lives in metadata under this key so query results can be
/// spliced straight into prompts.
pub const METADATA_TEXT_KEY: &str = "text";

pub fn chunk_record(file_id: i64, chunk_index: usize, values: Vec<f32>, text: &str) -> VectorRecord {
    VectorRecord {
        id: format!("file-{file_id}-chunk-{chunk_index}"),
        values,
        metadata: serde_json::json!({
            METADATA_TEXT_KEY: text,
            "file_id": file_id,
            "chunk_index": chunk_index,
        }),
    }
}
