use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// "admin" | "editor" | "user"
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sample_draft: String,
    /// When set, section drafting consults the per-country legal index.
    #[serde(default)]
    pub requires_meilisearch: bool,
    /// When set, section drafting consults the uploaded-document vector store.
    #[serde(default)]
    pub requires_vector_search: bool,
    #[serde(default)]
    pub position: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    pub id: i64,
    pub filename: String,
    pub original_name: String,
    pub path: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub country: String,
    pub sections: Vec<Section>,
    pub uploaded_files: Vec<UploadedFile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Draft {
    pub id: i64,
    pub template_id: i64,
    pub user_id: i64,
    /// Section title -> generated text. BTreeMap keeps response ordering stable.
    pub content: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatThread {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    /// Opaque thread id owned by the assistant provider.
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationRun {
    pub id: i64,
    pub thread_id: String,
    pub user_id: i64,
    /// "research" | "draft" | "review" | "completed" | "failed"
    pub status: String,
    pub error: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutput {
    pub id: i64,
    pub run_id: i64,
    pub phase: String,
    pub output: String,
    pub created_at: DateTime<Utc>,
}

/// One tool invocation requested by an in-flight assistant run.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them.
    pub arguments: String,
}

/// The output fed back for a single tool call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}
