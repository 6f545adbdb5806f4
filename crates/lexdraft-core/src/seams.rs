use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ToolCall, ToolOutput};

/// One-shot chat completion. The drafting loop and its tests depend on this
/// rather than on a concrete provider client.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Per-country legal index lookup used while drafting sections.
#[async_trait]
pub trait LegalSearch: Send + Sync {
    /// Returns formatted hits ready to splice into a prompt. Warnings for
    /// unsupported countries or empty results come back as `Ok` text, since
    /// the model is the consumer either way.
    async fn search(&self, keywords: &str, country: &str) -> Result<String>;
}

/// Dispatches a model-initiated tool call. Implementations must not fail:
/// anything that goes wrong is reported to the model inside the output text.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, call: ToolCall) -> ToolOutput;
}
