use async_trait::async_trait;
use lexdraft_core::{
    seams::ToolHandler,
    types::{ToolCall, ToolOutput},
};
use serde::Deserialize;
use tracing::warn;

use crate::{meili::MeiliClient, websearch::WebSearchClient};

/// The two functions declared on the drafting assistant. Every dispatch
/// produces an output string; a tool call is never allowed to fail the run.
pub struct LegalToolset {
    pub meili: MeiliClient,
    pub web: WebSearchClient,
}

#[derive(Deserialize)]
struct LegalBasisArgs {
    keywords: String,
    country: String,
}

#[derive(Deserialize)]
struct WebSearchArgs {
    query: String,
    #[serde(default)]
    location: String,
}

impl LegalToolset {
    pub fn new(meili: MeiliClient, web: WebSearchClient) -> Self {
        Self { meili, web }
    }

    async fn dispatch(&self, name: &str, arguments: &str) -> String {
        match name {
            "searchLegalBasis" => match serde_json::from_str::<LegalBasisArgs>(arguments) {
                Ok(args) => self.meili.search(&args.keywords, &args.country).await,
                Err(e) => format!("Error: invalid arguments for \"searchLegalBasis\": {e}"),
            },
            "searchWeb" => match serde_json::from_str::<WebSearchArgs>(arguments) {
                Ok(args) => {
                    let location = if args.location.is_empty() {
                        None
                    } else {
                        Some(args.location.as_str())
                    };
                    self.web.search_as_text(&args.query, location).await
                },
                Err(e) => format!("Error: invalid arguments for \"searchWeb\": {e}"),
            },
            _ => {
                warn!(name, "unknown tool function requested");
                format!("Error: Function \"{name}\" not implemented")
            },
        }
    }
}

#[async_trait]
impl ToolHandler for LegalToolset {
    async fn handle(&self, call: ToolCall) -> ToolOutput {
        let output = self.dispatch(&call.name, &call.arguments).await;
        ToolOutput {
            tool_call_id: call.id,
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolset() -> LegalToolset {
        let http = reqwest::Client::new();
        LegalToolset::new(
            MeiliClient::new(http.clone(), "key"),
            WebSearchClient::new(http, "key"),
        )
    }

    #[tokio::test]
    async fn unknown_function_reports_not_implemented() {
        let out = toolset()
            .handle(ToolCall {
                id: "call_1".into(),
                name: "summon".into(),
                arguments: "{}".into(),
            })
            .await;
        assert_eq!(out.tool_call_id, "call_1");
        assert_eq!(out.output, "Error: Function \"summon\" not implemented");
    }

    #[tokio::test]
    async fn malformed_arguments_stay_model_visible() {
        let out = toolset()
            .handle(ToolCall {
                id: "call_2".into(),
                name: "searchLegalBasis".into(),
                arguments: "not json".into(),
            })
            .await;
        assert!(out.output.starts_with("Error: invalid arguments for \"searchLegalBasis\""));
    }

    #[tokio::test]
    async fn legal_basis_with_unsupported_country_returns_warning() {
        let out = toolset()
            .handle(ToolCall {
                id: "call_3".into(),
                name: "searchLegalBasis".into(),
                arguments: r#"{"keywords":"marca","country":"Mordor"}"#.into(),
            })
            .await;
        assert!(out.output.contains("No legal search index is available for \"Mordor\""));
    }
}
