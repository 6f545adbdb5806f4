use anyhow::Result;
use async_trait::async_trait;
use lexdraft_core::seams::LegalSearch;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

/// Per-country hybrid search over the hosted legal indexes.
///
/// Every outcome is a string for the model: hits are formatted into numbered
/// reference lines, and unsupported countries, empty results and transport
/// failures all come back as warning text rather than errors.
pub struct MeiliClient {
    http: reqwest::Client,
    api_key: String,
}

/// Search endpoint for each supported country's index.
fn index_url(country: &str) -> Option<&'static str> {
    match country {
        "El Salvador" => Some("https://api.docs.bufetemejia.com/indexes/El-Salvador-test/search"),
        "Costa Rica" => Some("https://api.docs.bufetemejia.com/indexes/COSTA-RICA/search"),
        "Honduras" => Some("https://api.docs.bufetemejia.com/indexes/HONDURAS/search"),
        "Nicaragua" => Some("https://api.docs.bufetemejia.com/indexes/Nicaragua/search"),
        "Panama" => Some("https://api.docs.bufetemejia.com/indexes/Panama/search"),
        "Paraguay" => Some("https://api.docs.bufetemejia.com/indexes/Paraguay/search"),
        "Dominica" => Some("https://api.docs.bufetemejia.com/indexes/Republica-Dominicana/search"),
        _ => None,
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Value>,
}

fn field(hit: &Value, path: &[&str]) -> String {
    let mut cur = hit;
    for key in path {
        match cur.get(key) {
            Some(v) => cur = v,
            None => return "N/A".to_string(),
        }
    }
    match cur {
        Value::Null => "N/A".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One hit per numbered line, flattened to the law/title/chapter/section/
/// article hierarchy the assistant is instructed to cite from.
pub fn format_hits(hits: &[Value]) -> String {
    hits.iter()
        .enumerate()
        .map(|(index, hit)| {
            format!(
                "{}. law_title: {}, type: {}, title_number: {}, title_text: {}, \
                 chapter_number: {}, chapter_title: {}, section_number: {}, \
                 section_title: {}, article_number: {}, article_title: {}, content: {}",
                index + 1,
                field(hit, &["law_title"]),
                field(hit, &["type"]),
                field(hit, &["title", "number"]),
                field(hit, &["title", "text"]),
                field(hit, &["chapter", "number"]),
                field(hit, &["chapter", "title"]),
                field(hit, &["section", "number"]),
                field(hit, &["section", "title"]),
                field(hit, &["article", "number"]),
                field(hit, &["article", "title"]),
                field(hit, &["text"]),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn unsupported_country_warning(country: &str) -> String {
    format!(
        "⚠️ No legal search index is available for \"{country}\". Please provide a \
         supported country (e.g., El Salvador, Costa Rica, Honduras, Nicaragua, \
         Panama, Paraguay, and Dominica)."
    )
}

pub const NO_HITS_WARNING: &str = "⚠️ No relevant legal content found.";
pub const SEARCH_ERROR_WARNING: &str =
    "⚠️ Error occurred during legal search. Please try again later.";

impl MeiliClient {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
        }
    }

    /// Hybrid search, limit 5, fully semantic ranking.
    /// An unsupported country short-circuits before any HTTP is attempted.
    pub async fn search(&self, query: &str, country: &str) -> String {
        let Some(url) = index_url(country) else {
            warn!(country, "no legal index for country");
            return unsupported_country_warning(country);
        };

        let body = json!({
            "q": query,
            "limit": 5,
            "hybrid": { "semanticRatio": 1, "embedder": "default" },
        });

        let response = match self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
        {
            Ok(r) => r,
            Err(e) => {
                warn!(country, "legal index search failed: {}", e);
                return SEARCH_ERROR_WARNING.to_string();
            },
        };

        let parsed: SearchResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!(country, "failed to parse legal index response: {}", e);
                return SEARCH_ERROR_WARNING.to_string();
            },
        };

        if parsed.hits.is_empty() {
            return NO_HITS_WARNING.to_string();
        }
        format_hits(&parsed.hits)
    }
}

#[async_trait]
impl LegalSearch for MeiliClient {
    async fn search(&self, keywords: &str, country: &str) -> Result<String> {
        Ok(MeiliClient::search(self, keywords, country).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unsupported_country_short_circuits() {
        let client = MeiliClient::new(reqwest::Client::new(), "key");
        let out = client.search("marca", "Atlantis").await;
        assert!(out.starts_with("⚠️ No legal search index is available for \"Atlantis\""));
    }

    #[test]
    fn hit_formatting_fills_gaps_with_na() {
        let hits = vec![serde_json::json!({
            "law_title": "Ley de Propiedad Industrial",
            "type": "article",
            "article": { "number": 84, "title": "Prohibiciones relativas" },
            "text": "No podrá ser registrado...",
        })];
        let formatted = format_hits(&hits);
        assert!(formatted.starts_with("1. law_title: Ley de Propiedad Industrial"));
        assert!(formatted.contains("article_number: 84"));
        assert!(formatted.contains("chapter_number: N/A"));
        assert!(formatted.contains("content: No podrá ser registrado..."));
    }
}
