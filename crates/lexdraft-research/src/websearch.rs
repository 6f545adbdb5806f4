use serde::{Deserialize, Serialize};
use tracing::warn;

const BASE: &str = "https://www.searchapi.io/api/v1/search";

/// Bing web search via searchapi.io. Like the legal index client, failures
/// become model-visible text instead of errors.
pub struct WebSearchClient {
    http: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
    pub rank: usize,
}

#[derive(Deserialize)]
struct SearchApiResponse {
    #[serde(default)]
    web_results: Vec<RawResult>,
}

#[derive(Deserialize)]
struct RawResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: String,
}

impl WebSearchClient {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
        }
    }

    /// Top 5 results. The error string is Spanish because the assistant
    /// surfaces it to the user verbatim.
    pub async fn search(&self, query: &str, location: Option<&str>) -> Result<Vec<WebResult>, String> {
        let mut url = format!(
            "{BASE}?engine=bing&q={}&api_key={}",
            urlencoding::encode(query),
            urlencoding::encode(&self.api_key),
        );
        if let Some(location) = location.filter(|l| !l.is_empty()) {
            url.push_str(&format!("&location={}", urlencoding::encode(location)));
        }

        let parse = async {
            let response = self.http.get(&url).send().await?.error_for_status()?;
            response.json::<SearchApiResponse>().await
        };
        match parse.await {
            Ok(parsed) => Ok(parsed
                .web_results
                .into_iter()
                .take(5)
                .enumerate()
                .map(|(index, r)| WebResult {
                    title: r.title,
                    snippet: r.snippet,
                    url: r.link,
                    rank: index + 1,
                })
                .collect()),
            Err(e) => {
                warn!("web search failed: {}", e);
                Err(format!("Error al buscar en la web: {e}"))
            },
        }
    }

    /// Tool-loop entry point: result list or error, already as text.
    pub async fn search_as_text(&self, query: &str, location: Option<&str>) -> String {
        match self.search(query, location).await {
            Ok(results) => serde_json::to_string(&results).unwrap_or_default(),
            Err(msg) => msg,
        }
    }
}
