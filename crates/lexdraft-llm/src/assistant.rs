use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use lexdraft_core::{
    run::{PollConfig, RunState},
    seams::ToolHandler,
    types::{ToolCall, ToolOutput},
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Client for the Assistants v2 API: threads, runs and the tool loop.
pub struct AssistantClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

#[derive(Debug, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RequiredAction {
    pub submit_tool_outputs: SubmitToolOutputs,
}

#[derive(Debug, Deserialize)]
pub struct SubmitToolOutputs {
    pub tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    pub function: WireFunction,
}

#[derive(Debug, Deserialize)]
pub struct WireFunction {
    pub name: String,
    pub arguments: String,
}

/// A thread message reduced to what callers need.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<WireMessage>,
}

#[derive(Deserialize)]
struct WireMessage {
    id: String,
    role: String,
    #[serde(default)]
    content: Vec<WireContent>,
}

#[derive(Deserialize)]
struct WireContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<WireText>,
}

#[derive(Deserialize)]
struct WireText {
    value: String,
}

#[derive(Deserialize)]
struct IdOnly {
    id: String,
}

impl AssistantClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(path, status = %status, "assistants API returned non-200: {}", text);
            bail!("assistants API call {path} failed with status {status}");
        }
        Ok(response)
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(path, status = %status, "assistants API returned non-200: {}", text);
            bail!("assistants API call {path} failed with status {status}");
        }
        Ok(response)
    }

    /// Create an assistant with the given instructions and tool declarations.
    /// Returns the new assistant id.
    pub async fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
        model: &str,
        tools: &[Value],
    ) -> Result<String> {
        let body = json!({
            "name": name,
            "instructions": instructions,
            "model": model,
            "tools": tools,
        });
        let parsed: IdOnly = self.post("/v1/assistants", &body).await?.json().await?;
        info!(assistant_id = %parsed.id, "assistant created");
        Ok(parsed.id)
    }

    pub async fn create_thread(&self) -> Result<String> {
        let parsed: IdOnly = self.post("/v1/threads", &json!({})).await?.json().await?;
        Ok(parsed.id)
    }

    pub async fn add_message(&self, thread_id: &str, role: &str, content: &str) -> Result<()> {
        let body = json!({ "role": role, "content": content });
        self.post(&format!("/v1/threads/{thread_id}/messages"), &body)
            .await?;
        Ok(())
    }

    /// Messages newest-first, with content flattened to plain text.
    pub async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let parsed: MessageList = self
            .get(&format!("/v1/threads/{thread_id}/messages"))
            .await?
            .json()
            .await?;
        Ok(parsed
            .data
            .into_iter()
            .map(|m| ThreadMessage {
                id: m.id,
                role: m.role,
                content: m
                    .content
                    .into_iter()
                    .filter(|c| c.kind == "text")
                    .filter_map(|c| c.text.map(|t| t.value))
                    .collect::<Vec<_>>()
                    .join("\n"),
            })
            .collect())
    }

    pub async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        instructions: Option<&str>,
    ) -> Result<Run> {
        let mut body = json!({ "assistant_id": assistant_id });
        if let Some(instructions) = instructions {
            body["instructions"] = json!(instructions);
        }
        Ok(self
            .post(&format!("/v1/threads/{thread_id}/runs"), &body)
            .await?
            .json()
            .await?)
    }

    pub async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        Ok(self
            .get(&format!("/v1/threads/{thread_id}/runs/{run_id}"))
            .await?
            .json()
            .await?)
    }

    pub async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<()> {
        let body = json!({ "tool_outputs": outputs });
        self.post(
            &format!("/v1/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            &body,
        )
        .await?;
        Ok(())
    }

    /// Drive a run to completion, servicing tool calls along the way, and
    /// return the latest assistant message text.
    ///
    /// All tool calls of one step are dispatched concurrently; the run resumes
    /// only after every output is back. A run that reaches a terminal failure
    /// state, or that outlives `poll.timeout`, is an error.
    pub async fn run_with_tools(
        &self,
        thread_id: &str,
        assistant_id: &str,
        instructions: Option<&str>,
        handler: Arc<dyn ToolHandler>,
        poll: PollConfig,
    ) -> Result<String> {
        let run = self.create_run(thread_id, assistant_id, instructions).await?;
        let run_id = run.id.clone();
        let deadline = Instant::now() + poll.timeout;
        let mut run = run;

        loop {
            let state = RunState::from_status(&run.status);
            if state == RunState::Completed {
                break;
            }
            // Checked before every step, not just while waiting: a run that
            // keeps demanding tool outputs must still respect the deadline.
            if Instant::now() >= deadline {
                bail!(
                    "run {run_id} did not complete within {}s",
                    poll.timeout.as_secs()
                );
            }
            match state {
                RunState::RequiresAction => {
                    let action = run
                        .required_action
                        .take()
                        .ok_or_else(|| anyhow!("run requires action but carries none"))?;
                    let calls: Vec<ToolCall> = action
                        .submit_tool_outputs
                        .tool_calls
                        .into_iter()
                        .map(|c| ToolCall {
                            id: c.id,
                            name: c.function.name,
                            arguments: c.function.arguments,
                        })
                        .collect();
                    info!(run_id = %run_id, tools = calls.len(), "run paused for tool calls");

                    let mut set = JoinSet::new();
                    for call in calls {
                        let handler = Arc::clone(&handler);
                        set.spawn(async move { handler.handle(call).await });
                    }
                    let mut outputs = Vec::new();
                    while let Some(joined) = set.join_next().await {
                        outputs.push(joined.context("tool task panicked")?);
                    }
                    self.submit_tool_outputs(thread_id, &run_id, &outputs).await?;
                },
                s if s.is_terminal() => {
                    let detail = run
                        .last_error
                        .map(|e| e.message)
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| run.status.clone());
                    bail!("run {run_id} ended without completing: {detail}");
                },
                _ => tokio::time::sleep(poll.interval).await,
            }
            run = self.get_run(thread_id, &run_id).await?;
        }

        let messages = self.list_messages(thread_id).await?;
        messages
            .into_iter()
            .find(|m| m.role == "assistant")
            .map(|m| m.content)
            .ok_or_else(|| anyhow!("run {run_id} completed without an assistant message"))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{routing, Json, Router};

    use super::*;

    struct EchoTools;

    #[async_trait::async_trait]
    impl ToolHandler for EchoTools {
        async fn handle(&self, call: ToolCall) -> ToolOutput {
            ToolOutput {
                tool_call_id: call.id,
                output: "ok".to_string(),
            }
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn requires_action_run() -> Value {
        json!({
            "id": "run_1",
            "status": "requires_action",
            "required_action": {
                "submit_tool_outputs": {
                    "tool_calls": [
                        { "id": "call_1", "function": { "name": "searchWeb", "arguments": "{}" } }
                    ]
                }
            }
        })
    }

    #[tokio::test]
    async fn run_stuck_in_requires_action_hits_the_deadline() {
        let app = Router::new()
            .route(
                "/v1/threads/:tid/runs",
                routing::post(|| async { Json(requires_action_run()) }),
            )
            .route(
                "/v1/threads/:tid/runs/:rid",
                routing::get(|| async { Json(requires_action_run()) }),
            )
            .route(
                "/v1/threads/:tid/runs/:rid/submit_tool_outputs",
                routing::post(|| async { Json(json!({})) }),
            );
        let client = AssistantClient::new(reqwest::Client::new(), serve(app).await, "key");

        let poll = PollConfig {
            interval: Duration::from_millis(5),
            timeout: Duration::ZERO,
        };
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            client.run_with_tools("thread_1", "asst_1", None, Arc::new(EchoTools), poll),
        )
        .await
        .expect("must not loop past the deadline");

        let err = result.expect_err("deadline exceeded").to_string();
        assert!(err.contains("did not complete"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn completed_run_returns_the_assistant_message() {
        let app = Router::new()
            .route(
                "/v1/threads/:tid/runs",
                routing::post(|| async { Json(json!({ "id": "run_1", "status": "completed" })) }),
            )
            .route(
                "/v1/threads/:tid/messages",
                routing::get(|| async {
                    Json(json!({
                        "data": [
                            {
                                "id": "msg_1",
                                "role": "assistant",
                                "content": [{ "type": "text", "text": { "value": "hola" } }]
                            }
                        ]
                    }))
                }),
            );
        let client = AssistantClient::new(reqwest::Client::new(), serve(app).await, "key");

        // A run that is already complete succeeds even with no time budget left.
        let poll = PollConfig {
            interval: Duration::from_millis(5),
            timeout: Duration::ZERO,
        };
        let text = client
            .run_with_tools("thread_1", "asst_1", None, Arc::new(EchoTools), poll)
            .await
            .expect("completed run");
        assert_eq!(text, "hola");
    }
}
