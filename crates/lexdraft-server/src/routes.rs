use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use lexdraft_core::{
    config::Config,
    db::Db,
    run::PollConfig,
    seams::ToolHandler,
    types::Section,
};
use lexdraft_llm::{assistant::AssistantClient, chat::ChatClient, embeddings::EmbeddingClient};
use lexdraft_research::{
    meili::MeiliClient, phases, pinecone::PineconeClient, websearch::WebSearchClient,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::auth::{self, AuthUser};
use crate::drafting::{DocContext, SectionDrafter};
use crate::generate;

// ── AppState ──────────────────────────────────────────────────────────────

pub struct AppState {
    pub db: Arc<Db>,
    pub config: Config,
    pub start_time: Instant,
    pub log_tx: broadcast::Sender<String>,
    pub log_ring: Arc<std::sync::Mutex<VecDeque<String>>>,
    pub chat: Arc<ChatClient>,
    pub embeddings: Arc<EmbeddingClient>,
    pub assistant: Arc<AssistantClient>,
    pub legal: Arc<MeiliClient>,
    pub web: Arc<WebSearchClient>,
    pub vectors: Arc<PineconeClient>,
    pub tools: Arc<dyn ToolHandler>,
    pub poll: PollConfig,
}

// ── Error helper ──────────────────────────────────────────────────────────

pub(crate) fn internal(e: impl std::fmt::Display) -> StatusCode {
    tracing::error!("internal error: {e}");
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Active assistant id: the config table wins over the environment, so
/// `/admin/create-assistant` takes effect without a restart.
fn assistant_id(state: &AppState) -> Result<String, StatusCode> {
    let id = state
        .db
        .get_config("assistant_id")
        .map_err(internal)?
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| state.config.assistant_id.clone());
    if id.is_empty() {
        warn!("no assistant configured; create one via /admin/create-assistant");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(id)
}

// ── Request body types ────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(crate) struct RegisterBody {
    email: String,
    password: String,
    role: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct LoginBody {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub(crate) struct CreateTemplateBody {
    name: String,
    description: Option<String>,
    country: Option<String>,
    sections: Vec<Section>,
}

#[derive(Deserialize)]
pub(crate) struct DraftBody {
    #[serde(rename = "templateId")]
    template_id: Option<i64>,
    inputs: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize)]
pub(crate) struct UpdateDraftBody {
    content: BTreeMap<String, String>,
}

#[derive(Deserialize)]
pub(crate) struct ChatBody {
    query: String,
    #[serde(rename = "threadId")]
    thread_id: Option<String>,
    #[serde(rename = "userID", default)]
    user_id: i64,
}

#[derive(Deserialize)]
pub(crate) struct ThreadHistoryBody {
    #[serde(rename = "threadId")]
    thread_id: String,
}

#[derive(Deserialize)]
pub(crate) struct GenerateBody {
    #[serde(rename = "documentType")]
    document_type: Option<String>,
    #[serde(rename = "caseDetails")]
    case_details: String,
    #[serde(rename = "threadId")]
    thread_id: Option<String>,
    #[serde(rename = "userID", default)]
    user_id: i64,
}

#[derive(Deserialize)]
pub(crate) struct SearchWebBody {
    query: String,
    location: Option<String>,
}

// ── Health ────────────────────────────────────────────────────────────────

pub(crate) async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_s": state.start_time.elapsed().as_secs(),
    }))
}

// ── Auth ──────────────────────────────────────────────────────────────────

pub(crate) async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterBody>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if state
        .db
        .get_user_by_email(&body.email)
        .map_err(internal)?
        .is_some()
    {
        return Err(StatusCode::CONFLICT);
    }
    let role = body.role.as_deref().unwrap_or("user");
    if !matches!(role, "admin" | "editor" | "user") {
        return Err(StatusCode::BAD_REQUEST);
    }
    let hash = auth::hash_password(&body.password).map_err(internal)?;
    let id = state
        .db
        .insert_user(&body.email, &hash, role)
        .map_err(internal)?;
    info!(email = %body.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "email": body.email, "role": role })),
    ))
}

pub(crate) async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginBody>,
) -> Result<Json<Value>, StatusCode> {
    let user = state
        .db
        .get_user_by_email(&body.email)
        .map_err(internal)?
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if !auth::verify_password(&body.password, &user.password_hash) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let token = auth::issue_token(
        user.id,
        &user.role,
        &state.config.jwt_secret,
        state.config.token_ttl_hours,
    )
    .map_err(internal)?;
    Ok(Json(json!({ "token": token })))
}

// ── Templates ─────────────────────────────────────────────────────────────

pub(crate) async fn list_templates(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, StatusCode> {
    let templates = state.db.list_templates().map_err(internal)?;
    Ok(Json(json!(templates)))
}

pub(crate) async fn create_template(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTemplateBody>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    if body.name.trim().is_empty() || body.sections.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let mut seen = HashSet::new();
    for section in &body.sections {
        if section.title.trim().is_empty() {
            return Err(StatusCode::BAD_REQUEST);
        }
        // Draft content is keyed by section title; duplicates would collide.
        if !seen.insert(section.title.as_str()) {
            return Err(StatusCode::BAD_REQUEST);
        }
    }
    let id = state
        .db
        .insert_template(
            &body.name,
            body.description.as_deref().unwrap_or(""),
            body.country.as_deref().unwrap_or("Honduras"),
            &body.sections,
        )
        .map_err(internal)?;
    let template = state
        .db
        .get_template(id)
        .map_err(internal)?
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok((StatusCode::CREATED, Json(json!(template))))
}

pub(crate) async fn get_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, StatusCode> {
    let template = state
        .db
        .get_template(id)
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!(template)))
}

pub(crate) async fn delete_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, StatusCode> {
    if state.db.delete_template(id).map_err(internal)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

pub(crate) async fn list_template_files(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, StatusCode> {
    if state.db.get_template(id).map_err(internal)?.is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    let files = state.db.list_uploaded_files(id).map_err(internal)?;
    Ok(Json(json!(files)))
}

// ── Drafting ──────────────────────────────────────────────────────────────

pub(crate) async fn create_draft(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<DraftBody>,
) -> Result<Json<Value>, StatusCode> {
    let (Some(template_id), Some(inputs)) = (body.template_id, body.inputs) else {
        return Err(StatusCode::BAD_REQUEST);
    };
    let template = state
        .db
        .get_template(template_id)
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let docs = (!state.config.pinecone_index_host.is_empty()).then(|| DocContext {
        embeddings: &*state.embeddings,
        vectors: &*state.vectors,
    });
    let drafter = SectionDrafter {
        chat: &*state.chat,
        legal: &*state.legal,
        docs,
    };
    let drafts = drafter
        .generate(&template, &inputs)
        .await
        .map_err(internal)?;

    let draft_id = state
        .db
        .insert_draft(template_id, user.id, &drafts)
        .map_err(internal)?;
    Ok(Json(json!({ "draftId": draft_id, "draft": drafts })))
}

pub(crate) async fn draft_history(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(template_id): Path<i64>,
) -> Result<Json<Value>, StatusCode> {
    let drafts = state
        .db
        .list_drafts_for_owner(user.id, template_id)
        .map_err(internal)?;
    Ok(Json(json!(drafts)))
}

pub(crate) async fn update_draft(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateDraftBody>,
) -> Result<Json<Value>, StatusCode> {
    let updated = state
        .db
        .update_draft_content(id, user.id, &body.content)
        .map_err(internal)?;
    if !updated {
        return Err(StatusCode::NOT_FOUND);
    }
    let draft = state
        .db
        .get_draft_for_owner(id, user.id)
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!(draft)))
}

// ── Assistant chat ────────────────────────────────────────────────────────

/// List-view title derived from the opening message: anything over 50
/// characters is cut to 47 plus an ellipsis.
fn thread_title(query: &str) -> String {
    if query.chars().count() > 50 {
        let head: String = query.chars().take(47).collect();
        format!("{head}...")
    } else {
        query.to_string()
    }
}

async fn ensure_thread(
    state: &AppState,
    thread_id: Option<String>,
    title: &str,
    user_id: i64,
) -> Result<String, StatusCode> {
    if let Some(thread_id) = thread_id.filter(|t| !t.is_empty()) {
        return Ok(thread_id);
    }
    let thread_id = state.assistant.create_thread().await.map_err(internal)?;
    state
        .db
        .insert_chat_thread(user_id, &thread_title(title), &thread_id)
        .map_err(internal)?;
    info!(thread_id = %thread_id, user_id, "chat thread created");
    Ok(thread_id)
}

pub(crate) async fn chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatBody>,
) -> Result<Json<Value>, StatusCode> {
    if body.query.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let assistant_id = assistant_id(&state)?;
    let thread_id = ensure_thread(&state, body.thread_id, &body.query, body.user_id).await?;

    state
        .assistant
        .add_message(&thread_id, "user", &body.query)
        .await
        .map_err(internal)?;
    let response = state
        .assistant
        .run_with_tools(
            &thread_id,
            &assistant_id,
            None,
            Arc::clone(&state.tools),
            state.poll,
        )
        .await
        .map_err(internal)?;
    state.db.touch_chat_thread(&thread_id).map_err(internal)?;

    Ok(Json(json!({ "response": response, "threadId": thread_id })))
}

pub(crate) async fn thread_history(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ThreadHistoryBody>,
) -> Result<Json<Value>, StatusCode> {
    let messages = state
        .assistant
        .list_messages(&body.thread_id)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "messages": messages })))
}

pub(crate) async fn create_assistant(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, StatusCode> {
    let id = state
        .assistant
        .create_assistant(
            phases::ASSISTANT_NAME,
            phases::SYSTEM_PROMPT,
            phases::ASSISTANT_MODEL,
            &phases::tool_declarations(),
        )
        .await
        .map_err(internal)?;
    state.db.set_config("assistant_id", &id).map_err(internal)?;
    Ok(Json(json!({ "message": "Assistant Created Successfully", "id": id })))
}

// ── Full-document generation ──────────────────────────────────────────────

pub(crate) async fn generate_document(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<Value>, StatusCode> {
    if body.case_details.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let assistant_id = assistant_id(&state)?;
    let document_type = body.document_type.as_deref().unwrap_or("default");
    let thread_id =
        ensure_thread(&state, body.thread_id, &body.case_details, body.user_id).await?;

    let report = generate::run_generation(
        &state.db,
        &state.assistant,
        Arc::clone(&state.tools),
        &assistant_id,
        &thread_id,
        body.user_id,
        document_type,
        &body.case_details,
        state.poll,
    )
    .await
    .map_err(internal)?;
    state.db.touch_chat_thread(&thread_id).map_err(internal)?;

    Ok(Json(json!({
        "runId": report.run_id,
        "threadId": thread_id,
        "document": report.document,
    })))
}

// ── Web search ────────────────────────────────────────────────────────────

pub(crate) async fn search_web(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchWebBody>,
) -> Result<Json<Value>, StatusCode> {
    if body.query.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    match state.web.search(&body.query, body.location.as_deref()).await {
        Ok(results) => Ok(Json(json!({ "results": results }))),
        Err(message) => Ok(Json(json!({ "error": message }))),
    }
}

// ── SSE logs — replays ring buffer history then streams live events ───────

pub(crate) async fn sse_logs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    // Subscribe before snapshotting ring to avoid race
    let live_rx = state.log_tx.subscribe();
    let history: Vec<String> = state
        .log_ring
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .cloned()
        .collect();
    tokio::spawn(async move {
        for line in history {
            if tx.send(line).is_err() {
                return;
            }
        }
        let mut live_rx = live_rx;
        loop {
            match live_rx.recv().await {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        return;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });
    let stream = UnboundedReceiverStream::new(rx)
        .map(|data| Ok::<_, std::convert::Infallible>(Event::default().data(data)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    )
}

#[cfg(test)]
mod tests {
    use axum::{routing, Router};
    use lexdraft_research::tools::LegalToolset;

    use super::*;

    fn test_config() -> Config {
        Config {
            openai_api_key: String::new(),
            openai_base_url: "http://127.0.0.1:9".to_string(),
            chat_model: "gpt-4".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            assistant_id: "asst_test".to_string(),
            meili_api_key: String::new(),
            search_api_key: String::new(),
            pinecone_api_key: String::new(),
            pinecone_index_host: String::new(),
            jwt_secret: "test-secret".to_string(),
            token_ttl_hours: 1,
            proxy_url: String::new(),
            web_bind: "127.0.0.1".to_string(),
            web_port: 0,
            db_path: ":memory:".to_string(),
            uploads_dir: "uploads".to_string(),
            run_poll_interval_ms: 5,
            run_timeout_s: 5,
        }
    }

    fn test_state(base_url: &str) -> Arc<AppState> {
        let mut db = Db::open(":memory:").expect("open db");
        db.migrate().expect("migrate");
        let http = reqwest::Client::new();
        let (log_tx, _) = broadcast::channel(8);
        Arc::new(AppState {
            db: Arc::new(db),
            config: test_config(),
            start_time: Instant::now(),
            log_tx,
            log_ring: Arc::new(std::sync::Mutex::new(VecDeque::new())),
            chat: Arc::new(ChatClient::new(http.clone(), base_url, "key", "gpt-4")),
            embeddings: Arc::new(EmbeddingClient::new(
                http.clone(),
                base_url,
                "key",
                "text-embedding-3-small",
            )),
            assistant: Arc::new(AssistantClient::new(http.clone(), base_url, "key")),
            legal: Arc::new(MeiliClient::new(http.clone(), "key")),
            web: Arc::new(WebSearchClient::new(http.clone(), "key")),
            vectors: Arc::new(PineconeClient::new(http.clone(), base_url, "key")),
            tools: Arc::new(LegalToolset::new(
                MeiliClient::new(http.clone(), "key"),
                WebSearchClient::new(http, "key"),
            )),
            poll: PollConfig {
                interval: std::time::Duration::from_millis(5),
                timeout: std::time::Duration::from_secs(5),
            },
        })
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

    #[test]
    fn long_thread_titles_are_ellipsized() {
        assert_eq!(thread_title("Consulta breve"), "Consulta breve");
        let long = "x".repeat(60);
        assert_eq!(thread_title(&long), format!("{}...", "x".repeat(47)));
        assert_eq!(thread_title(&long).chars().count(), 50);
    }

    #[tokio::test]
    async fn register_then_login_issues_a_valid_token() {
        let state = test_state("http://127.0.0.1:9");

        let (status, _) = register(
            State(Arc::clone(&state)),
            Json(RegisterBody {
                email: "ana@bufete.hn".to_string(),
                password: "hunter2".to_string(),
                role: Some("editor".to_string()),
            }),
        )
        .await
        .expect("register");
        assert_eq!(status, StatusCode::CREATED);

        let duplicate = register(
            State(Arc::clone(&state)),
            Json(RegisterBody {
                email: "ana@bufete.hn".to_string(),
                password: "hunter2".to_string(),
                role: None,
            }),
        )
        .await
        .expect_err("duplicate email");
        assert_eq!(duplicate, StatusCode::CONFLICT);

        let Json(body) = login(
            State(Arc::clone(&state)),
            Json(LoginBody {
                email: "ana@bufete.hn".to_string(),
                password: "hunter2".to_string(),
            }),
        )
        .await
        .expect("login");
        let token = body["token"].as_str().expect("token field");
        let claims = crate::auth::decode_token(token, "test-secret").expect("decode");
        assert_eq!(claims.role, "editor");

        let rejected = login(
            State(state),
            Json(LoginBody {
                email: "ana@bufete.hn".to_string(),
                password: "wrong".to_string(),
            }),
        )
        .await
        .expect_err("wrong password");
        assert_eq!(rejected, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn new_chat_threads_record_the_caller() {
        let app = Router::new().route(
            "/v1/threads",
            routing::post(|| async { Json(json!({ "id": "thread_t1" })) }),
        );
        let state = test_state(&serve(app).await);

        let query = "Consulta sobre oposición de marca notoria en Honduras y medidas cautelares";
        let thread_id = ensure_thread(&state, None, query, 42)
            .await
            .expect("ensure_thread");
        assert_eq!(thread_id, "thread_t1");

        let row = state
            .db
            .get_chat_thread("thread_t1")
            .expect("get thread")
            .expect("thread row");
        assert_eq!(row.user_id, 42);
        assert!(row.title.ends_with("..."));
        assert_eq!(row.title.chars().count(), 50);

        // An existing thread id passes through without another insert.
        let same = ensure_thread(&state, Some("thread_t1".to_string()), query, 7)
            .await
            .expect("ensure_thread");
        assert_eq!(same, "thread_t1");
        let row = state
            .db
            .get_chat_thread("thread_t1")
            .expect("get thread")
            .expect("thread row");
        assert_eq!(row.user_id, 42);
    }

    #[tokio::test]
    async fn generation_runs_record_the_caller() {
        let app = Router::new()
            .route(
                "/v1/threads/:tid/messages",
                routing::post(|| async { Json(json!({ "id": "msg_1" })) }).get(|| async {
                    Json(json!({
                        "data": [
                            {
                                "id": "msg_2",
                                "role": "assistant",
                                "content": [{ "type": "text", "text": { "value": "Documento final" } }]
                            }
                        ]
                    }))
                }),
            )
            .route(
                "/v1/threads/:tid/runs",
                routing::post(|| async { Json(json!({ "id": "run_1", "status": "completed" })) }),
            );
        let state = test_state(&serve(app).await);

        let report = generate::run_generation(
            &state.db,
            &state.assistant,
            Arc::clone(&state.tools),
            "asst_test",
            "thread_g1",
            42,
            "opposition",
            "detalles del caso",
            state.poll,
        )
        .await
        .expect("run_generation");
        assert_eq!(report.document, "Documento final");

        let run = state
            .db
            .get_generation_run(report.run_id)
            .expect("get run")
            .expect("run row");
        assert_eq!(run.user_id, 42);
        assert_eq!(run.status, "completed");
        let outputs = state
            .db
            .get_generation_outputs(report.run_id)
            .expect("outputs");
        assert_eq!(outputs.len(), 3);
    }
}
