mod auth;
mod drafting;
mod generate;
mod logging;
mod routes;
mod upload;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::{
    routing::{get, post, put},
    Router,
};
use lexdraft_core::{config::Config, db::Db, run::PollConfig};
use lexdraft_llm::{assistant::AssistantClient, chat::ChatClient, embeddings::EmbeddingClient};
use lexdraft_research::{
    meili::MeiliClient, pinecone::PineconeClient, tools::LegalToolset, websearch::WebSearchClient,
};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::routes::AppState;

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> Result<()> {
    let (log_tx, _) = broadcast::channel::<String>(256);
    let log_ring = Arc::new(std::sync::Mutex::new(VecDeque::new()));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "lexdraft_server=info,lexdraft_core=info,lexdraft_llm=info,lexdraft_research=info",
            )
        }))
        .with(tracing_subscriber::fmt::layer())
        .with(logging::BroadcastLayer {
            tx: log_tx.clone(),
            ring: Arc::clone(&log_ring),
        })
        .init();

    let config = Config::from_env()?;
    let mut db = Db::open(&config.db_path)?;
    db.migrate()?;
    config.seed_db(&db)?;
    let config = config.load_from_db(&db);
    let db = Arc::new(db);

    let http = lexdraft_core::http::build_client(&config.proxy_url, HTTP_TIMEOUT)?;

    let chat = Arc::new(ChatClient::new(
        http.clone(),
        &config.openai_base_url,
        &config.openai_api_key,
        &config.chat_model,
    ));
    let embeddings = Arc::new(EmbeddingClient::new(
        http.clone(),
        &config.openai_base_url,
        &config.openai_api_key,
        &config.embedding_model,
    ));
    let assistant = Arc::new(AssistantClient::new(
        http.clone(),
        &config.openai_base_url,
        &config.openai_api_key,
    ));
    let legal = Arc::new(MeiliClient::new(http.clone(), &config.meili_api_key));
    let web = Arc::new(WebSearchClient::new(http.clone(), &config.search_api_key));
    let vectors = Arc::new(PineconeClient::new(
        http.clone(),
        &config.pinecone_index_host,
        &config.pinecone_api_key,
    ));
    let tools = Arc::new(LegalToolset::new(
        MeiliClient::new(http.clone(), &config.meili_api_key),
        WebSearchClient::new(http, &config.search_api_key),
    ));

    let poll = PollConfig {
        interval: Duration::from_millis(config.run_poll_interval_ms),
        timeout: Duration::from_secs(config.run_timeout_s),
    };

    let bind = format!("{}:{}", config.web_bind, config.web_port);
    let state = Arc::new(AppState {
        db,
        config,
        start_time: Instant::now(),
        log_tx,
        log_ring,
        chat,
        embeddings,
        assistant,
        legal,
        web,
        vectors,
        tools,
        poll,
    });

    let app = Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/auth/register", post(routes::register))
        .route("/api/auth/login", post(routes::login))
        .route(
            "/api/templates",
            get(routes::list_templates).post(routes::create_template),
        )
        .route(
            "/api/templates/:id",
            get(routes::get_template).delete(routes::delete_template),
        )
        .route("/api/templates/:id/files", get(routes::list_template_files))
        .route("/api/templates/upload", post(upload::upload_template_files))
        .route("/api/draft", post(routes::create_draft))
        .route("/api/draft/history/:template_id", get(routes::draft_history))
        .route("/api/draft/:id", put(routes::update_draft))
        .route("/api/chat", post(routes::chat))
        .route("/api/get-thread-history", post(routes::thread_history))
        .route("/admin/create-assistant", post(routes::create_assistant))
        .route(
            "/api/generate-legal-document",
            post(routes::generate_document),
        )
        .route("/api/searchWeb", post(routes::search_web))
        .route("/api/logs", get(routes::sse_logs))
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!(%bind, "listening");
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    axum::serve(listener, app).await.context("server exited")?;
    Ok(())
}
