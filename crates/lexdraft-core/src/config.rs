use std::collections::HashMap;

use anyhow::Result;

use crate::db::Db;

/// Full application configuration.
/// Non-sensitive fields are seeded to and loaded from the DB `config` table.
/// Sensitive fields (API keys, JWT secret) come from env/.env only.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub assistant_id: String,

    pub meili_api_key: String,
    pub search_api_key: String,
    pub pinecone_api_key: String,
    /// Data-plane host of the Pinecone index, e.g. "https://my-index-abc123.svc.pinecone.io".
    pub pinecone_index_host: String,

    pub jwt_secret: String,
    pub token_ttl_hours: i64,

    /// Optional SOCKS proxy for outbound OpenAI traffic, e.g. "socks5://127.0.0.1:1080".
    pub proxy_url: String,

    // HTTP server
    pub web_bind: String,
    pub web_port: u16,

    // Storage
    pub db_path: String,
    pub uploads_dir: String,

    // Run polling
    pub run_poll_interval_ms: u64,
    pub run_timeout_s: u64,
}

fn parse_dotenv() -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Ok(contents) = std::fs::read_to_string(".env") else {
        return map;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    map
}

fn get(key: &str, dotenv: &HashMap<String, String>) -> Option<String> {
    std::env::var(key).ok().or_else(|| dotenv.get(key).cloned())
}

fn get_str(key: &str, dotenv: &HashMap<String, String>, default: &str) -> String {
    get(key, dotenv).unwrap_or_else(|| default.to_string())
}

fn get_i64(key: &str, dotenv: &HashMap<String, String>, default: i64) -> i64 {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_u64(key: &str, dotenv: &HashMap<String, String>, default: u64) -> u64 {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_u16(key: &str, dotenv: &HashMap<String, String>, default: u16) -> u16 {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let dotenv = parse_dotenv();

        Ok(Config {
            openai_api_key: get_str("OPENAI_API_KEY", &dotenv, ""),
            openai_base_url: get_str("OPENAI_BASE_URL", &dotenv, "https://api.openai.com"),
            chat_model: get_str("CHAT_MODEL", &dotenv, "gpt-4"),
            embedding_model: get_str("EMBEDDING_MODEL", &dotenv, "text-embedding-3-small"),
            assistant_id: get_str("ASSISTANT_ID", &dotenv, ""),
            meili_api_key: get_str("MEILI_API_KEY", &dotenv, ""),
            search_api_key: get_str("SEARCH_API_KEY", &dotenv, ""),
            pinecone_api_key: get_str("PINECONE_API_KEY", &dotenv, ""),
            pinecone_index_host: get_str("PINECONE_INDEX_HOST", &dotenv, ""),
            jwt_secret: get_str("JWT_SECRET", &dotenv, ""),
            token_ttl_hours: get_i64("TOKEN_TTL_HOURS", &dotenv, 24),
            proxy_url: get_str("PROXY_URL", &dotenv, ""),
            web_bind: get_str("WEB_BIND", &dotenv, "0.0.0.0"),
            web_port: get_u16("WEB_PORT", &dotenv, 5000),
            db_path: get_str("DB_PATH", &dotenv, "lexdraft.db"),
            uploads_dir: get_str("UPLOADS_DIR", &dotenv, "uploads"),
            run_poll_interval_ms: get_u64("RUN_POLL_INTERVAL_MS", &dotenv, 1000),
            run_timeout_s: get_u64("RUN_TIMEOUT_S", &dotenv, 300),
        })
    }

    /// Write non-sensitive fields to DB if not already present (first-run seeding).
    pub fn seed_db(&self, db: &Db) -> Result<()> {
        let entries: &[(&str, String)] = &[
            ("chat_model", self.chat_model.clone()),
            ("embedding_model", self.embedding_model.clone()),
            ("assistant_id", self.assistant_id.clone()),
            ("uploads_dir", self.uploads_dir.clone()),
            (
                "run_poll_interval_ms",
                self.run_poll_interval_ms.to_string(),
            ),
            ("run_timeout_s", self.run_timeout_s.to_string()),
        ];
        for (key, value) in entries {
            db.seed_config(key, value)?;
        }
        Ok(())
    }

    /// Return a new Config with non-sensitive fields overridden from DB values.
    pub fn load_from_db(&self, db: &Db) -> Self {
        let mut c = self.clone();
        let get = |key: &str| db.get_config(key).ok().flatten();
        if let Some(v) = get("chat_model") {
            c.chat_model = v;
        }
        if let Some(v) = get("embedding_model") {
            c.embedding_model = v;
        }
        if let Some(v) = get("assistant_id") {
            c.assistant_id = v;
        }
        if let Some(v) = get("uploads_dir") {
            c.uploads_dir = v;
        }
        if let Some(v) = get("run_poll_interval_ms").and_then(|s| s.parse().ok()) {
            c.run_poll_interval_ms = v;
        }
        if let Some(v) = get("run_timeout_s").and_then(|s| s.parse().ok()) {
            c.run_timeout_s = v;
        }
        c
    }
}
