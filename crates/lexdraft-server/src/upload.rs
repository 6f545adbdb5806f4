use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::Json,
};
use lexdraft_core::chunker::chunk_text;
use lexdraft_research::pinecone::chunk_record;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::routes::{internal, AppState};

pub fn sanitize_filename(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Stored name: upload timestamp plus the sanitized original name, so repeat
/// uploads of the same file never collide.
pub fn stored_name(timestamp_ms: i64, original: &str) -> String {
    format!("{timestamp_ms}-{}", sanitize_filename(original))
}

async fn extract_pdf_text(path: PathBuf) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text(&path).map_err(|e| anyhow!("pdf extraction failed: {e}"))
    })
    .await
    .context("pdf extraction task panicked")?
}

/// `POST /api/templates/upload` — multipart with a `templateId` field and one
/// or more `files` parts. Each PDF is saved, extracted, chunked, embedded and
/// upserted into the template's vector namespace.
pub async fn upload_template_files(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, StatusCode> {
    let mut template_id: Option<i64> = None;
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        match field.name().unwrap_or_default() {
            "templateId" => {
                let text = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                template_id = text.parse().ok();
            },
            "files" => {
                let original = field.file_name().unwrap_or("upload.pdf").to_string();
                let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                files.push((original, bytes.to_vec()));
            },
            _ => {},
        }
    }

    let Some(template_id) = template_id else {
        return Err(StatusCode::BAD_REQUEST);
    };
    let template = state
        .db
        .get_template(template_id)
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    std::fs::create_dir_all(&state.config.uploads_dir).map_err(internal)?;

    for (original, bytes) in files {
        let filename = stored_name(chrono::Utc::now().timestamp_millis(), &original);
        let path = Path::new(&state.config.uploads_dir)
            .join(&filename)
            .to_string_lossy()
            .into_owned();
        std::fs::write(&path, &bytes).map_err(internal)?;

        let file_id = state
            .db
            .insert_uploaded_file(template_id, &filename, &original, &path)
            .map_err(internal)?;

        match extract_pdf_text(PathBuf::from(&path)).await {
            Ok(text) => {
                ingest_text(&state, template_id, file_id, &text)
                    .await
                    .map_err(internal)?;
            },
            Err(e) => {
                // The file is kept either way; only retrieval misses it.
                warn!(original, "skipping vector ingest: {}", e);
            },
        }
        info!(template_id, original, "file uploaded");
    }

    let template = state
        .db
        .get_template(template.id)
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!({ "success": true, "template": template })))
}

async fn ingest_text(
    state: &AppState,
    template_id: i64,
    file_id: i64,
    text: &str,
) -> Result<()> {
    let chunks = chunk_text(text);
    if chunks.is_empty() {
        return Ok(());
    }
    let embeddings = state.embeddings.embed(&chunks).await?;
    let records: Vec<_> = chunks
        .iter()
        .zip(embeddings)
        .enumerate()
        .map(|(index, (chunk, values))| chunk_record(file_id, index, values, chunk))
        .collect();
    state
        .vectors
        .upsert(&template_id.to_string(), &records)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_sanitized_and_timestamped() {
        assert_eq!(sanitize_filename("mi escrito final.pdf"), "mi_escrito_final.pdf");
        assert_eq!(
            stored_name(1700000000000, "poder  notarial.pdf"),
            "1700000000000-poder_notarial.pdf"
        );
    }
}
