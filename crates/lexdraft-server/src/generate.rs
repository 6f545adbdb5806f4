use std::sync::Arc;

use anyhow::{Context, Result};
use lexdraft_core::{db::Db, run::PollConfig, seams::ToolHandler};
use lexdraft_llm::assistant::AssistantClient;
use lexdraft_research::phases;
use tracing::info;

pub struct GenerationReport {
    pub run_id: i64,
    /// Output of the review phase: the final document text.
    pub document: String,
}

/// Drive the research → draft → review workflow against one thread.
///
/// Each phase's output is checkpointed to the database before the next phase
/// starts, and the run row always records which phase was in flight, so a
/// failure mid-workflow keeps everything produced up to that point.
pub async fn run_generation(
    db: &Db,
    assistant: &AssistantClient,
    tools: Arc<dyn ToolHandler>,
    assistant_id: &str,
    thread_id: &str,
    user_id: i64,
    document_type: &str,
    case_details: &str,
    poll: PollConfig,
) -> Result<GenerationReport> {
    let run_id = db.insert_generation_run(thread_id, user_id, "research")?;
    let mut document = String::new();

    for phase in phases::generation_phases(document_type, case_details) {
        db.update_generation_run(run_id, phase.name, None)?;
        info!(run_id, phase = phase.name, "generation phase started");

        let result = async {
            assistant
                .add_message(thread_id, "user", &phase.instructions)
                .await?;
            assistant
                .run_with_tools(thread_id, assistant_id, None, Arc::clone(&tools), poll)
                .await
        }
        .await;

        match result {
            Ok(output) => {
                db.insert_generation_output(run_id, phase.name, &output)?;
                document = output;
            },
            Err(e) => {
                db.update_generation_run(run_id, "failed", Some(&e.to_string()))?;
                return Err(e).with_context(|| format!("generation phase {:?}", phase.name));
            },
        }
    }

    db.update_generation_run(run_id, "completed", None)?;
    info!(run_id, "generation completed");
    Ok(GenerationReport { run_id, document })
}
