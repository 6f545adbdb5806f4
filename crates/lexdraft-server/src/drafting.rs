use std::collections::BTreeMap;

use anyhow::{Context, Result};
use lexdraft_core::{
    seams::{ChatBackend, LegalSearch},
    types::Template,
};
use lexdraft_llm::embeddings::EmbeddingClient;
use lexdraft_research::{phases, pinecone::PineconeClient};
use tracing::warn;

/// Per-section draft generation. One chat completion per section; research
/// lookups only for sections that ask for them and have user input.
pub struct SectionDrafter<'a> {
    pub chat: &'a dyn ChatBackend,
    pub legal: &'a dyn LegalSearch,
    pub docs: Option<DocContext<'a>>,
}

/// Uploaded-document retrieval: embed the user's input and pull the closest
/// chunks from the template's vector namespace.
pub struct DocContext<'a> {
    pub embeddings: &'a EmbeddingClient,
    pub vectors: &'a PineconeClient,
}

const DOC_TOP_K: usize = 3;

impl SectionDrafter<'_> {
    pub async fn generate(
        &self,
        template: &Template,
        inputs: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        let mut drafts = BTreeMap::new();

        for section in &template.sections {
            let user_input = inputs.get(&section.title).cloned().unwrap_or_default();

            let legal_references = if section.requires_meilisearch && !user_input.trim().is_empty()
            {
                match self.legal.search(&user_input, &template.country).await {
                    // Warnings carry nothing citable; drop them from the prompt.
                    Ok(text) if !text.starts_with("⚠️") => text,
                    Ok(_) => String::new(),
                    Err(e) => {
                        warn!(section = %section.title, "legal search failed: {}", e);
                        String::new()
                    },
                }
            } else {
                String::new()
            };

            let document_references =
                if section.requires_vector_search && !user_input.trim().is_empty() {
                    match &self.docs {
                        Some(docs) => docs
                            .lookup(template.id, &user_input)
                            .await
                            .unwrap_or_else(|e| {
                                warn!(section = %section.title, "document lookup failed: {}", e);
                                String::new()
                            }),
                        None => String::new(),
                    }
                } else {
                    String::new()
                };

            let prompt = phases::section_prompt(
                &section.title,
                &template.name,
                &section.description,
                &section.sample_draft,
                &legal_references,
                &document_references,
                &user_input,
            );

            let text = self
                .chat
                .complete("", &prompt)
                .await
                .with_context(|| format!("drafting section {:?}", section.title))?;
            drafts.insert(section.title.clone(), text);
        }

        Ok(drafts)
    }
}

impl DocContext<'_> {
    async fn lookup(&self, template_id: i64, query: &str) -> Result<String> {
        let vectors = self.embeddings.embed(&[query.to_string()]).await?;
        let Some(vector) = vectors.first() else {
            return Ok(String::new());
        };
        let matches = self
            .vectors
            .query(&template_id.to_string(), vector, DOC_TOP_K)
            .await?;
        Ok(matches
            .iter()
            .filter_map(|m| m.metadata.get(lexdraft_research::pinecone::METADATA_TEXT_KEY))
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use lexdraft_core::types::Section;

    use super::*;

    struct CountingChat {
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatBackend for CountingChat {
        async fn complete(&self, _system: &str, user: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().expect("lock").push(user.to_string());
            Ok(format!("draft #{}", self.calls.load(Ordering::SeqCst)))
        }
    }

    struct StubLegal {
        response: String,
        queries: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl LegalSearch for StubLegal {
        async fn search(&self, keywords: &str, country: &str) -> Result<String> {
            self.queries
                .lock()
                .expect("lock")
                .push((keywords.to_string(), country.to_string()));
            Ok(self.response.clone())
        }
    }

    fn template(sections: Vec<Section>) -> Template {
        Template {
            id: 7,
            name: "Oposición".to_string(),
            description: String::new(),
            country: "Honduras".to_string(),
            sections,
            uploaded_files: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn section(title: &str, requires_meilisearch: bool) -> Section {
        Section {
            id: 0,
            title: title.to_string(),
            description: String::new(),
            sample_draft: String::new(),
            requires_meilisearch,
            requires_vector_search: false,
            position: 0,
        }
    }

    #[tokio::test]
    async fn one_chat_call_per_section() {
        let chat = CountingChat {
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        };
        let legal = StubLegal {
            response: String::new(),
            queries: Mutex::new(Vec::new()),
        };
        let tpl = template(vec![
            section("Hechos", false),
            section("Fundamentos", false),
            section("Petición", false),
        ]);
        let mut inputs = BTreeMap::new();
        inputs.insert("Hechos".to_string(), "los hechos".to_string());

        let drafter = SectionDrafter {
            chat: &chat,
            legal: &legal,
            docs: None,
        };
        let drafts = drafter.generate(&tpl, &inputs).await.expect("generate");

        assert_eq!(chat.calls.load(Ordering::SeqCst), 3);
        assert_eq!(drafts.len(), 3);
        for s in &tpl.sections {
            assert!(drafts.contains_key(&s.title), "missing {}", s.title);
        }
        assert!(legal.queries.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn legal_search_only_for_flagged_sections_with_input() {
        let chat = CountingChat {
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        };
        let legal = StubLegal {
            response: "1. law_title: LPI, ...".to_string(),
            queries: Mutex::new(Vec::new()),
        };
        let tpl = template(vec![
            section("Hechos", true),
            section("Fundamentos", true),
            section("Petición", false),
        ]);
        let mut inputs = BTreeMap::new();
        inputs.insert("Hechos".to_string(), "marca notoria".to_string());
        // "Fundamentos" flagged but has no input: no lookup.

        let drafter = SectionDrafter {
            chat: &chat,
            legal: &legal,
            docs: None,
        };
        drafter.generate(&tpl, &inputs).await.expect("generate");

        let queries = legal.queries.lock().expect("lock");
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0], ("marca notoria".to_string(), "Honduras".to_string()));

        let prompts = chat.prompts.lock().expect("lock");
        assert!(prompts[0].contains("1. law_title: LPI"));
        assert!(prompts[1].contains("[No related legal references found.]"));
    }

    #[tokio::test]
    async fn warning_results_are_dropped_from_the_prompt() {
        let chat = CountingChat {
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        };
        let legal = StubLegal {
            response: "⚠️ No relevant legal content found.".to_string(),
            queries: Mutex::new(Vec::new()),
        };
        let tpl = template(vec![section("Hechos", true)]);
        let mut inputs = BTreeMap::new();
        inputs.insert("Hechos".to_string(), "algo".to_string());

        let drafter = SectionDrafter {
            chat: &chat,
            legal: &legal,
            docs: None,
        };
        drafter.generate(&tpl, &inputs).await.expect("generate");

        let prompts = chat.prompts.lock().expect("lock");
        assert!(prompts[0].contains("[No related legal references found.]"));
        assert!(!prompts[0].contains("No relevant legal content"));
    }
}
