use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::types::{
    ChatThread, Draft, GenerationOutput, GenerationRun, Section, Template, UploadedFile, User,
};

const SCHEMA_SQL: &str = include_str!("../../../schema.sql");

pub struct Db {
    conn: Mutex<Connection>,
}

// ── Timestamp helpers ─────────────────────────────────────────────────────

fn parse_ts(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|ndt| ndt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

fn now_str() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

// ── Row mappers ───────────────────────────────────────────────────────────

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let created_at_str: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        role: row.get(3)?,
        created_at: parse_ts(&created_at_str),
    })
}

fn row_to_section(row: &rusqlite::Row<'_>) -> rusqlite::Result<Section> {
    Ok(Section {
        id: row.get(0)?,
        title: row.get(2)?,
        description: row.get(3)?,
        sample_draft: row.get(4)?,
        requires_meilisearch: row.get::<_, i64>(5)? != 0,
        requires_vector_search: row.get::<_, i64>(6)? != 0,
        position: row.get(1)?,
    })
}

fn row_to_uploaded_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<UploadedFile> {
    let uploaded_at_str: String = row.get(4)?;
    Ok(UploadedFile {
        id: row.get(0)?,
        filename: row.get(1)?,
        original_name: row.get(2)?,
        path: row.get(3)?,
        uploaded_at: parse_ts(&uploaded_at_str),
    })
}

fn row_to_draft(row: &rusqlite::Row<'_>) -> rusqlite::Result<Draft> {
    let content_str: String = row.get(3)?;
    let created_at_str: String = row.get(4)?;
    let updated_at_str: String = row.get(5)?;
    Ok(Draft {
        id: row.get(0)?,
        template_id: row.get(1)?,
        user_id: row.get(2)?,
        content: serde_json::from_str::<BTreeMap<String, String>>(&content_str)
            .unwrap_or_default(),
        created_at: parse_ts(&created_at_str),
        updated_at: parse_ts(&updated_at_str),
    })
}

fn row_to_chat_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatThread> {
    let created_at_str: String = row.get(4)?;
    let updated_at_str: String = row.get(5)?;
    Ok(ChatThread {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        thread_id: row.get(3)?,
        created_at: parse_ts(&created_at_str),
        updated_at: parse_ts(&updated_at_str),
    })
}

fn row_to_generation_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<GenerationRun> {
    let created_at_str: String = row.get(5)?;
    let updated_at_str: String = row.get(6)?;
    Ok(GenerationRun {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        user_id: row.get(2)?,
        status: row.get(3)?,
        error: row.get(4)?,
        created_at: parse_ts(&created_at_str),
        updated_at: parse_ts(&updated_at_str),
    })
}

fn row_to_generation_output(row: &rusqlite::Row<'_>) -> rusqlite::Result<GenerationOutput> {
    let created_at_str: String = row.get(4)?;
    Ok(GenerationOutput {
        id: row.get(0)?,
        run_id: row.get(1)?,
        phase: row.get(2)?,
        output: row.get(3)?,
        created_at: parse_ts(&created_at_str),
    })
}

// ── Db impl ───────────────────────────────────────────────────────────────

impl Db {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open SQLite database at {path:?}"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .context("failed to set PRAGMAs")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn migrate(&mut self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to apply schema migrations")?;
        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────────────────

    pub fn insert_user(&self, email: &str, password_hash: &str, role: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let created_at = now_str();
        conn.execute(
            "INSERT INTO users (email, password_hash, role, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![email, password_hash, role, created_at],
        )
        .context("insert_user")?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let result = conn
            .query_row(
                "SELECT id, email, password_hash, role, created_at \
                 FROM users WHERE email = ?1",
                params![email],
                row_to_user,
            )
            .optional()
            .context("get_user_by_email")?;
        Ok(result)
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let result = conn
            .query_row(
                "SELECT id, email, password_hash, role, created_at \
                 FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .optional()
            .context("get_user")?;
        Ok(result)
    }

    // ── Templates ─────────────────────────────────────────────────────────

    /// Insert a template and its sections in one transaction.
    pub fn insert_template(
        &self,
        name: &str,
        description: &str,
        country: &str,
        sections: &[Section],
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.unchecked_transaction().context("insert_template tx")?;
        let now = now_str();
        tx.execute(
            "INSERT INTO templates (name, description, country, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, description, country, now, now],
        )
        .context("insert_template")?;
        let template_id = tx.last_insert_rowid();
        for (position, section) in sections.iter().enumerate() {
            tx.execute(
                "INSERT INTO sections \
                 (template_id, position, title, description, sample_draft, \
                  requires_meilisearch, requires_vector_search) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    template_id,
                    position as i64,
                    section.title,
                    section.description,
                    section.sample_draft,
                    i64::from(section.requires_meilisearch),
                    i64::from(section.requires_vector_search),
                ],
            )
            .context("insert_template section")?;
        }
        tx.commit().context("insert_template commit")?;
        Ok(template_id)
    }

    fn template_sections(conn: &Connection, template_id: i64) -> Result<Vec<Section>> {
        let mut stmt = conn.prepare(
            "SELECT id, position, title, description, sample_draft, \
             requires_meilisearch, requires_vector_search \
             FROM sections WHERE template_id = ?1 ORDER BY position ASC",
        )?;
        let sections = stmt
            .query_map(params![template_id], row_to_section)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("template_sections")?;
        Ok(sections)
    }

    fn template_files(conn: &Connection, template_id: i64) -> Result<Vec<UploadedFile>> {
        let mut stmt = conn.prepare(
            "SELECT id, filename, original_name, path, uploaded_at \
             FROM uploaded_files WHERE template_id = ?1 ORDER BY id ASC",
        )?;
        let files = stmt
            .query_map(params![template_id], row_to_uploaded_file)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("template_files")?;
        Ok(files)
    }

    pub fn get_template(&self, id: i64) -> Result<Option<Template>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let head = conn
            .query_row(
                "SELECT id, name, description, country, created_at, updated_at \
                 FROM templates WHERE id = ?1",
                params![id],
                |row| {
                    let created_at_str: String = row.get(4)?;
                    let updated_at_str: String = row.get(5)?;
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        created_at_str,
                        updated_at_str,
                    ))
                },
            )
            .optional()
            .context("get_template")?;
        let Some((id, name, description, country, created_at, updated_at)) = head else {
            return Ok(None);
        };
        Ok(Some(Template {
            id,
            name,
            description,
            country,
            sections: Self::template_sections(&conn, id)?,
            uploaded_files: Self::template_files(&conn, id)?,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
        }))
    }

    pub fn list_templates(&self) -> Result<Vec<Template>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let heads = {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, country, created_at, updated_at \
                 FROM templates ORDER BY id DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("list_templates")?;
            rows
        };
        let mut templates = Vec::with_capacity(heads.len());
        for (id, name, description, country, created_at, updated_at) in heads {
            templates.push(Template {
                id,
                name,
                description,
                country,
                sections: Self::template_sections(&conn, id)?,
                uploaded_files: Self::template_files(&conn, id)?,
                created_at: parse_ts(&created_at),
                updated_at: parse_ts(&updated_at),
            });
        }
        Ok(templates)
    }

    /// Returns true when a row was deleted. Sections and files cascade.
    pub fn delete_template(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let n = conn
            .execute("DELETE FROM templates WHERE id = ?1", params![id])
            .context("delete_template")?;
        Ok(n > 0)
    }

    // ── Uploaded files ────────────────────────────────────────────────────

    pub fn insert_uploaded_file(
        &self,
        template_id: i64,
        filename: &str,
        original_name: &str,
        path: &str,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let uploaded_at = now_str();
        conn.execute(
            "INSERT INTO uploaded_files (template_id, filename, original_name, path, uploaded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![template_id, filename, original_name, path, uploaded_at],
        )
        .context("insert_uploaded_file")?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_uploaded_files(&self, template_id: i64) -> Result<Vec<UploadedFile>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        Self::template_files(&conn, template_id)
    }

    // ── Drafts ────────────────────────────────────────────────────────────

    pub fn insert_draft(
        &self,
        template_id: i64,
        user_id: i64,
        content: &BTreeMap<String, String>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let content_str = serde_json::to_string(content).context("insert_draft serialize")?;
        let now = now_str();
        conn.execute(
            "INSERT INTO drafts (template_id, user_id, content, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![template_id, user_id, content_str, now, now],
        )
        .context("insert_draft")?;
        Ok(conn.last_insert_rowid())
    }

    /// Drafts are owner-scoped; another user's draft is invisible here.
    pub fn get_draft_for_owner(&self, id: i64, user_id: i64) -> Result<Option<Draft>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let result = conn
            .query_row(
                "SELECT id, template_id, user_id, content, created_at, updated_at \
                 FROM drafts WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                row_to_draft,
            )
            .optional()
            .context("get_draft_for_owner")?;
        Ok(result)
    }

    pub fn list_drafts_for_owner(&self, user_id: i64, template_id: i64) -> Result<Vec<Draft>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(
            "SELECT id, template_id, user_id, content, created_at, updated_at \
             FROM drafts WHERE user_id = ?1 AND template_id = ?2 ORDER BY id DESC",
        )?;
        let drafts = stmt
            .query_map(params![user_id, template_id], row_to_draft)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("list_drafts_for_owner")?;
        Ok(drafts)
    }

    /// Returns false when the draft does not exist or belongs to someone else.
    pub fn update_draft_content(
        &self,
        id: i64,
        user_id: i64,
        content: &BTreeMap<String, String>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let content_str =
            serde_json::to_string(content).context("update_draft_content serialize")?;
        let updated_at = now_str();
        let n = conn
            .execute(
                "UPDATE drafts SET content = ?1, updated_at = ?2 \
                 WHERE id = ?3 AND user_id = ?4",
                params![content_str, updated_at, id, user_id],
            )
            .context("update_draft_content")?;
        Ok(n > 0)
    }

    // ── Chat threads ──────────────────────────────────────────────────────

    pub fn insert_chat_thread(&self, user_id: i64, title: &str, thread_id: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let now = now_str();
        conn.execute(
            "INSERT INTO chat_threads (user_id, title, thread_id, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, title, thread_id, now, now],
        )
        .context("insert_chat_thread")?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_chat_thread(&self, thread_id: &str) -> Result<Option<ChatThread>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let result = conn
            .query_row(
                "SELECT id, user_id, title, thread_id, created_at, updated_at \
                 FROM chat_threads WHERE thread_id = ?1",
                params![thread_id],
                row_to_chat_thread,
            )
            .optional()
            .context("get_chat_thread")?;
        Ok(result)
    }

    pub fn touch_chat_thread(&self, thread_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let updated_at = now_str();
        conn.execute(
            "UPDATE chat_threads SET updated_at = ?1 WHERE thread_id = ?2",
            params![updated_at, thread_id],
        )
        .context("touch_chat_thread")?;
        Ok(())
    }

    // ── Generation runs ───────────────────────────────────────────────────

    pub fn insert_generation_run(
        &self,
        thread_id: &str,
        user_id: i64,
        status: &str,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let now = now_str();
        conn.execute(
            "INSERT INTO generation_runs (thread_id, user_id, status, error, created_at, updated_at) \
             VALUES (?1, ?2, ?3, '', ?4, ?5)",
            params![thread_id, user_id, status, now, now],
        )
        .context("insert_generation_run")?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_generation_run(&self, id: i64, status: &str, error: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let updated_at = now_str();
        conn.execute(
            "UPDATE generation_runs SET status = ?1, error = COALESCE(?2, error), \
             updated_at = ?3 WHERE id = ?4",
            params![status, error, updated_at, id],
        )
        .context("update_generation_run")?;
        Ok(())
    }

    pub fn get_generation_run(&self, id: i64) -> Result<Option<GenerationRun>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let result = conn
            .query_row(
                "SELECT id, thread_id, user_id, status, error, created_at, updated_at \
                 FROM generation_runs WHERE id = ?1",
                params![id],
                row_to_generation_run,
            )
            .optional()
            .context("get_generation_run")?;
        Ok(result)
    }

    /// Checkpoint one phase's output before the next phase starts.
    pub fn insert_generation_output(&self, run_id: i64, phase: &str, output: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let created_at = now_str();
        conn.execute(
            "INSERT INTO generation_outputs (run_id, phase, output, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![run_id, phase, output, created_at],
        )
        .context("insert_generation_output")?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_generation_outputs(&self, run_id: i64) -> Result<Vec<GenerationOutput>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(
            "SELECT id, run_id, phase, output, created_at \
             FROM generation_outputs WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let outputs = stmt
            .query_map(params![run_id], row_to_generation_output)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("get_generation_outputs")?;
        Ok(outputs)
    }

    // ── Config ────────────────────────────────────────────────────────────

    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let result = conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("get_config")?;
        Ok(result)
    }

    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let updated_at = now_str();
        conn.execute(
            "INSERT INTO config (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, updated_at],
        )
        .context("set_config")?;
        Ok(())
    }

    /// Write a config value only if the key is not already present.
    pub fn seed_config(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let updated_at = now_str();
        conn.execute(
            "INSERT OR IGNORE INTO config (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, updated_at],
        )
        .context("seed_config")?;
        Ok(())
    }
}
