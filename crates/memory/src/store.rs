//! SQLite storage backend for memories and tasks.
//!
//! Uses a single database file with four tables:
//! - `memories` — structured memory entries
//! - `memories_fts` — FTS5 virtual table for ranked keyword search (BM25)
//! - `tasks` — tasks and reminders with optional due dates
//! - `meta` — store-level key/value scratch
//!
//! Triggers keep the FTS index in sync on insert/update/delete.
//! The store holds exactly one connection (WAL mode, 5 s busy timeout)
//! and is the sole owner of it; other components go through this facade.

use chrono::Utc;
use opencrank_core::error::MemoryError;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Sentinel used so tasks without a due date sort after all dated ones.
const NO_DUE_DATE_SENTINEL: i64 = 9_999_999_999_999;

/// A structured memory entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// UUIDv4, generated on save when empty
    pub id: String,
    pub content: String,
    /// Defaults to "general"
    pub category: String,
    /// Comma-joined tags
    pub tags: String,
    pub channel: String,
    pub user_id: String,
    /// 1..=10, default 5; drives ranking alongside BM25
    pub importance: i32,
    /// ms since epoch
    pub created_at: i64,
    /// ms since epoch, stamped on every save
    pub updated_at: i64,
}

impl MemoryEntry {
    /// A new entry with defaults matching the schema defaults.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            content: content.into(),
            category: "general".into(),
            tags: String::new(),
            channel: String::new(),
            user_id: String::new(),
            importance: 5,
            created_at: 0,
            updated_at: 0,
        }
    }
}

/// A memory search hit: the full entry, the raw BM25 rank from the FTS
/// index (lower is better), and an FTS snippet with the match marked.
#[derive(Debug, Clone)]
pub struct MemorySearchHit {
    pub entry: MemoryEntry,
    pub score: f64,
    pub snippet: String,
}

/// A task or reminder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryTask {
    pub id: String,
    pub content: String,
    pub context: String,
    pub channel: String,
    pub user_id: String,
    /// ms since epoch
    pub created_at: i64,
    /// ms since epoch; 0 = no due date
    pub due_at: i64,
    pub completed: bool,
    pub completed_at: i64,
}

impl MemoryTask {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// A task is due iff not completed and its due date has passed.
    pub fn is_due(&self, now_ms: i64) -> bool {
        !self.completed && self.due_at > 0 && self.due_at <= now_ms
    }
}

/// The SQLite memory store facade.
pub struct MemoryStore {
    pool: SqlitePool,
}

impl MemoryStore {
    /// Open (or create) the database at `path`.
    ///
    /// Creates parent directories as needed, enables WAL mode with
    /// `synchronous=NORMAL` and a 5-second busy timeout, and
    /// idempotently initializes the schema.
    pub async fn open(path: &str) -> Result<Self, MemoryError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!("Failed to create parent directory: {e}"))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let store = Self::open_with(options).await?;
        info!("Memory store opened at {path}");
        Ok(store)
    }

    /// Open an in-process ephemeral database (used by tests).
    pub async fn open_in_memory() -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?;
        Self::open_with(options).await
    }

    async fn open_with(options: SqliteConnectOptions) -> Result<Self, MemoryError> {
        let options = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // The facade owns exactly one connection; callers serialize access.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Release the connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn init_schema(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id          TEXT PRIMARY KEY,
                content     TEXT NOT NULL,
                category    TEXT DEFAULT 'general',
                tags        TEXT DEFAULT '',
                channel     TEXT DEFAULT '',
                user_id     TEXT DEFAULT '',
                importance  INTEGER DEFAULT 5,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("memories table: {e}")))?;

        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
                content, category, tags,
                tokenize='porter unicode61'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("FTS5 table: {e}")))?;

        // Triggers keep the FTS index rowid-aligned with memories.rowid.
        // save_memory upserts via ON CONFLICT DO UPDATE, so the update
        // trigger covers the replace path without recursive triggers.
        for (name, sql) in [
            (
                "insert trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
                    INSERT INTO memories_fts(rowid, content, category, tags)
                    VALUES (NEW.rowid, NEW.content, NEW.category, NEW.tags);
                END
                "#,
            ),
            (
                "update trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
                    DELETE FROM memories_fts WHERE rowid = OLD.rowid;
                    INSERT INTO memories_fts(rowid, content, category, tags)
                    VALUES (NEW.rowid, NEW.content, NEW.category, NEW.tags);
                END
                "#,
            ),
            (
                "delete trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
                    DELETE FROM memories_fts WHERE rowid = OLD.rowid;
                END
                "#,
            ),
        ] {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::MigrationFailed(format!("{name}: {e}")))?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id           TEXT PRIMARY KEY,
                content      TEXT NOT NULL,
                context      TEXT DEFAULT '',
                channel      TEXT DEFAULT '',
                user_id      TEXT DEFAULT '',
                created_at   INTEGER NOT NULL,
                due_at       INTEGER DEFAULT 0,
                completed    INTEGER DEFAULT 0,
                completed_at INTEGER DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("tasks table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key   TEXT PRIMARY KEY,
                value TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("meta table: {e}")))?;

        for sql in [
            "CREATE INDEX IF NOT EXISTS idx_tasks_completed ON tasks(completed)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(due_at)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_channel ON tasks(channel)",
            "CREATE INDEX IF NOT EXISTS idx_memories_category ON memories(category)",
            "CREATE INDEX IF NOT EXISTS idx_memories_updated ON memories(updated_at)",
        ] {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::MigrationFailed(format!("index: {e}")))?;
        }

        debug!("Memory store schema initialized");
        Ok(())
    }

    /// Current wall time in ms since epoch.
    pub fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ------------------------------------------------------------------
    // Memory operations
    // ------------------------------------------------------------------

    /// Save a memory entry, upserting by id.
    ///
    /// Generates a UUIDv4 id when none is set and stamps `updated_at`
    /// with the current wall time. Returns the entry's id.
    pub async fn save_memory(&self, entry: &MemoryEntry) -> Result<String, MemoryError> {
        let id = if entry.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            entry.id.clone()
        };
        let now = Self::now_ms();
        let created = if entry.created_at > 0 {
            entry.created_at
        } else {
            now
        };
        let category = if entry.category.is_empty() {
            "general"
        } else {
            entry.category.as_str()
        };

        sqlx::query(
            r#"
            INSERT INTO memories
                (id, content, category, tags, channel, user_id, importance, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                category = excluded.category,
                tags = excluded.tags,
                channel = excluded.channel,
                user_id = excluded.user_id,
                importance = excluded.importance,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id)
        .bind(&entry.content)
        .bind(category)
        .bind(&entry.tags)
        .bind(&entry.channel)
        .bind(&entry.user_id)
        .bind(entry.importance)
        .bind(created)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("save_memory: {e}")))?;

        debug!(id = %id, category = %category, importance = entry.importance, "Saved memory");
        Ok(id)
    }

    /// Build a safe FTS5 MATCH expression from user text.
    ///
    /// Strips characters that are special in FTS5 syntax from each
    /// whitespace-separated token and joins the quoted tokens with OR.
    /// Returns an empty string when nothing survives sanitization.
    fn sanitize_fts_query(text: &str) -> String {
        text.split_whitespace()
            .filter_map(|word| {
                let clean: String = word
                    .chars()
                    .filter(|c| !matches!(c, '"' | '\'' | '*' | '(' | ')'))
                    .collect();
                if clean.is_empty() {
                    None
                } else {
                    Some(format!("\"{clean}\""))
                }
            })
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    /// BM25-ranked full-text search over memories.
    ///
    /// Per-column weights: content 1.0, category 0.5, tags 0.3.
    /// The returned score is the raw BM25 rank — lower is a better
    /// match. An empty sanitized query returns no rows rather than an
    /// FTS syntax error.
    pub async fn search_memories(
        &self,
        query: &str,
        max_results: i64,
        category_filter: Option<&str>,
    ) -> Result<Vec<MemorySearchHit>, MemoryError> {
        let safe_query = Self::sanitize_fts_query(query);
        if safe_query.is_empty() {
            return Ok(Vec::new());
        }

        let sql = if category_filter.is_some() {
            r#"
            SELECT m.id, m.content, m.category, m.tags, m.channel, m.user_id,
                   m.importance, m.created_at, m.updated_at,
                   bm25(memories_fts, 1.0, 0.5, 0.3) AS score,
                   snippet(memories_fts, 0, '<b>', '</b>', '...', 64) AS snip
            FROM memories_fts f
            JOIN memories m ON m.rowid = f.rowid
            WHERE memories_fts MATCH ?1 AND m.category = ?2
            ORDER BY score
            LIMIT ?3
            "#
        } else {
            r#"
            SELECT m.id, m.content, m.category, m.tags, m.channel, m.user_id,
                   m.importance, m.created_at, m.updated_at,
                   bm25(memories_fts, 1.0, 0.5, 0.3) AS score,
                   snippet(memories_fts, 0, '<b>', '</b>', '...', 64) AS snip
            FROM memories_fts f
            JOIN memories m ON m.rowid = f.rowid
            WHERE memories_fts MATCH ?1
            ORDER BY score
            LIMIT ?2
            "#
        };

        let mut db_query = sqlx::query(sql).bind(&safe_query);
        if let Some(category) = category_filter {
            db_query = db_query.bind(category);
        }
        let rows = db_query
            .bind(max_results)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("search_memories: {e}")))?;

        let hits = rows
            .iter()
            .map(|row| {
                Ok(MemorySearchHit {
                    entry: Self::row_to_entry(row)?,
                    score: row
                        .try_get("score")
                        .map_err(|e| MemoryError::QueryFailed(format!("score column: {e}")))?,
                    snippet: row.try_get("snip").unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, MemoryError>>()?;

        debug!(query = %query, hits = hits.len(), "Memory search");
        Ok(hits)
    }

    /// Fetch a memory entry by id. `None` when absent.
    pub async fn get_memory(&self, id: &str) -> Result<Option<MemoryEntry>, MemoryError> {
        let row = sqlx::query(
            "SELECT id, content, category, tags, channel, user_id, importance, created_at, updated_at \
             FROM memories WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("get_memory: {e}")))?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    /// Most recently updated entries, optionally filtered by category.
    pub async fn get_recent_memories(
        &self,
        limit: i64,
        category_filter: Option<&str>,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let sql = if category_filter.is_some() {
            "SELECT id, content, category, tags, channel, user_id, importance, created_at, updated_at \
             FROM memories WHERE category = ?1 ORDER BY updated_at DESC LIMIT ?2"
        } else {
            "SELECT id, content, category, tags, channel, user_id, importance, created_at, updated_at \
             FROM memories ORDER BY updated_at DESC LIMIT ?1"
        };

        let mut db_query = sqlx::query(sql);
        if let Some(category) = category_filter {
            db_query = db_query.bind(category);
        }
        let rows = db_query
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("get_recent_memories: {e}")))?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    /// Delete a memory entry. Returns true when a row was removed.
    pub async fn delete_memory(&self, id: &str) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM memories WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("delete_memory: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryEntry, MemoryError> {
        let get_text = |col: &str| -> Result<String, MemoryError> {
            row.try_get::<String, _>(col)
                .map_err(|e| MemoryError::QueryFailed(format!("{col} column: {e}")))
        };
        Ok(MemoryEntry {
            id: get_text("id")?,
            content: get_text("content")?,
            category: get_text("category")?,
            tags: get_text("tags")?,
            channel: get_text("channel")?,
            user_id: get_text("user_id")?,
            importance: row
                .try_get("importance")
                .map_err(|e| MemoryError::QueryFailed(format!("importance column: {e}")))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?,
            updated_at: row
                .try_get("updated_at")
                .map_err(|e| MemoryError::QueryFailed(format!("updated_at column: {e}")))?,
        })
    }

    // ------------------------------------------------------------------
    // Task operations
    // ------------------------------------------------------------------

    /// Create a task. Generates a UUIDv4 id when none is set and
    /// returns the task's id.
    pub async fn create_task(&self, task: &MemoryTask) -> Result<String, MemoryError> {
        let id = if task.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            task.id.clone()
        };
        let now = Self::now_ms();
        let created = if task.created_at > 0 {
            task.created_at
        } else {
            now
        };

        sqlx::query(
            r#"
            INSERT INTO tasks
                (id, content, context, channel, user_id, created_at, due_at, completed, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0)
            "#,
        )
        .bind(&id)
        .bind(&task.content)
        .bind(&task.context)
        .bind(&task.channel)
        .bind(&task.user_id)
        .bind(created)
        .bind(task.due_at)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("create_task: {e}")))?;

        debug!(id = %id, "Created task");
        Ok(id)
    }

    /// List tasks, soonest due date first, then newest created.
    /// Tasks without a due date sort after all dated ones.
    pub async fn list_tasks(
        &self,
        include_completed: bool,
        channel_filter: Option<&str>,
    ) -> Result<Vec<MemoryTask>, MemoryError> {
        let mut sql = String::from(
            "SELECT id, content, context, channel, user_id, created_at, due_at, completed, completed_at \
             FROM tasks",
        );
        let mut conditions = Vec::new();
        if !include_completed {
            conditions.push("completed = 0".to_string());
        }
        if channel_filter.is_some() {
            conditions.push("channel = ?1".to_string());
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(
            " ORDER BY CASE WHEN due_at > 0 THEN due_at ELSE {NO_DUE_DATE_SENTINEL} END ASC, created_at DESC"
        ));

        let mut db_query = sqlx::query(&sql);
        if let Some(channel) = channel_filter {
            db_query = db_query.bind(channel);
        }
        let rows = db_query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("list_tasks: {e}")))?;

        rows.iter().map(Self::row_to_task).collect()
    }

    /// Fetch a task by id. `None` when absent.
    pub async fn get_task(&self, id: &str) -> Result<Option<MemoryTask>, MemoryError> {
        let row = sqlx::query(
            "SELECT id, content, context, channel, user_id, created_at, due_at, completed, completed_at \
             FROM tasks WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("get_task: {e}")))?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    /// Mark a task as completed, stamping `completed_at`.
    /// Returns true when a row was updated.
    pub async fn complete_task(&self, id: &str) -> Result<bool, MemoryError> {
        let result = sqlx::query("UPDATE tasks SET completed = 1, completed_at = ?1 WHERE id = ?2")
            .bind(Self::now_ms())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("complete_task: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a task. Returns true when a row was removed.
    pub async fn delete_task(&self, id: &str) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("delete_task: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    /// Incomplete tasks whose due date has passed, soonest first.
    pub async fn due_tasks(&self) -> Result<Vec<MemoryTask>, MemoryError> {
        let rows = sqlx::query(
            "SELECT id, content, context, channel, user_id, created_at, due_at, completed, completed_at \
             FROM tasks WHERE completed = 0 AND due_at > 0 AND due_at <= ?1 \
             ORDER BY due_at ASC",
        )
        .bind(Self::now_ms())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("due_tasks: {e}")))?;

        rows.iter().map(Self::row_to_task).collect()
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryTask, MemoryError> {
        let get_text = |col: &str| -> Result<String, MemoryError> {
            row.try_get::<String, _>(col)
                .map_err(|e| MemoryError::QueryFailed(format!("{col} column: {e}")))
        };
        let get_int = |col: &str| -> Result<i64, MemoryError> {
            row.try_get::<i64, _>(col)
                .map_err(|e| MemoryError::QueryFailed(format!("{col} column: {e}")))
        };
        Ok(MemoryTask {
            id: get_text("id")?,
            content: get_text("content")?,
            context: get_text("context")?,
            channel: get_text("channel")?,
            user_id: get_text("user_id")?,
            created_at: get_int("created_at")?,
            due_at: get_int("due_at")?,
            completed: get_int("completed")? != 0,
            completed_at: get_int("completed_at")?,
        })
    }

    // ------------------------------------------------------------------
    // Meta operations
    // ------------------------------------------------------------------

    /// Set a store-level key/value pair (upsert).
    pub async fn set_meta(&self, key: &str, value: &str) -> Result<(), MemoryError> {
        sqlx::query(
            "INSERT INTO meta (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("set_meta: {e}")))?;
        Ok(())
    }

    /// Get a store-level value. `None` when absent.
    pub async fn get_meta(&self, key: &str) -> Result<Option<String>, MemoryError> {
        let row = sqlx::query("SELECT value FROM meta WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("get_meta: {e}")))?;
        Ok(row.and_then(|r| r.try_get("value").ok()))
    }

    /// Remove a store-level key. Returns true when a row was removed.
    pub async fn delete_meta(&self, key: &str) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM meta WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("delete_meta: {e}")))?;
        Ok(result.rows_affected() > 0)
    }
}
