//! autoblog-storage: SQLite-based persistence for the blog backend.
//!
//! Posts, the current generation settings and the autopilot state row are
//! stored as JSON documents, one table each.

use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use autoblog_types::{BlogPost, GenerationSettings, JobState};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Stored document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Blocking task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS posts (
        id TEXT PRIMARY KEY,
        date_sort TEXT NOT NULL,
        json TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS settings (
        id INTEGER PRIMARY KEY,
        json TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS autopilot (
        id INTEGER PRIMARY KEY,
        json TEXT NOT NULL
    );";

/// Single-row tables (settings, autopilot) always use this id.
const SINGLETON_ID: i64 = 1;

/// SQLite-based storage for posts, settings and autopilot state.
pub struct BlogStorage {
    conn: Arc<Mutex<Connection>>,
}

impl BlogStorage {
    /// Open (or create) the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!("Storage opened: {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing and single-session runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await?
    }

    // ─── Posts ───────────────────────────────────────────────

    /// Insert or replace a post.
    pub async fn upsert_post(&self, post: &BlogPost) -> Result<()> {
        let id = post.id.clone();
        let date_sort = post.created_at.to_rfc3339();
        let json = serde_json::to_string(post)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO posts (id, date_sort, json) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, date_sort, json],
            )?;
            Ok(())
        })
        .await
    }

    /// Get a post by id.
    pub async fn get_post(&self, id: &str) -> Result<Option<BlogPost>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT json FROM posts WHERE id = ?1",
                    rusqlite::params![id],
                    |row| row.get(0),
                )
                .optional()?;
            json.map(|j| decode(&j)).transpose()
        })
        .await
    }

    /// List all posts, newest first.
    pub async fn list_posts(&self) -> Result<Vec<BlogPost>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT json FROM posts ORDER BY date_sort DESC")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.iter().map(|j| decode(j)).collect()
        })
        .await
    }

    /// Delete a post. Returns false when it did not exist.
    pub async fn delete_post(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let count = conn.execute("DELETE FROM posts WHERE id = ?1", rusqlite::params![id])?;
            Ok(count > 0)
        })
        .await
    }

    // ─── Settings ────────────────────────────────────────────

    pub async fn load_settings(&self) -> Result<Option<GenerationSettings>> {
        self.load_singleton("settings").await
    }

    pub async fn save_settings(&self, settings: &GenerationSettings) -> Result<()> {
        self.save_singleton("settings", settings).await
    }

    // ─── Autopilot State ─────────────────────────────────────

    pub async fn load_autopilot_state(&self) -> Result<Option<JobState>> {
        self.load_singleton("autopilot").await
    }

    pub async fn save_autopilot_state(&self, state: &JobState) -> Result<()> {
        self.save_singleton("autopilot", state).await
    }

    async fn load_singleton<T>(&self, table: &'static str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.with_conn(move |conn| {
            let json: Option<String> = conn
                .query_row(
                    &format!("SELECT json FROM {table} WHERE id = ?1"),
                    rusqlite::params![SINGLETON_ID],
                    |row| row.get(0),
                )
                .optional()?;
            json.map(|j| decode(&j)).transpose()
        })
        .await
    }

    async fn save_singleton<T: Serialize>(&self, table: &'static str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.with_conn(move |conn| {
            conn.execute(
                &format!("INSERT OR REPLACE INTO {table} (id, json) VALUES (?1, ?2)"),
                rusqlite::params![SINGLETON_ID, json],
            )?;
            Ok(())
        })
        .await
    }
}

fn decode<T: DeserializeOwned>(json: &str) -> Result<T> {
    Ok(serde_json::from_str(json)?)
}
