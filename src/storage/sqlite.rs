//! SQLite-backed implementation of the record stores
//!
//! One [`SqliteStore`] implements [`ContentStore`], [`SubscriberStore`] and
//! [`TopicStore`] over a single connection. Scheduled times are persisted as
//! UTC epoch milliseconds, so sub-millisecond precision is dropped on save.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::repository::{ContentStore, SubscriberStore, TopicStore};
use super::{StoreError, StoreResult};
use crate::models::{Content, ContentStatus, Subscriber, Topic};

const CONTENT_SELECT: &str = "SELECT c.id, c.status, c.text, c.scheduled_time_ms, c.sent, t.id, t.name
     FROM content c JOIN topics t ON t.id = c.topic_id";

impl ToSql for ContentStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ContentStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        ContentStatus::parse(raw)
            .ok_or_else(|| FromSqlError::Other(format!("unknown content status '{raw}'").into()))
    }
}

/// SQLite store shared by the dispatcher, the publisher and the CLI
///
/// Statements run on the blocking thread pool; the connection is guarded by a
/// `Mutex` so clones of the store can be handed to several tasks.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self::from_connection(conn)?;
        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn create_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        r#"
            CREATE TABLE IF NOT EXISTS topics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS subscribers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL,
                topic_id INTEGER NOT NULL REFERENCES topics(id),
                UNIQUE (email, topic_id)
            );

            CREATE TABLE IF NOT EXISTS content (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                status TEXT NOT NULL DEFAULT 'PENDING',
                text TEXT NOT NULL,
                scheduled_time_ms INTEGER NOT NULL,
                sent INTEGER NOT NULL DEFAULT 0,
                topic_id INTEGER NOT NULL REFERENCES topics(id)
            );

            CREATE INDEX IF NOT EXISTS idx_content_status_time
                ON content(status, scheduled_time_ms);

            CREATE INDEX IF NOT EXISTS idx_subscribers_topic
                ON subscribers(topic_id);
            "#,
    )?;
    Ok(())
}

fn millis_to_utc(column: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(column, ms))
}

fn content_from_row(row: &Row<'_>) -> rusqlite::Result<Content> {
    Ok(Content {
        id: row.get(0)?,
        status: row.get(1)?,
        text: row.get(2)?,
        scheduled_time: millis_to_utc(3, row.get(3)?)?,
        sent: row.get(4)?,
        topic: Topic {
            id: row.get(5)?,
            name: row.get(6)?,
        },
    })
}

fn topic_id(topic: &Topic) -> StoreResult<i64> {
    topic
        .id
        .ok_or_else(|| StoreError::invalid(format!("topic '{}' has not been saved", topic.name)))
}

fn upsert_content(conn: &Connection, mut content: Content) -> StoreResult<Content> {
    let topic_id = topic_id(&content.topic)?;
    let scheduled_ms = content.scheduled_time.timestamp_millis();

    match content.id {
        Some(id) => {
            conn.execute(
                "INSERT INTO content (id, status, text, scheduled_time_ms, sent, topic_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                     status = excluded.status,
                     text = excluded.text,
                     scheduled_time_ms = excluded.scheduled_time_ms,
                     sent = excluded.sent",
                params![id, content.status, content.text, scheduled_ms, content.sent, topic_id],
            )?;
        }
        None => {
            conn.execute(
                "INSERT INTO content (status, text, scheduled_time_ms, sent, topic_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![content.status, content.text, scheduled_ms, content.sent, topic_id],
            )?;
            content.id = Some(conn.last_insert_rowid());
        }
    }

    Ok(content)
}

fn insert_subscriber(conn: &Connection, mut subscriber: Subscriber) -> StoreResult<Subscriber> {
    let topic_id = topic_id(&subscriber.topic)?;
    let inserted = conn.execute(
        "INSERT INTO subscribers (email, topic_id) VALUES (?1, ?2)",
        params![subscriber.email, topic_id],
    );

    match inserted {
        Ok(_) => {
            subscriber.id = Some(conn.last_insert_rowid());
            Ok(subscriber)
        }
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            Err(StoreError::DuplicateSubscriber {
                email: subscriber.email,
                topic: subscriber.topic.name,
            })
        }
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// ContentStore
// ============================================================================

#[async_trait]
impl ContentStore for SqliteStore {
    async fn find_pending(
        &self,
        status: ContentStatus,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> StoreResult<Vec<Content>> {
        let start_ms = window_start.timestamp_millis();
        let end_ms = window_end.timestamp_millis();

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "{CONTENT_SELECT}
                 WHERE c.status = ?1 AND c.scheduled_time_ms BETWEEN ?2 AND ?3
                 ORDER BY c.scheduled_time_ms, c.id"
            ))?;
            let rows = stmt.query_map(params![status, start_ms, end_ms], content_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn save(&self, content: Content) -> StoreResult<Content> {
        self.with_conn(move |conn| upsert_content(conn, content)).await
    }

    async fn save_all(&self, contents: Vec<Content>) -> StoreResult<Vec<Content>> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let saved = contents
                .into_iter()
                .map(|c| upsert_content(&tx, c))
                .collect::<StoreResult<Vec<_>>>()?;
            tx.commit()?;
            Ok(saved)
        })
        .await
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Content>> {
        self.with_conn(move |conn| {
            let content = conn
                .query_row(
                    &format!("{CONTENT_SELECT} WHERE c.id = ?1"),
                    params![id],
                    content_from_row,
                )
                .optional()?;
            Ok(content)
        })
        .await
    }

    async fn find_all(&self) -> StoreResult<Vec<Content>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!("{CONTENT_SELECT} ORDER BY c.id"))?;
            let rows = stmt.query_map([], content_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }
}

// ============================================================================
// SubscriberStore
// ============================================================================

#[async_trait]
impl SubscriberStore for SqliteStore {
    async fn find_by_topic(&self, topic: &Topic) -> StoreResult<Vec<Subscriber>> {
        let Some(topic_id) = topic.id else {
            return Ok(Vec::new());
        };
        let topic = topic.clone();

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, email FROM subscribers WHERE topic_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![topic_id], |row| {
                Ok(Subscriber {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    topic: topic.clone(),
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn save(&self, subscriber: Subscriber) -> StoreResult<Subscriber> {
        self.with_conn(move |conn| insert_subscriber(conn, subscriber))
            .await
    }

    async fn save_all(&self, subscribers: Vec<Subscriber>) -> StoreResult<Vec<Subscriber>> {
        self.with_conn(move |conn| {
            // Dropping the transaction on error rolls the whole batch back
            let tx = conn.transaction()?;
            let saved = subscribers
                .into_iter()
                .map(|s| insert_subscriber(&tx, s))
                .collect::<StoreResult<Vec<_>>>()?;
            tx.commit()?;
            Ok(saved)
        })
        .await
    }
}

// ============================================================================
// TopicStore
// ============================================================================

#[async_trait]
impl TopicStore for SqliteStore {
    async fn save(&self, mut topic: Topic) -> StoreResult<Topic> {
        self.with_conn(move |conn| {
            match topic.id {
                Some(id) => {
                    conn.execute(
                        "INSERT INTO topics (id, name) VALUES (?1, ?2)
                         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                        params![id, topic.name],
                    )?;
                }
                None => {
                    conn.execute("INSERT INTO topics (name) VALUES (?1)", params![topic.name])?;
                    topic.id = Some(conn.last_insert_rowid());
                }
            }
            Ok(topic)
        })
        .await
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Topic>> {
        self.with_conn(move |conn| {
            let topic = conn
                .query_row(
                    "SELECT id, name FROM topics WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(Topic {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(topic)
        })
        .await
    }

    async fn find_all(&self) -> StoreResult<Vec<Topic>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached("SELECT id, name FROM topics ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok(Topic {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }
}
