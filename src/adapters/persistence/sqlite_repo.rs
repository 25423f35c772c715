//! SQLite-backed repository via libsql. Implements the chat registry, message store and
//! report store over one database file.
//!
//! Every call opens its own connection and commits before returning; nothing is held
//! across an await point of the caller.

use crate::domain::{Chat, DomainError, IncomingMessage, Message, NewReport, Report};
use crate::ports::{ChatRepository, MessageRepository, ReportRepository};
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database, Row, Value, params};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const CHATS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS chats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id INTEGER NOT NULL UNIQUE,
    name TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL
)"#;

const MESSAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id INTEGER NOT NULL,
    message_id INTEGER NOT NULL,
    sender_id INTEGER NOT NULL,
    sender_name TEXT NOT NULL,
    text TEXT NOT NULL,
    sent_at INTEGER NOT NULL,
    reactions_json TEXT,
    created_at INTEGER NOT NULL,
    UNIQUE (chat_id, message_id)
)"#;
const MESSAGES_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_messages_chat_sent ON messages (chat_id, sent_at)";

const REPORTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_ref INTEGER NOT NULL REFERENCES chats (id),
    report_date TEXT NOT NULL,
    questions_count INTEGER NOT NULL DEFAULT 0,
    answered_count INTEGER NOT NULL DEFAULT 0,
    unanswered_count INTEGER NOT NULL DEFAULT 0,
    avg_response_time_minutes REAL,
    report_text TEXT,
    sent_at INTEGER,
    created_at INTEGER NOT NULL
)"#;
const REPORTS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_reports_chat_date ON reports (chat_ref, report_date)";

const CHAT_COLUMNS: &str = "id, chat_id, name, enabled, created_at";
const MESSAGE_COLUMNS: &str =
    "id, chat_id, message_id, sender_id, sender_name, text, sent_at, reactions_json, created_at";
const REPORT_COLUMNS: &str = "id, chat_ref, report_date, questions_count, answered_count, \
     unanswered_count, avg_response_time_minutes, report_text, sent_at, created_at";

const DATE_FORMAT: &str = "%Y-%m-%d";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn open_conn(db: &Database) -> Result<Connection, DomainError> {
    let conn = db.connect().map_err(db_err)?;
    conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
    Ok(conn)
}

/// SQLite repository. One database file shared by all chats.
pub struct SqliteRepo {
    db: Database,
}

impl SqliteRepo {
    /// Connect to (or create) the database file and ensure the schema exists.
    /// Call this once at startup; the returned repo is safe to share via Arc.
    pub async fn connect(db_path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DomainError::Repo(e.to_string()))?;
        }
        let path_str = db_path.to_string_lossy();
        let db = libsql::Builder::new_local(path_str.as_ref())
            .build()
            .await
            .map_err(db_err)?;
        let conn = open_conn(&db)?;

        // PRAGMA returns a row; use query and drain it (execute fails when rows are returned).
        for pragma in ["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL"] {
            let mut rows = conn
                .query(pragma, ())
                .await
                .map_err(|e| DomainError::Repo(format!("{pragma} failed: {e}")))?;
            while rows.next().await.map_err(db_err)?.is_some() {}
        }

        for ddl in [
            CHATS_TABLE,
            MESSAGES_TABLE,
            MESSAGES_INDEX,
            REPORTS_TABLE,
            REPORTS_INDEX,
        ] {
            conn.execute(ddl, ()).await.map_err(db_err)?;
        }

        info!(path = %db_path.display(), "SQLite connected with WAL mode");

        Ok(Self { db })
    }

    /// Fresh connection that waits for a competing writer instead of failing with
    /// "database is locked".
    fn conn(&self) -> Result<Connection, DomainError> {
        open_conn(&self.db)
    }

    async fn query_chats(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Chat>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn.query(sql, params).await.map_err(db_err)?;
        let mut chats = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            chats.push(row_to_chat(&row)?);
        }
        Ok(chats)
    }

    async fn query_messages(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Message>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn.query(sql, params).await.map_err(db_err)?;
        let mut messages = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            messages.push(row_to_message(&row)?);
        }
        Ok(messages)
    }

    async fn query_reports(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Report>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn.query(sql, params).await.map_err(db_err)?;
        let mut reports = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            reports.push(row_to_report(&row)?);
        }
        Ok(reports)
    }
}

#[async_trait::async_trait]
impl ChatRepository for SqliteRepo {
    async fn upsert_chat(&self, chat_id: i64, name: &str) -> Result<Chat, DomainError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO chats (chat_id, name, enabled, created_at)
            VALUES (?1, ?2, 1, ?3)
            ON CONFLICT (chat_id) DO UPDATE SET
                name = excluded.name,
                enabled = 1
            "#,
            params![chat_id, name, Utc::now().timestamp()],
        )
        .await
        .map_err(db_err)?;
        info!(chat_id, name, "chat upserted");

        self.get_chat(chat_id)
            .await?
            .ok_or_else(|| DomainError::Repo(format!("chat {chat_id} missing after upsert")))
    }

    async fn get_chat(&self, chat_id: i64) -> Result<Option<Chat>, DomainError> {
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chats WHERE chat_id = ?1");
        Ok(self.query_chats(&sql, params![chat_id]).await?.into_iter().next())
    }

    async fn list_enabled(&self) -> Result<Vec<Chat>, DomainError> {
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chats WHERE enabled = 1 ORDER BY id");
        let chats = self.query_chats(&sql, ()).await?;
        debug!(count = chats.len(), "retrieved enabled chats");
        Ok(chats)
    }

    async fn list_all(&self) -> Result<Vec<Chat>, DomainError> {
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chats ORDER BY id");
        self.query_chats(&sql, ()).await
    }

    async fn set_enabled(
        &self,
        chat_id: i64,
        enabled: bool,
    ) -> Result<Option<Chat>, DomainError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE chats SET enabled = ?1 WHERE chat_id = ?2",
                params![enabled as i64, chat_id],
            )
            .await
            .map_err(db_err)?;
        if changed == 0 {
            return Ok(None);
        }
        info!(chat_id, enabled, "chat enabled status updated");
        self.get_chat(chat_id).await
    }

    async fn delete_chat(&self, chat_id: i64) -> Result<bool, DomainError> {
        let Some(chat) = self.get_chat(chat_id).await? else {
            return Ok(false);
        };
        let conn = self.conn()?;
        let tx = conn.transaction().await.map_err(db_err)?;
        let reports = tx
            .execute("DELETE FROM reports WHERE chat_ref = ?1", params![chat.id])
            .await
            .map_err(db_err)?;
        let messages = tx
            .execute("DELETE FROM messages WHERE chat_id = ?1", params![chat_id])
            .await
            .map_err(db_err)?;
        tx.execute("DELETE FROM chats WHERE id = ?1", params![chat.id])
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        info!(chat_id, reports, messages, "chat deleted");
        Ok(true)
    }
}

#[async_trait::async_trait]
impl MessageRepository for SqliteRepo {
    async fn save_message(&self, message: &IncomingMessage) -> Result<Message, DomainError> {
        let conn = self.conn()?;
        let inserted = conn
            .execute(
                r#"
                INSERT INTO messages
                    (chat_id, message_id, sender_id, sender_name, text, sent_at, reactions_json, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7)
                ON CONFLICT (chat_id, message_id) DO NOTHING
                "#,
                params![
                    message.chat_id,
                    message.message_id,
                    message.sender_id,
                    message.sender_name.as_str(),
                    message.text.as_str(),
                    message.sent_at,
                    Utc::now().timestamp()
                ],
            )
            .await
            .map_err(db_err)?;
        if inserted == 0 {
            debug!(
                chat_id = message.chat_id,
                message_id = message.message_id,
                "duplicate message ignored"
            );
        }

        self.get_message(message.chat_id, message.message_id)
            .await?
            .ok_or_else(|| {
                DomainError::Repo(format!(
                    "message {}/{} missing after insert",
                    message.chat_id, message.message_id
                ))
            })
    }

    async fn get_messages_between(
        &self,
        chat_id: i64,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Message>, DomainError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE chat_id = ?1 AND sent_at >= ?2 AND sent_at < ?3 \
             ORDER BY sent_at ASC, message_id ASC"
        );
        let messages = self
            .query_messages(
                &sql,
                params![chat_id, since.timestamp(), until.timestamp()],
            )
            .await?;
        debug!(chat_id, count = messages.len(), "retrieved message window");
        Ok(messages)
    }

    async fn get_message(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Option<Message>, DomainError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = ?1 AND message_id = ?2"
        );
        Ok(self
            .query_messages(&sql, params![chat_id, message_id])
            .await?
            .into_iter()
            .next())
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM messages WHERE sent_at < ?1",
                params![cutoff.timestamp()],
            )
            .await
            .map_err(db_err)?;
        info!(deleted, cutoff = %cutoff, "deleted old messages");
        Ok(deleted)
    }

    async fn count_messages(&self, chat_id: Option<i64>) -> Result<u64, DomainError> {
        let conn = self.conn()?;
        let mut rows = match chat_id {
            Some(id) => conn
                .query("SELECT COUNT(*) FROM messages WHERE chat_id = ?1", params![id])
                .await
                .map_err(db_err)?,
            None => conn
                .query("SELECT COUNT(*) FROM messages", ())
                .await
                .map_err(db_err)?,
        };
        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)? as u64),
            None => Ok(0),
        }
    }
}

#[async_trait::async_trait]
impl ReportRepository for SqliteRepo {
    async fn create_report(&self, report: &NewReport) -> Result<Report, DomainError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO reports
                (chat_ref, report_date, questions_count, answered_count, unanswered_count,
                 avg_response_time_minutes, report_text, sent_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                report.chat_ref,
                report.report_date.format(DATE_FORMAT).to_string(),
                report.questions_count as i64,
                report.answered_count as i64,
                report.unanswered_count as i64,
                report.avg_response_time_minutes,
                report.report_text.clone(),
                report.sent_at,
                Utc::now().timestamp()
            ],
        )
        .await
        .map_err(db_err)?;
        let id = conn.last_insert_rowid();
        debug!(report_id = id, chat_ref = report.chat_ref, "report created");

        self.get_report(id)
            .await?
            .ok_or_else(|| DomainError::Repo(format!("report {id} missing after insert")))
    }

    async fn get_report(&self, report_id: i64) -> Result<Option<Report>, DomainError> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1");
        Ok(self
            .query_reports(&sql, params![report_id])
            .await?
            .into_iter()
            .next())
    }

    async fn get_by_chat_and_date(
        &self,
        chat_ref: i64,
        report_date: NaiveDate,
    ) -> Result<Option<Report>, DomainError> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM reports \
             WHERE chat_ref = ?1 AND report_date = ?2 ORDER BY id DESC LIMIT 1"
        );
        Ok(self
            .query_reports(
                &sql,
                params![chat_ref, report_date.format(DATE_FORMAT).to_string()],
            )
            .await?
            .into_iter()
            .next())
    }

    async fn get_recent_by_chat(
        &self,
        chat_ref: i64,
        limit: u32,
    ) -> Result<Vec<Report>, DomainError> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM reports \
             WHERE chat_ref = ?1 ORDER BY report_date DESC, id DESC LIMIT ?2"
        );
        self.query_reports(&sql, params![chat_ref, limit as i64])
            .await
    }

    async fn mark_sent(
        &self,
        report_id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<Option<Report>, DomainError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE reports SET sent_at = ?1 WHERE id = ?2",
                params![sent_at.timestamp(), report_id],
            )
            .await
            .map_err(db_err)?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_report(report_id).await
    }

    async fn delete_report(&self, report_id: i64) -> Result<bool, DomainError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute("DELETE FROM reports WHERE id = ?1", params![report_id])
            .await
            .map_err(db_err)?;
        Ok(deleted > 0)
    }

    async fn delete_reports_before(
        &self,
        chat_ref: i64,
        before: NaiveDate,
    ) -> Result<u64, DomainError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM reports WHERE chat_ref = ?1 AND report_date < ?2",
            params![chat_ref, before.format(DATE_FORMAT).to_string()],
        )
        .await
        .map_err(db_err)
    }

    async fn delete_all_reports_before(&self, before: NaiveDate) -> Result<u64, DomainError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM reports WHERE report_date < ?1",
                params![before.format(DATE_FORMAT).to_string()],
            )
            .await
            .map_err(db_err)?;
        info!(deleted, before = %before, "deleted old reports");
        Ok(deleted)
    }
}

fn db_err(e: libsql::Error) -> DomainError {
    DomainError::Repo(e.to_string())
}

fn opt_text(row: &Row, idx: i32) -> Result<Option<String>, DomainError> {
    match row.get_value(idx).map_err(db_err)? {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        other => Err(DomainError::Repo(format!(
            "column {idx}: expected text, got {other:?}"
        ))),
    }
}

fn opt_int(row: &Row, idx: i32) -> Result<Option<i64>, DomainError> {
    match row.get_value(idx).map_err(db_err)? {
        Value::Null => Ok(None),
        Value::Integer(n) => Ok(Some(n)),
        other => Err(DomainError::Repo(format!(
            "column {idx}: expected integer, got {other:?}"
        ))),
    }
}

fn opt_real(row: &Row, idx: i32) -> Result<Option<f64>, DomainError> {
    match row.get_value(idx).map_err(db_err)? {
        Value::Null => Ok(None),
        Value::Real(x) => Ok(Some(x)),
        Value::Integer(n) => Ok(Some(n as f64)),
        other => Err(DomainError::Repo(format!(
            "column {idx}: expected real, got {other:?}"
        ))),
    }
}

fn row_to_chat(row: &Row) -> Result<Chat, DomainError> {
    Ok(Chat {
        id: row.get(0).map_err(db_err)?,
        chat_id: row.get(1).map_err(db_err)?,
        name: row.get(2).map_err(db_err)?,
        enabled: row.get::<i64>(3).map_err(db_err)? != 0,
        created_at: row.get(4).map_err(db_err)?,
    })
}

fn row_to_message(row: &Row) -> Result<Message, DomainError> {
    let reactions: Option<BTreeMap<String, u32>> =
        opt_text(row, 7)?.and_then(|json| serde_json::from_str(&json).ok());
    Ok(Message {
        id: row.get(0).map_err(db_err)?,
        chat_id: row.get(1).map_err(db_err)?,
        message_id: row.get(2).map_err(db_err)?,
        sender_id: row.get(3).map_err(db_err)?,
        sender_name: row.get(4).map_err(db_err)?,
        text: row.get(5).map_err(db_err)?,
        sent_at: row.get(6).map_err(db_err)?,
        reactions,
        created_at: row.get(8).map_err(db_err)?,
    })
}

fn row_to_report(row: &Row) -> Result<Report, DomainError> {
    let date: String = row.get(2).map_err(db_err)?;
    let report_date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
        .map_err(|e| DomainError::Repo(format!("bad report_date '{date}': {e}")))?;
    Ok(Report {
        id: row.get(0).map_err(db_err)?,
        chat_ref: row.get(1).map_err(db_err)?,
        report_date,
        questions_count: row.get::<i64>(3).map_err(db_err)? as u32,
        answered_count: row.get::<i64>(4).map_err(db_err)? as u32,
        unanswered_count: row.get::<i64>(5).map_err(db_err)? as u32,
        avg_response_time_minutes: opt_real(row, 6)?,
        report_text: opt_text(row, 7)?,
        sent_at: opt_int(row, 8)?,
        created_at: row.get(9).map_err(db_err)?,
    })
}
