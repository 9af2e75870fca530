use crate::error::Error;
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_rusqlite::Connection;

/// How the store identifies this client in recorded rows.
const CLIENT_HOST: &str = "linkaudit@localhost";

/// One row of query-log evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub event_time: String,
    pub user_host: String,
    pub argument: String,
}

/// Marker position bracketing one replayed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkPhase {
    Start,
    End,
}

impl MarkPhase {
    fn as_str(&self) -> &'static str {
        match self {
            MarkPhase::Start => "start",
            MarkPhase::End => "end",
        }
    }
}

/// The audit-log-bearing store, read for evidence and poked with marker
/// statements that bracket each replayed action's time window.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Emit a marker statement carrying the browse id.
    async fn mark(&self, phase: MarkPhase, browse_id: &str) -> Result<(), Error>;

    /// Rows whose event time falls inside the browse id's minute window
    /// and whose statement text contains the id. Zero rows is a valid
    /// answer, not an error.
    async fn evidence(&self, browse_id: &str) -> Result<Vec<LogRow>, Error>;
}

/// SQLite-backed store. Every marker statement it executes is also
/// recorded into the log table, standing in for a server-side general
/// query log that captures client statements as they arrive.
pub struct SqliteAuditStore {
    conn: Connection,
    table: String,
}

impl SqliteAuditStore {
    /// Open (or create) a file-backed store.
    pub async fn open(path: impl AsRef<Path>, table: &str) -> Result<Self, Error> {
        let conn = Connection::open(path.as_ref().to_path_buf()).await?;
        Self::with_connection(conn, table).await
    }

    /// An in-memory store holding only this run's marker statements.
    pub async fn in_memory(table: &str) -> Result<Self, Error> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn, table).await
    }

    async fn with_connection(conn: Connection, table: &str) -> Result<Self, Error> {
        let table = table.to_string();
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                event_time TEXT NOT NULL,
                user_host TEXT NOT NULL,
                argument TEXT NOT NULL
            )"
        );
        conn.call(move |conn| {
            conn.execute(&ddl, [])?;
            Ok(())
        })
        .await?;
        Ok(Self { conn, table })
    }

    /// Insert a row directly, as a server-side component would.
    #[cfg(test)]
    async fn insert_row(&self, row: LogRow) -> Result<(), Error> {
        let table = self.table.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO {table} (event_time, user_host, argument)
                         VALUES (?1, ?2, ?3)"
                    ),
                    params![row.event_time, row.user_host, row.argument],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn mark(&self, phase: MarkPhase, browse_id: &str) -> Result<(), Error> {
        let statement = format!("SELECT 1 -- {} browse: {}", phase.as_str(), browse_id);
        let table = self.table.clone();
        let event_time = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.conn
            .call(move |conn| {
                conn.query_row(&statement, [], |_| Ok(()))?;
                conn.execute(
                    &format!(
                        "INSERT INTO {table} (event_time, user_host, argument)
                         VALUES (?1, ?2, ?3)"
                    ),
                    params![event_time, CLIENT_HOST, statement],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn evidence(&self, browse_id: &str) -> Result<Vec<LogRow>, Error> {
        let Some(window) = window_start(browse_id) else {
            ::log::warn!("browse id {browse_id:?} has no parsable timestamp");
            return Ok(Vec::new());
        };
        let table = self.table.clone();
        let pattern = format!("%{browse_id}%");
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT event_time, user_host, argument FROM {table}
                     WHERE event_time >= ?1 AND argument LIKE ?2
                     ORDER BY event_time"
                ))?;
                let rows = stmt
                    .query_map(params![window, pattern], |row| {
                        Ok(LogRow {
                            event_time: row.get(0)?,
                            user_host: row.get(1)?,
                            argument: row.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }
}

/// Start of the correlation window: the browse id's embedded timestamp
/// truncated to the minute, in the log's `event_time` format.
pub fn window_start(browse_id: &str) -> Option<String> {
    let ts = browse_id.get(..14)?;
    let parsed = NaiveDateTime::parse_from_str(ts, "%Y%m%d%H%M%S").ok()?;
    Some(parsed.format("%Y-%m-%d %H:%M").to_string())
}
