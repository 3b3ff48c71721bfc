pub mod event_store;
pub mod migrations;
pub mod settings_store;
pub mod template_store;

pub use event_store::EventStore;
pub use settings_store::SettingsStore;
pub use template_store::{StoredTemplate, TemplateStatus, TemplateStore, TemplateSyncCounts};

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;
use wadesk_common::{Error, OrganizationId, Result};

/// Open (or create) a database file with WAL enabled and all migrations applied.
pub(crate) fn open_connection(db_path: &Path) -> Result<Connection> {
    info!("opening database at {}", db_path.display());
    let conn = Connection::open(db_path)
        .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
        .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

    migrations::run(&conn)?;
    Ok(conn)
}

pub(crate) fn in_memory_connection() -> Result<Connection> {
    let conn = Connection::open_in_memory()
        .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
    migrations::run(&conn)?;
    Ok(conn)
}

pub(crate) fn conversion_error(message: impl ToString) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

pub(crate) fn parse_organization(raw: &str) -> rusqlite::Result<OrganizationId> {
    Uuid::parse_str(raw)
        .map(OrganizationId::from)
        .map_err(|e| conversion_error(format!("invalid organization id {raw:?}: {e}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| conversion_error(format!("invalid timestamp format: {raw}")))
}
