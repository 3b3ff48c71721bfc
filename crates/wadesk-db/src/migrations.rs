use rusqlite::{Connection, params};
use tracing::info;
use wadesk_common::{Error, Result};

/// A versioned schema change, tracked in the `_migrations` table.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "whatsapp_settings",
        sql: "CREATE TABLE IF NOT EXISTS whatsapp_settings (
                organization_id TEXT PRIMARY KEY,
                access_token TEXT NOT NULL DEFAULT '',
                phone_number_id TEXT NOT NULL DEFAULT '',
                business_account_id TEXT NOT NULL DEFAULT '',
                webhook_verify_token TEXT NOT NULL DEFAULT '',
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_whatsapp_settings_phone
                ON whatsapp_settings(phone_number_id);",
    },
    Migration {
        version: 2,
        name: "message_templates",
        sql: "CREATE TABLE IF NOT EXISTS message_templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                organization_id TEXT NOT NULL,
                name TEXT NOT NULL,
                language TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT '',
                body_text TEXT NOT NULL DEFAULT '',
                variable_placeholders TEXT NOT NULL DEFAULT '[]',
                provider_template_id TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                synced_at TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (organization_id, name, language)
            );",
    },
    Migration {
        version: 3,
        name: "webhook_events",
        sql: "CREATE TABLE IF NOT EXISTS inbound_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                organization_id TEXT NOT NULL,
                provider_message_id TEXT NOT NULL UNIQUE,
                from_number TEXT NOT NULL,
                contact_name TEXT,
                message_type TEXT NOT NULL,
                body TEXT NOT NULL,
                phone_number_id TEXT,
                received_at INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_inbound_messages_org
                ON inbound_messages(organization_id, received_at);

            CREATE TABLE IF NOT EXISTS message_statuses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                organization_id TEXT NOT NULL,
                provider_message_id TEXT NOT NULL,
                status TEXT NOT NULL,
                recipient TEXT NOT NULL,
                error TEXT,
                occurred_at INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_message_statuses_message
                ON message_statuses(provider_message_id, occurred_at);",
    },
];

/// Apply every migration newer than the recorded schema version.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| Error::Database(format!("failed to create migrations table: {e}")))?;

    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| {
            row.get(0)
        })
        .map_err(|e| Error::Database(format!("failed to read schema version: {e}")))?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.sql).map_err(|e| {
            Error::Database(format!("migration {} failed: {e}", migration.name))
        })?;
        conn.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )
        .map_err(|e| Error::Database(format!("failed to record migration: {e}")))?;
        info!("applied migration {} ({})", migration.version, migration.name);
    }

    Ok(())
}
