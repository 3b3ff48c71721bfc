use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use wadesk_channels::{MessageEvent, MessageStatus, StatusEvent};
use wadesk_common::{Error, OrganizationId, Result};

const DEFAULT_INBOX_LIMIT: usize = 50;
const MAX_INBOX_LIMIT: usize = 500;

/// Inbound messages and delivery status history received via webhooks.
pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(crate::open_connection(db_path)?),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(crate::in_memory_connection()?),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("event database lock poisoned".into()))
    }

    /// Store an inbound message. Redelivered webhooks carry the same provider
    /// id; those are ignored and `false` is returned.
    pub fn record_message(&self, org: OrganizationId, event: &MessageEvent) -> Result<bool> {
        let conn = self.connection()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO inbound_messages (
                    organization_id, provider_message_id, from_number, contact_name,
                    message_type, body, phone_number_id, received_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    org.to_hyphenated(),
                    event.provider_message_id,
                    event.from,
                    event.contact_name,
                    event.message_type,
                    event.text,
                    event.phone_number_id,
                    event.received_at,
                ],
            )
            .map_err(|e| Error::Database(format!("failed to record inbound message: {e}")))?;

        if inserted == 0 {
            debug!(
                "duplicate inbound message {} ignored",
                event.provider_message_id
            );
        }
        Ok(inserted > 0)
    }

    pub fn record_status(&self, org: OrganizationId, event: &StatusEvent) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO message_statuses (
                organization_id, provider_message_id, status, recipient, error, occurred_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                org.to_hyphenated(),
                event.provider_message_id,
                event.status.as_str(),
                event.recipient,
                event.error,
                event.occurred_at,
            ],
        )
        .map_err(|e| Error::Database(format!("failed to record message status: {e}")))?;
        Ok(())
    }

    /// Most recent status an organization has received for an outbound message.
    pub fn latest_status(
        &self,
        org: OrganizationId,
        provider_message_id: &str,
    ) -> Result<Option<MessageStatus>> {
        let conn = self.connection()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT status FROM message_statuses
                WHERE organization_id = ?1 AND provider_message_id = ?2
                ORDER BY occurred_at DESC, id DESC
                LIMIT 1",
                params![org.to_hyphenated(), provider_message_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to load message status: {e}")))?;

        raw.map(|s| {
            MessageStatus::parse(&s)
                .ok_or_else(|| Error::Database(format!("unknown message status: {s}")))
        })
        .transpose()
    }

    /// Newest inbound messages first. A zero limit means the default page size.
    pub fn recent_messages(&self, org: OrganizationId, limit: usize) -> Result<Vec<MessageEvent>> {
        let limit = if limit == 0 {
            DEFAULT_INBOX_LIMIT
        } else {
            limit.min(MAX_INBOX_LIMIT)
        };

        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT from_number, provider_message_id, body, received_at,
                    message_type, contact_name, phone_number_id
                FROM inbound_messages
                WHERE organization_id = ?1
                ORDER BY received_at DESC, id DESC
                LIMIT ?2",
            )
            .map_err(|e| Error::Database(format!("failed to prepare inbox query: {e}")))?;

        let rows = stmt
            .query_map(params![org.to_hyphenated(), limit as i64], |row| {
                Ok(MessageEvent {
                    from: row.get(0)?,
                    provider_message_id: row.get(1)?,
                    text: row.get(2)?,
                    received_at: row.get(3)?,
                    message_type: row.get(4)?,
                    contact_name: row.get(5)?,
                    phone_number_id: row.get(6)?,
                })
            })
            .map_err(|e| Error::Database(format!("failed to query inbox: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(format!("failed to collect inbox rows: {e}")))?;
        Ok(rows)
    }
}
