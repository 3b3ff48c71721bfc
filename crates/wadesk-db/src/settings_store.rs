use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;
use wadesk_channels::WhatsAppCredentials;
use wadesk_common::{Error, OrganizationId, Result};

use crate::parse_organization;

const SELECT_COLUMNS: &str = "SELECT organization_id, access_token, phone_number_id,
        business_account_id, webhook_verify_token
    FROM whatsapp_settings";

/// Per-organization WhatsApp credentials.
///
/// Rows are read fresh on every call so that a token rotation takes effect
/// on the next request.
pub struct SettingsStore {
    conn: Mutex<Connection>,
}

impl SettingsStore {
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
            .map_err(|_| Error::Database("settings database lock poisoned".into()))
    }

    pub fn get_credentials(&self, org: OrganizationId) -> Result<Option<WhatsAppCredentials>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE organization_id = ?1"),
            params![org.to_hyphenated()],
            row_to_credentials,
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load WhatsApp settings: {e}")))
    }

    /// Insert or replace the organization's credentials. Values are trimmed.
    pub fn save_credentials(&self, credentials: &WhatsAppCredentials) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO whatsapp_settings (
                organization_id, access_token, phone_number_id,
                business_account_id, webhook_verify_token, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(organization_id) DO UPDATE SET
                access_token = excluded.access_token,
                phone_number_id = excluded.phone_number_id,
                business_account_id = excluded.business_account_id,
                webhook_verify_token = excluded.webhook_verify_token,
                updated_at = excluded.updated_at",
            params![
                credentials.organization_id.to_hyphenated(),
                credentials.access_token.trim(),
                credentials.phone_number_id.trim(),
                credentials.business_account_id.trim(),
                credentials.webhook_verify_token.trim(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Database(format!("failed to save WhatsApp settings: {e}")))?;

        info!(
            "saved WhatsApp settings for org {}",
            credentials.organization_id
        );
        Ok(())
    }

    /// Organization that owns the business phone number a webhook was addressed to.
    pub fn find_by_phone_number_id(
        &self,
        phone_number_id: &str,
    ) -> Result<Option<WhatsAppCredentials>> {
        let phone_number_id = phone_number_id.trim();
        if phone_number_id.is_empty() {
            return Ok(None);
        }

        let conn = self.connection()?;
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE phone_number_id = ?1 ORDER BY updated_at DESC LIMIT 1"),
            params![phone_number_id],
            row_to_credentials,
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to look up phone number: {e}")))
    }

    /// Every non-empty webhook verify token across organizations.
    pub fn verify_tokens(&self) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT webhook_verify_token FROM whatsapp_settings
                WHERE webhook_verify_token != ''",
            )
            .map_err(|e| Error::Database(format!("failed to prepare token query: {e}")))?;

        let tokens = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| Error::Database(format!("failed to query verify tokens: {e}")))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(|e| Error::Database(format!("failed to collect verify tokens: {e}")))?;
        Ok(tokens)
    }
}

fn row_to_credentials(row: &rusqlite::Row<'_>) -> rusqlite::Result<WhatsAppCredentials> {
    let org: String = row.get(0)?;
    Ok(WhatsAppCredentials {
        organization_id: parse_organization(&org)?,
        access_token: row.get(1)?,
        phone_number_id: row.get(2)?,
        business_account_id: row.get(3)?,
        webhook_verify_token: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(org: OrganizationId, phone: &str, verify: &str) -> WhatsAppCredentials {
        WhatsAppCredentials {
            organization_id: org,
            access_token: "token-1".into(),
            phone_number_id: phone.into(),
            business_account_id: "WABA1".into(),
            webhook_verify_token: verify.into(),
        }
    }

    #[test]
    fn unknown_organization_has_no_credentials() {
        let store = SettingsStore::in_memory().unwrap();
        assert!(store.get_credentials(OrganizationId::new()).unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips_and_upserts() {
        let store = SettingsStore::in_memory().unwrap();
        let org = OrganizationId::new();

        store.save_credentials(&creds(org, "PN1", "v1")).unwrap();
        assert_eq!(
            store.get_credentials(org).unwrap(),
            Some(creds(org, "PN1", "v1"))
        );

        let mut rotated = creds(org, " PN1 ", "v1");
        rotated.access_token = "token-2".into();
        store.save_credentials(&rotated).unwrap();

        let loaded = store.get_credentials(org).unwrap().unwrap();
        assert_eq!(loaded.access_token, "token-2");
        assert_eq!(loaded.phone_number_id, "PN1");
    }

    #[test]
    fn phone_number_lookup_finds_owner() {
        let store = SettingsStore::in_memory().unwrap();
        let a = OrganizationId::new();
        let b = OrganizationId::new();
        store.save_credentials(&creds(a, "PN-A", "")).unwrap();
        store.save_credentials(&creds(b, "PN-B", "")).unwrap();

        let found = store.find_by_phone_number_id("PN-B").unwrap().unwrap();
        assert_eq!(found.organization_id, b);
        assert!(store.find_by_phone_number_id("PN-C").unwrap().is_none());
        assert!(store.find_by_phone_number_id("").unwrap().is_none());
    }

    #[test]
    fn verify_tokens_skip_empty_values() {
        let store = SettingsStore::in_memory().unwrap();
        store
            .save_credentials(&creds(OrganizationId::new(), "PN1", "alpha"))
            .unwrap();
        store
            .save_credentials(&creds(OrganizationId::new(), "PN2", ""))
            .unwrap();
        store
            .save_credentials(&creds(OrganizationId::new(), "PN3", "  "))
            .unwrap();

        assert_eq!(store.verify_tokens().unwrap(), ["alpha"]);
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wadesk.db");
        let org = OrganizationId::new();

        {
            let store = SettingsStore::open(&path).unwrap();
            store.save_credentials(&creds(org, "PN1", "v")).unwrap();
        }

        let reopened = SettingsStore::open(&path).unwrap();
        assert!(reopened.get_credentials(org).unwrap().is_some());
    }
}
