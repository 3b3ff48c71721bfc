use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::info;
use wadesk_channels::SyncedTemplate;
use wadesk_channels::whatsapp::extract_placeholders;
use wadesk_common::{Error, OrganizationId, Result};

use crate::{conversion_error, parse_organization, parse_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateStatus {
    Approved,
    Pending,
}

impl TemplateStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Pending => "PENDING",
        }
    }

    fn from_db(value: &str) -> Result<Self> {
        match value {
            "APPROVED" => Ok(Self::Approved),
            "PENDING" => Ok(Self::Pending),
            other => Err(Error::Database(format!("unknown template status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTemplate {
    pub organization_id: OrganizationId,
    pub name: String,
    pub language: String,
    pub category: String,
    pub body_text: String,
    pub variable_placeholders: Vec<String>,
    pub provider_template_id: String,
    pub status: TemplateStatus,
    pub synced_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSyncCounts {
    pub created: usize,
    pub updated: usize,
}

/// Local copies of provider templates, keyed by (organization, name, language).
pub struct TemplateStore {
    conn: Mutex<Connection>,
}

impl TemplateStore {
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
            .map_err(|_| Error::Database("template database lock poisoned".into()))
    }

    /// Write a successful sync in one transaction. Each template is counted
    /// as created or updated depending on whether its row already existed.
    pub fn upsert_synced(
        &self,
        org: OrganizationId,
        templates: &[SyncedTemplate],
    ) -> Result<TemplateSyncCounts> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin template sync: {e}")))?;

        let org_id = org.to_hyphenated();
        let now = Utc::now().to_rfc3339();
        let mut counts = TemplateSyncCounts::default();

        for template in templates {
            let placeholders = serde_json::to_string(&template.variable_placeholders)?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM message_templates
                    WHERE organization_id = ?1 AND name = ?2 AND language = ?3",
                    params![org_id, template.name, template.language],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| Error::Database(format!("failed to look up template: {e}")))?;

            match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE message_templates SET
                            category = ?1, body_text = ?2, variable_placeholders = ?3,
                            provider_template_id = ?4, status = ?5,
                            synced_at = ?6, updated_at = ?6
                        WHERE id = ?7",
                        params![
                            template.category,
                            template.body_text,
                            placeholders,
                            template.provider_template_id,
                            TemplateStatus::Approved.as_str(),
                            now,
                            id,
                        ],
                    )
                    .map_err(|e| Error::Database(format!("failed to update template: {e}")))?;
                    counts.updated += 1;
                }
                None => {
                    tx.execute(
                        "INSERT INTO message_templates (
                            organization_id, name, language, category, body_text,
                            variable_placeholders, provider_template_id, status,
                            synced_at, created_at, updated_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?9)",
                        params![
                            org_id,
                            template.name,
                            template.language,
                            template.category,
                            template.body_text,
                            placeholders,
                            template.provider_template_id,
                            TemplateStatus::Approved.as_str(),
                            now,
                        ],
                    )
                    .map_err(|e| Error::Database(format!("failed to insert template: {e}")))?;
                    counts.created += 1;
                }
            }
        }

        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit template sync: {e}")))?;

        info!(
            "stored {} templates for org {org} ({} created, {} updated)",
            templates.len(),
            counts.created,
            counts.updated
        );
        Ok(counts)
    }

    /// Apply a local edit. Edited templates lose their approval until the
    /// next sync. Returns `false` when no such template exists.
    pub fn mark_edited(
        &self,
        org: OrganizationId,
        name: &str,
        language: &str,
        body_text: &str,
    ) -> Result<bool> {
        let placeholders = serde_json::to_string(&extract_placeholders(body_text))?;
        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE message_templates SET
                    body_text = ?1, variable_placeholders = ?2, status = ?3, updated_at = ?4
                WHERE organization_id = ?5 AND name = ?6 AND language = ?7",
                params![
                    body_text,
                    placeholders,
                    TemplateStatus::Pending.as_str(),
                    Utc::now().to_rfc3339(),
                    org.to_hyphenated(),
                    name,
                    language,
                ],
            )
            .map_err(|e| Error::Database(format!("failed to edit template: {e}")))?;
        Ok(changed > 0)
    }

    pub fn list(&self, org: OrganizationId) -> Result<Vec<StoredTemplate>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT organization_id, name, language, category, body_text,
                    variable_placeholders, provider_template_id, status, synced_at, updated_at
                FROM message_templates
                WHERE organization_id = ?1
                ORDER BY name, language",
            )
            .map_err(|e| Error::Database(format!("failed to prepare template query: {e}")))?;

        let rows = stmt
            .query_map(params![org.to_hyphenated()], row_to_template)
            .map_err(|e| Error::Database(format!("failed to query templates: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(format!("failed to collect templates: {e}")))?;
        Ok(rows)
    }
}

fn row_to_template(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredTemplate> {
    let org: String = row.get(0)?;
    let placeholders: String = row.get(5)?;
    let status: String = row.get(7)?;
    let synced_at: Option<String> = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(StoredTemplate {
        organization_id: parse_organization(&org)?,
        name: row.get(1)?,
        language: row.get(2)?,
        category: row.get(3)?,
        body_text: row.get(4)?,
        variable_placeholders: serde_json::from_str(&placeholders).map_err(conversion_error)?,
        provider_template_id: row.get(6)?,
        status: TemplateStatus::from_db(&status).map_err(conversion_error)?,
        synced_at: synced_at.as_deref().map(parse_timestamp).transpose()?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
