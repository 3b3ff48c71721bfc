use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use wadesk_channels::{WhatsAppClient, WhatsAppCredentials};
use wadesk_common::{OrganizationId, Result};
use wadesk_config::AppConfig;
use wadesk_db::{EventStore, SettingsStore, TemplateStore};
use wadesk_security::TenancyResolver;

/// File name of the SQLite database inside the data directory.
pub const DATABASE_FILE: &str = "wadesk.db";

/// Shared application state accessible from all request handlers.
pub struct AppState {
    pub config: AppConfig,
    /// One client per process; its connection pool is shared by every request.
    pub whatsapp: WhatsAppClient,
    pub settings: SettingsStore,
    pub templates: TemplateStore,
    pub events: EventStore,
    pub tenancy: TenancyResolver,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        whatsapp: WhatsAppClient,
        settings: SettingsStore,
        templates: TemplateStore,
        events: EventStore,
    ) -> Self {
        let tenancy = TenancyResolver::new(
            config.tenancy.public_prefixes.clone(),
            config.tenancy.base_domain.clone(),
        );
        Self {
            config,
            whatsapp,
            settings,
            templates,
            events,
            tenancy,
        }
    }

    /// Open the stores under `data_dir` and build the provider client from config.
    pub fn open(config: AppConfig, data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join(DATABASE_FILE);
        let whatsapp = whatsapp_client(&config)?;
        Ok(Self::new(
            config,
            whatsapp,
            SettingsStore::open(&db_path)?,
            TemplateStore::open(&db_path)?,
            EventStore::open(&db_path)?,
        ))
    }

    /// Same as [`AppState::open`] but backed by in-memory databases.
    pub fn in_memory(config: AppConfig) -> Result<Self> {
        let whatsapp = whatsapp_client(&config)?;
        Ok(Self::new(
            config,
            whatsapp,
            SettingsStore::in_memory()?,
            TemplateStore::in_memory()?,
            EventStore::in_memory()?,
        ))
    }

    /// Current credentials for `org`, read fresh from the store.
    ///
    /// An organization without settings gets empty credentials so the
    /// adapter's own precondition produces the error.
    pub fn credentials(&self, org: OrganizationId) -> Result<WhatsAppCredentials> {
        Ok(self
            .settings
            .get_credentials(org)?
            .unwrap_or_else(|| WhatsAppCredentials {
                organization_id: org,
                ..Default::default()
            }))
    }

    pub fn broadcast_concurrency(&self) -> usize {
        self.config.whatsapp.broadcast_concurrency.max(1)
    }
}

fn whatsapp_client(config: &AppConfig) -> Result<WhatsAppClient> {
    let timeout = Duration::from_secs(config.whatsapp.request_timeout_secs.max(1));
    Ok(WhatsAppClient::new(timeout)?.with_base_url(config.whatsapp.api_base_url.as_str()))
}

pub type SharedState = Arc<AppState>;
