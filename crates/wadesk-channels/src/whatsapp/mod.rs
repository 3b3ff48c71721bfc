pub mod api;
pub mod builder;
pub mod templates;
pub mod webhook;

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use wadesk_common::{Error, OrganizationId, Result};

pub use builder::{
    BuildError, OutboundMessage, build_template_message, build_text_message, normalize_phone,
    normalize_template_name,
};
pub use templates::{SyncedTemplate, TemplateSyncResult, extract_placeholders};
pub use webhook::{
    CallbackEvents, MessageEvent, MessageStatus, StatusEvent, VerificationResult, parse_callback,
    verify_subscription,
};

/// Connect timeout is capped separately so a dead host fails fast.
const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Organization-scoped secrets needed to call the Cloud API.
///
/// Empty strings mean "not configured". Callers must load a fresh copy for
/// each operation; tokens can be rotated at any time.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhatsAppCredentials {
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub phone_number_id: String,
    #[serde(default)]
    pub business_account_id: String,
    #[serde(default)]
    pub webhook_verify_token: String,
}

impl WhatsAppCredentials {
    /// Whether the token/phone-number pair needed for any API call is present.
    pub fn is_configured(&self) -> bool {
        !self.access_token.trim().is_empty() && !self.phone_number_id.trim().is_empty()
    }

    fn ensure_configured(&self) -> std::result::Result<(), SendError> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(SendError::ConfigurationMissing)
        }
    }
}

impl fmt::Debug for WhatsAppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhatsAppCredentials")
            .field("organization_id", &self.organization_id)
            .field("access_token", &"<redacted>")
            .field("phone_number_id", &self.phone_number_id)
            .field("business_account_id", &self.business_account_id)
            .field("webhook_verify_token", &"<redacted>")
            .finish()
    }
}

/// Why a provider interaction failed. Never surfaced as `Err` to adapter
/// callers; folded into the uniform result types instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("WhatsApp credentials not configured")]
    ConfigurationMissing,

    #[error("{0}")]
    ProviderRejected(String),

    #[error("{0}")]
    NetworkFailure(String),
}

/// Outcome of one send. Exactly one of `message_id` / `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResult {
    pub fn sent(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.to_string()),
        }
    }
}

impl From<std::result::Result<String, SendError>> for SendResult {
    fn from(result: std::result::Result<String, SendError>) -> Self {
        match result {
            Ok(id) => Self::sent(id),
            Err(e) => Self::failed(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_name: Option<String>,
}

impl ConnectionResult {
    fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

/// Cloud API adapter. One instance per process; credentials are passed in
/// per call and never retained. Each call makes exactly one attempt.
#[derive(Clone)]
pub struct WhatsAppClient {
    client: Client,
    base_url: String,
}

impl WhatsAppClient {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(MAX_CONNECT_TIMEOUT))
            .build()
            .map_err(|e| Error::Channel(format!("failed to build WhatsApp HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: api::GRAPH_API_BASE.to_string(),
        })
    }

    /// Point the adapter at a different Graph API root (e.g. a local mock).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn send_message(
        &self,
        credentials: &WhatsAppCredentials,
        message: &OutboundMessage,
    ) -> SendResult {
        if let Err(e) = credentials.ensure_configured() {
            warn!(
                "whatsapp: send skipped for org {}: {e}",
                credentials.organization_id
            );
            return SendResult::failed(e);
        }

        let result = api::send_message(
            &self.client,
            &self.base_url,
            &credentials.access_token,
            &credentials.phone_number_id,
            message,
        )
        .await;

        match &result {
            Ok(id) => info!(
                "whatsapp: {} message accepted for org {} (id={id})",
                message.kind(),
                credentials.organization_id
            ),
            Err(e) => warn!(
                "whatsapp: {} message failed for org {}: {e}",
                message.kind(),
                credentials.organization_id
            ),
        }

        result.into()
    }

    pub async fn test_connection(&self, credentials: &WhatsAppCredentials) -> ConnectionResult {
        if let Err(e) = credentials.ensure_configured() {
            return ConnectionResult::failed(e);
        }

        match api::fetch_phone_number(
            &self.client,
            &self.base_url,
            &credentials.access_token,
            &credentials.phone_number_id,
        )
        .await
        {
            Ok(info) => {
                info!(
                    "whatsapp: connection ok for org {}",
                    credentials.organization_id
                );
                ConnectionResult {
                    success: true,
                    error: None,
                    display_phone_number: info.display_phone_number,
                    verified_name: info.verified_name,
                }
            }
            Err(e) => {
                warn!(
                    "whatsapp: connection test failed for org {}: {e}",
                    credentials.organization_id
                );
                ConnectionResult::failed(e)
            }
        }
    }

    /// Pull approved templates. All-or-nothing: any failed lookup aborts.
    pub async fn sync_templates(&self, credentials: &WhatsAppCredentials) -> TemplateSyncResult {
        match self.fetch_approved_templates(credentials).await {
            Ok(templates) => {
                info!(
                    "whatsapp: fetched {} approved templates for org {}",
                    templates.len(),
                    credentials.organization_id
                );
                TemplateSyncResult::synced(templates)
            }
            Err(e) => {
                warn!(
                    "whatsapp: template sync failed for org {}: {e}",
                    credentials.organization_id
                );
                TemplateSyncResult::failed(e)
            }
        }
    }

    async fn fetch_approved_templates(
        &self,
        credentials: &WhatsAppCredentials,
    ) -> std::result::Result<Vec<SyncedTemplate>, SendError> {
        credentials.ensure_configured()?;
        let token = &credentials.access_token;

        let looked_up = api::fetch_business_account_id(
            &self.client,
            &self.base_url,
            token,
            &credentials.phone_number_id,
        )
        .await
        .map_err(|e| match e {
            SendError::ProviderRejected(msg) => SendError::ProviderRejected(format!(
                "failed to resolve business account: {msg}"
            )),
            other => other,
        })?;

        let business_account_id = looked_up
            .or_else(|| {
                let stored = credentials.business_account_id.trim();
                (!stored.is_empty()).then(|| stored.to_string())
            })
            .ok_or_else(|| {
                SendError::ProviderRejected(format!(
                    "no business account found for phone number {}",
                    credentials.phone_number_id
                ))
            })?;

        let templates =
            api::list_message_templates(&self.client, &self.base_url, token, &business_account_id)
                .await
                .map_err(|e| match e {
                    SendError::ProviderRejected(msg) => {
                        SendError::ProviderRejected(format!("failed to list templates: {msg}"))
                    }
                    other => other,
                })?;

        Ok(templates::approved_templates(templates))
    }
}
