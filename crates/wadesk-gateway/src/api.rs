use std::fmt::Display;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use wadesk_channels::whatsapp::{build_template_message, build_text_message};
use wadesk_channels::{BuildError, OutboundMessage, WhatsAppCredentials};

use crate::state::SharedState;
use crate::tenancy::Tenant;

/// `{ "error": ..., "code": ... }` with the given status.
pub fn error_response(status: StatusCode, code: &str, message: impl Display) -> Response {
    (
        status,
        Json(json!({ "error": message.to_string(), "code": code })),
    )
        .into_response()
}

pub(crate) fn internal_error(err: wadesk_common::Error) -> Response {
    error!("request failed: {err}");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "internal server error",
    )
}

/// 409 when the organization has no usable credentials (the provider was never
/// called), 502 when the provider call itself failed.
fn failure_status(creds: &WhatsAppCredentials, success: bool) -> StatusCode {
    if success {
        StatusCode::OK
    } else if !creds.is_configured() {
        StatusCode::CONFLICT
    } else {
        StatusCode::BAD_GATEWAY
    }
}

pub(crate) fn validation_error(err: BuildError) -> Response {
    error_response(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", err)
}

/// Message content shared by single sends and broadcasts.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text {
        body: String,
    },
    Template {
        template_name: String,
        #[serde(default = "default_language")]
        language_code: String,
        #[serde(default)]
        variables: Vec<String>,
        #[serde(default)]
        cta_url: Option<String>,
    },
}

fn default_language() -> String {
    "en_US".to_string()
}

impl MessageContent {
    pub fn build(&self, to: &str) -> Result<OutboundMessage, BuildError> {
        match self {
            Self::Text { body } => build_text_message(to, body),
            Self::Template {
                template_name,
                language_code,
                variables,
                cta_url,
            } => build_template_message(
                to,
                template_name,
                language_code,
                variables,
                cta_url.as_deref(),
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub to: String,
    #[serde(flatten)]
    pub content: MessageContent,
}

#[derive(Debug, Deserialize)]
pub struct SettingsRequest {
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub business_account_id: Option<String>,
    pub webhook_verify_token: Option<String>,
}

/// Settings as shown to the dashboard. The access token is never returned in full.
#[derive(Debug, Serialize)]
pub struct SettingsView {
    pub organization_id: String,
    pub configured: bool,
    pub access_token: String,
    pub phone_number_id: String,
    pub business_account_id: String,
    pub webhook_verify_token: String,
}

impl From<&WhatsAppCredentials> for SettingsView {
    fn from(creds: &WhatsAppCredentials) -> Self {
        Self {
            organization_id: creds.organization_id.to_hyphenated(),
            configured: creds.is_configured(),
            access_token: mask_secret(&creds.access_token),
            phone_number_id: creds.phone_number_id.clone(),
            business_account_id: creds.business_account_id.clone(),
            webhook_verify_token: creds.webhook_verify_token.clone(),
        }
    }
}

/// Keep the last four characters of long secrets; hide short ones entirely.
fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0 => String::new(),
        n if n <= 8 => "*".repeat(n),
        n => {
            let tail: String = chars[n - 4..].iter().collect();
            format!("{}{tail}", "*".repeat(n - 4))
        }
    }
}

/// GET /api/v1/whatsapp/settings
pub async fn get_settings(State(state): State<SharedState>, tenant: Tenant) -> Response {
    match state.credentials(tenant.organization_id()) {
        Ok(creds) => Json(SettingsView::from(&creds)).into_response(),
        Err(e) => internal_error(e),
    }
}

/// PUT /api/v1/whatsapp/settings: fields left out keep their stored value.
pub async fn save_settings(
    State(state): State<SharedState>,
    tenant: Tenant,
    Json(body): Json<SettingsRequest>,
) -> Response {
    let mut creds = match state.credentials(tenant.organization_id()) {
        Ok(creds) => creds,
        Err(e) => return internal_error(e),
    };

    let fields = [
        (body.access_token, &mut creds.access_token),
        (body.phone_number_id, &mut creds.phone_number_id),
        (body.business_account_id, &mut creds.business_account_id),
        (body.webhook_verify_token, &mut creds.webhook_verify_token),
    ];
    for (update, field) in fields {
        if let Some(value) = update {
            *field = value.trim().to_string();
        }
    }

    if let Err(e) = state.settings.save_credentials(&creds) {
        return internal_error(e);
    }
    Json(SettingsView::from(&creds)).into_response()
}

/// POST /api/v1/whatsapp/test-connection
pub async fn test_connection(State(state): State<SharedState>, tenant: Tenant) -> Response {
    let creds = match state.credentials(tenant.organization_id()) {
        Ok(creds) => creds,
        Err(e) => return internal_error(e),
    };
    Json(state.whatsapp.test_connection(&creds).await).into_response()
}

/// POST /api/v1/whatsapp/messages
pub async fn send_message(
    State(state): State<SharedState>,
    tenant: Tenant,
    Json(body): Json<SendMessageRequest>,
) -> Response {
    let message = match body.content.build(&body.to) {
        Ok(message) => message,
        Err(e) => return validation_error(e),
    };

    let creds = match state.credentials(tenant.organization_id()) {
        Ok(creds) => creds,
        Err(e) => return internal_error(e),
    };

    let result = state.whatsapp.send_message(&creds, &message).await;
    (failure_status(&creds, result.success), Json(result)).into_response()
}

/// POST /api/v1/whatsapp/templates/sync
pub async fn sync_templates(State(state): State<SharedState>, tenant: Tenant) -> Response {
    let org = tenant.organization_id();
    let creds = match state.credentials(org) {
        Ok(creds) => creds,
        Err(e) => return internal_error(e),
    };

    let result = state.whatsapp.sync_templates(&creds).await;
    let Some(templates) = result.templates.filter(|_| result.success) else {
        return (
            failure_status(&creds, false),
            Json(json!({
                "success": false,
                "error": result.error.unwrap_or_else(|| "template sync failed".to_string()),
            })),
        )
            .into_response();
    };

    match state.templates.upsert_synced(org, &templates) {
        Ok(counts) => {
            info!(
                "template sync for org {org}: {} synced, {} created, {} updated",
                templates.len(),
                counts.created,
                counts.updated
            );
            Json(json!({
                "success": true,
                "synced": templates.len(),
                "created": counts.created,
                "updated": counts.updated,
            }))
            .into_response()
        }
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/whatsapp/templates
pub async fn list_templates(State(state): State<SharedState>, tenant: Tenant) -> Response {
    match state.templates.list(tenant.organization_id()) {
        Ok(templates) => Json(json!({ "templates": templates })).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct TemplateEditRequest {
    pub body_text: String,
}

/// PUT /api/v1/whatsapp/templates/{name}/{language}: local body edit. The
/// template goes back to `PENDING` until the next sync.
pub async fn edit_template(
    State(state): State<SharedState>,
    tenant: Tenant,
    Path((name, language)): Path<(String, String)>,
    Json(body): Json<TemplateEditRequest>,
) -> Response {
    if body.body_text.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "body_text must not be empty",
        );
    }

    let org = tenant.organization_id();
    match state
        .templates
        .mark_edited(org, &name, &language, &body.body_text)
    {
        Ok(true) => {
            info!("template {name}/{language} edited for org {org}");
            Json(json!({ "name": name, "language": language, "status": "PENDING" }))
                .into_response()
        }
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("no template {name} ({language})"),
        ),
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/whatsapp/messages/{message_id}/status
pub async fn message_status(
    State(state): State<SharedState>,
    tenant: Tenant,
    Path(message_id): Path<String>,
) -> Response {
    match state
        .events
        .latest_status(tenant.organization_id(), &message_id)
    {
        Ok(Some(status)) => {
            Json(json!({ "message_id": message_id, "status": status.as_str() })).into_response()
        }
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("no status recorded for {message_id}"),
        ),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct InboxParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// GET /api/v1/whatsapp/inbox
pub async fn inbox(
    State(state): State<SharedState>,
    tenant: Tenant,
    Query(params): Query<InboxParams>,
) -> Response {
    match state
        .events
        .recent_messages(tenant.organization_id(), params.limit.unwrap_or(0))
    {
        Ok(messages) => Json(json!({ "messages": messages })).into_response(),
        Err(e) => internal_error(e),
    }
}
