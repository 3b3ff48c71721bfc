use std::collections::HashMap;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};
use wadesk_channels::CallbackEvents;
use wadesk_channels::whatsapp::{parse_callback, verify_subscription};
use wadesk_common::OrganizationId;
use wadesk_security::{SIGNATURE_HEADER, verify_signature};

use crate::api::error_response;
use crate::state::{AppState, SharedState};

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// GET /api/webhooks/whatsapp: subscription handshake.
pub async fn verify(State(state): State<SharedState>, Query(params): Query<VerifyParams>) -> Response {
    let mode = params.mode.as_deref().unwrap_or("");
    let token = params.verify_token.as_deref().unwrap_or("");
    let challenge = params.challenge.as_deref().unwrap_or("");

    let mut expected: Vec<String> = state
        .config
        .whatsapp
        .webhook_verify_token
        .iter()
        .filter(|t| !t.is_empty())
        .cloned()
        .collect();
    match state.settings.verify_tokens() {
        Ok(tokens) => expected.extend(tokens),
        Err(e) => warn!("whatsapp: could not load stored verify tokens: {e}"),
    }

    let verified = expected
        .iter()
        .map(|candidate| verify_subscription(mode, token, challenge, candidate))
        .find(|result| result.success);

    match verified {
        Some(result) => {
            info!("whatsapp: webhook verified");
            (
                StatusCode::OK,
                [(CONTENT_TYPE, "text/plain")],
                result.challenge.unwrap_or_default(),
            )
                .into_response()
        }
        None => {
            warn!("whatsapp: webhook verification failed");
            (StatusCode::FORBIDDEN, "verification failed").into_response()
        }
    }
}

/// POST /api/webhooks/whatsapp: inbound messages and delivery statuses.
pub async fn receive(State(state): State<SharedState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(secret) = state
        .config
        .whatsapp
        .app_secret
        .as_deref()
        .filter(|s| !s.is_empty())
    {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !verify_signature(secret, &body, signature) {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_SIGNATURE",
                "webhook signature mismatch",
            );
        }
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("whatsapp: rejecting malformed webhook body: {e}");
            return error_response(StatusCode::BAD_REQUEST, "INVALID_PAYLOAD", "body is not valid JSON");
        }
    };

    let events = parse_callback(&payload);
    if !events.is_empty() {
        let failed = persist_events(&state, &events);
        if failed > 0 {
            // Non-2xx so the provider redelivers.
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORAGE_FAILED",
                format!("failed to store {failed} webhook event(s)"),
            );
        }
    }

    Json(json!({
        "status": "received",
        "messages": events.messages.len(),
        "statuses": events.statuses.len(),
    }))
    .into_response()
}

/// Route each event to the organization owning its business phone number and
/// store it. Events that cannot be routed are logged and dropped. Returns the
/// number of events that could not be stored because of a storage error.
fn persist_events(state: &AppState, events: &CallbackEvents) -> usize {
    let mut owners: HashMap<String, Option<OrganizationId>> = HashMap::new();
    let mut owner_of = |phone_number_id: Option<&str>| -> wadesk_common::Result<Option<OrganizationId>> {
        let Some(phone_number_id) = phone_number_id else {
            return Ok(None);
        };
        if let Some(owner) = owners.get(phone_number_id) {
            return Ok(*owner);
        }
        let owner = state
            .settings
            .find_by_phone_number_id(phone_number_id)?
            .map(|creds| creds.organization_id);
        owners.insert(phone_number_id.to_string(), owner);
        Ok(owner)
    };
    let mut failed = 0;

    for message in &events.messages {
        let stored = owner_of(message.phone_number_id.as_deref()).and_then(|owner| match owner {
            Some(org) => state.events.record_message(org, message).map(|_| true),
            None => Ok(false),
        });
        match stored {
            Ok(true) => {}
            Ok(false) => warn!(
                "whatsapp: no organization for message {} (phone_number_id={:?})",
                message.provider_message_id, message.phone_number_id
            ),
            Err(e) => {
                error!("whatsapp: failed to store message {}: {e}", message.provider_message_id);
                failed += 1;
            }
        }
    }

    for status in &events.statuses {
        let stored = owner_of(status.phone_number_id.as_deref()).and_then(|owner| match owner {
            Some(org) => state.events.record_status(org, status).map(|()| true),
            None => Ok(false),
        });
        match stored {
            Ok(true) => {}
            Ok(false) => warn!(
                "whatsapp: no organization for status of {} (phone_number_id={:?})",
                status.provider_message_id, status.phone_number_id
            ),
            Err(e) => {
                error!("whatsapp: failed to store status for {}: {e}", status.provider_message_id);
                failed += 1;
            }
        }
    }

    failed
}
