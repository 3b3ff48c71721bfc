use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use tracing::info;
use wadesk_channels::{SendResult, WhatsAppClient, WhatsAppCredentials};

use crate::api::{MessageContent, error_response, internal_error};
use crate::state::SharedState;
use crate::tenancy::Tenant;

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub recipients: Vec<String>,
    #[serde(flatten)]
    pub content: MessageContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastOutcome {
    pub to: String,
    pub result: SendResult,
}

/// Send `content` to every recipient, at most `concurrency` requests in flight.
///
/// Outcomes come back in recipient order. A failed recipient, including one
/// whose address does not build, never stops the rest.
pub async fn deliver(
    client: &WhatsAppClient,
    credentials: &WhatsAppCredentials,
    content: &MessageContent,
    recipients: Vec<String>,
    concurrency: usize,
) -> Vec<BroadcastOutcome> {
    stream::iter(recipients)
        .map(|to| async move {
            let result = match content.build(&to) {
                Ok(message) => client.send_message(credentials, &message).await,
                Err(e) => SendResult::failed(e),
            };
            BroadcastOutcome { to, result }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// POST /api/v1/broadcasts/send
pub async fn send_broadcast(
    State(state): State<SharedState>,
    tenant: Tenant,
    Json(body): Json<BroadcastRequest>,
) -> Response {
    if body.recipients.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "at least one recipient is required",
        );
    }

    let org = tenant.organization_id();
    let creds = match state.credentials(org) {
        Ok(creds) => creds,
        Err(e) => return internal_error(e),
    };

    let total = body.recipients.len();
    let results = deliver(
        &state.whatsapp,
        &creds,
        &body.content,
        body.recipients,
        state.broadcast_concurrency(),
    )
    .await;
    let sent = results.iter().filter(|o| o.result.success).count();
    info!("broadcast for org {org}: {sent}/{total} sent");

    Json(serde_json::json!({
        "total": total,
        "sent": sent,
        "failed": total - sent,
        "results": results,
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::Router;
    use axum::routing::post;
    use serde_json::{Value, json};
    use wadesk_common::OrganizationId;

    async fn mock_graph(in_flight_peak: Arc<AtomicUsize>) -> String {
        let current = Arc::new(AtomicUsize::new(0));
        let app = Router::new().route(
            "/{phone}/messages",
            post(move |Json(body): Json<Value>| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&in_flight_peak);
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    current.fetch_sub(1, Ordering::SeqCst);

                    let to = body["to"].as_str().unwrap_or_default().to_string();
                    if to.ends_with('2') {
                        (
                            StatusCode::BAD_REQUEST,
                            Json(json!({ "error": { "message": "Recipient not on WhatsApp" } })),
                        )
                    } else {
                        (
                            StatusCode::OK,
                            Json(json!({ "messages": [{ "id": format!("wamid.{to}") }] })),
                        )
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn credentials() -> WhatsAppCredentials {
        WhatsAppCredentials {
            organization_id: OrganizationId::new(),
            access_token: "token".into(),
            phone_number_id: "PN1".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn failures_do_not_abort_and_order_is_kept() {
        let peak = Arc::new(AtomicUsize::new(0));
        let base = mock_graph(Arc::clone(&peak)).await;
        let client = WhatsAppClient::new(Duration::from_secs(5))
            .unwrap()
            .with_base_url(base);

        let recipients = vec![
            "15550000001".to_string(),
            "15550000002".to_string(),
            "bogus".to_string(),
            "15550000003".to_string(),
            "15550000004".to_string(),
        ];
        let content = MessageContent::Text { body: "sale".into() };

        let outcomes = deliver(&client, &credentials(), &content, recipients.clone(), 2).await;

        let order: Vec<&str> = outcomes.iter().map(|o| o.to.as_str()).collect();
        assert_eq!(order, recipients.iter().map(String::as_str).collect::<Vec<_>>());

        assert_eq!(outcomes[0].result, SendResult::sent("wamid.15550000001"));
        assert_eq!(
            outcomes[1].result.error.as_deref(),
            Some("Recipient not on WhatsApp")
        );
        assert!(!outcomes[2].result.success);
        assert!(outcomes[2].result.error.as_deref().unwrap().contains("invalid recipient"));
        assert!(outcomes[3].result.success);
        assert!(outcomes[4].result.success);

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn unconfigured_credentials_fail_every_recipient() {
        let client = WhatsAppClient::new(Duration::from_secs(1)).unwrap();
        let content = MessageContent::Text { body: "hi".into() };
        let outcomes = deliver(
            &client,
            &WhatsAppCredentials::default(),
            &content,
            vec!["15550000001".into(), "15550000003".into()],
            4,
        )
        .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| {
            o.result.error.as_deref() == Some("WhatsApp credentials not configured")
        }));
    }
}
