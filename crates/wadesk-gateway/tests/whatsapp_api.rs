mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::{ORG_A, ORG_B, app, body_json, get_as, json_request, send, serve, state_with};
use serde_json::{Value, json};
use wadesk_config::AppConfig;
use wadesk_gateway::SharedState;

fn graph_mock(sends: Arc<AtomicUsize>, template_body: &'static str) -> Router {
    Router::new()
        .route(
            "/{node}",
            get(|Path(node): Path<String>| async move {
                Json(json!({
                    "id": node,
                    "display_phone_number": "+1 555-0100",
                    "verified_name": "Acme",
                    "whatsapp_business_account": { "id": "WABA1" }
                }))
            }),
        )
        .route(
            "/{node}/messages",
            post(move |Json(body): Json<Value>| {
                let sends = Arc::clone(&sends);
                async move {
                    sends.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "messages": [{ "id": format!("wamid.{}", body["to"].as_str().unwrap_or("")) }] }))
                }
            }),
        )
        .route(
            "/{node}/message_templates",
            get(move || async move {
                Json(json!({ "data": [
                    { "id": "t1", "name": "order_update", "status": "APPROVED",
                      "category": "UTILITY", "language": "en_US",
                      "components": [{ "type": "BODY", "text": template_body }] },
                    { "id": "t2", "name": "promo", "status": "REJECTED",
                      "category": "MARKETING", "language": "en_US", "components": [] }
                ]}))
            }),
        )
}

async fn configured_state(sends: Arc<AtomicUsize>) -> SharedState {
    let base = serve(graph_mock(sends, "Hi {{1}}, order {{2}} shipped")).await;
    let mut config = AppConfig::default();
    config.whatsapp.api_base_url = base;
    let state = state_with(config);

    let response = send(
        app(&state),
        json_request(
            "PUT",
            "/api/v1/whatsapp/settings",
            ORG_A,
            json!({ "access_token": "token-abcdefgh", "phone_number_id": "PN-A" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    state
}

#[tokio::test]
async fn text_message_is_sent_with_stored_credentials() {
    let sends = Arc::new(AtomicUsize::new(0));
    let state = configured_state(Arc::clone(&sends)).await;

    let response = send(
        app(&state),
        json_request(
            "POST",
            "/api/v1/whatsapp/messages",
            ORG_A,
            json!({ "to": "+1 (555) 123-4567", "type": "text", "body": "hello" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "success": true, "message_id": "wamid.+15551234567" })
    );
    assert_eq!(sends.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_message_is_rejected_before_sending() {
    let sends = Arc::new(AtomicUsize::new(0));
    let state = configured_state(Arc::clone(&sends)).await;

    for body in [
        json!({ "to": "12345", "type": "text", "body": "hello" }),
        json!({ "to": "+15551234567", "type": "text", "body": "   " }),
        json!({ "to": "+15551234567", "type": "template", "template_name": "!!!", "language_code": "" }),
    ] {
        let response = send(
            app(&state),
            json_request("POST", "/api/v1/whatsapp/messages", ORG_A, body.clone()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body_json(response).await["code"], "VALIDATION_FAILED");
    }
    assert_eq!(sends.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unconfigured_org_gets_configuration_error_without_io() {
    let sends = Arc::new(AtomicUsize::new(0));
    let state = configured_state(Arc::clone(&sends)).await;

    let response = send(
        app(&state),
        json_request(
            "POST",
            "/api/v1/whatsapp/messages",
            ORG_B,
            json!({ "to": "+15551234567", "type": "text", "body": "hello" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        body_json(response).await,
        json!({ "success": false, "error": "WhatsApp credentials not configured" })
    );
    assert_eq!(sends.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn connection_test_reports_phone_details() {
    let state = configured_state(Arc::new(AtomicUsize::new(0))).await;

    let response = send(
        app(&state),
        json_request("POST", "/api/v1/whatsapp/test-connection", ORG_A, json!({})),
    )
    .await;
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["verified_name"], "Acme");
}

#[tokio::test]
async fn template_sync_counts_created_then_updated() {
    let state = configured_state(Arc::new(AtomicUsize::new(0))).await;
    let sync = || json_request("POST", "/api/v1/whatsapp/templates/sync", ORG_A, json!({}));

    let first = body_json(send(app(&state), sync()).await).await;
    assert_eq!(
        first,
        json!({ "success": true, "synced": 1, "created": 1, "updated": 0 })
    );

    let second = body_json(send(app(&state), sync()).await).await;
    assert_eq!(
        second,
        json!({ "success": true, "synced": 1, "created": 0, "updated": 1 })
    );

    let listed = body_json(send(app(&state), get_as("/api/v1/whatsapp/templates", ORG_A)).await).await;
    let templates = listed["templates"].as_array().unwrap();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0]["name"], "order_update");
    assert_eq!(templates[0]["status"], "APPROVED");
    assert_eq!(templates[0]["variable_placeholders"], json!(["1", "2"]));

    let other = body_json(send(app(&state), get_as("/api/v1/whatsapp/templates", ORG_B)).await).await;
    assert_eq!(other["templates"], json!([]));
}

#[tokio::test]
async fn template_sync_failure_reports_error() {
    let state = configured_state(Arc::new(AtomicUsize::new(0))).await;

    let response = send(
        app(&state),
        json_request("POST", "/api/v1/whatsapp/templates/sync", ORG_B, json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "WhatsApp credentials not configured");
}

#[tokio::test]
async fn broadcast_returns_results_in_request_order() {
    let sends = Arc::new(AtomicUsize::new(0));
    let state = configured_state(Arc::clone(&sends)).await;

    let response = send(
        app(&state),
        json_request(
            "POST",
            "/api/v1/broadcasts/send",
            ORG_A,
            json!({
                "recipients": ["15550000001", "oops", "15550000003"],
                "type": "template",
                "template_name": "order_update",
                "variables": ["Ann", "A-1"]
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["sent"], 2);
    assert_eq!(body["failed"], 1);

    let results = body["results"].as_array().unwrap();
    let order: Vec<&str> = results.iter().map(|r| r["to"].as_str().unwrap()).collect();
    assert_eq!(order, ["15550000001", "oops", "15550000003"]);
    assert_eq!(results[0]["result"]["message_id"], "wamid.15550000001");
    assert_eq!(results[1]["result"]["success"], false);
    assert_eq!(sends.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn broadcast_without_recipients_is_rejected() {
    let state = configured_state(Arc::new(AtomicUsize::new(0))).await;
    let response = send(
        app(&state),
        json_request(
            "POST",
            "/api/v1/broadcasts/send",
            ORG_A,
            json!({ "recipients": [], "type": "text", "body": "hi" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn provider_rejection_is_a_bad_gateway() {
    let rejecting = Router::new().route(
        "/{node}/messages",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": { "message": "Invalid parameter" } })),
            )
        }),
    );
    let mut config = AppConfig::default();
    config.whatsapp.api_base_url = serve(rejecting).await;
    let state = state_with(config);
    send(
        app(&state),
        json_request(
            "PUT",
            "/api/v1/whatsapp/settings",
            ORG_A,
            json!({ "access_token": "token-abcdefgh", "phone_number_id": "PN-A" }),
        ),
    )
    .await;

    let response = send(
        app(&state),
        json_request(
            "POST",
            "/api/v1/whatsapp/messages",
            ORG_A,
            json!({ "to": "+15551234567", "type": "text", "body": "hello" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        body_json(response).await,
        json!({ "success": false, "error": "Invalid parameter" })
    );
}

#[tokio::test]
async fn edited_template_returns_to_pending_with_new_placeholders() {
    let state = configured_state(Arc::new(AtomicUsize::new(0))).await;
    send(
        app(&state),
        json_request("POST", "/api/v1/whatsapp/templates/sync", ORG_A, json!({})),
    )
    .await;

    let edit = |org| {
        json_request(
            "PUT",
            "/api/v1/whatsapp/templates/order_update/en_US",
            org,
            json!({ "body_text": "Order {{1}} is on its way" }),
        )
    };

    // Another organization cannot touch the template.
    let foreign = send(app(&state), edit(ORG_B)).await;
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

    let response = send(app(&state), edit(ORG_A)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "PENDING");

    let listed = body_json(send(app(&state), get_as("/api/v1/whatsapp/templates", ORG_A)).await).await;
    assert_eq!(listed["templates"][0]["status"], "PENDING");
    assert_eq!(listed["templates"][0]["body_text"], "Order {{1}} is on its way");
    assert_eq!(listed["templates"][0]["variable_placeholders"], json!(["1"]));

    let blank = send(
        app(&state),
        json_request(
            "PUT",
            "/api/v1/whatsapp/templates/order_update/en_US",
            ORG_A,
            json!({ "body_text": "  " }),
        ),
    )
    .await;
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
}
