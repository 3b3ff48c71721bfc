use axum::Router;
use axum::http::{StatusCode, Uri};
use axum::middleware;
use axum::response::Response;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

use crate::api::{self, error_response};
use crate::state::SharedState;
use crate::{broadcast, tenancy, webhook};

/// Build the main application router with all routes.
///
/// The tenancy layer wraps the fallback too, so unknown protected paths are
/// rejected for a missing organization before they 404.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route(
            "/api/webhooks/whatsapp",
            get(webhook::verify).post(webhook::receive),
        )
        .route(
            "/api/v1/whatsapp/settings",
            get(api::get_settings).put(api::save_settings),
        )
        .route("/api/v1/whatsapp/test-connection", post(api::test_connection))
        .route("/api/v1/whatsapp/messages", post(api::send_message))
        .route(
            "/api/v1/whatsapp/messages/{message_id}/status",
            get(api::message_status),
        )
        .route("/api/v1/whatsapp/templates", get(api::list_templates))
        .route("/api/v1/whatsapp/templates/sync", post(api::sync_templates))
        .route(
            "/api/v1/whatsapp/templates/{name}/{language}",
            put(api::edit_template),
        )
        .route("/api/v1/whatsapp/inbox", get(api::inbox))
        .route("/api/v1/broadcasts/send", post(broadcast::send_broadcast))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            tenancy::resolve_tenant,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn not_found(uri: Uri) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        "NOT_FOUND",
        format!("no route for {}", uri.path()),
    )
}
