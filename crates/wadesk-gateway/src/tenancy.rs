//! Request scoping: every non-public request carries exactly one organization.
//!
//! The middleware resolves the organization with [`TenancyResolver`], stores a
//! [`TenantContext`] in the request extensions and echoes the id back in the
//! `x-organization-id` response header. Handlers read it with [`Tenant`].

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::HOST;
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};
use wadesk_common::OrganizationId;
use wadesk_security::{
    ORGANIZATION_HEADER, TenancyError, TenancyOutcome, TenancyRequest, TenantContext,
};

use crate::api::error_response;
use crate::state::SharedState;

pub async fn resolve_tenant(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Response {
    // Non-UTF-8 header bytes must still be rejected as invalid, not ignored.
    let header_values: Vec<String> = request
        .headers()
        .get_all(ORGANIZATION_HEADER)
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .collect();
    let headers: Vec<&str> = header_values.iter().map(String::as_str).collect();
    let host = request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().host())
        .map(str::to_owned);

    let outcome = state.tenancy.resolve(&TenancyRequest {
        path: request.uri().path(),
        headers: &headers,
        query: request.uri().query(),
        host: host.as_deref(),
    });

    match outcome {
        Ok(TenancyOutcome::Bypassed) => next.run(request).await,
        Ok(TenancyOutcome::Resolved { context, source }) => {
            let context = match request.extensions().get::<TenantContext>() {
                Some(existing) => *existing,
                None => {
                    request.extensions_mut().insert(context);
                    context
                }
            };
            debug!(
                "request {} scoped to org {} via {source:?}",
                request.uri().path(),
                context.organization_id
            );

            let mut response = next.run(request).await;
            if let Ok(value) = HeaderValue::from_str(&context.organization_id.to_hyphenated()) {
                response.headers_mut().insert(ORGANIZATION_HEADER, value);
            }
            response
        }
        Err(e) => {
            warn!("rejecting {}: {e}", request.uri().path());
            rejection(&e)
        }
    }
}

fn rejection(error: &TenancyError) -> Response {
    error_response(StatusCode::BAD_REQUEST, error.code(), error)
}

/// Extractor for the organization a request was scoped to.
#[derive(Debug, Clone, Copy)]
pub struct Tenant(pub TenantContext);

impl Tenant {
    pub fn organization_id(&self) -> OrganizationId {
        self.0.organization_id
    }
}

impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .copied()
            .map(Tenant)
            .ok_or_else(|| rejection(&TenancyError::Missing))
    }
}
