//! Organization (tenant) resolution for inbound requests.
//!
//! Each request starts unresolved and ends either resolved to a
//! [`TenantContext`], bypassed (public route), or rejected with a
//! [`TenancyError`]. This module is transport-agnostic; the gateway feeds it
//! the request path, headers, and query string.

use std::net::IpAddr;

use thiserror::Error;
use tracing::debug;
use wadesk_common::OrganizationId;

use crate::validation::parse_organization_id;

pub const ORGANIZATION_HEADER: &str = "x-organization-id";
pub const ORGANIZATION_QUERY_PARAM: &str = "organizationId";

/// Subdomain labels that never name an organization.
const RESERVED_SUBDOMAINS: &[&str] = &["www", "api", "app"];

/// Organization scope attached to a request once resolved. Never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub organization_id: OrganizationId,
}

/// Where a resolved organization id came from, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenancySource {
    Header,
    Query,
    Subdomain,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TenancyError {
    #[error("organization context is required for this route")]
    Missing,

    #[error("organization id from {origin:?} is not a valid UUID v4")]
    Invalid { origin: TenancySource },

    #[error("{origin:?} names more than one organization")]
    Ambiguous { origin: TenancySource },
}

impl TenancyError {
    /// Stable machine-readable code returned in rejection bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Missing => "MISSING_ORGANIZATION",
            Self::Invalid { .. } => "INVALID_ORGANIZATION_ID",
            Self::Ambiguous { .. } => "AMBIGUOUS_ORGANIZATION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenancyOutcome {
    /// Public route: proceeds without organization context.
    Bypassed,
    Resolved {
        context: TenantContext,
        source: TenancySource,
    },
}

/// The parts of a request the resolver looks at.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenancyRequest<'a> {
    pub path: &'a str,
    /// Every value of the organization header, in request order.
    pub headers: &'a [&'a str],
    /// Raw query string, without the leading `?`.
    pub query: Option<&'a str>,
    pub host: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct TenancyResolver {
    public_prefixes: Vec<String>,
    base_domain: Option<String>,
}

impl TenancyResolver {
    pub fn new(public_prefixes: Vec<String>, base_domain: Option<String>) -> Self {
        Self {
            public_prefixes,
            base_domain: base_domain
                .map(|d| d.trim().trim_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty()),
        }
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_prefixes.iter().any(|prefix| {
            let prefix = prefix.trim_end_matches('/');
            path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn resolve(&self, req: &TenancyRequest<'_>) -> Result<TenancyOutcome, TenancyError> {
        if self.is_public(req.path) {
            debug!("tenancy: public route {}, skipping resolution", req.path);
            return Ok(TenancyOutcome::Bypassed);
        }

        let (raw, source) = self.find_candidate(req)?.ok_or(TenancyError::Missing)?;

        let organization_id =
            parse_organization_id(&raw).map_err(|_| TenancyError::Invalid { origin: source })?;

        Ok(TenancyOutcome::Resolved {
            context: TenantContext { organization_id },
            source,
        })
    }

    /// The first source with a non-empty value wins: header, then query, then
    /// subdomain. A source carrying two different values is rejected.
    fn find_candidate(
        &self,
        req: &TenancyRequest<'_>,
    ) -> Result<Option<(String, TenancySource)>, TenancyError> {
        if let Some(value) = single_value(req.headers.iter().copied(), TenancySource::Header)? {
            return Ok(Some((value, TenancySource::Header)));
        }

        if let Some(query) = req.query {
            let from_query: Vec<String> = url::form_urlencoded::parse(query.as_bytes())
                .filter(|(key, _)| key == ORGANIZATION_QUERY_PARAM)
                .map(|(_, value)| value.into_owned())
                .collect();
            let values = from_query.iter().map(String::as_str);
            if let Some(value) = single_value(values, TenancySource::Query)? {
                return Ok(Some((value, TenancySource::Query)));
            }
        }

        Ok(req
            .host
            .and_then(|host| self.subdomain(host))
            .map(|value| (value, TenancySource::Subdomain)))
    }

    fn subdomain(&self, host: &str) -> Option<String> {
        let base = self.base_domain.as_deref()?;
        let host = strip_port(host.trim())?.to_ascii_lowercase();

        if host.parse::<IpAddr>().is_ok() {
            return None;
        }

        let label = host.strip_suffix(base)?.strip_suffix('.')?;
        if label.is_empty() || label.contains('.') || RESERVED_SUBDOMAINS.contains(&label) {
            return None;
        }
        Some(label.to_string())
    }
}

/// Blank values are ignored; repeats of the same id (in any case) collapse.
fn single_value<'v>(
    values: impl Iterator<Item = &'v str>,
    origin: TenancySource,
) -> Result<Option<String>, TenancyError> {
    let mut found: Option<&str> = None;
    for value in values.map(str::trim).filter(|v| !v.is_empty()) {
        match found {
            Some(first) if !first.eq_ignore_ascii_case(value) => {
                return Err(TenancyError::Ambiguous { origin });
            }
            Some(_) => {}
            None => found = Some(value),
        }
    }
    Ok(found.map(String::from))
}

fn strip_port(host: &str) -> Option<&str> {
    // Bracketed IPv6 literal; never a subdomain.
    if host.starts_with('[') {
        return None;
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => Some(name),
        Some(_) => None,
        None => Some(host),
    }
}
