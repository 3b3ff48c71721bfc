use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;
use wadesk_common::{Error, OrganizationId, Result};

static UUID_V4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-4[0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}$")
        .expect("uuid v4 pattern is valid")
});

/// Strict hyphenated UUID-v4 shape check: version nibble `4`, RFC 4122 variant.
/// Braced, URN, and simple (unhyphenated) forms are rejected.
pub fn is_uuid_v4(value: &str) -> bool {
    UUID_V4.is_match(value)
}

/// Parse untrusted input into an [`OrganizationId`], enforcing the v4 shape.
pub fn parse_organization_id(value: &str) -> Result<OrganizationId> {
    if !is_uuid_v4(value) {
        return Err(Error::Security(format!(
            "organization id is not a UUID v4: {value}"
        )));
    }
    Uuid::parse_str(value)
        .map(OrganizationId::from)
        .map_err(|e| Error::Security(format!("invalid organization id: {e}")))
}
