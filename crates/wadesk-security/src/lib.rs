pub mod signature;
pub mod tenancy;
pub mod validation;

pub use signature::{SIGNATURE_HEADER, verify_signature};
pub use tenancy::{
    ORGANIZATION_HEADER, TenancyError, TenancyOutcome, TenancyRequest, TenancyResolver,
    TenancySource, TenantContext,
};
pub use validation::{is_uuid_v4, parse_organization_id};
