pub mod api;
pub mod broadcast;
pub mod router;
pub mod server;
pub mod state;
pub mod tenancy;
pub mod webhook;

pub use router::build_router;
pub use server::GatewayServer;
pub use state::{AppState, SharedState};
pub use tenancy::Tenant;
