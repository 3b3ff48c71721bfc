use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    #[serde(default)]
    pub tenancy: TenancyConfig,

    /// Directory holding `wadesk.db`. Defaults to `<config dir>/data`.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Process-wide settings for talking to the WhatsApp Cloud API.
///
/// Per-organization credentials are not configured here; they live in the
/// settings store and are re-read on every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Upper bound for a single provider request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Accepted on webhook verification in addition to every organization's
    /// stored verify token.
    #[serde(default)]
    pub webhook_verify_token: Option<String>,

    /// Meta app secret. When set, webhook POSTs must carry a valid
    /// `X-Hub-Signature-256` header.
    #[serde(default)]
    pub app_secret: Option<String>,

    #[serde(default = "default_broadcast_concurrency")]
    pub broadcast_concurrency: usize,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            webhook_verify_token: None,
            app_secret: None,
            broadcast_concurrency: default_broadcast_concurrency(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://graph.facebook.com/v21.0".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_broadcast_concurrency() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Path prefixes that skip organization resolution entirely.
    #[serde(default = "default_public_prefixes")]
    pub public_prefixes: Vec<String>,

    /// Apex domain the dashboard is served under, e.g. `wadesk.example.com`.
    /// Enables subdomain resolution relative to it.
    #[serde(default)]
    pub base_domain: Option<String>,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            public_prefixes: default_public_prefixes(),
            base_domain: None,
        }
    }
}

fn default_public_prefixes() -> Vec<String> {
    [
        "/health",
        "/api/health",
        "/api/auth/login",
        "/api/auth/signup",
        "/api/auth/forgot-password",
        "/api/auth/reset-password",
        "/api/webhooks",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
