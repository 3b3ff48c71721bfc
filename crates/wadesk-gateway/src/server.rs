use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use wadesk_common::{Error, Result};
use wadesk_config::AppConfig;

use crate::router::build_router;
use crate::state::AppState;

/// Binds the configured address and serves the HTTP API.
pub struct GatewayServer {
    config: AppConfig,
    data_dir: PathBuf,
}

impl GatewayServer {
    pub fn new(config: AppConfig, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            data_dir: data_dir.into(),
        }
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.gateway.host, self.config.gateway.port);

        let state = Arc::new(AppState::open(self.config, &self.data_dir)?);
        let app = build_router(state);

        let listener = TcpListener::bind(&addr).await?;
        info!("wadesk gateway listening on {addr}");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Gateway(format!("server error: {e}")))?;

        info!("wadesk gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            warn!("failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
    }
}
