//! Serve command implementation

use crate::config::Config;
use crate::service;
use clap::Args;
use std::net::SocketAddr;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Override the HTTP listen address
    #[arg(long)]
    pub http_addr: Option<SocketAddr>,
}

impl ServeArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let addr = self.http_addr.unwrap_or(config.service.http_addr);
        let runtime = service::start(config).await?;
        let auth = config.service.auth();
        if auth.enabled && auth.api_key.as_deref().map_or(true, str::is_empty) {
            tracing::warn!("No API key configured, every request except /health will be refused");
        }
        let app = service::router(runtime.service.clone(), auth);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr = %addr, "HTTP adapter listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for shutdown signal");
                }
                tracing::info!("Shutdown requested");
            })
            .await?;

        runtime.shutdown().await;
        Ok(())
    }
}
