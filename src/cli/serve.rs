use crate::core::config::AppConfig;
use crate::server;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub async fn run(config: &AppConfig, listen: Option<&str>) -> Result<()> {
    let addr = listen.unwrap_or(&config.server.listen_addr);
    let service = Arc::new(crate::build_service(config)?);

    if config.credential().api_key().is_none() {
        warn!(
            env_var = %config.provider.api_key_env,
            "API key not set, /rates will report a configuration error"
        );
    }

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, base_url = %config.provider.base_url, "Rate server listening");

    server::serve(listener, service, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    })
    .await?;

    info!("Rate server stopped");
    Ok(())
}
