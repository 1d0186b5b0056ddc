//! MCP server initialization for stdio and streamable HTTP transports.
//!
//! Provides [`serve`], which builds the session coordinator (embedding
//! provider + vector index) and runs the MCP tool handler on the configured
//! transport.

use std::sync::Arc;

use anyhow::{bail, Result};
use rmcp::ServiceExt;

use crate::config::VigilConfig;
use crate::session::Coordinator;
use crate::tools::VigilTools;

/// Shared setup: embedding provider, vector index and the coordinator over them.
fn setup_coordinator(config: VigilConfig) -> Result<Arc<Coordinator>> {
    let coordinator = Coordinator::from_config(config)?;
    Ok(Arc::new(coordinator))
}

/// Start the server on the transport named in `server.transport`.
pub async fn serve(config: VigilConfig) -> Result<()> {
    match config.server.transport.as_str() {
        "stdio" => serve_stdio(config).await,
        "http" => serve_http(config).await,
        other => bail!("unknown transport: {other}. Supported: stdio, http"),
    }
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: VigilConfig) -> Result<()> {
    tracing::info!("starting vigil MCP server on stdio");

    let coordinator = setup_coordinator(config)?;
    let tools = VigilTools::new(Arc::clone(&coordinator));
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    finalize_on_exit(&coordinator).await;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over streamable HTTP transport.
pub async fn serve_http(config: VigilConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting vigil MCP server on HTTP");

    let coordinator = setup_coordinator(config)?;
    let shared = Arc::clone(&coordinator);

    // Every HTTP client session shares the one coordinator, so they all see the
    // same active session.
    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(VigilTools::new(Arc::clone(&shared))),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    finalize_on_exit(&coordinator).await;
    Ok(())
}

/// Session memory is ephemeral: drop whatever session is still open.
async fn finalize_on_exit(coordinator: &Coordinator) {
    match coordinator.finalize_session().await {
        Ok(report) if report.finalized => {
            tracing::info!(session_id = ?report.session_id, "finalized open session on exit");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "failed to finalize session on exit"),
    }
}
