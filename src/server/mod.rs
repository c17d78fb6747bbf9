/// HTTP surface over the ledger, the chain and the anchor gateway.
///
/// Handlers own nothing. Every store is built once in `main` and reaches
/// the handlers through [`AppState`], so tests can drive the router over
/// in-memory stores without binding a socket.
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::anchor::AnchorGateway;
use crate::chain::BlockChain;
use crate::error::{LedgerError, Result};
use crate::ledger::EvidenceLedger;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<EvidenceLedger>,
    pub chain: Arc<BlockChain>,
    pub anchor: Arc<AnchorGateway>,
}

/// The full router: health, ledger and blockchain groups.
///
/// CORS is wide open because the browser UI is served from elsewhere.
pub fn build_app(state: AppState) -> Router {
    let routes = routes::health_routes()
        .merge(routes::ledger_routes())
        .merge(routes::blockchain_routes());

    routes
        .with_state(Arc::new(state))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, "Listening");

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(LedgerError::Io)?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
