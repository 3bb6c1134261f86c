/// Axum HTTP server setup and routing

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::*;
use crate::ledger::MockLedger;

pub fn create_router(ledger: Arc<MockLedger>) -> Router {
    // Allow cross-origin requests from local tooling
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        
        // Block endpoints
        .route("/blocks/tip/height", get(get_tip_height))

        // Fee endpoints
        .route("/fee-estimates", get(get_fee_estimates))
        
        // Transaction endpoints
        .route("/tx", post(broadcast_transaction))
        .route("/tx/:txid/hex", get(get_transaction_hex))
        
        // Address endpoints
        .route("/address/:address/utxo", get(get_address_utxos))
        
        // Regtest helper endpoints
        .route("/regtest/mine", post(mine_blocks))
        
        // Shared state
        .with_state(ledger)
        
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(
    ledger: Arc<MockLedger>,
    host: String,
    port: u16,
) -> anyhow::Result<()> {
    let app = create_router(ledger);
    
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    
    log::info!("Esplora mock server listening on http://{}", addr);
    log::info!("Regtest mining endpoint: POST /regtest/mine");
    
    axum::serve(listener, app)
        .await?;
    
    Ok(())
}

/// Serve `ledger` on an ephemeral localhost port
///
/// Returns the base URL and the server task; abort the task to stop it.
pub async fn spawn(ledger: Arc<MockLedger>) -> anyhow::Result<(String, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}", listener.local_addr()?);
    let app = create_router(ledger);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            log::error!("Esplora mock server stopped: {}", e);
        }
    });

    log::debug!("Esplora mock server spawned at {}", url);
    Ok((url, handle))
}
