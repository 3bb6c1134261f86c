/// Axum HTTP handlers for Esplora API endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ledger::MockLedger;
use crate::types::*;

/// Shared application state
pub type AppState = Arc<MockLedger>;

/// Custom error type for handlers
pub enum ApiError {
    NotFound(String),
    Status(StatusCode, String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Status(status, msg) => (status, msg),
        };

        (status, message).into_response()
    }
}

/// GET /blocks/tip/height
/// Returns the current blockchain height as plain text
pub async fn get_tip_height(State(ledger): State<AppState>) -> String {
    ledger.tip_height().to_string()
}

/// GET /fee-estimates
/// Returns `{"<confirmation target>": <sat/vB>}`
pub async fn get_fee_estimates(State(ledger): State<AppState>) -> Json<BTreeMap<String, f64>> {
    Json(ledger.fee_estimates())
}

/// POST /tx
/// Broadcasts a raw transaction (hex string in body)
/// Returns the txid as plain text
pub async fn broadcast_transaction(
    State(ledger): State<AppState>,
    body: String,
) -> Result<String, ApiError> {
    ledger.submit(&body).map_err(|(status, reason)| {
        log::warn!("Rejecting broadcast: {}", reason);
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST);
        ApiError::Status(status, reason)
    })
}

/// GET /tx/{txid}/hex
/// Returns raw transaction hex
pub async fn get_transaction_hex(
    State(ledger): State<AppState>,
    Path(txid): Path<String>,
) -> Result<String, ApiError> {
    ledger
        .raw_transaction(&txid)
        .ok_or_else(|| ApiError::NotFound(format!("Transaction not found: {}", txid)))
}

/// GET /address/{address}/utxo
/// Returns all UTXOs for an address
pub async fn get_address_utxos(
    State(ledger): State<AppState>,
    Path(address): Path<String>,
) -> Json<Vec<UtxoResponse>> {
    Json(ledger.address_utxos(&address))
}

// ============================================================================
// REGTEST HELPER ENDPOINTS (not part of standard Esplora API)
// ============================================================================

/// POST /regtest/mine
/// Advance the tip height (helper endpoint for testing)
pub async fn mine_blocks(
    State(ledger): State<AppState>,
    Json(req): Json<MineBlocksRequest>,
) -> Json<MineBlocksResponse> {
    log::info!("Mining {} blocks", req.count);

    let new_height = ledger.mine(req.count);

    Json(MineBlocksResponse { new_height })
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}
