/// Esplora API response types
/// 
/// These types match the Esplora API format so clients can consume them transparently.

use serde::{Deserialize, Serialize};

/// UTXO response from /address/{address}/utxo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtxoResponse {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    pub status: UtxoStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtxoStatus {
    pub confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_time: Option<u64>,
}

/// Body of POST /regtest/mine
#[derive(Debug, Deserialize)]
pub struct MineBlocksRequest {
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct MineBlocksResponse {
    pub new_height: u64,
}
