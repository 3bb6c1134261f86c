//! External collaborators consumed by the pipeline
//!
//! The engine never talks to the network directly; it goes through these
//! traits. [`crate::esplora::EsploraClient`] implements all of them.

use async_trait::async_trait;
use bitcoin::{Amount, Txid};

use crate::error::{BroadcastError, SourceError};
use crate::types::{FeeRateQuote, UnspentOutput};

/// Spendable outputs of an address
#[async_trait]
pub trait UtxoSource: Send + Sync {
    /// `ceiling` caps the total value returned; callers pass a very large
    /// value to get the full spendable set.
    async fn fetch_utxos(&self, address: &str, ceiling: Amount) -> Result<Vec<UnspentOutput>, SourceError>;
}

#[async_trait]
pub trait FeeRateSource: Send + Sync {
    async fn fetch_fee_rates(&self) -> Result<FeeRateQuote, SourceError>;
}

/// Raw consensus bytes of previously confirmed transactions
#[async_trait]
pub trait ParentTxSource: Send + Sync {
    async fn fetch_raw_transaction(&self, txid: &Txid) -> Result<Vec<u8>, SourceError>;
}

#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Submit raw transaction bytes and return the id the network assigned
    async fn submit(&self, raw_transaction: &[u8]) -> Result<String, BroadcastError>;
}

/// Chain tip height, used by the liveness probe
#[async_trait]
pub trait ChainTipSource: Send + Sync {
    async fn tip_height(&self) -> Result<u64, SourceError>;

    /// Endpoint reported by `ping_network`
    fn url(&self) -> String;
}
