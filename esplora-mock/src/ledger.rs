/// In-memory chain state behind the mock Esplora endpoints
///
/// Tests seed UTXOs, parent transactions and fee estimates, pick how
/// broadcasts are answered, then inspect what the client actually asked for.

use anyhow::{Context, Result};
use bitcoin::consensus;
use bitcoin::Transaction;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::types::*;

/// How `POST /tx` answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastBehavior {
    /// Decode the transaction and answer with its txid
    Accept,
    /// Answer with an error status and body
    Reject { status: u16, reason: String },
    /// Answer 200 with a fixed id, whatever was submitted
    ReportTxid(String),
}

/// Endpoints with request counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    AddressUtxo,
    FeeEstimates,
    TxHex,
    Broadcast,
    TipHeight,
}

struct LedgerState {
    utxos: HashMap<String, Vec<UtxoResponse>>,
    raw_transactions: HashMap<String, String>,
    fee_estimates: BTreeMap<String, f64>,
    tip_height: u64,
    broadcast_behavior: BroadcastBehavior,
    broadcasted: Vec<String>,
    requests: HashMap<Endpoint, u64>,
}

pub struct MockLedger {
    state: Mutex<LedgerState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    /// Empty ledger at height 100 with a 20/10/5/1 sat/vB fee curve
    pub fn new() -> Self {
        let fee_estimates = [("1", 20.0), ("3", 10.0), ("6", 5.0), ("144", 1.0)]
            .into_iter()
            .map(|(target, rate)| (target.to_string(), rate))
            .collect();

        Self {
            state: Mutex::new(LedgerState {
                utxos: HashMap::new(),
                raw_transactions: HashMap::new(),
                fee_estimates,
                tip_height: 100,
                broadcast_behavior: BroadcastBehavior::Accept,
                broadcasted: Vec::new(),
                requests: HashMap::new(),
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut LedgerState) -> T) -> T {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state)
    }

    /// Store a transaction so `/tx/{txid}/hex` can serve it
    pub fn add_transaction(&self, tx: &Transaction) -> String {
        let txid = tx.compute_txid().to_string();
        let hex = consensus::encode::serialize_hex(tx);
        self.with_state(|s| s.raw_transactions.insert(txid.clone(), hex));
        txid
    }

    /// Store raw hex under an arbitrary txid (for integrity-failure tests)
    pub fn add_raw_transaction(&self, txid: impl Into<String>, hex: impl Into<String>) {
        self.with_state(|s| s.raw_transactions.insert(txid.into(), hex.into()));
    }

    /// Register output `vout` of `tx` as a confirmed UTXO of `address`
    pub fn add_utxo(&self, address: &str, tx: &Transaction, vout: u32) -> Result<()> {
        let output = tx
            .output
            .get(vout as usize)
            .with_context(|| format!("transaction has no output {}", vout))?;
        let txid = self.add_transaction(tx);

        self.with_state(|s| {
            let height = s.tip_height;
            s.utxos.entry(address.to_string()).or_default().push(UtxoResponse {
                txid,
                vout,
                value: output.value.to_sat(),
                status: UtxoStatus {
                    confirmed: true,
                    block_height: Some(height),
                    block_hash: None,
                    block_time: None,
                },
            })
        });
        Ok(())
    }

    pub fn set_fee_estimates(&self, estimates: &[(u16, f64)]) {
        self.with_state(|s| {
            s.fee_estimates = estimates
                .iter()
                .map(|(target, rate)| (target.to_string(), *rate))
                .collect()
        });
    }

    pub fn set_tip_height(&self, height: u64) {
        self.with_state(|s| s.tip_height = height);
    }

    pub fn set_broadcast_behavior(&self, behavior: BroadcastBehavior) {
        self.with_state(|s| s.broadcast_behavior = behavior);
    }

    /// Raw hex of every transaction the mock accepted or reported on
    pub fn broadcasted(&self) -> Vec<String> {
        self.with_state(|s| s.broadcasted.clone())
    }

    pub fn request_count(&self, endpoint: Endpoint) -> u64 {
        self.with_state(|s| s.requests.get(&endpoint).copied().unwrap_or(0))
    }

    pub fn total_requests(&self) -> u64 {
        self.with_state(|s| s.requests.values().sum())
    }

    fn record(&self, endpoint: Endpoint) {
        self.with_state(|s| *s.requests.entry(endpoint).or_insert(0) += 1);
    }

    pub fn address_utxos(&self, address: &str) -> Vec<UtxoResponse> {
        self.record(Endpoint::AddressUtxo);
        self.with_state(|s| s.utxos.get(address).cloned().unwrap_or_default())
    }

    pub fn fee_estimates(&self) -> BTreeMap<String, f64> {
        self.record(Endpoint::FeeEstimates);
        self.with_state(|s| s.fee_estimates.clone())
    }

    pub fn raw_transaction(&self, txid: &str) -> Option<String> {
        self.record(Endpoint::TxHex);
        self.with_state(|s| s.raw_transactions.get(txid).cloned())
    }

    pub fn tip_height(&self) -> u64 {
        self.record(Endpoint::TipHeight);
        self.with_state(|s| s.tip_height)
    }

    /// Mine `count` empty blocks
    pub fn mine(&self, count: u64) -> u64 {
        self.with_state(|s| {
            s.tip_height += count;
            s.tip_height
        })
    }

    /// Answer a broadcast according to the configured behaviour
    ///
    /// Errors carry the HTTP status and body to reply with.
    pub fn submit(&self, tx_hex: &str) -> std::result::Result<String, (u16, String)> {
        self.record(Endpoint::Broadcast);
        let tx_hex = tx_hex.trim().to_string();

        self.with_state(|s| match s.broadcast_behavior.clone() {
            BroadcastBehavior::Reject { status, reason } => Err((status, reason)),
            BroadcastBehavior::ReportTxid(txid) => {
                s.broadcasted.push(tx_hex);
                Ok(txid)
            }
            BroadcastBehavior::Accept => {
                let tx: Transaction = consensus::encode::deserialize_hex(&tx_hex)
                    .map_err(|e| (400, format!("TX decode failed: {}", e)))?;
                let txid = tx.compute_txid().to_string();
                s.raw_transactions.insert(txid.clone(), tx_hex.clone());
                s.broadcasted.push(tx_hex);
                Ok(txid)
            }
        })
    }
}
