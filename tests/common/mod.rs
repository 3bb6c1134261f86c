//! Shared fixtures for the integration tests
//!
//! - Deterministic keys and their addresses of every supported kind
//! - `MemorySources`: in-memory data sources with call counters
//! - `MockDevice`: a hardware transport that signs with a known key

#![allow(dead_code)]

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::bip32::DerivationPath;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::transaction::Version;
use bitcoin::{
    consensus, ecdsa, Address, Amount, CompressedPublicKey, Network, OutPoint, PrivateKey, PublicKey, ScriptBuf,
    Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use rust_decimal::Decimal;

use btc_transfer::{
    Account, BroadcastError, Broadcaster, ChainTipSource, DataSources, DeviceError, DeviceErrorKind,
    DeviceSignRequest, DeviceSignature, EngineConfig, FeeRateQuote, FeeRateSource, HardwareTransport,
    ParentTxSource, SourceError, TransferEngine, TransportProvider, UnspentOutput, UtxoSource,
};

pub const NETWORK: Network = Network::Regtest;

pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

// ============================================================================
// Keys and addresses
// ============================================================================

pub struct TestKey {
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
    compressed: CompressedPublicKey,
}

impl TestKey {
    pub fn new(seed: u8) -> Self {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[seed; 32]).expect("valid secret key");
        let private_key = PrivateKey::new(secret, NETWORK);
        let public_key = PublicKey::from_private_key(&secp, &private_key);
        let compressed = CompressedPublicKey::try_from(public_key).expect("compressed key");

        Self {
            private_key,
            public_key,
            compressed,
        }
    }

    pub fn segwit_address(&self) -> String {
        Address::p2wpkh(&self.compressed, NETWORK).to_string()
    }

    pub fn legacy_address(&self) -> String {
        Address::p2pkh(self.compressed, NETWORK).to_string()
    }

    pub fn p2sh_address(&self) -> String {
        Address::p2shwpkh(&self.compressed, NETWORK).to_string()
    }

    pub fn wif(&self) -> String {
        self.private_key.to_wif()
    }

    pub fn account(&self, address: String) -> Account {
        Account::with_private_key(address, self.private_key)
    }
}

pub fn script_for(address: &str) -> ScriptBuf {
    Address::from_str(address)
        .expect("valid address")
        .assume_checked()
        .script_pubkey()
}

/// A confirmed-looking transaction paying `values` to `script`
pub fn funding_tx(script: &ScriptBuf, values: &[u64], salt: u8) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: Txid::from_byte_array([salt; 32]),
                vout: 0,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: values
            .iter()
            .map(|value| TxOut {
                value: Amount::from_sat(*value),
                script_pubkey: script.clone(),
            })
            .collect(),
    }
}

pub fn regtest_config() -> EngineConfig {
    EngineConfig::for_network(NETWORK)
}

// ============================================================================
// In-memory data sources
// ============================================================================

/// How the in-memory broadcaster answers
#[derive(Clone, Debug)]
pub enum BroadcastReply {
    /// Report the txid of the submitted bytes
    Echo,
    Report(String),
    Reject(String),
    Transport(String),
}

pub struct MemorySources {
    utxos: Mutex<Vec<UnspentOutput>>,
    parents: Mutex<HashMap<Txid, Vec<u8>>>,
    quote: Mutex<FeeRateQuote>,
    reply: Mutex<BroadcastReply>,
    submitted: Mutex<Vec<Transaction>>,
    tip_delay: Mutex<Duration>,
    salt: AtomicU8,
    calls: AtomicUsize,
}

impl MemorySources {
    pub fn new(fee_rate: i64) -> Arc<Self> {
        Arc::new(Self {
            utxos: Mutex::new(Vec::new()),
            parents: Mutex::new(HashMap::new()),
            quote: Mutex::new(FeeRateQuote::flat(Decimal::from(fee_rate))),
            reply: Mutex::new(BroadcastReply::Echo),
            submitted: Mutex::new(Vec::new()),
            tip_delay: Mutex::new(Duration::ZERO),
            salt: AtomicU8::new(1),
            calls: AtomicUsize::new(0),
        })
    }

    /// Create one parent transaction paying `values` to `address` and
    /// register each output as a UTXO
    pub fn fund(&self, address: &str, values: &[u64]) -> Transaction {
        self.fund_as(address, &script_for(address), values)
    }

    /// Like `fund`, but the parent actually pays `script` while the UTXOs
    /// are listed under `address`
    pub fn fund_as(&self, address: &str, script: &ScriptBuf, values: &[u64]) -> Transaction {
        let salt = self.salt.fetch_add(1, Ordering::SeqCst);
        let tx = funding_tx(script, values, salt);
        let txid = tx.compute_txid();

        self.parents.lock().unwrap().insert(txid, consensus::serialize(&tx));

        let mut utxos = self.utxos.lock().unwrap();
        for (vout, output) in tx.output.iter().enumerate() {
            utxos.push(UnspentOutput {
                txid,
                vout: vout as u32,
                value: output.value,
                address: address.to_string(),
            });
        }
        tx
    }

    /// Serve arbitrary bytes as the parent of `txid`
    pub fn set_parent_bytes(&self, txid: Txid, bytes: Vec<u8>) {
        self.parents.lock().unwrap().insert(txid, bytes);
    }

    pub fn set_quote(&self, quote: FeeRateQuote) {
        *self.quote.lock().unwrap() = quote;
    }

    pub fn set_reply(&self, reply: BroadcastReply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn set_tip_delay(&self, delay: Duration) {
        *self.tip_delay.lock().unwrap() = delay;
    }

    pub fn submitted(&self) -> Vec<Transaction> {
        self.submitted.lock().unwrap().clone()
    }

    /// Number of calls made to any source
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    pub fn data_sources(self: &Arc<Self>) -> DataSources {
        DataSources {
            utxos: self.clone(),
            fees: self.clone(),
            parents: self.clone(),
            broadcaster: self.clone(),
            chain: self.clone(),
        }
    }
}

#[async_trait]
impl UtxoSource for MemorySources {
    async fn fetch_utxos(&self, address: &str, _ceiling: Amount) -> Result<Vec<UnspentOutput>, SourceError> {
        self.record();
        Ok(self
            .utxos
            .lock()
            .unwrap()
            .iter()
            .filter(|utxo| utxo.address == address)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FeeRateSource for MemorySources {
    async fn fetch_fee_rates(&self) -> Result<FeeRateQuote, SourceError> {
        self.record();
        Ok(*self.quote.lock().unwrap())
    }
}

#[async_trait]
impl ParentTxSource for MemorySources {
    async fn fetch_raw_transaction(&self, txid: &Txid) -> Result<Vec<u8>, SourceError> {
        self.record();
        self.parents
            .lock()
            .unwrap()
            .get(txid)
            .cloned()
            .ok_or_else(|| SourceError::Status {
                status: 404,
                body: format!("Transaction not found: {}", txid),
            })
    }
}

#[async_trait]
impl Broadcaster for MemorySources {
    async fn submit(&self, raw_transaction: &[u8]) -> Result<String, BroadcastError> {
        self.record();
        let tx: Transaction =
            consensus::deserialize(raw_transaction).map_err(|e| BroadcastError::Transport(e.to_string()))?;

        let reply = self.reply.lock().unwrap().clone();
        match reply {
            BroadcastReply::Echo => {
                let txid = tx.compute_txid().to_string();
                self.submitted.lock().unwrap().push(tx);
                Ok(txid)
            }
            BroadcastReply::Report(txid) => {
                self.submitted.lock().unwrap().push(tx);
                Ok(txid)
            }
            BroadcastReply::Reject(reason) => Err(BroadcastError::Rejected {
                status: Some(400),
                reason,
            }),
            BroadcastReply::Transport(message) => Err(BroadcastError::Transport(message)),
        }
    }
}

#[async_trait]
impl ChainTipSource for MemorySources {
    async fn tip_height(&self) -> Result<u64, SourceError> {
        self.record();
        let delay = *self.tip_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(4_242)
    }

    fn url(&self) -> String {
        "memory://sources".to_string()
    }
}

pub fn engine(sources: &Arc<MemorySources>) -> TransferEngine {
    TransferEngine::new(regtest_config(), sources.data_sources(), None)
}

// ============================================================================
// Hardware device
// ============================================================================

/// A device holding one key; signs whatever digests it is given
pub struct MockDevice {
    key: TestKey,
    /// Transient failures returned by `get_public_key` before it succeeds
    pub locked_attempts: AtomicU32,
    pub sign_error: Mutex<Option<DeviceErrorKind>>,
    /// Drop the last signature from the reply
    pub short_reply: Mutex<bool>,
    pub public_key_calls: AtomicU32,
    pub requests: Mutex<Vec<DeviceSignRequest>>,
}

impl MockDevice {
    pub fn new(seed: u8) -> Arc<Self> {
        Arc::new(Self {
            key: TestKey::new(seed),
            locked_attempts: AtomicU32::new(0),
            sign_error: Mutex::new(None),
            short_reply: Mutex::new(false),
            public_key_calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn key(&self) -> &TestKey {
        &self.key
    }
}

#[async_trait]
impl HardwareTransport for MockDevice {
    async fn get_public_key(&self, _path: &DerivationPath) -> Result<PublicKey, DeviceError> {
        self.public_key_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.locked_attempts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.locked_attempts.store(remaining - 1, Ordering::SeqCst);
            return Err(DeviceError::new(DeviceErrorKind::LockedDevice, "unlock the device"));
        }

        Ok(self.key.public_key)
    }

    async fn sign_transaction(&self, request: DeviceSignRequest) -> Result<Vec<DeviceSignature>, DeviceError> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(kind) = *self.sign_error.lock().unwrap() {
            return Err(DeviceError::new(kind, "device refused"));
        }

        let secp = Secp256k1::new();
        let mut signatures: Vec<DeviceSignature> = request
            .inputs
            .iter()
            .map(|input| DeviceSignature {
                signature: ecdsa::Signature {
                    signature: secp.sign_ecdsa(&Message::from_digest(input.digest), &self.key.private_key.inner),
                    sighash_type: request.sighash_type,
                },
                public_key: self.key.public_key,
            })
            .collect();

        if *self.short_reply.lock().unwrap() {
            signatures.pop();
        }

        Ok(signatures)
    }
}

pub struct MockProvider {
    pub device: Arc<MockDevice>,
    pub opened: AtomicUsize,
}

impl MockProvider {
    pub fn new(device: Arc<MockDevice>) -> Arc<Self> {
        Arc::new(Self {
            device,
            opened: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TransportProvider for MockProvider {
    async fn open(&self, _account: Option<&Account>) -> Result<Arc<dyn HardwareTransport>, DeviceError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.device.clone())
    }
}

pub fn hardware_path() -> DerivationPath {
    DerivationPath::from_str("m/84'/1'/0'/0/0").expect("valid path")
}
