//! btc-transfer: Bitcoin transfer assembly
//!
//! Turns "send these amounts to these addresses from this account" into a
//! signed, verified and broadcast Bitcoin transaction.
//!
//! # Architecture
//!
//! - **Coin selection**: smallest-first accumulation with per-input fee
//!   recomputation and dust handling
//! - **Drafts**: unsigned version 2 transactions with parent transactions
//!   attached to every input
//! - **Signing**: local keys or a hardware device behind caller-supplied
//!   transport traits
//! - **Verification and broadcast**: every signature is re-checked before
//!   the transaction is finalized, and the network-reported id is reconciled
//!   against the locally computed one
//!
//! # Example
//!
//! ```ignore
//! use btc_transfer::{Account, EngineConfig, TransferEngine, TransferIntent};
//!
//! let config = EngineConfig::from_env();
//! let engine = TransferEngine::esplora(config.clone(), None);
//!
//! let account = Account::from_wif(&wif, config.network)?;
//! let intent = TransferIntent::from_btc("tb1q...", "0.0005")?;
//!
//! let fee = engine.estimate_fee(&account, &[intent.clone()]).await?;
//! let txids = engine.transfer(&account, &[intent]).await?;
//! ```

// Public modules
pub mod address;
pub mod config;
pub mod draft;
pub mod engine;
pub mod error;
pub mod esplora;
pub mod finalize;
pub mod retry;
pub mod selection;
pub mod signing;
pub mod size;
pub mod sources;
pub mod types;
pub mod validator;

// Re-exports for convenience
pub use address::{parse_address, AddressKind};
pub use config::EngineConfig;
pub use draft::{DraftBuilder, DraftInput, DraftOutput, TransactionDraft};
pub use engine::{DataSources, PingResponse, TransferEngine};
pub use error::{BroadcastError, DeviceError, DeviceErrorKind, ErrorKind, SourceError, TransferError};
pub use esplora::EsploraClient;
pub use finalize::{FinalizedTransaction, Finalizer, TransferStage};
pub use retry::{retry, RetryError, RetryOptions};
pub use selection::{CoinSelection, CoinSelector, SelectionMode};
pub use signing::{
    DeviceInput, DeviceSignRequest, DeviceSignature, HardwareSigner, HardwareTransport, InputSignature,
    SignedDraft, SignerKind, SigningEvent, SoftwareSigner, TransactionSigner, TransportProvider,
};
pub use size::{estimate_size, SizeEstimator};
pub use sources::{Broadcaster, ChainTipSource, FeeRateSource, ParentTxSource, UtxoSource};
pub use types::{
    parse_btc_amount, Account, AccountKey, AssetDescriptor, FeeRateQuote, FeeTier, TransferIntent, UnspentOutput,
    DUST_THRESHOLD,
};
pub use validator::{SignatureValidator, VerifiedDraft};

// Common result type
pub type Result<T> = std::result::Result<T, TransferError>;
