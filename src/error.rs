//! Error types for transfer assembly
//!
//! Every pipeline stage raises a [`TransferError`] at the point where it
//! observes the failure. Each variant maps to a stable [`ErrorKind`] whose
//! `code()` is safe to match on from callers.

use std::fmt;
use thiserror::Error;

/// Core error type for the transfer pipeline
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("No UTXO available for {0}")]
    NoUtxoAvailable(String),

    #[error("No UTXOs to pay the transaction")]
    NoUtxoToPayTransaction,

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Amount is lower than the dust: {0}")]
    Dust(String),

    #[error("You must provide a transport provider to use a hardware wallet")]
    GetLedgerTransportNotFound,

    #[error("Your account must have a BIP84 path to use a hardware wallet")]
    BipPathNotFound,

    #[error("Invalid signatures: {0}")]
    InvalidSignatures(String),

    #[error("Invalid transaction hash: computed {computed}, network reported {reported}")]
    InvalidTransactionHash { computed: String, reported: String },

    #[error("Transaction failed: {cause}")]
    TransactionFailed {
        #[source]
        cause: BroadcastError,
    },

    #[error("Invalid transfer intent: {0}")]
    InvalidIntent(String),

    #[error("Missing key material: {0}")]
    MissingKeyMaterial(String),

    #[error("Invalid parent transaction {txid}: {reason}")]
    InvalidParentTransaction { txid: String, reason: String },

    #[error("Data source error: {0}")]
    DataSource(#[from] SourceError),

    #[error("Hardware device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Stable, machine-readable classification of a [`TransferError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidAddress,
    NoUtxoAvailable,
    NoUtxoToPayTransaction,
    InsufficientFunds,
    DustError,
    GetLedgerTransportNotFound,
    BipPathNotFound,
    InvalidSignatures,
    InvalidTransactionHash,
    TransactionFailed,
    InvalidIntent,
    MissingKeyMaterial,
    InvalidParentTransaction,
    DataSource,
    Device,
    Signing,
    Timeout,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAddress => "INVALID_ADDRESS",
            Self::NoUtxoAvailable => "NO_UTXO_AVAILABLE",
            Self::NoUtxoToPayTransaction => "NO_UTXO_PAY_TRANSACTION",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::DustError => "DUST_ERROR",
            Self::GetLedgerTransportNotFound => "GET_LEDGER_TRANSPORT_NOT_FOUND",
            Self::BipPathNotFound => "BIP_PATH_NOT_FOUND",
            Self::InvalidSignatures => "INVALID_SIGNATURES",
            Self::InvalidTransactionHash => "INVALID_TRANSACTION_HASH",
            Self::TransactionFailed => "TRANSACTION_FAILED",
            Self::InvalidIntent => "INVALID_INTENT",
            Self::MissingKeyMaterial => "MISSING_KEY_MATERIAL",
            Self::InvalidParentTransaction => "INVALID_PARENT_TRANSACTION",
            Self::DataSource => "DATA_SOURCE",
            Self::Device => "DEVICE",
            Self::Signing => "SIGNING",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAddress(_) => ErrorKind::InvalidAddress,
            Self::NoUtxoAvailable(_) => ErrorKind::NoUtxoAvailable,
            Self::NoUtxoToPayTransaction => ErrorKind::NoUtxoToPayTransaction,
            Self::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            Self::Dust(_) => ErrorKind::DustError,
            Self::GetLedgerTransportNotFound => ErrorKind::GetLedgerTransportNotFound,
            Self::BipPathNotFound => ErrorKind::BipPathNotFound,
            Self::InvalidSignatures(_) => ErrorKind::InvalidSignatures,
            Self::InvalidTransactionHash { .. } => ErrorKind::InvalidTransactionHash,
            Self::TransactionFailed { .. } => ErrorKind::TransactionFailed,
            Self::InvalidIntent(_) => ErrorKind::InvalidIntent,
            Self::MissingKeyMaterial(_) => ErrorKind::MissingKeyMaterial,
            Self::InvalidParentTransaction { .. } => ErrorKind::InvalidParentTransaction,
            Self::DataSource(_) => ErrorKind::DataSource,
            Self::Device(_) => ErrorKind::Device,
            Self::Signing(_) => ErrorKind::Signing,
            Self::Timeout(_) => ErrorKind::Timeout,
        }
    }

    pub fn invalid_parent(txid: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidParentTransaction {
            txid: txid.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by an external data collaborator (UTXOs, fees, parents, chain tip)
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}

/// Failure returned by a [`crate::sources::Broadcaster`]
#[derive(Error, Debug)]
pub enum BroadcastError {
    /// The network answered and refused the transaction
    #[error("Rejected by network (status {status:?}): {reason}")]
    Rejected { status: Option<u16>, reason: String },

    /// The submission never got an answer
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Empty response from network")]
    EmptyResponse,
}

impl BroadcastError {
    /// Whether the network refused the payment for being below its dust floor
    pub fn is_dust(&self) -> bool {
        match self {
            Self::Rejected { reason, .. } => reason.to_ascii_lowercase().contains("dust"),
            _ => false,
        }
    }
}

/// Category of a hardware failure, used by retry predicates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceErrorKind {
    /// Transient transport/APDU status error
    TransportStatus,
    /// Device is locked or the app is not open
    LockedDevice,
    /// User refused on the device
    Rejected,
    Other,
}

#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    pub message: String,
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            DeviceErrorKind::TransportStatus | DeviceErrorKind::LockedDevice
        )
    }
}
