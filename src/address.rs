//! Address classification and per-kind script rules
//!
//! [`AddressKind`] is the single source of truth for how an address is
//! treated: the size table in [`crate::size`], the redeem script attached by
//! the draft builder and the script a signature must unlock all dispatch on it.

use std::fmt;
use std::str::FromStr;

use bitcoin::hashes::Hash;
use bitcoin::{Address, CompressedPublicKey, Network, PublicKey, ScriptBuf, ScriptHash};
use serde::{Deserialize, Serialize};

use crate::error::TransferError;

/// The three payment-address kinds the engine can spend from and pay to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    /// Pay-to-pubkey-hash: `1…` on mainnet, `m…`/`n…` on test networks
    Legacy,
    /// Pay-to-script-hash: `3…` on mainnet, `2…` on test networks
    ScriptHash,
    /// Pay-to-witness-pubkey-hash: `bc1…`, `tb1…`, `bcrt1…`
    SegwitV0,
}

impl AddressKind {
    /// Classify an address by its structural prefix
    pub fn classify(address: &str) -> Result<Self, TransferError> {
        let lowercase = address.to_ascii_lowercase();

        if lowercase.starts_with("bc1") || lowercase.starts_with("tb1") || lowercase.starts_with("bcrt1") {
            return Ok(Self::SegwitV0);
        }

        if lowercase.starts_with('1') || lowercase.starts_with('m') || lowercase.starts_with('n') {
            return Ok(Self::Legacy);
        }

        if address.starts_with('3') || address.starts_with('2') {
            return Ok(Self::ScriptHash);
        }

        Err(TransferError::InvalidAddress(address.to_string()))
    }

    /// Whether spends of this kind carry witness data
    pub fn is_segwit(&self) -> bool {
        matches!(self, Self::SegwitV0 | Self::ScriptHash)
    }

    /// Redeem script a spend of this kind must reveal, if any
    pub fn redeem_script(&self, public_key: &PublicKey) -> Result<Option<ScriptBuf>, TransferError> {
        match self {
            Self::ScriptHash => Ok(Some(p2wpkh_script(public_key)?)),
            Self::Legacy | Self::SegwitV0 => Ok(None),
        }
    }

    /// The scriptPubKey that `public_key` controls under this kind
    pub fn script_pubkey_for(&self, public_key: &PublicKey) -> Result<ScriptBuf, TransferError> {
        match self {
            Self::Legacy => Ok(ScriptBuf::new_p2pkh(&public_key.pubkey_hash())),
            Self::SegwitV0 => p2wpkh_script(public_key),
            Self::ScriptHash => {
                let redeem = p2wpkh_script(public_key)?;
                Ok(ScriptBuf::new_p2sh(&ScriptHash::hash(redeem.as_bytes())))
            }
        }
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("p2pkh"),
            Self::ScriptHash => f.write_str("p2sh"),
            Self::SegwitV0 => f.write_str("p2wpkh"),
        }
    }
}

fn p2wpkh_script(public_key: &PublicKey) -> Result<ScriptBuf, TransferError> {
    let compressed = CompressedPublicKey::try_from(*public_key)
        .map_err(|e| TransferError::Signing(format!("Segwit spends need a compressed key: {}", e)))?;
    Ok(ScriptBuf::new_p2wpkh(&compressed.wpubkey_hash()))
}

/// Parse an address and check it belongs to `network`
pub fn parse_address(address: &str, network: Network) -> Result<Address, TransferError> {
    Address::from_str(address)
        .map_err(|e| TransferError::InvalidAddress(format!("{}: {}", address, e)))?
        .require_network(network)
        .map_err(|e| TransferError::InvalidAddress(format!("{}: {}", address, e)))
}
