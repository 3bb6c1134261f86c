//! Data model shared by every pipeline stage

use std::fmt;
use std::str::FromStr;

use bitcoin::bip32::DerivationPath;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::{Address, Amount, CompressedPublicKey, Network, NetworkKind, PrivateKey, PublicKey, Txid};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::TransferError;

/// Minimum output value relayed by the network; change below it is dropped
pub const DUST_THRESHOLD: Amount = Amount::from_sat(546);

pub const ONE_BTC_IN_SATOSHIS: u64 = 100_000_000;

/// A spendable output owned by the sender
///
/// Snapshots are only valid for the assembly call that fetched them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub txid: Txid,
    pub vout: u32,
    pub value: Amount,
    pub address: String,
}

/// Asset moved by an intent. Only the ledger-native asset is transferable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    pub symbol: String,
    pub hash: String,
    pub decimals: u8,
}

impl AssetDescriptor {
    pub fn native() -> Self {
        Self {
            symbol: "BTC".to_string(),
            hash: "-".to_string(),
            decimals: 8,
        }
    }

    pub fn is_native(&self) -> bool {
        *self == Self::native()
    }
}

/// One payment requested by the caller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferIntent {
    pub receiver_address: String,
    pub amount: Amount,
    pub asset: AssetDescriptor,
}

impl TransferIntent {
    /// Native-asset payment of `amount` to `receiver_address`
    pub fn new(receiver_address: impl Into<String>, amount: Amount) -> Self {
        Self {
            receiver_address: receiver_address.into(),
            amount,
            asset: AssetDescriptor::native(),
        }
    }

    /// Native-asset payment with a decimal BTC amount, e.g. `"0.0005"`
    pub fn from_btc(receiver_address: impl Into<String>, btc: &str) -> Result<Self, TransferError> {
        Ok(Self::new(receiver_address, parse_btc_amount(btc)?))
    }
}

/// Convert a decimal BTC string to satoshis, rounding down extra precision
pub fn parse_btc_amount(btc: &str) -> Result<Amount, TransferError> {
    let value = Decimal::from_str(btc.trim())
        .map_err(|e| TransferError::InvalidIntent(format!("Invalid amount '{}': {}", btc, e)))?;

    if value.is_sign_negative() {
        return Err(TransferError::InvalidIntent(format!("Negative amount '{}'", btc)));
    }

    let sats = (value * Decimal::from(ONE_BTC_IN_SATOSHIS))
        .trunc()
        .to_u64()
        .ok_or_else(|| TransferError::InvalidIntent(format!("Amount out of range '{}'", btc)))?;

    Ok(Amount::from_sat(sats))
}

/// Fee tier picked from a [`FeeRateQuote`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeTier {
    Slow,
    #[default]
    Medium,
    Fast,
}

impl FromStr for FeeTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "slow" => Ok(Self::Slow),
            "medium" => Ok(Self::Medium),
            "fast" => Ok(Self::Fast),
            other => Err(format!("unknown fee tier '{}'", other)),
        }
    }
}

/// Tiered fee rates in sat/vB
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRateQuote {
    pub slow: Decimal,
    pub medium: Decimal,
    pub fast: Decimal,
}

impl FeeRateQuote {
    /// Same rate on every tier
    pub fn flat(rate: Decimal) -> Self {
        Self {
            slow: rate,
            medium: rate,
            fast: rate,
        }
    }

    pub fn rate(&self, tier: FeeTier) -> Decimal {
        match tier {
            FeeTier::Slow => self.slow,
            FeeTier::Medium => self.medium,
            FeeTier::Fast => self.fast,
        }
    }
}

/// Key material carried by an [`Account`]
#[derive(Clone)]
pub enum AccountKey {
    Private(PrivateKey),
    Public(PublicKey),
    AddressOnly,
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private(_) => f.write_str("Private(<redacted>)"),
            Self::Public(pk) => write!(f, "Public({})", pk),
            Self::AddressOnly => f.write_str("AddressOnly"),
        }
    }
}

/// Sender account supplied by the caller; never persisted by the engine
#[derive(Clone, Debug)]
pub struct Account {
    pub address: String,
    pub key: AccountKey,
    pub is_hardware: bool,
    pub derivation_path: Option<DerivationPath>,
}

impl Account {
    /// Software account for a WIF key, receiving on its P2WPKH address
    pub fn from_wif(wif: &str, network: Network) -> Result<Self, TransferError> {
        let private_key = PrivateKey::from_wif(wif)
            .map_err(|e| TransferError::MissingKeyMaterial(format!("Invalid WIF: {}", e)))?;

        if private_key.network != NetworkKind::from(network) {
            return Err(TransferError::MissingKeyMaterial(format!(
                "WIF key does not belong to {}",
                network
            )));
        }

        let secp = Secp256k1::new();
        let compressed = CompressedPublicKey::from_private_key(&secp, &private_key)
            .map_err(|e| TransferError::MissingKeyMaterial(e.to_string()))?;
        let address = Address::p2wpkh(&compressed, network);

        Ok(Self {
            address: address.to_string(),
            key: AccountKey::Private(private_key),
            is_hardware: false,
            derivation_path: None,
        })
    }

    /// Software account for an explicit address (any of the supported kinds)
    pub fn with_private_key(address: impl Into<String>, private_key: PrivateKey) -> Self {
        Self {
            address: address.into(),
            key: AccountKey::Private(private_key),
            is_hardware: false,
            derivation_path: None,
        }
    }

    /// Hardware account; signing goes through the device at `derivation_path`
    pub fn hardware(
        address: impl Into<String>,
        derivation_path: Option<DerivationPath>,
        public_key: Option<PublicKey>,
    ) -> Self {
        Self {
            address: address.into(),
            key: public_key.map_or(AccountKey::AddressOnly, AccountKey::Public),
            is_hardware: true,
            derivation_path,
        }
    }

    /// Watch-only account: can be estimated against, cannot sign
    pub fn watch_only(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            key: AccountKey::AddressOnly,
            is_hardware: false,
            derivation_path: None,
        }
    }

    pub fn private_key(&self) -> Option<&PrivateKey> {
        match &self.key {
            AccountKey::Private(key) => Some(key),
            _ => None,
        }
    }

    /// Public key, derived from the private key when needed
    pub fn public_key(&self) -> Option<PublicKey> {
        match &self.key {
            AccountKey::Private(key) => Some(PublicKey::from_private_key(&Secp256k1::new(), key)),
            AccountKey::Public(pk) => Some(*pk),
            AccountKey::AddressOnly => None,
        }
    }
}
