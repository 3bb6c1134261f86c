//! Signing
//!
//! Two mutually exclusive signer paths produce a [`SignedDraft`]:
//!
//! - [`SoftwareSigner`] signs locally with the account's private key
//! - [`HardwareSigner`] delegates to a device through a caller-supplied
//!   [`TransportProvider`]
//!
//! Both use [`signature_digest`] so the validator checks exactly what was signed.

pub mod hardware;
pub mod software;

use async_trait::async_trait;
use bitcoin::ecdsa;
use bitcoin::hashes::Hash;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{PublicKey, Transaction};

use crate::address::AddressKind;
use crate::draft::{DraftInput, TransactionDraft};
use crate::error::TransferError;
use crate::types::Account;

pub use hardware::{
    DeviceInput, DeviceSignRequest, DeviceSignature, HardwareSigner, HardwareTransport, SigningEvent,
    TransportProvider,
};
pub use software::SoftwareSigner;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignerKind {
    Software,
    Hardware,
}

/// Signature material for one input
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputSignature {
    pub signature: ecdsa::Signature,
    pub public_key: PublicKey,
}

/// A draft with exactly one signature set per input, from a single signer path
#[derive(Clone, Debug)]
pub struct SignedDraft {
    pub(crate) draft: TransactionDraft,
    pub(crate) signatures: Vec<InputSignature>,
    pub(crate) signer: SignerKind,
}

impl SignedDraft {
    pub fn new(
        draft: TransactionDraft,
        signatures: Vec<InputSignature>,
        signer: SignerKind,
    ) -> Result<Self, TransferError> {
        if signatures.len() != draft.inputs().len() {
            return Err(TransferError::Signing(format!(
                "{} signatures for {} inputs",
                signatures.len(),
                draft.inputs().len()
            )));
        }

        Ok(Self {
            draft,
            signatures,
            signer,
        })
    }

    pub fn draft(&self) -> &TransactionDraft {
        &self.draft
    }

    pub fn signatures(&self) -> &[InputSignature] {
        &self.signatures
    }

    pub fn signer(&self) -> SignerKind {
        self.signer
    }
}

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Checks that need no network or device I/O; run before coin selection
    fn preflight(&self, account: &Account) -> Result<(), TransferError>;

    async fn sign(&self, draft: TransactionDraft, account: &Account) -> Result<SignedDraft, TransferError>;
}

/// Digest input `index` of `tx` commits to when spent as `kind`
pub fn signature_digest(
    tx: &Transaction,
    index: usize,
    kind: AddressKind,
    input: &DraftInput,
    sighash_type: EcdsaSighashType,
) -> Result<[u8; 32], TransferError> {
    let mut cache = SighashCache::new(tx);

    match kind {
        AddressKind::Legacy => cache
            .legacy_signature_hash(index, &input.prevout.script_pubkey, sighash_type.to_u32())
            .map(|sighash| sighash.to_byte_array())
            .map_err(|e| TransferError::Signing(e.to_string())),
        AddressKind::SegwitV0 => cache
            .p2wpkh_signature_hash(index, &input.prevout.script_pubkey, input.prevout.value, sighash_type)
            .map(|sighash| sighash.to_byte_array())
            .map_err(|e| TransferError::Signing(e.to_string())),
        AddressKind::ScriptHash => {
            let redeem_script = input.redeem_script.as_ref().ok_or_else(|| {
                TransferError::Signing(format!("input {} has no redeem script", index))
            })?;
            cache
                .p2wpkh_signature_hash(index, redeem_script, input.prevout.value, sighash_type)
                .map(|sighash| sighash.to_byte_array())
                .map_err(|e| TransferError::Signing(e.to_string()))
        }
    }
}
