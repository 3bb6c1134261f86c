//! Finalization and broadcast
//!
//! Applies the verified signatures as scriptSig / witness data, computes the
//! canonical txid locally and submits the raw bytes. The id the network
//! reports must match the local one.

use std::fmt;
use std::sync::Arc;

use bitcoin::blockdata::script::{Builder, PushBytesBuf};
use bitcoin::blockdata::witness::Witness;
use bitcoin::{consensus, ScriptBuf, Transaction, Txid};

use crate::address::AddressKind;
use crate::error::{BroadcastError, TransferError};
use crate::signing::InputSignature;
use crate::sources::Broadcaster;
use crate::validator::VerifiedDraft;

/// Pipeline position of a transfer, logged at every transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferStage {
    Selected,
    Drafted,
    Signed,
    Verified,
    Finalized,
    Broadcast,
    Rejected,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Selected => "selected",
            Self::Drafted => "drafted",
            Self::Signed => "signed",
            Self::Verified => "verified",
            Self::Finalized => "finalized",
            Self::Broadcast => "broadcast",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Fully signed transaction and its locally computed id
#[derive(Clone, Debug)]
pub struct FinalizedTransaction {
    pub transaction: Transaction,
    pub raw_bytes: Vec<u8>,
    pub txid: Txid,
}

impl FinalizedTransaction {
    pub fn hex(&self) -> String {
        hex::encode(&self.raw_bytes)
    }
}

pub struct Finalizer {
    broadcaster: Arc<dyn Broadcaster>,
}

impl Finalizer {
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { broadcaster }
    }

    pub fn finalize(&self, verified: VerifiedDraft) -> Result<FinalizedTransaction, TransferError> {
        let signed = verified.into_signed();
        let kind = signed.draft.sender_kind();
        let mut transaction = signed.draft.unsigned_tx().clone();

        for ((txin, input), sig) in transaction
            .input
            .iter_mut()
            .zip(signed.draft.inputs())
            .zip(&signed.signatures)
        {
            match kind {
                AddressKind::Legacy => {
                    txin.script_sig = legacy_script_sig(sig)?;
                }
                AddressKind::SegwitV0 => {
                    txin.witness = Witness::p2wpkh(&sig.signature, &sig.public_key.inner);
                }
                AddressKind::ScriptHash => {
                    let redeem_script = input
                        .redeem_script
                        .as_ref()
                        .ok_or_else(|| TransferError::Signing("P2SH input without redeem script".to_string()))?;
                    txin.script_sig = redeem_script_sig(redeem_script)?;
                    txin.witness = Witness::p2wpkh(&sig.signature, &sig.public_key.inner);
                }
            }
        }

        let raw_bytes = consensus::serialize(&transaction);
        let txid = transaction.compute_txid();

        log::debug!("Finalized {} ({} bytes, {} vB)", txid, raw_bytes.len(), transaction.vsize());

        Ok(FinalizedTransaction {
            transaction,
            raw_bytes,
            txid,
        })
    }

    /// Submit and reconcile the reported id against the local one
    pub async fn broadcast(&self, finalized: &FinalizedTransaction) -> Result<Txid, TransferError> {
        log::debug!("Broadcasting {}", finalized.txid);

        let reported = self.broadcaster.submit(&finalized.raw_bytes).await.map_err(|cause| {
            if cause.is_dust() {
                TransferError::Dust(cause.to_string())
            } else {
                TransferError::TransactionFailed { cause }
            }
        })?;

        let reported = reported.trim();
        if reported.is_empty() {
            return Err(TransferError::TransactionFailed {
                cause: BroadcastError::EmptyResponse,
            });
        }

        let computed = finalized.txid.to_string();
        if !reported.eq_ignore_ascii_case(&computed) {
            return Err(TransferError::InvalidTransactionHash {
                computed,
                reported: reported.to_string(),
            });
        }

        Ok(finalized.txid)
    }
}

fn push_bytes(bytes: Vec<u8>) -> Result<PushBytesBuf, TransferError> {
    PushBytesBuf::try_from(bytes).map_err(|e| TransferError::Signing(e.to_string()))
}

/// `<sig> <pubkey>`
fn legacy_script_sig(sig: &InputSignature) -> Result<ScriptBuf, TransferError> {
    Ok(Builder::new()
        .push_slice(push_bytes(sig.signature.to_vec())?)
        .push_key(&sig.public_key)
        .into_script())
}

/// `<redeem script>`; the signature lives in the witness
fn redeem_script_sig(redeem_script: &ScriptBuf) -> Result<ScriptBuf, TransferError> {
    Ok(Builder::new()
        .push_slice(push_bytes(redeem_script.to_bytes())?)
        .into_script())
}
