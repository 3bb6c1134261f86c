//! Post-sign verification
//!
//! A [`VerifiedDraft`] can only come out of [`SignatureValidator::validate`],
//! so finalization never sees an unchecked signature set.

use bitcoin::secp256k1::{Message, Secp256k1, VerifyOnly};
use bitcoin::sighash::EcdsaSighashType;

use crate::error::TransferError;
use crate::signing::{signature_digest, SignedDraft};

/// Signed draft whose every input signature has been checked
#[derive(Clone, Debug)]
pub struct VerifiedDraft {
    signed: SignedDraft,
}

impl VerifiedDraft {
    pub fn signed(&self) -> &SignedDraft {
        &self.signed
    }

    pub(crate) fn into_signed(self) -> SignedDraft {
        self.signed
    }
}

pub struct SignatureValidator {
    secp: Secp256k1<VerifyOnly>,
}

impl SignatureValidator {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }

    pub fn validate(&self, signed: SignedDraft) -> Result<VerifiedDraft, TransferError> {
        let draft = signed.draft();
        let kind = draft.sender_kind();

        for (index, (input, sig)) in draft.inputs().iter().zip(signed.signatures()).enumerate() {
            // Anything weaker than ALL would leave outputs unsigned
            if sig.signature.sighash_type != EcdsaSighashType::All {
                return Err(TransferError::InvalidSignatures(format!(
                    "input {}: sighash type {} does not commit to every output",
                    index, sig.signature.sighash_type
                )));
            }

            let expected_script = kind
                .script_pubkey_for(&sig.public_key)
                .map_err(|e| TransferError::InvalidSignatures(format!("input {}: {}", index, e)))?;
            if expected_script != input.prevout.script_pubkey {
                return Err(TransferError::InvalidSignatures(format!(
                    "input {}: public key does not control the spent output",
                    index
                )));
            }

            let digest = signature_digest(draft.unsigned_tx(), index, kind, input, EcdsaSighashType::All)?;
            let message = Message::from_digest(digest);

            self.secp
                .verify_ecdsa(&message, &sig.signature.signature, &sig.public_key.inner)
                .map_err(|e| TransferError::InvalidSignatures(format!("input {}: {}", index, e)))?;
        }

        log::debug!("Verified {} input signatures", signed.signatures().len());

        Ok(VerifiedDraft { signed })
    }
}

impl Default for SignatureValidator {
    fn default() -> Self {
        Self::new()
    }
}
