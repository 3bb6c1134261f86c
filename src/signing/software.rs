use async_trait::async_trait;
use bitcoin::ecdsa;
use bitcoin::secp256k1::{All, Message, Secp256k1};
use bitcoin::sighash::EcdsaSighashType;
use bitcoin::PublicKey;

use super::{signature_digest, InputSignature, SignedDraft, SignerKind, TransactionSigner};
use crate::draft::TransactionDraft;
use crate::error::TransferError;
use crate::types::Account;

/// Signs every input locally with the account's private key
#[derive(Clone)]
pub struct SoftwareSigner {
    secp: Secp256k1<All>,
}

impl SoftwareSigner {
    pub fn new() -> Self {
        Self { secp: Secp256k1::new() }
    }
}

impl Default for SoftwareSigner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionSigner for SoftwareSigner {
    fn preflight(&self, account: &Account) -> Result<(), TransferError> {
        if account.private_key().is_none() {
            return Err(TransferError::MissingKeyMaterial(format!(
                "No private key for {}",
                account.address
            )));
        }
        Ok(())
    }

    async fn sign(&self, draft: TransactionDraft, account: &Account) -> Result<SignedDraft, TransferError> {
        let private_key = account.private_key().ok_or_else(|| {
            TransferError::MissingKeyMaterial(format!("No private key for {}", account.address))
        })?;
        let public_key = PublicKey::from_private_key(&self.secp, private_key);

        let mut signatures = Vec::with_capacity(draft.inputs().len());

        for (index, input) in draft.inputs().iter().enumerate() {
            let digest = signature_digest(
                draft.unsigned_tx(),
                index,
                draft.sender_kind(),
                input,
                EcdsaSighashType::All,
            )?;

            let message = Message::from_digest(digest);
            let signature = self.secp.sign_ecdsa(&message, &private_key.inner);

            signatures.push(InputSignature {
                signature: ecdsa::Signature {
                    signature,
                    sighash_type: EcdsaSighashType::All,
                },
                public_key,
            });
        }

        log::debug!("Signed {} inputs with software key", signatures.len());

        SignedDraft::new(draft, signatures, SignerKind::Software)
    }
}
