//! Hardware-device signing
//!
//! The device itself sits behind two capability traits supplied by the
//! caller. [`HardwareSigner`] is the Bitcoin adapter over them: it derives
//! digests and BIP84 paths, performs one device round trip per draft and
//! reports progress on a broadcast channel.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::bip32::DerivationPath;
use bitcoin::sighash::EcdsaSighashType;
use bitcoin::{ecdsa, Address, CompressedPublicKey, PublicKey, ScriptBuf, Transaction};
use tokio::sync::broadcast;

use super::{signature_digest, InputSignature, SignedDraft, SignerKind, TransactionSigner};
use crate::address::AddressKind;
use crate::config::EngineConfig;
use crate::draft::TransactionDraft;
use crate::error::{DeviceError, DeviceErrorKind, TransferError};
use crate::retry::{retry, RetryError, RetryOptions};
use crate::types::Account;

const EVENT_CAPACITY: usize = 16;

/// Account discovery retry policy: the device may still be unlocking
const ACCOUNT_RETRY: RetryOptions = RetryOptions {
    attempts: 10,
    delay: Duration::from_millis(500),
};

/// Progress notifications for UIs prompting the user on the device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SigningEvent {
    SignatureStart,
    SignatureEnd,
}

/// Everything the device needs to sign one input
#[derive(Clone, Debug)]
pub struct DeviceInput {
    pub parent: Transaction,
    pub vout: u32,
    pub digest: [u8; 32],
    pub derivation_path: DerivationPath,
    pub kind: AddressKind,
    pub redeem_script: Option<ScriptBuf>,
}

#[derive(Clone, Debug)]
pub struct DeviceSignRequest {
    pub unsigned_tx: Transaction,
    pub inputs: Vec<DeviceInput>,
    pub sighash_type: EcdsaSighashType,
}

/// One signature per requested input, in request order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceSignature {
    pub signature: ecdsa::Signature,
    pub public_key: PublicKey,
}

/// An open session with a signing device
#[async_trait]
pub trait HardwareTransport: Send + Sync {
    async fn get_public_key(&self, path: &DerivationPath) -> Result<PublicKey, DeviceError>;

    async fn sign_transaction(&self, request: DeviceSignRequest) -> Result<Vec<DeviceSignature>, DeviceError>;
}

/// Caller capability that opens a device session
#[async_trait]
pub trait TransportProvider: Send + Sync {
    /// `account` is `None` during account discovery
    async fn open(&self, account: Option<&Account>) -> Result<Arc<dyn HardwareTransport>, DeviceError>;
}

pub struct HardwareSigner {
    config: EngineConfig,
    provider: Option<Arc<dyn TransportProvider>>,
    events: broadcast::Sender<SigningEvent>,
}

impl HardwareSigner {
    pub fn new(config: EngineConfig, provider: Option<Arc<dyn TransportProvider>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            provider,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SigningEvent> {
        self.events.subscribe()
    }

    fn provider(&self) -> Result<&Arc<dyn TransportProvider>, TransferError> {
        self.provider.as_ref().ok_or(TransferError::GetLedgerTransportNotFound)
    }

    fn emit(&self, event: SigningEvent) {
        // No subscribers is fine
        self.events.send(event).ok();
    }

    /// Hardware account at BIP84 `index`, receiving on its P2WPKH address
    pub async fn get_account(&self, index: u32) -> Result<Account, TransferError> {
        let transport = self.provider()?.open(None).await?;
        self.account_at(transport.as_ref(), index).await
    }

    /// Accounts at BIP84 indexes `0..=until_index`, over one transport
    pub async fn get_accounts(&self, until_index: u32) -> Result<Vec<Account>, TransferError> {
        let transport = self.provider()?.open(None).await?;

        let mut accounts = Vec::with_capacity(until_index as usize + 1);
        for index in 0..=until_index {
            accounts.push(self.account_at(transport.as_ref(), index).await?);
        }
        Ok(accounts)
    }

    async fn account_at(&self, transport: &dyn HardwareTransport, index: u32) -> Result<Account, TransferError> {
        let path = DerivationPath::from_str(&self.config.bip_path(index))
            .map_err(|e| TransferError::Signing(format!("Invalid derivation path: {}", e)))?;

        let public_key = retry(ACCOUNT_RETRY, DeviceError::is_transient, || {
            transport.get_public_key(&path)
        })
        .await
        .map_err(|err| match err {
            RetryError::Aborted(e) => TransferError::Device(e),
            RetryError::Exhausted { attempts, last } => {
                TransferError::Timeout(format!("Device not ready after {} attempts: {}", attempts, last))
            }
        })?;

        let compressed = CompressedPublicKey::try_from(public_key)
            .map_err(|e| TransferError::Device(DeviceError::new(DeviceErrorKind::Other, e.to_string())))?;
        let address = Address::p2wpkh(&compressed, self.config.network);

        log::info!("Hardware account {} at {}", address, path);

        Ok(Account::hardware(address.to_string(), Some(path), Some(public_key)))
    }

    fn build_request(
        &self,
        draft: &TransactionDraft,
        path: &DerivationPath,
    ) -> Result<DeviceSignRequest, TransferError> {
        let inputs = draft
            .inputs()
            .iter()
            .enumerate()
            .map(|(index, input)| {
                Ok(DeviceInput {
                    parent: input.parent.clone(),
                    vout: input.utxo.vout,
                    digest: signature_digest(
                        draft.unsigned_tx(),
                        index,
                        draft.sender_kind(),
                        input,
                        EcdsaSighashType::All,
                    )?,
                    derivation_path: path.clone(),
                    kind: draft.sender_kind(),
                    redeem_script: input.redeem_script.clone(),
                })
            })
            .collect::<Result<Vec<_>, TransferError>>()?;

        Ok(DeviceSignRequest {
            unsigned_tx: draft.unsigned_tx().clone(),
            inputs,
            sighash_type: EcdsaSighashType::All,
        })
    }
}

#[async_trait]
impl TransactionSigner for HardwareSigner {
    fn preflight(&self, account: &Account) -> Result<(), TransferError> {
        self.provider()?;
        if account.derivation_path.is_none() {
            return Err(TransferError::BipPathNotFound);
        }
        Ok(())
    }

    async fn sign(&self, draft: TransactionDraft, account: &Account) -> Result<SignedDraft, TransferError> {
        self.preflight(account)?;
        let provider = self.provider()?;
        let path = account.derivation_path.as_ref().ok_or(TransferError::BipPathNotFound)?;

        let request = self.build_request(&draft, path)?;
        let transport = provider.open(Some(account)).await?;

        self.emit(SigningEvent::SignatureStart);
        let result = transport.sign_transaction(request).await;
        self.emit(SigningEvent::SignatureEnd);

        let device_signatures = result?;

        if device_signatures.len() != draft.inputs().len() {
            return Err(TransferError::Device(DeviceError::new(
                DeviceErrorKind::Other,
                format!(
                    "Device returned {} signatures for {} inputs",
                    device_signatures.len(),
                    draft.inputs().len()
                ),
            )));
        }

        let signatures = device_signatures
            .into_iter()
            .map(|sig| InputSignature {
                signature: sig.signature,
                public_key: sig.public_key,
            })
            .collect();

        log::debug!("Device signed {} inputs", draft.inputs().len());

        SignedDraft::new(draft, signatures, SignerKind::Hardware)
    }
}
