//! Transfer engine
//!
//! Wires the pipeline stages together:
//!
//! ```text
//! CoinSelector -> DraftBuilder -> Signer -> SignatureValidator -> Finalizer
//! ```
//!
//! Each stage is a strict precondition for the next. Nothing is retried and
//! nothing is cached between calls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bitcoin::secp256k1::SecretKey;
use bitcoin::{Amount, NetworkKind, PrivateKey, Txid};
use tokio::sync::broadcast;

use crate::address::{parse_address, AddressKind};
use crate::config::EngineConfig;
use crate::draft::DraftBuilder;
use crate::error::TransferError;
use crate::esplora::EsploraClient;
use crate::finalize::{Finalizer, TransferStage};
use crate::selection::{CoinSelector, SelectionMode};
use crate::signing::{HardwareSigner, SigningEvent, SoftwareSigner, TransactionSigner, TransportProvider};
use crate::sources::{Broadcaster, ChainTipSource, FeeRateSource, ParentTxSource, UtxoSource};
use crate::types::{Account, TransferIntent};
use crate::validator::SignatureValidator;
use crate::Result;

/// External collaborators used by the engine
#[derive(Clone)]
pub struct DataSources {
    pub utxos: Arc<dyn UtxoSource>,
    pub fees: Arc<dyn FeeRateSource>,
    pub parents: Arc<dyn ParentTxSource>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub chain: Arc<dyn ChainTipSource>,
}

impl DataSources {
    /// Every source backed by one Esplora endpoint
    pub fn esplora(client: EsploraClient) -> Self {
        let client = Arc::new(client);
        Self {
            utxos: client.clone(),
            fees: client.clone(),
            parents: client.clone(),
            broadcaster: client.clone(),
            chain: client,
        }
    }
}

/// Result of a liveness probe
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PingResponse {
    pub url: String,
    pub height: u64,
    pub latency: Duration,
}

pub struct TransferEngine {
    config: EngineConfig,
    sources: DataSources,
    selector: CoinSelector,
    drafts: DraftBuilder,
    software: SoftwareSigner,
    hardware: HardwareSigner,
    validator: SignatureValidator,
    finalizer: Finalizer,
}

impl TransferEngine {
    pub fn new(
        config: EngineConfig,
        sources: DataSources,
        transport_provider: Option<Arc<dyn TransportProvider>>,
    ) -> Self {
        Self {
            selector: CoinSelector::new(config.fee_tier),
            drafts: DraftBuilder::new(config.network, sources.parents.clone()),
            software: SoftwareSigner::new(),
            hardware: HardwareSigner::new(config.clone(), transport_provider),
            validator: SignatureValidator::new(),
            finalizer: Finalizer::new(sources.broadcaster.clone()),
            config,
            sources,
        }
    }

    /// Engine talking to the Esplora endpoint named in `config`
    pub fn esplora(config: EngineConfig, transport_provider: Option<Arc<dyn TransportProvider>>) -> Self {
        let sources = DataSources::esplora(EsploraClient::from_config(&config));
        Self::new(config, sources, transport_provider)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Hardware signing progress; see [`SigningEvent`]
    pub fn signing_events(&self) -> broadcast::Receiver<SigningEvent> {
        self.hardware.subscribe()
    }

    /// Fee the transfer would pay at the configured tier, without signing
    ///
    /// Selection stops once the payment amount is covered, so the result is a
    /// preview and may be lower than the fee of the eventual transfer.
    pub async fn estimate_fee(&self, account: &Account, intents: &[TransferIntent]) -> Result<Amount> {
        self.validate_intents(account, intents)?;

        let utxos = self.sources.utxos.fetch_utxos(&account.address, Amount::MAX_MONEY).await?;
        let quote = self.sources.fees.fetch_fee_rates().await?;

        let selection = self
            .selector
            .select(&account.address, utxos, intents, &quote, SelectionMode::Estimate)?;

        log::info!("Estimated fee for {}: {}", account.address, selection.fee);
        Ok(selection.fee)
    }

    /// Build, sign, verify and broadcast one transaction paying every intent
    pub async fn transfer(&self, account: &Account, intents: &[TransferIntent]) -> Result<Vec<Txid>> {
        log::info!(
            "Transfer from {} to {} receiver(s){}",
            account.address,
            intents.len(),
            if account.is_hardware { " (hardware)" } else { "" }
        );

        match self.run_transfer(account, intents).await {
            Ok(txid) => {
                log::info!("Transfer {}: {}", TransferStage::Broadcast, txid);
                Ok(vec![txid])
            }
            Err(err) => {
                log::warn!("Transfer {}: {} ({})", TransferStage::Rejected, err, err.kind());
                Err(err)
            }
        }
    }

    async fn run_transfer(&self, account: &Account, intents: &[TransferIntent]) -> Result<Txid> {
        self.validate_intents(account, intents)?;

        let signer = self.signer_for(account);
        signer.preflight(account)?;

        let utxos = self.sources.utxos.fetch_utxos(&account.address, Amount::MAX_MONEY).await?;
        let quote = self.sources.fees.fetch_fee_rates().await?;

        let selection = self
            .selector
            .select(&account.address, utxos, intents, &quote, SelectionMode::Execute)?;
        log::debug!(
            "Transfer {}: {} inputs, fee {}, change {}",
            TransferStage::Selected,
            selection.selected.len(),
            selection.fee,
            selection.change
        );

        let draft = self.drafts.build(account, intents, selection).await?;
        log::debug!("Transfer {}: {} outputs", TransferStage::Drafted, draft.outputs().len());

        let signed = signer.sign(draft, account).await?;
        log::debug!("Transfer {}: {:?} signer", TransferStage::Signed, signed.signer());

        let verified = self.validator.validate(signed)?;
        log::debug!("Transfer {}", TransferStage::Verified);

        let finalized = self.finalizer.finalize(verified)?;
        log::debug!("Transfer {}: {}", TransferStage::Finalized, finalized.txid);

        self.finalizer.broadcast(&finalized).await
    }

    fn signer_for(&self, account: &Account) -> &dyn TransactionSigner {
        if account.is_hardware {
            &self.hardware
        } else {
            &self.software
        }
    }

    /// Checks that need no I/O: intents, assets and address formats
    fn validate_intents(&self, account: &Account, intents: &[TransferIntent]) -> Result<()> {
        if intents.is_empty() {
            return Err(TransferError::InvalidIntent("no transfer intents".to_string()));
        }

        AddressKind::classify(&account.address)?;
        parse_address(&account.address, self.config.network)?;

        let mut total = Amount::ZERO;
        for intent in intents {
            if intent.amount == Amount::ZERO || intent.amount > Amount::MAX_MONEY {
                return Err(TransferError::InvalidIntent(format!(
                    "amount {} to {} is out of range",
                    intent.amount, intent.receiver_address
                )));
            }
            total = total
                .checked_add(intent.amount)
                .filter(|total| *total <= Amount::MAX_MONEY)
                .ok_or_else(|| TransferError::InvalidIntent("payment total exceeds the money supply".to_string()))?;

            if !intent.asset.is_native() {
                return Err(TransferError::InvalidIntent(format!(
                    "unsupported asset {}",
                    intent.asset.symbol
                )));
            }
            AddressKind::classify(&intent.receiver_address)?;
            parse_address(&intent.receiver_address, self.config.network)?;
        }

        Ok(())
    }

    /// Chain tip height of the configured endpoint, bounded by `ping_timeout`
    pub async fn ping_network(&self) -> Result<PingResponse> {
        let url = self.sources.chain.url();
        let started = Instant::now();

        let height = tokio::time::timeout(self.config.ping_timeout, self.sources.chain.tip_height())
            .await
            .map_err(|_| {
                TransferError::Timeout(format!("{} did not answer within {:?}", url, self.config.ping_timeout))
            })??;

        Ok(PingResponse {
            url,
            height,
            latency: started.elapsed(),
        })
    }

    /// Whether `address` is a supported address on the configured network
    pub fn validate_address(&self, address: &str) -> bool {
        AddressKind::classify(address).is_ok() && parse_address(address, self.config.network).is_ok()
    }

    /// Whether `key` is a WIF for the configured network or a 32-byte hex secret key
    pub fn validate_key(&self, key: &str) -> bool {
        let key = key.trim();
        if let Ok(private_key) = PrivateKey::from_wif(key) {
            return private_key.network == NetworkKind::from(self.config.network);
        }

        match hex::decode(key) {
            Ok(bytes) if bytes.len() == 32 => SecretKey::from_slice(&bytes).is_ok(),
            _ => false,
        }
    }

    /// Watch-only account for a supported address on the configured network
    pub fn watch_only_account(&self, address: &str) -> Result<Account> {
        AddressKind::classify(address)?;
        parse_address(address, self.config.network)?;
        Ok(Account::watch_only(address))
    }

    /// Hardware account at BIP84 `index` on the configured network
    pub async fn hardware_account(&self, index: u32) -> Result<Account> {
        self.hardware.get_account(index).await
    }

    /// Hardware accounts at BIP84 indexes `0..=until_index`
    pub async fn hardware_accounts(&self, until_index: u32) -> Result<Vec<Account>> {
        self.hardware.get_accounts(until_index).await
    }
}
