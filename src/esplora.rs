//! Esplora REST adapter
//!
//! Implements every data source and the broadcaster against an Esplora
//! compatible API (mempool.space, blockstream.info or the bundled
//! `esplora-mock`).

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use bitcoin::{Amount, Txid};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::config::EngineConfig;
use crate::error::{BroadcastError, SourceError};
use crate::sources::{Broadcaster, ChainTipSource, FeeRateSource, ParentTxSource, UtxoSource};
use crate::types::{FeeRateQuote, UnspentOutput};

/// Confirmation targets (in blocks) used for each fee tier
const FAST_TARGET: u16 = 1;
const MEDIUM_TARGET: u16 = 3;
const SLOW_TARGET: u16 = 6;

#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
}

#[derive(Clone)]
pub struct EsploraClient {
    client: reqwest::Client,
    base_url: String,
}

impl EsploraClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.esplora_url.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_text(&self, path: &str) -> Result<String, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl UtxoSource for EsploraClient {
    async fn fetch_utxos(&self, address: &str, ceiling: Amount) -> Result<Vec<UnspentOutput>, SourceError> {
        let body = self.get_text(&format!("/address/{}/utxo", address)).await?;
        let entries: Vec<EsploraUtxo> =
            serde_json::from_str(&body).map_err(|e| SourceError::Malformed(e.to_string()))?;

        let mut utxos = Vec::with_capacity(entries.len());
        let mut total = Amount::ZERO;

        for entry in entries {
            if total >= ceiling {
                break;
            }

            let txid = Txid::from_str(&entry.txid)
                .map_err(|e| SourceError::Malformed(format!("txid '{}': {}", entry.txid, e)))?;
            let value = Amount::from_sat(entry.value);
            total = total
                .checked_add(value)
                .ok_or_else(|| SourceError::Malformed(format!("UTXO total for {} overflows", address)))?;

            utxos.push(UnspentOutput {
                txid,
                vout: entry.vout,
                value,
                address: address.to_string(),
            });
        }

        log::debug!("{} UTXOs ({}) for {}", utxos.len(), total, address);
        Ok(utxos)
    }
}

#[async_trait]
impl FeeRateSource for EsploraClient {
    async fn fetch_fee_rates(&self) -> Result<FeeRateQuote, SourceError> {
        let body = self.get_text("/fee-estimates").await?;
        parse_fee_estimates(&body)
    }
}

#[async_trait]
impl ParentTxSource for EsploraClient {
    async fn fetch_raw_transaction(&self, txid: &Txid) -> Result<Vec<u8>, SourceError> {
        let body = self.get_text(&format!("/tx/{}/hex", txid)).await?;
        hex::decode(body.trim()).map_err(|e| SourceError::Malformed(format!("tx {} hex: {}", txid, e)))
    }
}

#[async_trait]
impl Broadcaster for EsploraClient {
    async fn submit(&self, raw_transaction: &[u8]) -> Result<String, BroadcastError> {
        let url = format!("{}/tx", self.base_url);
        log::debug!("Broadcasting transaction to: {}", url);

        let response = self
            .client
            .post(&url)
            .body(hex::encode(raw_transaction))
            .send()
            .await
            .map_err(|e| BroadcastError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BroadcastError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(BroadcastError::Rejected {
                status: Some(status.as_u16()),
                reason: body,
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl ChainTipSource for EsploraClient {
    async fn tip_height(&self) -> Result<u64, SourceError> {
        let body = self.get_text("/blocks/tip/height").await?;
        body.trim()
            .parse()
            .map_err(|e: std::num::ParseIntError| SourceError::Malformed(e.to_string()))
    }

    fn url(&self) -> String {
        self.base_url.clone()
    }
}

/// Map an Esplora `{"<target>": <sat/vB>}` object onto the three tiers
pub fn parse_fee_estimates(body: &str) -> Result<FeeRateQuote, SourceError> {
    let raw: BTreeMap<String, serde_json::Number> =
        serde_json::from_str(body).map_err(|e| SourceError::Malformed(e.to_string()))?;

    let mut by_target = BTreeMap::new();
    for (target, rate) in raw {
        let target: u16 = match target.parse() {
            Ok(target) => target,
            Err(_) => {
                log::warn!("Ignoring fee estimate for target '{}'", target);
                continue;
            }
        };
        let text = rate.to_string();
        let rate = Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|e| SourceError::Malformed(format!("fee rate '{}': {}", text, e)))?;
        by_target.insert(target, rate);
    }

    Ok(FeeRateQuote {
        slow: rate_for_target(&by_target, SLOW_TARGET)?,
        medium: rate_for_target(&by_target, MEDIUM_TARGET)?,
        fast: rate_for_target(&by_target, FAST_TARGET)?,
    })
}

/// Exact target, else the nearest larger one, else the largest available
fn rate_for_target(by_target: &BTreeMap<u16, Decimal>, target: u16) -> Result<Decimal, SourceError> {
    by_target
        .range(target..)
        .next()
        .or_else(|| by_target.iter().next_back())
        .map(|(_, rate)| *rate)
        .ok_or_else(|| SourceError::Malformed("empty fee estimates".to_string()))
}
