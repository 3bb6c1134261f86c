/// Engine configuration from environment variables
///
/// Controls Bitcoin network type, Esplora API endpoint, fee tier and the
/// liveness probe timeout. Defaults to Signet.
use std::env;
use std::time::Duration;

use crate::types::FeeTier;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Bitcoin network type
    pub network: bitcoin::Network,
    /// Esplora API base URL
    pub esplora_url: String,
    /// Fee tier taken from the fee-rate quote
    pub fee_tier: FeeTier,
    /// Upper bound for `ping_network`
    pub ping_timeout: Duration,
}

const DEFAULT_PING_TIMEOUT_MS: u64 = 5_000;

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `BITCOIN_NETWORK`: "signet" (default), "mainnet"/"bitcoin", "testnet" or "regtest"
    /// - `ESPLORA_URL`: Esplora API endpoint (optional, has sensible defaults)
    /// - `FEE_TIER`: "slow", "medium" (default) or "fast"
    /// - `PING_TIMEOUT_MS`: liveness probe timeout in milliseconds (default 5000)
    pub fn from_env() -> Self {
        let network_str = env::var("BITCOIN_NETWORK")
            .unwrap_or_else(|_| "signet".to_string())
            .to_lowercase();

        let network = match network_str.as_str() {
            "mainnet" | "bitcoin" => bitcoin::Network::Bitcoin,
            "testnet" => bitcoin::Network::Testnet,
            "regtest" => bitcoin::Network::Regtest,
            "signet" | "" => bitcoin::Network::Signet,
            other => {
                log::warn!("Unknown network '{}', defaulting to Signet", other);
                bitcoin::Network::Signet
            }
        };
        log::info!("Using {} network", network);

        let esplora_url = env::var("ESPLORA_URL").unwrap_or_else(|_| default_esplora_url(network));
        log::info!("Esplora URL: {}", esplora_url);

        let fee_tier = match env::var("FEE_TIER") {
            Ok(tier) => tier.parse().unwrap_or_else(|_| {
                log::warn!("Unknown fee tier '{}', defaulting to medium", tier);
                FeeTier::Medium
            }),
            Err(_) => FeeTier::Medium,
        };

        let ping_timeout = env::var("PING_TIMEOUT_MS")
            .ok()
            .and_then(|ms| ms.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_PING_TIMEOUT_MS));

        Self {
            network,
            esplora_url,
            fee_tier,
            ping_timeout,
        }
    }

    /// Configuration for a network with its default Esplora endpoint
    pub fn for_network(network: bitcoin::Network) -> Self {
        Self {
            network,
            esplora_url: default_esplora_url(network),
            ..Default::default()
        }
    }

    /// Get the BIP44 coin type for this network
    ///
    /// - Mainnet: 0
    /// - Testnet/Signet/Regtest: 1
    pub fn coin_type(&self) -> u32 {
        match self.network {
            bitcoin::Network::Bitcoin => 0,
            _ => 1,
        }
    }

    /// BIP84 derivation path for an address index: `m/84'/{coin}'/0'/0/{index}`
    pub fn bip_path(&self, index: u32) -> String {
        format!("m/84'/{}'/0'/0/{}", self.coin_type(), index)
    }
}

fn default_esplora_url(network: bitcoin::Network) -> String {
    match network {
        bitcoin::Network::Bitcoin => "https://mempool.space/api".to_string(),
        bitcoin::Network::Testnet => "https://mempool.space/testnet/api".to_string(),
        bitcoin::Network::Regtest => "http://localhost:3000".to_string(),
        _ => "https://mempool.space/signet/api".to_string(),
    }
}

impl Default for EngineConfig {
    /// Default configuration (Signet)
    fn default() -> Self {
        Self {
            network: bitcoin::Network::Signet,
            esplora_url: "https://mempool.space/signet/api".to_string(),
            fee_tier: FeeTier::Medium,
            ping_timeout: Duration::from_millis(DEFAULT_PING_TIMEOUT_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_signet() {
        let config = EngineConfig::default();
        assert!(matches!(config.network, bitcoin::Network::Signet));
        assert_eq!(config.fee_tier, FeeTier::Medium);
        assert_eq!(config.ping_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_coin_type() {
        let mainnet = EngineConfig::for_network(bitcoin::Network::Bitcoin);
        assert_eq!(mainnet.coin_type(), 0);
        assert_eq!(mainnet.esplora_url, "https://mempool.space/api");

        let regtest = EngineConfig::for_network(bitcoin::Network::Regtest);
        assert_eq!(regtest.coin_type(), 1);
        assert_eq!(regtest.esplora_url, "http://localhost:3000");
    }

    #[test]
    fn test_bip_path() {
        let mainnet = EngineConfig::for_network(bitcoin::Network::Bitcoin);
        assert_eq!(mainnet.bip_path(3), "m/84'/0'/0'/0/3");

        let testnet = EngineConfig::for_network(bitcoin::Network::Testnet);
        assert_eq!(testnet.bip_path(0), "m/84'/1'/0'/0/0");
    }
}
