//! Immutable per-chain connection info

use crate::config::ChainConfig;
use crate::error::{OrchestratorError, OrchestratorResult};

use ethers::types::Address;

/// Chain slugs of the networks the gateway currently serves
pub mod slugs {
    pub const EVMX: u64 = 43;
    pub const ARBITRUM_SEPOLIA: u64 = 421_614;
    pub const OPTIMISM_SEPOLIA: u64 = 11_155_420;
    pub const BASE_SEPOLIA: u64 = 84_532;
}

/// Connection info for one chain, built once at start-up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainDescriptor {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub explorer_url: Option<String>,
    /// Only set on the hub chain
    pub gateway_address: Option<Address>,
    /// CCTP domain used by the attestation bridge
    pub cctp_domain: Option<u32>,
}

impl ChainDescriptor {
    pub fn from_config(config: &ChainConfig) -> OrchestratorResult<Self> {
        let gateway_address = match config.gateway_address.as_deref() {
            Some(raw) if !raw.is_empty() => Some(raw.parse::<Address>().map_err(|e| {
                OrchestratorError::Config(format!(
                    "Invalid gateway address for chain {}: {}",
                    config.chain_id, e
                ))
            })?),
            _ => None,
        };

        Ok(Self {
            chain_id: config.chain_id,
            name: config.name.clone(),
            rpc_urls: config
                .rpc_urls
                .iter()
                .filter(|url| !url.is_empty())
                .cloned()
                .collect(),
            explorer_url: config
                .explorer_url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
            gateway_address,
            cctp_domain: config.cctp_domain,
        })
    }

    /// Explorer link for a transaction on this chain
    pub fn tx_url(&self, tx_hash: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{}", base, tx_hash))
    }
}

/// Convert a chain id into the gateway's `uint32` chain slug
pub fn to_slug(chain_id: u64) -> OrchestratorResult<u32> {
    u32::try_from(chain_id).map_err(|_| {
        OrchestratorError::InvalidOrder(format!("Chain id {} does not fit a chain slug", chain_id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChainConfig {
        ChainConfig {
            chain_id: slugs::ARBITRUM_SEPOLIA,
            name: "Arbitrum Sepolia".into(),
            rpc_urls: vec!["https://sepolia-rollup.arbitrum.io/rpc".into(), "".into()],
            explorer_url: Some("https://sepolia.arbiscan.io/".into()),
            gateway_address: None,
            cctp_domain: Some(3),
            enabled: true,
        }
    }

    #[test]
    fn test_tx_url_strips_trailing_slash() {
        let descriptor = ChainDescriptor::from_config(&config()).unwrap();
        assert_eq!(
            descriptor.tx_url("0xabc").as_deref(),
            Some("https://sepolia.arbiscan.io/tx/0xabc")
        );
        assert_eq!(descriptor.rpc_urls.len(), 1);
    }

    #[test]
    fn test_invalid_gateway_address() {
        let mut config = config();
        config.gateway_address = Some("not-an-address".into());
        assert!(matches!(
            ChainDescriptor::from_config(&config),
            Err(OrchestratorError::Config(_))
        ));
    }

    #[test]
    fn test_slug_conversion() {
        assert_eq!(to_slug(slugs::OPTIMISM_SEPOLIA).unwrap(), 11_155_420);
        assert!(to_slug(u64::from(u32::MAX) + 1).is_err());
    }
}
