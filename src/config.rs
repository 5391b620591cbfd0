//! Configuration management for the super token orchestrator
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::tx::OperationKind;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bounds on the status poll interval, in milliseconds
pub const MIN_POLL_INTERVAL_MS: u64 = 1_000;
pub const MAX_POLL_INTERVAL_MS: u64 = 5_000;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub session: SessionConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub permit: PermitConfig,
    pub wallet: WalletConfig,
    pub chains: HashMap<String, ChainConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Chain hosting the app gateway
    pub hub_chain_id: u64,
    /// Chain where the underlying token and its vault live
    pub token_home_chain_id: u64,
    /// Home token address on `token_home_chain_id`
    pub token_address: String,
    #[serde(default = "default_decimals")]
    pub token_decimals: u32,
    pub status_api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    pub deposit_poll_interval_ms: u64,
    pub mint_poll_interval_ms: u64,
    pub transfer_poll_interval_ms: u64,
    pub deploy_poll_interval_ms: u64,
    pub timeout_secs: u64,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermitConfig {
    pub deadline_window_secs: u64,
    pub verify_with_dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub explorer_url: Option<String>,
    pub gateway_address: Option<String>,
    pub cctp_domain: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_decimals() -> u32 {
    18
}

fn default_enabled() -> bool {
    true
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            deposit_poll_interval_ms: 1_000,
            mint_poll_interval_ms: 1_000,
            transfer_poll_interval_ms: 5_000,
            deploy_poll_interval_ms: 5_000,
            timeout_secs: 600,
            request_timeout_ms: 10_000,
        }
    }
}

impl TrackerConfig {
    /// Poll interval for an operation kind
    pub fn poll_interval(&self, kind: OperationKind) -> Duration {
        let ms = match kind {
            OperationKind::Deposit => self.deposit_poll_interval_ms,
            OperationKind::Mint => self.mint_poll_interval_ms,
            OperationKind::Transfer => self.transfer_poll_interval_ms,
            OperationKind::Deploy => self.deploy_poll_interval_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for PermitConfig {
    fn default() -> Self {
        Self {
            deadline_window_secs: 3_600,
            verify_with_dry_run: true,
        }
    }
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("SUPERTOKEN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text, substituting environment variables
    pub fn parse(config_str: &str) -> Result<Self> {
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        let hub = self
            .get_chain_by_id(self.session.hub_chain_id)
            .with_context(|| format!("Hub chain {} is not configured", self.session.hub_chain_id))?;

        match hub.gateway_address.as_deref() {
            Some(address) if !address.is_empty() => {}
            _ => anyhow::bail!("Hub chain {} has no gateway address configured", hub.name),
        }

        if self.get_chain_by_id(self.session.token_home_chain_id).is_none() {
            anyhow::bail!(
                "Token home chain {} is not configured",
                self.session.token_home_chain_id
            );
        }

        if self.spoke_chains().is_empty() {
            anyhow::bail!("At least one spoke chain must be enabled");
        }

        for (name, chain) in &self.chains {
            if chain.enabled && chain.rpc_urls.iter().all(|url| url.is_empty()) {
                anyhow::bail!("Chain {} has no RPC URLs configured", name);
            }
            if chain.enabled && chain.explorer_url.is_none() {
                tracing::warn!("Chain {} has no explorer URL - links will fall back to the hub explorer", name);
            }
        }

        if self.session.status_api_url.is_empty() {
            anyhow::bail!("Status API URL must be set");
        }

        for kind in OperationKind::ALL {
            let interval = self.tracker.poll_interval(kind).as_millis() as u64;
            if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&interval) {
                anyhow::bail!(
                    "Poll interval for {} must be within {}..={} ms, got {}",
                    kind,
                    MIN_POLL_INTERVAL_MS,
                    MAX_POLL_INTERVAL_MS,
                    interval
                );
            }
        }

        if self.tracker.timeout_secs == 0 {
            anyhow::bail!("Tracker timeout must be greater than zero");
        }

        if self.permit.deadline_window_secs == 0 {
            anyhow::bail!("Permit deadline window must be greater than zero");
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Enabled chains other than the hub, ordered by chain id
    pub fn spoke_chains(&self) -> Vec<&ChainConfig> {
        let mut spokes: Vec<_> = self
            .chains
            .values()
            .filter(|c| c.enabled && c.chain_id != self.session.hub_chain_id)
            .collect();
        spokes.sort_by_key(|c| c.chain_id);
        spokes
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
