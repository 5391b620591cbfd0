//! Chain module - static chain registry and read providers
//!
//! This module provides:
//! - Immutable chain descriptors built once from configuration
//! - Multi-RPC providers with automatic failover for read calls
//! - Explorer link construction with hub-chain fallback

pub mod descriptor;
pub mod provider;

pub use descriptor::{slugs, to_slug, ChainDescriptor};
pub use provider::ChainProvider;

use crate::config::Settings;
use crate::error::{OrchestratorError, OrchestratorResult};

use ethers::types::Address;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Read-only registry of every configured chain
pub struct ChainRegistry {
    /// Descriptors indexed by chain ID
    descriptors: HashMap<u64, Arc<ChainDescriptor>>,
    /// Providers indexed by chain ID
    providers: HashMap<u64, Arc<ChainProvider>>,
    /// Chain hosting the app gateway
    hub_chain_id: u64,
}

impl ChainRegistry {
    /// Build the registry for all enabled chains
    pub fn from_settings(settings: &Settings) -> OrchestratorResult<Self> {
        let mut descriptors = HashMap::new();
        let mut providers = HashMap::new();

        for (name, chain_config) in settings.enabled_chains() {
            let descriptor = ChainDescriptor::from_config(chain_config)?;

            match ChainProvider::new(&descriptor) {
                Ok(provider) => {
                    providers.insert(descriptor.chain_id, Arc::new(provider));
                }
                Err(e) => {
                    warn!("Skipping provider for chain {}: {}", name, e);
                }
            }

            info!(
                "Registered chain {} (ID: {})",
                descriptor.name, descriptor.chain_id
            );
            descriptors.insert(descriptor.chain_id, Arc::new(descriptor));
        }

        let registry = Self {
            descriptors,
            providers,
            hub_chain_id: settings.session.hub_chain_id,
        };

        registry.gateway_address()?;
        Ok(registry)
    }

    /// Build a registry from descriptors without providers
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ChainDescriptor>,
        hub_chain_id: u64,
    ) -> Self {
        Self {
            descriptors: descriptors
                .into_iter()
                .map(|d| (d.chain_id, Arc::new(d)))
                .collect(),
            providers: HashMap::new(),
            hub_chain_id,
        }
    }

    /// Get descriptor for a specific chain
    pub fn descriptor(&self, chain_id: u64) -> OrchestratorResult<Arc<ChainDescriptor>> {
        self.descriptors
            .get(&chain_id)
            .cloned()
            .ok_or(OrchestratorError::ChainNotFound { chain_id })
    }

    /// Get provider for a specific chain
    pub fn provider(&self, chain_id: u64) -> OrchestratorResult<Arc<ChainProvider>> {
        self.providers
            .get(&chain_id)
            .cloned()
            .ok_or(OrchestratorError::ChainNotFound { chain_id })
    }

    pub fn hub_chain_id(&self) -> u64 {
        self.hub_chain_id
    }

    pub fn hub(&self) -> OrchestratorResult<Arc<ChainDescriptor>> {
        self.descriptor(self.hub_chain_id)
    }

    /// Address of the app gateway on the hub chain
    pub fn gateway_address(&self) -> OrchestratorResult<Address> {
        self.hub()?.gateway_address.ok_or_else(|| {
            OrchestratorError::Config(format!(
                "App gateway address not set for hub chain {}",
                self.hub_chain_id
            ))
        })
    }

    /// All chains other than the hub, ordered by chain ID
    pub fn spoke_chains(&self) -> Vec<Arc<ChainDescriptor>> {
        let mut spokes: Vec<_> = self
            .descriptors
            .values()
            .filter(|d| d.chain_id != self.hub_chain_id)
            .cloned()
            .collect();
        spokes.sort_by_key(|d| d.chain_id);
        spokes
    }

    pub fn is_known(&self, chain_id: u64) -> bool {
        self.descriptors.contains_key(&chain_id)
    }

    /// Explorer link for a transaction, falling back to the hub explorer
    pub fn tx_url(&self, chain_id: u64, tx_hash: &str) -> String {
        self.descriptors
            .get(&chain_id)
            .and_then(|d| d.tx_url(tx_hash))
            .or_else(|| {
                self.descriptors
                    .get(&self.hub_chain_id)
                    .and_then(|d| d.tx_url(tx_hash))
            })
            .unwrap_or_else(|| tx_hash.to_string())
    }

    /// Health check for all chains
    pub async fn health_check(&self) -> Vec<(u64, bool)> {
        let mut results = Vec::new();

        for (chain_id, provider) in &self.providers {
            let healthy = provider.health_check().await;
            results.push((*chain_id, healthy));

            crate::metrics::record_chain_health(*chain_id, healthy);
        }

        results.sort_by_key(|(chain_id, _)| *chain_id);
        results
    }
}
