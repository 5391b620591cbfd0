//! Chain provider with multi-RPC support and automatic failover

use super::ChainDescriptor;
use crate::error::{OrchestratorError, OrchestratorResult};

use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    chain_id: u64,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Arc<Provider<Http>>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(descriptor: &ChainDescriptor) -> OrchestratorResult<Self> {
        let mut http_providers = Vec::new();

        for url in &descriptor.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(500));
                    http_providers.push(Arc::new(provider));
                    debug!("Added HTTP provider for chain {}: {}", descriptor.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(OrchestratorError::Rpc {
                chain_id: descriptor.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        Ok(Self {
            chain_id: descriptor.chain_id,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn client(&self) -> Arc<Provider<Http>> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        self.http_providers[idx % self.http_providers.len()].clone()
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.chain_id, next);
    }

    /// Run a read-only call, failing over across providers on error
    pub async fn read<T, F, Fut>(&self, what: &str, call: F) -> OrchestratorResult<T>
    where
        F: Fn(Arc<Provider<Http>>) -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        let mut last_error = String::from("no providers");

        for _ in 0..self.http_providers.len() {
            match call(self.client()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("Failed to read {} from chain {}: {}", what, self.chain_id, e);
                    last_error = e;
                    self.failover();
                }
            }
        }

        Err(OrchestratorError::Rpc {
            chain_id: self.chain_id,
            message: format!("All providers failed to read {}: {}", what, last_error),
        })
    }

    /// Get current block number with failover
    pub async fn get_block_number(&self) -> OrchestratorResult<u64> {
        self.read("block number", |client| async move {
            client
                .get_block_number()
                .await
                .map(|b| b.as_u64())
                .map_err(|e| e.to_string())
        })
        .await
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.chain_id, e);
                false
            }
        }
    }

    /// Get chain ID
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}
