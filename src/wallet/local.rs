//! Local private-key wallet implementing the signing capability

use super::{SigningCapability, WalletError};
use crate::chain::ChainRegistry;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::RpcError;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::transaction::eip712::TypedData;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether each wallet prompt needs an explicit yes on the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationPolicy {
    AutoApprove,
    Prompt,
}

/// Wallet backed by a private key held in the environment
pub struct LocalWalletCapability {
    wallet: LocalWallet,
    registry: Arc<ChainRegistry>,
    active_chain: AtomicU64,
    confirmation: ConfirmationPolicy,
}

impl LocalWalletCapability {
    pub fn new(
        wallet: LocalWallet,
        registry: Arc<ChainRegistry>,
        initial_chain: u64,
        confirmation: ConfirmationPolicy,
    ) -> Self {
        Self {
            wallet,
            registry,
            active_chain: AtomicU64::new(initial_chain),
            confirmation,
        }
    }

    /// Load wallet from the environment variable named in the config
    pub fn from_env(
        key_env: &str,
        registry: Arc<ChainRegistry>,
        initial_chain: u64,
        confirmation: ConfirmationPolicy,
    ) -> Result<Self, WalletError> {
        let key = std::env::var(key_env).map_err(|_| WalletError::Unavailable)?;
        let wallet = key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| WalletError::Other(format!("Invalid private key: {}", e)))?;

        info!("Wallet loaded: {:?}", wallet.address());
        Ok(Self::new(wallet, registry, initial_chain, confirmation))
    }

    async fn confirm(&self, prompt: String) -> Result<(), WalletError> {
        if self.confirmation == ConfirmationPolicy::AutoApprove {
            return Ok(());
        }

        let approved = tokio::task::spawn_blocking(move || {
            print!("{} [y/N] ", prompt);
            let _ = std::io::stdout().flush();
            let mut answer = String::new();
            std::io::stdin().lock().read_line(&mut answer).ok()?;
            Some(matches!(answer.trim(), "y" | "Y" | "yes"))
        })
        .await
        .map_err(|e| WalletError::Other(e.to_string()))?;

        match approved {
            Some(true) => Ok(()),
            _ => Err(WalletError::Declined),
        }
    }

    fn client(&self) -> Result<Arc<Provider<Http>>, WalletError> {
        let chain_id = self.active_chain.load(Ordering::SeqCst);
        self.registry
            .provider(chain_id)
            .map(|p| p.client())
            .map_err(|_| WalletError::UnknownChain(chain_id))
    }
}

/// Map a node error into a wallet error, keeping revert data when present
fn classify(err: ProviderError) -> WalletError {
    if let Some(resp) = RpcError::as_error_response(&err) {
        if let Some(data) = resp.as_revert_data() {
            return WalletError::Reverted {
                data: Some(data),
                message: resp.message.clone(),
            };
        }
        if resp.message.contains("revert") {
            return WalletError::Reverted {
                data: None,
                message: resp.message.clone(),
            };
        }
    }
    WalletError::Other(err.to_string())
}

#[async_trait]
impl SigningCapability for LocalWalletCapability {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn active_chain_id(&self) -> Result<u64, WalletError> {
        Ok(self.active_chain.load(Ordering::SeqCst))
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        if self.registry.provider(chain_id).is_err() {
            return Err(WalletError::UnknownChain(chain_id));
        }

        self.confirm(format!("Switch wallet to chain {}?", chain_id))
            .await?;
        let previous = self.active_chain.swap(chain_id, Ordering::SeqCst);
        info!("Wallet switched from chain {} to {}", previous, chain_id);
        Ok(())
    }

    async fn sign_typed_data(&self, payload: &TypedData) -> Result<Signature, WalletError> {
        self.confirm(format!("Sign {} permit?", payload.primary_type))
            .await?;
        self.wallet
            .sign_typed_data(payload)
            .await
            .map_err(|e| WalletError::Other(e.to_string()))
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, WalletError> {
        let mut tx = tx.clone();
        tx.set_from(self.wallet.address());
        self.client()?
            .estimate_gas(&tx, None)
            .await
            .map_err(classify)
    }

    async fn send_transaction(&self, tx: TypedTransaction) -> Result<H256, WalletError> {
        let chain_id = self.active_chain.load(Ordering::SeqCst);
        let client = self.client()?;

        let mut tx = tx;
        tx.set_from(self.wallet.address());
        tx.set_chain_id(chain_id);
        client.fill_transaction(&mut tx, None).await.map_err(classify)?;

        self.confirm(format!("Send transaction to {:?} on chain {}?", tx.to(), chain_id))
            .await?;

        let wallet = self.wallet.clone().with_chain_id(chain_id);
        let signature = wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| WalletError::Other(e.to_string()))?;
        let raw = tx.rlp_signed(&signature);

        let sent = timeout(SEND_TIMEOUT, client.send_raw_transaction(raw)).await;
        match sent {
            Ok(Ok(pending)) => {
                let tx_hash = pending.tx_hash();
                debug!("Transaction sent on chain {}: {:?}", chain_id, tx_hash);
                Ok(tx_hash)
            }
            Ok(Err(e)) => Err(classify(e)),
            Err(_) => Err(WalletError::Other(format!(
                "send timed out after {:?}",
                SEND_TIMEOUT
            ))),
        }
    }
}
