//! Balances shown alongside the actions, refreshed after each completed operation

use super::draft::format_amount;
use crate::chain::ChainRegistry;
use crate::contracts::ContractIdentifier;
use crate::error::OrchestratorResult;
use crate::gateway::{AddressResolver, GatewayReader, Resolution, TokenReader};

use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Balance of the super token on one chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBalance {
    /// `None` while the super token is not deployed there
    pub token: Option<Address>,
    pub balance: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Balances {
    /// Home token held on the home chain
    pub home_token: U256,
    /// Deposited but not yet minted, on the gateway
    pub unminted: U256,
    /// Unminted balance reserved by in-flight requests
    pub locked: U256,
    pub super_token: BTreeMap<u64, ChainBalance>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Balances {
    /// Unminted minus locked, floored at zero
    pub fn max_mintable(&self) -> U256 {
        self.unminted.saturating_sub(self.locked)
    }

    /// Human-readable summary lines
    pub fn describe(&self, decimals: u32, registry: &ChainRegistry) -> Vec<String> {
        let mut lines = vec![
            format!("Home token: {}", format_amount(self.home_token, decimals)),
            format!("Unminted: {}", format_amount(self.unminted, decimals)),
            format!("Locked: {}", format_amount(self.locked, decimals)),
            format!("Max mintable: {}", format_amount(self.max_mintable(), decimals)),
        ];
        for (chain_id, entry) in &self.super_token {
            let name = registry
                .descriptor(*chain_id)
                .map(|d| d.name.clone())
                .unwrap_or_else(|_| chain_id.to_string());
            match entry.token {
                Some(_) => lines.push(format!(
                    "Super token on {}: {}",
                    name,
                    format_amount(entry.balance, decimals)
                )),
                None => lines.push(format!("Super token on {}: not deployed", name)),
            }
        }
        lines
    }
}

/// What to read on refresh
#[derive(Debug, Clone)]
pub struct BalanceScope {
    pub user: Address,
    pub home_chain_id: u64,
    pub home_token: Address,
    /// Chains whose super token balance is shown
    pub spoke_chains: Vec<u64>,
}

pub struct BalanceBoard {
    gateway: Arc<dyn GatewayReader>,
    tokens: Arc<dyn TokenReader>,
    resolver: AddressResolver,
    scope: BalanceScope,
    current: RwLock<Balances>,
    /// Serializes refreshes
    refresh_lock: Mutex<()>,
    refreshes: AtomicU64,
}

impl BalanceBoard {
    pub fn new(
        gateway: Arc<dyn GatewayReader>,
        tokens: Arc<dyn TokenReader>,
        resolver: AddressResolver,
        scope: BalanceScope,
    ) -> Self {
        Self {
            gateway,
            tokens,
            resolver,
            scope,
            current: RwLock::new(Balances::default()),
            refresh_lock: Mutex::new(()),
            refreshes: AtomicU64::new(0),
        }
    }

    pub async fn snapshot(&self) -> Balances {
        self.current.read().await.clone()
    }

    /// Number of completed refreshes
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Re-read every balance
    pub async fn refresh(&self) -> OrchestratorResult<Balances> {
        let _guard = self.refresh_lock.lock().await;
        let balances = self.read().await?;
        self.store(balances.clone()).await;
        Ok(balances)
    }

    /// Re-read every balance, keeping the result only if `still_wanted`
    /// holds once the reads are done. Returns `None` when discarded.
    pub async fn refresh_if<F>(&self, still_wanted: F) -> OrchestratorResult<Option<Balances>>
    where
        F: Fn() -> bool,
    {
        let _guard = self.refresh_lock.lock().await;
        let balances = self.read().await?;
        if !still_wanted() {
            debug!("Discarding balances read for a superseded operation");
            return Ok(None);
        }
        self.store(balances.clone()).await;
        Ok(Some(balances))
    }

    async fn read(&self) -> OrchestratorResult<Balances> {
        let user = self.scope.user;
        let lookups = self.resolver.scope();

        let (home_token, unminted, locked) = tokio::try_join!(
            self.tokens
                .balance_of(self.scope.home_chain_id, self.scope.home_token, user),
            self.gateway.unminted_balance(user),
            self.gateway.locked_balance(user),
        )?;

        let per_chain = try_join_all(self.scope.spoke_chains.iter().map(|chain_id| {
            let lookups = &lookups;
            async move {
                let entry = match lookups
                    .resolve(ContractIdentifier::super_token(), *chain_id)
                    .await?
                {
                    Resolution::Deployed(token) => ChainBalance {
                        token: Some(token),
                        balance: self.tokens.balance_of(*chain_id, token, user).await?,
                    },
                    Resolution::NotDeployed => ChainBalance {
                        token: None,
                        balance: U256::zero(),
                    },
                };
                OrchestratorResult::Ok((*chain_id, entry))
            }
        }))
        .await?;

        Ok(Balances {
            home_token,
            unminted,
            locked,
            super_token: per_chain.into_iter().collect(),
            refreshed_at: Some(Utc::now()),
        })
    }

    async fn store(&self, balances: Balances) {
        let count = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Balances refreshed ({} total): {:?}", count, balances);
        info!(
            "Unminted {}, locked {}, max mintable {}",
            balances.unminted,
            balances.locked,
            balances.max_mintable()
        );
        *self.current.write().await = balances;
    }
}
