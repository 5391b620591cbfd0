//! Read access to the app gateway and the tokens it manages

mod resolver;

pub use resolver::{AddressResolver, Resolution, ResolutionScope};

use crate::chain::{to_slug, ChainRegistry};
use crate::contracts::{AppGateway, ContractIdentifier, GatewayRevert, PermitToken};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::permit::PermitAuthorization;

use async_trait::async_trait;
use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::debug;

/// Read-only view of the hub-chain gateway
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GatewayReader: Send + Sync {
    /// Address of a managed contract on a chain; zero while not deployed
    async fn on_chain_address(
        &self,
        contract: ContractIdentifier,
        chain_id: u64,
    ) -> OrchestratorResult<Address>;

    /// Hub-side forwarder standing in for a managed contract
    async fn forwarder_address(
        &self,
        contract: ContractIdentifier,
        chain_id: u64,
    ) -> OrchestratorResult<Address>;

    async fn unminted_balance(&self, user: Address) -> OrchestratorResult<U256>;

    async fn locked_balance(&self, user: Address) -> OrchestratorResult<U256>;
}

/// Read-only view of permit-enabled tokens on any configured chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenReader: Send + Sync {
    async fn name(&self, chain_id: u64, token: Address) -> OrchestratorResult<String>;

    async fn nonce(&self, chain_id: u64, token: Address, owner: Address)
        -> OrchestratorResult<U256>;

    async fn balance_of(
        &self,
        chain_id: u64,
        token: Address,
        owner: Address,
    ) -> OrchestratorResult<U256>;

    /// Simulate `permit(...)` on the token without sending anything
    async fn dry_run_permit(&self, permit: &PermitAuthorization) -> OrchestratorResult<()>;
}

/// Gateway and token reads over JSON-RPC
pub struct EvmReader {
    registry: Arc<ChainRegistry>,
}

impl EvmReader {
    pub fn new(registry: Arc<ChainRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl GatewayReader for EvmReader {
    async fn on_chain_address(
        &self,
        contract: ContractIdentifier,
        chain_id: u64,
    ) -> OrchestratorResult<Address> {
        let gateway = self.registry.gateway_address()?;
        let hub = self.registry.provider(self.registry.hub_chain_id())?;
        let slug = to_slug(chain_id)?;
        let id = contract.as_bytes();

        hub.read("getOnChainAddress", |client| async move {
            AppGateway::new(gateway, client)
                .get_on_chain_address(id, slug)
                .call()
                .await
                .map_err(|e| e.to_string())
        })
        .await
    }

    async fn forwarder_address(
        &self,
        contract: ContractIdentifier,
        chain_id: u64,
    ) -> OrchestratorResult<Address> {
        let gateway = self.registry.gateway_address()?;
        let hub = self.registry.provider(self.registry.hub_chain_id())?;
        let slug = to_slug(chain_id)?;
        let id = contract.as_bytes();

        hub.read("forwarderAddresses", |client| async move {
            AppGateway::new(gateway, client)
                .forwarder_addresses(id, slug)
                .call()
                .await
                .map_err(|e| e.to_string())
        })
        .await
    }

    async fn unminted_balance(&self, user: Address) -> OrchestratorResult<U256> {
        let gateway = self.registry.gateway_address()?;
        let hub = self.registry.provider(self.registry.hub_chain_id())?;

        hub.read("unmintedBalance", |client| async move {
            AppGateway::new(gateway, client)
                .unminted_balance(user)
                .call()
                .await
                .map_err(|e| e.to_string())
        })
        .await
    }

    async fn locked_balance(&self, user: Address) -> OrchestratorResult<U256> {
        let gateway = self.registry.gateway_address()?;
        let hub = self.registry.provider(self.registry.hub_chain_id())?;

        hub.read("lockedBalance", |client| async move {
            AppGateway::new(gateway, client)
                .locked_balance(user)
                .call()
                .await
                .map_err(|e| e.to_string())
        })
        .await
    }
}

#[async_trait]
impl TokenReader for EvmReader {
    async fn name(&self, chain_id: u64, token: Address) -> OrchestratorResult<String> {
        self.registry
            .provider(chain_id)?
            .read("token name", |client| async move {
                PermitToken::new(token, client)
                    .name()
                    .call()
                    .await
                    .map_err(|e| e.to_string())
            })
            .await
    }

    async fn nonce(
        &self,
        chain_id: u64,
        token: Address,
        owner: Address,
    ) -> OrchestratorResult<U256> {
        self.registry
            .provider(chain_id)?
            .read("permit nonce", |client| async move {
                PermitToken::new(token, client)
                    .nonces(owner)
                    .call()
                    .await
                    .map_err(|e| e.to_string())
            })
            .await
    }

    async fn balance_of(
        &self,
        chain_id: u64,
        token: Address,
        owner: Address,
    ) -> OrchestratorResult<U256> {
        self.registry
            .provider(chain_id)?
            .read("token balance", |client| async move {
                PermitToken::new(token, client)
                    .balance_of(owner)
                    .call()
                    .await
                    .map_err(|e| e.to_string())
            })
            .await
    }

    async fn dry_run_permit(&self, permit: &PermitAuthorization) -> OrchestratorResult<()> {
        let provider = self.registry.provider(permit.chain_id)?;
        let token = PermitToken::new(permit.token, provider.client());

        let call = token
            .permit(
                permit.owner,
                permit.spender,
                permit.value,
                U256::from(permit.deadline),
                permit.v,
                permit.r,
                permit.s,
            )
            .from(permit.owner);

        match call.call().await {
            Ok(()) => {
                debug!("Permit dry-run accepted on chain {}", permit.chain_id);
                Ok(())
            }
            Err(e) => match e.as_revert() {
                Some(data) => Err(OrchestratorError::PermitInvalid {
                    reason: GatewayRevert::from_revert_data(data).to_string(),
                }),
                None => Err(OrchestratorError::Rpc {
                    chain_id: permit.chain_id,
                    message: e.to_string(),
                }),
            },
        }
    }
}
