//! Resolution of logical contract ids to per-chain addresses

use super::GatewayReader;
use crate::contracts::ContractIdentifier;
use crate::error::{OrchestratorError, OrchestratorResult};

use dashmap::DashMap;
use ethers::types::Address;
use std::sync::Arc;
use tracing::debug;

/// Outcome of an address lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Deployed(Address),
    /// The gateway reported the zero address
    NotDeployed,
}

impl Resolution {
    fn from_address(address: Address) -> Self {
        if address.is_zero() {
            Resolution::NotDeployed
        } else {
            Resolution::Deployed(address)
        }
    }

    pub fn address(&self) -> Option<Address> {
        match self {
            Resolution::Deployed(address) => Some(*address),
            Resolution::NotDeployed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Lookup {
    OnChain,
    Forwarder,
}

/// Resolves contract ids through the gateway
#[derive(Clone)]
pub struct AddressResolver {
    gateway: Arc<dyn GatewayReader>,
}

impl AddressResolver {
    pub fn new(gateway: Arc<dyn GatewayReader>) -> Self {
        Self { gateway }
    }

    /// Start a lookup scope for one user action
    pub fn scope(&self) -> ResolutionScope {
        ResolutionScope {
            gateway: self.gateway.clone(),
            cache: DashMap::new(),
        }
    }
}

/// Lookups made on behalf of one user action; repeated lookups of the same
/// key are answered from the scope without another gateway read
pub struct ResolutionScope {
    gateway: Arc<dyn GatewayReader>,
    cache: DashMap<(ContractIdentifier, u64, Lookup), Resolution>,
}

impl ResolutionScope {
    pub async fn resolve(
        &self,
        contract: ContractIdentifier,
        chain_id: u64,
    ) -> OrchestratorResult<Resolution> {
        self.lookup(contract, chain_id, Lookup::OnChain).await
    }

    pub async fn resolve_forwarder(
        &self,
        contract: ContractIdentifier,
        chain_id: u64,
    ) -> OrchestratorResult<Resolution> {
        self.lookup(contract, chain_id, Lookup::Forwarder).await
    }

    /// Resolve and fail with `ResolutionFailure` when not deployed
    pub async fn require(
        &self,
        contract: ContractIdentifier,
        chain_id: u64,
    ) -> OrchestratorResult<Address> {
        Self::deployed(self.resolve(contract, chain_id).await?, contract, chain_id)
    }

    pub async fn require_forwarder(
        &self,
        contract: ContractIdentifier,
        chain_id: u64,
    ) -> OrchestratorResult<Address> {
        Self::deployed(
            self.resolve_forwarder(contract, chain_id).await?,
            contract,
            chain_id,
        )
    }

    fn deployed(
        resolution: Resolution,
        contract: ContractIdentifier,
        chain_id: u64,
    ) -> OrchestratorResult<Address> {
        resolution
            .address()
            .ok_or_else(|| OrchestratorError::ResolutionFailure {
                contract: contract.label(),
                chain_id,
            })
    }

    async fn lookup(
        &self,
        contract: ContractIdentifier,
        chain_id: u64,
        kind: Lookup,
    ) -> OrchestratorResult<Resolution> {
        let key = (contract, chain_id, kind);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(*hit);
        }

        let address = match kind {
            Lookup::OnChain => self.gateway.on_chain_address(contract, chain_id).await?,
            Lookup::Forwarder => self.gateway.forwarder_address(contract, chain_id).await?,
        };
        let resolution = Resolution::from_address(address);
        debug!(
            "Resolved {} ({:?}) on chain {}: {:?}",
            contract, kind, chain_id, resolution
        );

        self.cache.insert(key, resolution);
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockGatewayReader;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_repeated_lookups_hit_gateway_once() {
        let mut gateway = MockGatewayReader::new();
        gateway
            .expect_on_chain_address()
            .with(eq(ContractIdentifier::vault()), eq(421_614u64))
            .times(1)
            .returning(|_, _| Ok(Address::repeat_byte(0x0a)));

        let scope = AddressResolver::new(Arc::new(gateway)).scope();
        for _ in 0..3 {
            assert_eq!(
                scope.require(ContractIdentifier::vault(), 421_614).await.unwrap(),
                Address::repeat_byte(0x0a)
            );
        }
    }

    #[tokio::test]
    async fn test_zero_address_is_not_deployed() {
        let mut gateway = MockGatewayReader::new();
        gateway
            .expect_on_chain_address()
            .returning(|_, _| Ok(Address::zero()));

        let scope = AddressResolver::new(Arc::new(gateway)).scope();
        assert_eq!(
            scope
                .resolve(ContractIdentifier::super_token(), 11_155_420)
                .await
                .unwrap(),
            Resolution::NotDeployed
        );

        let err = scope
            .require(ContractIdentifier::super_token(), 11_155_420)
            .await
            .unwrap_err();
        assert!(err.blocks_action());
        assert_eq!(
            err.to_string(),
            "superToken is not deployed on chain 11155420"
        );
    }

    #[tokio::test]
    async fn test_forwarder_and_on_chain_are_cached_separately() {
        let mut gateway = MockGatewayReader::new();
        gateway
            .expect_on_chain_address()
            .times(1)
            .returning(|_, _| Ok(Address::repeat_byte(1)));
        gateway
            .expect_forwarder_address()
            .times(1)
            .returning(|_, _| Ok(Address::repeat_byte(2)));

        let scope = AddressResolver::new(Arc::new(gateway)).scope();
        let id = ContractIdentifier::super_token();
        assert_eq!(scope.require(id, 421_614).await.unwrap(), Address::repeat_byte(1));
        assert_eq!(
            scope.require_forwarder(id, 421_614).await.unwrap(),
            Address::repeat_byte(2)
        );
    }

    #[tokio::test]
    async fn test_new_scope_reads_again() {
        let mut gateway = MockGatewayReader::new();
        gateway
            .expect_on_chain_address()
            .times(2)
            .returning(|_, _| Ok(Address::repeat_byte(1)));

        let resolver = AddressResolver::new(Arc::new(gateway));
        resolver.scope().resolve(ContractIdentifier::vault(), 1).await.unwrap();
        resolver.scope().resolve(ContractIdentifier::vault(), 1).await.unwrap();
    }
}
