//! Session context shared by every operation
//!
//! Built once at start-up from [`Settings`] and never mutated afterwards.

use crate::chain::ChainRegistry;
use crate::config::Settings;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::gateway::{AddressResolver, EvmReader, GatewayReader, TokenReader};
use crate::status::{HttpStatusClient, StatusClient, TrackingOptions};
use crate::tx::OperationKind;

use ethers::types::Address;
use std::sync::Arc;
use tracing::info;

pub struct SessionContext {
    pub settings: Settings,
    pub registry: Arc<ChainRegistry>,
    pub gateway: Arc<dyn GatewayReader>,
    pub tokens: Arc<dyn TokenReader>,
    pub resolver: AddressResolver,
    pub status: Arc<dyn StatusClient>,
    home_token: Address,
}

impl SessionContext {
    /// Connect to every configured chain and the status API
    pub fn connect(settings: Settings) -> OrchestratorResult<Self> {
        let registry = Arc::new(ChainRegistry::from_settings(&settings)?);
        let reader = Arc::new(EvmReader::new(registry.clone()));
        let status = Arc::new(HttpStatusClient::new(
            &settings.session.status_api_url,
            settings.tracker.request_timeout(),
        )?);

        info!(
            "Session connected: hub chain {}, {} spoke chains",
            registry.hub_chain_id(),
            registry.spoke_chains().len()
        );

        Self::new(settings, registry, reader.clone(), reader, status)
    }

    pub fn new(
        settings: Settings,
        registry: Arc<ChainRegistry>,
        gateway: Arc<dyn GatewayReader>,
        tokens: Arc<dyn TokenReader>,
        status: Arc<dyn StatusClient>,
    ) -> OrchestratorResult<Self> {
        let home_token = settings
            .session
            .token_address
            .parse::<Address>()
            .map_err(|e| OrchestratorError::Config(format!("Invalid token address: {}", e)))?;

        if !registry.is_known(settings.session.token_home_chain_id) {
            return Err(OrchestratorError::ChainNotFound {
                chain_id: settings.session.token_home_chain_id,
            });
        }

        Ok(Self {
            resolver: AddressResolver::new(gateway.clone()),
            settings,
            registry,
            gateway,
            tokens,
            status,
            home_token,
        })
    }

    pub fn hub_chain_id(&self) -> u64 {
        self.registry.hub_chain_id()
    }

    /// Chain holding the underlying token and its vault
    pub fn home_chain_id(&self) -> u64 {
        self.settings.session.token_home_chain_id
    }

    pub fn home_token(&self) -> Address {
        self.home_token
    }

    pub fn decimals(&self) -> u32 {
        self.settings.session.token_decimals
    }

    pub fn spoke_chain_ids(&self) -> Vec<u64> {
        self.registry
            .spoke_chains()
            .iter()
            .map(|d| d.chain_id)
            .collect()
    }

    pub fn tracking_options(&self, kind: OperationKind) -> TrackingOptions {
        TrackingOptions {
            poll_interval: self.settings.tracker.poll_interval(kind),
            timeout: self.settings.tracker.timeout(),
        }
    }
}
