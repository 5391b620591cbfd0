//! Submission of gateway orders on the hub chain

use super::gas::GasEstimator;
use super::{OperationHandle, Order};
use crate::chain::ChainRegistry;
use crate::contracts::GatewayRevert;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::wallet::{SigningCapability, WalletError};

use chrono::Utc;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::TransactionRequest;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Sends validated orders to the app gateway
pub struct OperationSubmitter {
    registry: Arc<ChainRegistry>,
    gas_estimator: GasEstimator,
}

impl OperationSubmitter {
    pub fn new(registry: Arc<ChainRegistry>) -> Self {
        Self {
            registry,
            gas_estimator: GasEstimator::new(),
        }
    }

    /// Make sure the wallet submits to the hub chain, asking it to switch if not
    pub async fn ensure_hub_network(&self, wallet: &dyn SigningCapability) -> OrchestratorResult<()> {
        let hub = self.registry.hub_chain_id();
        let active = wallet.active_chain_id().await.map_err(|e| match e {
            WalletError::Unavailable => {
                OrchestratorError::Signing("No signing capability available".into())
            }
            other => OrchestratorError::Internal(other.to_string()),
        })?;

        if active == hub {
            return Ok(());
        }

        info!("Wallet is on chain {}, switching to hub chain {}", active, hub);
        if let Err(e) = wallet.switch_chain(hub).await {
            warn!("Network switch to {} failed: {}", hub, e);
            return Err(OrchestratorError::NetworkSwitchRejected {
                from: active,
                to: hub,
            });
        }

        let now_active = wallet
            .active_chain_id()
            .await
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?;
        if now_active != hub {
            return Err(OrchestratorError::ChainMismatch {
                active: now_active,
                required: hub,
            });
        }

        Ok(())
    }

    /// Validate, pre-flight and send an order, returning the handle to track
    pub async fn submit(
        &self,
        order: &Order,
        wallet: &dyn SigningCapability,
    ) -> OrchestratorResult<OperationHandle> {
        let kind = order.kind();
        order.validate(Utc::now().timestamp().max(0) as u64)?;
        let calldata = order.calldata()?;

        self.ensure_hub_network(wallet).await?;

        let hub = self.registry.hub_chain_id();
        let gateway = self.registry.gateway_address()?;
        let mut tx: TypedTransaction = TransactionRequest::new()
            .to(gateway)
            .from(wallet.address())
            .data(calldata)
            .chain_id(hub)
            .into();

        // A revert here means the gateway would reject the call; nothing is sent
        let estimate = wallet
            .estimate_gas(&tx)
            .await
            .map_err(|e| self.submission_error(kind, e))?;
        tx.set_gas(self.gas_estimator.buffered_limit(estimate));

        let tx_hash = wallet
            .send_transaction(tx)
            .await
            .map_err(|e| self.submission_error(kind, e))?;

        let tx_hash_hex = format!("{:?}", tx_hash);
        let handle = OperationHandle {
            id: Uuid::new_v4(),
            kind,
            tx_hash,
            chain_id: hub,
            submitted_at: Utc::now(),
            explorer_url: self.registry.tx_url(hub, &tx_hash_hex),
        };

        crate::metrics::record_submission(kind, "sent");
        info!(
            operation_id = %handle.id,
            "{} submitted on hub chain {}: {}",
            kind, hub, tx_hash_hex
        );

        Ok(handle)
    }

    fn submission_error(&self, kind: super::OperationKind, err: WalletError) -> OrchestratorError {
        let mapped = match err {
            WalletError::Declined => OrchestratorError::SubmissionRejected,
            WalletError::Unavailable => {
                OrchestratorError::Signing("No signing capability available".into())
            }
            WalletError::Reverted {
                data: Some(data), ..
            } => OrchestratorError::SubmissionReverted(GatewayRevert::from_revert_data(&data)),
            WalletError::Reverted {
                data: None,
                message,
            } => OrchestratorError::SubmissionReverted(GatewayRevert::Message(message)),
            WalletError::UnknownChain(chain_id) => OrchestratorError::ChainNotFound { chain_id },
            WalletError::Other(message) => OrchestratorError::Rpc {
                chain_id: self.registry.hub_chain_id(),
                message,
            },
        };

        let outcome = match &mapped {
            OrchestratorError::SubmissionRejected => "declined",
            OrchestratorError::SubmissionReverted(_) => "reverted",
            _ => "failed",
        };
        crate::metrics::record_submission(kind, outcome);
        error!("{} submission failed: {}", kind, mapped);
        mapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::slugs;
    use crate::chain::tests::test_registry;
    use crate::tx::orders::tests::deposit_order;
    use crate::tx::{MintOrder, OperationKind};
    use crate::wallet::MockSigningCapability;
    use ethers::types::{Address, Bytes, H256, U256};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn mint_order() -> Order {
        Order::Mint(MintOrder {
            chain_id: slugs::OPTIMISM_SEPOLIA,
            amount: U256::from(5),
            available: U256::from(10),
        })
    }

    fn wallet_on(chain: u64) -> MockSigningCapability {
        let mut wallet = MockSigningCapability::new();
        let active = Arc::new(AtomicU64::new(chain));
        let read = active.clone();
        wallet.expect_address().return_const(Address::repeat_byte(0x01));
        wallet
            .expect_active_chain_id()
            .returning(move || Ok(read.load(Ordering::SeqCst)));
        wallet.expect_switch_chain().returning(move |to| {
            active.store(to, Ordering::SeqCst);
            Ok(())
        });
        wallet
    }

    #[tokio::test]
    async fn test_submit_switches_to_hub_and_buffers_gas() {
        let mut wallet = wallet_on(slugs::ARBITRUM_SEPOLIA);
        wallet
            .expect_estimate_gas()
            .times(1)
            .returning(|_| Ok(U256::from(100_000)));
        wallet
            .expect_send_transaction()
            .times(1)
            .withf(|tx| {
                tx.gas() == Some(&U256::from(120_000))
                    && tx.to_addr() == Some(&Address::repeat_byte(0xff))
            })
            .returning(|_| Ok(H256::repeat_byte(0x77)));

        let submitter = OperationSubmitter::new(Arc::new(test_registry()));
        let handle = submitter.submit(&mint_order(), &wallet).await.unwrap();

        assert_eq!(handle.kind, OperationKind::Mint);
        assert_eq!(handle.chain_id, slugs::EVMX);
        assert_eq!(
            handle.explorer_url,
            format!("https://evmx.cloud.blockscout.com/tx/0x{}", "77".repeat(32))
        );
    }

    #[tokio::test]
    async fn test_declined_switch_sends_nothing() {
        let mut wallet = MockSigningCapability::new();
        wallet
            .expect_active_chain_id()
            .returning(|| Ok(slugs::ARBITRUM_SEPOLIA));
        wallet
            .expect_switch_chain()
            .returning(|_| Err(WalletError::Declined));
        wallet.expect_send_transaction().never();

        let submitter = OperationSubmitter::new(Arc::new(test_registry()));
        let err = submitter.submit(&mint_order(), &wallet).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::NetworkSwitchRejected {
                from: slugs::ARBITRUM_SEPOLIA,
                to: slugs::EVMX
            }
        ));
    }

    #[tokio::test]
    async fn test_revert_is_decoded_and_nothing_sent() {
        let mut wallet = wallet_on(slugs::EVMX);
        wallet.expect_estimate_gas().returning(|_| {
            Err(WalletError::Reverted {
                data: Some(Bytes::from(ethers::utils::id("InsufficientBalance()").to_vec())),
                message: "execution reverted".into(),
            })
        });
        wallet.expect_send_transaction().never();

        let submitter = OperationSubmitter::new(Arc::new(test_registry()));
        let err = submitter.submit(&mint_order(), &wallet).await.unwrap_err();
        assert_eq!(err.to_string(), "Submission reverted: InsufficientBalance");
    }

    #[tokio::test]
    async fn test_declined_submission() {
        let mut wallet = wallet_on(slugs::EVMX);
        wallet.expect_estimate_gas().returning(|_| Ok(U256::from(50_000)));
        wallet
            .expect_send_transaction()
            .returning(|_| Err(WalletError::Declined));

        let submitter = OperationSubmitter::new(Arc::new(test_registry()));
        let err = submitter.submit(&mint_order(), &wallet).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::SubmissionRejected));
    }

    #[tokio::test]
    async fn test_stale_permit_fails_before_wallet_is_touched() {
        let mut order = deposit_order();
        order.amount = U256::from(1);
        let wallet = MockSigningCapability::new();

        let submitter = OperationSubmitter::new(Arc::new(test_registry()));
        let err = submitter
            .submit(&Order::Deposit(order), &wallet)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::StalePermit { .. }));
    }
}
