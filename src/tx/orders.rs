//! Gateway orders and their calldata

use super::OperationKind;
use crate::chain::to_slug;
use crate::contracts::{
    DeployContractsCall, DepositWithPermitCall, MintCall, PermitTransferOrder,
    TransferWithPermitCall, VaultDepositOrder,
};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::permit::{PermitAuthorization, PermitRequest};

use ethers::abi::AbiEncode;
use ethers::types::{Address, Bytes, U256};
use std::collections::HashSet;

/// Move home tokens into the vault, crediting unminted balance on the hub
#[derive(Debug, Clone)]
pub struct DepositOrder {
    pub chain_id: u64,
    pub token: Address,
    pub vault: Address,
    pub user: Address,
    pub amount: U256,
    /// User's token balance when the order was built
    pub available: U256,
    pub permit: PermitAuthorization,
}

/// Mint unminted balance as super tokens on a spoke chain
#[derive(Debug, Clone)]
pub struct MintOrder {
    pub chain_id: u64,
    pub amount: U256,
    /// Unminted minus locked balance when the order was built
    pub available: U256,
}

/// Move value between chains through the gateway
#[derive(Debug, Clone)]
pub struct TransferOrder {
    pub src_chain_id: u64,
    pub dst_chain_id: u64,
    /// Token the permit is signed over
    pub permit_token: Address,
    /// Contract the permit authorizes to pull
    pub spender: Address,
    pub src_token: Address,
    pub dst_token: Address,
    pub user: Address,
    pub amount: U256,
    pub available: U256,
    pub permit: PermitAuthorization,
}

/// Deploy the vault on the origin chain and super tokens on destinations
#[derive(Debug, Clone)]
pub struct DeployOrder {
    pub origin_chain_id: u64,
    pub dst_chain_ids: Vec<u64>,
}

#[derive(Debug, Clone)]
pub enum Order {
    Deposit(DepositOrder),
    Mint(MintOrder),
    Transfer(TransferOrder),
    Deploy(DeployOrder),
}

fn require_positive(amount: U256, available: U256) -> OrchestratorResult<()> {
    if amount.is_zero() {
        return Err(OrchestratorError::InvalidAmount {
            amount: amount.to_string(),
            reason: "amount must be greater than zero".into(),
        });
    }
    if amount > available {
        return Err(OrchestratorError::InvalidAmount {
            amount: amount.to_string(),
            reason: format!("exceeds available balance {}", available),
        });
    }
    Ok(())
}

fn check_permit(
    kind: OperationKind,
    permit: &PermitAuthorization,
    expected: &PermitRequest,
    now: u64,
) -> OrchestratorResult<()> {
    permit
        .authorizes(expected)
        .map_err(|reason| OrchestratorError::StalePermit { kind, reason })?;
    if permit.is_expired_at(now) {
        return Err(OrchestratorError::PermitExpired {
            deadline: permit.deadline,
        });
    }
    Ok(())
}

impl Order {
    pub fn kind(&self) -> OperationKind {
        match self {
            Order::Deposit(_) => OperationKind::Deposit,
            Order::Mint(_) => OperationKind::Mint,
            Order::Transfer(_) => OperationKind::Transfer,
            Order::Deploy(_) => OperationKind::Deploy,
        }
    }

    /// Local checks run before any wallet interaction
    pub fn validate(&self, now: u64) -> OrchestratorResult<()> {
        match self {
            Order::Deposit(order) => {
                require_positive(order.amount, order.available)?;
                let expected = PermitRequest {
                    chain_id: order.chain_id,
                    token: order.token,
                    owner: order.user,
                    spender: order.vault,
                    value: order.amount,
                };
                check_permit(OperationKind::Deposit, &order.permit, &expected, now)
            }
            Order::Mint(order) => require_positive(order.amount, order.available),
            Order::Transfer(order) => {
                if order.src_chain_id == order.dst_chain_id {
                    return Err(OrchestratorError::InvalidOrder(
                        "source and destination chain must differ".into(),
                    ));
                }
                require_positive(order.amount, order.available)?;
                let expected = PermitRequest {
                    chain_id: order.src_chain_id,
                    token: order.permit_token,
                    owner: order.user,
                    spender: order.spender,
                    value: order.amount,
                };
                check_permit(OperationKind::Transfer, &order.permit, &expected, now)
            }
            Order::Deploy(order) => {
                if order.dst_chain_ids.is_empty() {
                    return Err(OrchestratorError::InvalidOrder(
                        "at least one destination chain is required".into(),
                    ));
                }
                let mut seen = HashSet::new();
                if let Some(dup) = order.dst_chain_ids.iter().find(|id| !seen.insert(**id)) {
                    return Err(OrchestratorError::InvalidOrder(format!(
                        "destination chain {} listed twice",
                        dup
                    )));
                }
                Ok(())
            }
        }
    }

    /// ABI-encoded gateway call
    pub fn calldata(&self) -> OrchestratorResult<Bytes> {
        let data = match self {
            Order::Deposit(order) => DepositWithPermitCall {
                order: VaultDepositOrder {
                    chain_slug: to_slug(order.chain_id)?,
                    token: order.token,
                    user: order.user,
                    amount: order.amount,
                    deadline: U256::from(order.permit.deadline),
                    v: order.permit.v,
                    r: order.permit.r,
                    s: order.permit.s,
                },
            }
            .encode(),
            Order::Mint(order) => MintCall {
                chain_slug: to_slug(order.chain_id)?,
                amount: order.amount,
            }
            .encode(),
            Order::Transfer(order) => TransferWithPermitCall {
                order: PermitTransferOrder {
                    src_chain_slug: to_slug(order.src_chain_id)?,
                    dst_chain_slug: to_slug(order.dst_chain_id)?,
                    src_token: order.src_token,
                    dst_token: order.dst_token,
                    user: order.user,
                    src_amount: order.amount,
                    deadline: U256::from(order.permit.deadline),
                    v: order.permit.v,
                    r: order.permit.r,
                    s: order.permit.s,
                },
            }
            .encode(),
            Order::Deploy(order) => DeployContractsCall {
                origin_chain_slug: to_slug(order.origin_chain_id)?,
                dst_chain_slugs: order
                    .dst_chain_ids
                    .iter()
                    .map(|id| to_slug(*id))
                    .collect::<OrchestratorResult<Vec<_>>>()?,
            }
            .encode(),
        };
        Ok(Bytes::from(data))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::permit::tests::authorization;

    pub(crate) const NOW: u64 = 1_700_000_000;

    pub(crate) fn deposit_order() -> DepositOrder {
        let request = PermitRequest {
            chain_id: 421_614,
            token: Address::repeat_byte(0xaa),
            owner: Address::repeat_byte(0x01),
            spender: Address::repeat_byte(0x0a),
            value: U256::exp10(18),
        };
        DepositOrder {
            chain_id: request.chain_id,
            token: request.token,
            vault: request.spender,
            user: request.owner,
            amount: request.value,
            available: U256::exp10(19),
            permit: authorization(&request, NOW + 3_600),
        }
    }

    fn transfer_order() -> TransferOrder {
        let request = PermitRequest {
            chain_id: 11_155_420,
            token: Address::repeat_byte(0x5e),
            owner: Address::repeat_byte(0x01),
            spender: Address::repeat_byte(0x5e),
            value: U256::from(500),
        };
        TransferOrder {
            src_chain_id: 11_155_420,
            dst_chain_id: 421_614,
            permit_token: request.token,
            spender: request.spender,
            src_token: Address::repeat_byte(0xf0),
            dst_token: Address::repeat_byte(0xaa),
            user: request.owner,
            amount: request.value,
            available: U256::from(500),
            permit: authorization(&request, NOW + 60),
        }
    }

    #[test]
    fn test_valid_deposit() {
        let order = Order::Deposit(deposit_order());
        order.validate(NOW).unwrap();
        let data = order.calldata().unwrap();
        assert_eq!(
            &data[..4],
            &ethers::utils::id(
                "depositWithPermit((uint32,address,address,uint256,uint256,uint8,bytes32,bytes32))"
            )
        );
    }

    #[test]
    fn test_permit_for_other_amount_is_stale() {
        let mut order = deposit_order();
        order.amount = U256::exp10(17);
        let err = Order::Deposit(order).validate(NOW).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::StalePermit {
                kind: OperationKind::Deposit,
                ..
            }
        ));
    }

    #[test]
    fn test_expired_permit_is_rejected() {
        let order = Order::Transfer(transfer_order());
        assert!(order.validate(NOW + 59).is_ok());
        assert!(matches!(
            order.validate(NOW + 60),
            Err(OrchestratorError::PermitExpired { .. })
        ));
    }

    #[test]
    fn test_transfer_to_same_chain_is_invalid() {
        let mut order = transfer_order();
        order.dst_chain_id = order.src_chain_id;
        assert!(matches!(
            Order::Transfer(order).validate(NOW),
            Err(OrchestratorError::InvalidOrder(_))
        ));
    }

    #[test]
    fn test_mint_limited_by_available() {
        let order = Order::Mint(MintOrder {
            chain_id: 11_155_420,
            amount: U256::from(11),
            available: U256::from(10),
        });
        assert!(matches!(
            order.validate(NOW),
            Err(OrchestratorError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_deploy_rejects_duplicate_destinations() {
        let order = Order::Deploy(DeployOrder {
            origin_chain_id: 421_614,
            dst_chain_ids: vec![11_155_420, 84_532, 11_155_420],
        });
        assert!(order.validate(NOW).is_err());

        let order = Order::Deploy(DeployOrder {
            origin_chain_id: 421_614,
            dst_chain_ids: vec![11_155_420, 84_532],
        });
        order.validate(NOW).unwrap();
        assert_eq!(
            &order.calldata().unwrap()[..4],
            &ethers::utils::id("deployContracts(uint32,uint32[])")
        );
    }
}
