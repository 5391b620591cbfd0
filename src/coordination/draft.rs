//! User input for an operation that has not been submitted yet

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::permit::PermitAuthorization;
use crate::tx::OperationKind;

use ethers::types::U256;
use ethers::utils::{format_units, parse_units, ParseUnits};
use std::fmt;

/// Parse a decimal amount into base units, rejecting zero and negatives
pub fn parse_amount(raw: &str, decimals: u32) -> OrchestratorResult<U256> {
    let trimmed = raw.trim();
    let invalid = |reason: &str| OrchestratorError::InvalidAmount {
        amount: raw.to_string(),
        reason: reason.to_string(),
    };

    if trimmed.is_empty() {
        return Err(invalid("amount is empty"));
    }
    if trimmed.starts_with('-') {
        return Err(invalid("amount must not be negative"));
    }

    let value = match parse_units(trimmed, decimals).map_err(|e| invalid(&e.to_string()))? {
        ParseUnits::U256(value) => value,
        ParseUnits::I256(_) => return Err(invalid("amount must not be negative")),
    };

    if value.is_zero() {
        return Err(invalid("amount must be greater than zero"));
    }
    Ok(value)
}

/// Render base units as a decimal string without trailing zeros
pub fn format_amount(value: U256, decimals: u32) -> String {
    match format_units(value, decimals) {
        Ok(formatted) if formatted.contains('.') => {
            let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
            trimmed.to_string()
        }
        Ok(formatted) => formatted,
        Err(_) => value.to_string(),
    }
}

/// Selection a permit was signed against
#[derive(Debug, Clone, PartialEq, Eq)]
struct PermitBinding {
    amount: String,
    source_chain: Option<u64>,
    destination_chain: Option<u64>,
}

/// Why an action cannot be started right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    MissingAmount,
    InvalidAmount(String),
    InsufficientBalance { available: String },
    MissingSourceChain,
    MissingDestinationChain,
    SameChain,
    UnsupportedChain(u64),
    PermitRequired,
    NotDeployed { contract: String, chain_id: u64 },
    InProgress,
    /// A submitted operation of this kind is still being tracked.
    /// Submitting again supersedes it.
    Tracking { tx_hash: String },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::MissingAmount => f.write_str("enter an amount"),
            BlockReason::InvalidAmount(reason) => write!(f, "invalid amount: {}", reason),
            BlockReason::InsufficientBalance { available } => {
                write!(f, "amount exceeds available balance {}", available)
            }
            BlockReason::MissingSourceChain => f.write_str("select a source chain"),
            BlockReason::MissingDestinationChain => f.write_str("select a destination chain"),
            BlockReason::SameChain => f.write_str("source and destination must differ"),
            BlockReason::UnsupportedChain(chain_id) => {
                write!(f, "chain {} is not supported", chain_id)
            }
            BlockReason::PermitRequired => f.write_str("sign a permit first"),
            BlockReason::NotDeployed { contract, chain_id } => {
                write!(f, "{} is not deployed on chain {}", contract, chain_id)
            }
            BlockReason::InProgress => f.write_str("an operation is already in progress"),
            BlockReason::Tracking { tx_hash } => {
                write!(f, "{} is still being tracked", tx_hash)
            }
        }
    }
}

/// Whether an action may be started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Blocked(BlockReason),
}

/// Amount and chain selection for one operation kind, plus the permit
/// signed for exactly that selection
#[derive(Debug, Clone)]
pub struct OperationDraft {
    kind: OperationKind,
    amount: String,
    source_chain: Option<u64>,
    destination_chain: Option<u64>,
    permit: Option<(PermitAuthorization, PermitBinding)>,
}

impl OperationDraft {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            amount: String::new(),
            source_chain: None,
            destination_chain: None,
            permit: None,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn amount(&self) -> &str {
        &self.amount
    }

    pub fn source_chain(&self) -> Option<u64> {
        self.source_chain
    }

    pub fn destination_chain(&self) -> Option<u64> {
        self.destination_chain
    }

    pub fn set_amount(&mut self, amount: impl Into<String>) {
        self.amount = amount.into();
        self.drop_stale_permit();
    }

    /// Changing the source also clears the destination
    pub fn set_source_chain(&mut self, chain_id: u64) {
        if self.source_chain != Some(chain_id) {
            self.source_chain = Some(chain_id);
            self.destination_chain = None;
        }
        self.drop_stale_permit();
    }

    pub fn set_destination_chain(&mut self, chain_id: u64) {
        self.destination_chain = Some(chain_id);
        self.drop_stale_permit();
    }

    pub fn parsed_amount(&self, decimals: u32) -> OrchestratorResult<U256> {
        parse_amount(&self.amount, decimals)
    }

    fn binding(&self) -> PermitBinding {
        PermitBinding {
            amount: self.amount.trim().to_string(),
            source_chain: self.source_chain,
            destination_chain: self.destination_chain,
        }
    }

    fn drop_stale_permit(&mut self) {
        if matches!(&self.permit, Some((_, binding)) if *binding != self.binding()) {
            self.permit = None;
        }
    }

    pub(crate) fn attach_permit(&mut self, permit: PermitAuthorization) {
        let binding = self.binding();
        self.permit = Some((permit, binding));
    }

    /// Permit signed for the current selection, if any
    pub fn permit(&self) -> Option<&PermitAuthorization> {
        match &self.permit {
            Some((permit, binding)) if *binding == self.binding() => Some(permit),
            _ => None,
        }
    }

    /// Current permit or `StalePermit`
    pub fn require_permit(&self) -> OrchestratorResult<&PermitAuthorization> {
        self.permit().ok_or_else(|| OrchestratorError::StalePermit {
            kind: self.kind,
            reason: "no permit signed for the current amount and chains".into(),
        })
    }

    /// Checks that need no chain reads
    pub fn local_block_reason(&self, decimals: u32) -> Option<BlockReason> {
        if self.amount.trim().is_empty() && self.kind != OperationKind::Deploy {
            return Some(BlockReason::MissingAmount);
        }
        if self.kind != OperationKind::Deploy {
            if let Err(OrchestratorError::InvalidAmount { reason, .. }) = self.parsed_amount(decimals)
            {
                return Some(BlockReason::InvalidAmount(reason));
            }
        }

        match self.kind {
            OperationKind::Mint => {
                if self.destination_chain.is_none() {
                    return Some(BlockReason::MissingDestinationChain);
                }
            }
            OperationKind::Transfer => {
                let Some(source) = self.source_chain else {
                    return Some(BlockReason::MissingSourceChain);
                };
                match self.destination_chain {
                    None => return Some(BlockReason::MissingDestinationChain),
                    Some(destination) if destination == source => {
                        return Some(BlockReason::SameChain)
                    }
                    Some(_) => {}
                }
            }
            OperationKind::Deploy => {
                if self.source_chain.is_none() {
                    return Some(BlockReason::MissingSourceChain);
                }
            }
            OperationKind::Deposit => {}
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permit::tests::{authorization, request};

    #[test]
    fn test_parse_amount_scales_by_decimals() {
        assert_eq!(parse_amount("10", 18).unwrap(), U256::exp10(19));
        assert_eq!(parse_amount("1.5", 6).unwrap(), U256::from(1_500_000));
    }

    #[test]
    fn test_parse_amount_rejects_bad_input() {
        for raw in ["", "  ", "-1", "0", "0.0", "abc"] {
            assert!(
                matches!(parse_amount(raw, 18), Err(OrchestratorError::InvalidAmount { .. })),
                "{:?} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(U256::exp10(19), 18), "10");
        assert_eq!(format_amount(U256::from(1_500_000), 6), "1.5");
        assert_eq!(format_amount(U256::zero(), 18), "0");
    }

    #[test]
    fn test_changing_amount_invalidates_permit() {
        let mut draft = OperationDraft::new(OperationKind::Deposit);
        draft.set_amount("10");
        draft.attach_permit(authorization(&request(), u64::MAX));
        assert!(draft.permit().is_some());

        draft.set_amount("11");
        assert!(draft.permit().is_none());
        assert!(matches!(
            draft.require_permit(),
            Err(OrchestratorError::StalePermit { .. })
        ));

        // Going back does not resurrect a discarded permit
        draft.set_amount("10");
        assert!(draft.permit().is_none());
    }

    #[test]
    fn test_changing_chains_invalidates_permit() {
        let mut draft = OperationDraft::new(OperationKind::Transfer);
        draft.set_amount("1");
        draft.set_source_chain(421_614);
        draft.set_destination_chain(11_155_420);
        draft.attach_permit(authorization(&request(), u64::MAX));

        draft.set_destination_chain(84_532);
        assert!(draft.permit().is_none());

        draft.attach_permit(authorization(&request(), u64::MAX));
        draft.set_source_chain(11_155_420);
        assert!(draft.permit().is_none());
        assert_eq!(draft.destination_chain(), None);
    }

    #[test]
    fn test_local_block_reasons() {
        let mut draft = OperationDraft::new(OperationKind::Transfer);
        assert_eq!(draft.local_block_reason(18), Some(BlockReason::MissingAmount));

        draft.set_amount("-3");
        assert!(matches!(
            draft.local_block_reason(18),
            Some(BlockReason::InvalidAmount(_))
        ));

        draft.set_amount("3");
        draft.set_source_chain(421_614);
        draft.set_destination_chain(421_614);
        assert_eq!(draft.local_block_reason(18), Some(BlockReason::SameChain));

        draft.set_destination_chain(11_155_420);
        assert_eq!(draft.local_block_reason(18), None);
    }
}
