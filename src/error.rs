//! Error types for the super token orchestrator

use crate::contracts::GatewayRevert;
use crate::tx::OperationKind;

use std::time::Duration;
use thiserror::Error;

/// Main error type for orchestrated operations
#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chain {chain_id} not found")]
    ChainNotFound { chain_id: u64 },

    #[error("RPC error on chain {chain_id}: {message}")]
    Rpc { chain_id: u64, message: String },

    #[error("Invalid amount {amount:?}: {reason}")]
    InvalidAmount { amount: String, reason: String },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("{contract} is not deployed on chain {chain_id}")]
    ResolutionFailure { contract: String, chain_id: u64 },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Signature request declined in wallet")]
    UserDeclined,

    #[error("Permit rejected by token dry-run: {reason}")]
    PermitInvalid { reason: String },

    #[error("Permit no longer matches the {kind} order: {reason}")]
    StalePermit { kind: OperationKind, reason: String },

    #[error("Permit expired at {deadline}")]
    PermitExpired { deadline: u64 },

    #[error("Wallet is on chain {active}, operation requires chain {required}")]
    ChainMismatch { active: u64, required: u64 },

    #[error("Network switch from chain {from} to chain {to} was declined")]
    NetworkSwitchRejected { from: u64, to: u64 },

    #[error("Submission declined in wallet")]
    SubmissionRejected,

    #[error("Submission reverted: {0}")]
    SubmissionReverted(GatewayRevert),

    #[error("Transient status poll failure: {0}")]
    TransientPoll(String),

    #[error("No terminal status for {tx_hash} after {elapsed:?}; check {explorer_url}")]
    PollingTimeout {
        tx_hash: String,
        elapsed: Duration,
        explorer_url: String,
    },

    #[error("Status for {tx_hash} regressed: payload {index} on chain {chain_slug} is no longer executed")]
    StatusRegression {
        tx_hash: String,
        index: usize,
        chain_slug: u64,
    },

    #[error("An operation of kind {0} is already in progress")]
    OperationInProgress(OperationKind),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Check if error is retryable without user involvement
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Rpc { .. } | OrchestratorError::TransientPoll(_)
        )
    }

    /// Check if the user can recover by retrying the same action
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::UserDeclined
                | OrchestratorError::SubmissionRejected
                | OrchestratorError::NetworkSwitchRejected { .. }
                | OrchestratorError::ChainMismatch { .. }
                | OrchestratorError::StalePermit { .. }
                | OrchestratorError::PermitExpired { .. }
        )
    }

    /// Check if the error means the action must stay disabled until the
    /// missing contracts are deployed
    pub fn blocks_action(&self) -> bool {
        matches!(self, OrchestratorError::ResolutionFailure { .. })
    }
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(OrchestratorError::UserDeclined.is_user_recoverable());
        assert!(!OrchestratorError::UserDeclined.is_retryable());
        assert!(OrchestratorError::TransientPoll("eof".into()).is_retryable());
        assert!(OrchestratorError::ResolutionFailure {
            contract: "vault".into(),
            chain_id: 421614,
        }
        .blocks_action());
        assert!(!OrchestratorError::SubmissionReverted(GatewayRevert::ZeroAmount)
            .is_user_recoverable());
    }

    #[test]
    fn test_reverted_message_carries_contract_reason() {
        let err = OrchestratorError::SubmissionReverted(GatewayRevert::InsufficientBalance);
        assert_eq!(err.to_string(), "Submission reverted: InsufficientBalance");
    }
}
