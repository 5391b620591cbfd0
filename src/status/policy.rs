//! Per-kind completion criteria

use super::{OverallStatus, StatusSnapshot};
use crate::tx::OperationKind;

/// When a tracked request counts as done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// The first write payload has executed on its target chain
    FirstPayloadExecuted,
    /// Every write payload has executed
    AllPayloadsExecuted,
    /// The request as a whole reports COMPLETED
    RequestCompleted,
}

impl CompletionPolicy {
    pub fn for_kind(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Deposit | OperationKind::Mint => CompletionPolicy::FirstPayloadExecuted,
            OperationKind::Transfer => CompletionPolicy::RequestCompleted,
            OperationKind::Deploy => CompletionPolicy::AllPayloadsExecuted,
        }
    }

    pub fn is_satisfied(&self, snapshot: &StatusSnapshot) -> bool {
        if !snapshot.is_ready() {
            return false;
        }
        match self {
            CompletionPolicy::FirstPayloadExecuted => snapshot.first_payload_executed(),
            CompletionPolicy::AllPayloadsExecuted => {
                snapshot.executed_count() == snapshot.payloads.len()
            }
            CompletionPolicy::RequestCompleted => snapshot.overall == OverallStatus::Completed,
        }
    }
}
