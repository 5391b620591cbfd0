//! Per-kind action state shown to the user

use crate::status::StatusSnapshot;
use crate::tx::OperationKind;

/// Lifecycle of the latest operation of one kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionState {
    Idle,
    /// Waiting for the wallet to sign a permit
    Signing,
    /// A fresh permit is attached to the draft
    PermitReady { warning: Option<String> },
    /// Waiting for the wallet to switch network or accept the transaction
    Submitting,
    Tracking {
        tx_hash: String,
        explorer_url: String,
        latest: Option<StatusSnapshot>,
    },
    Completed {
        tx_hash: String,
        explorer_url: String,
    },
    TimedOut {
        tx_hash: String,
        explorer_url: String,
    },
    Failed {
        message: String,
    },
}

impl ActionState {
    /// A wallet prompt or tracker is outstanding
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            ActionState::Signing | ActionState::Submitting | ActionState::Tracking { .. }
        )
    }

    /// Line shown to the user for this state
    pub fn message(&self, kind: OperationKind) -> String {
        let label = capitalized(kind);
        match self {
            ActionState::Idle => String::new(),
            ActionState::Signing => "Waiting for permit signature...".to_string(),
            ActionState::PermitReady { warning: None } => "Permit signed".to_string(),
            ActionState::PermitReady {
                warning: Some(warning),
            } => format!("Permit signed, but the token rejected a dry-run: {}", warning),
            ActionState::Submitting => format!("{} in progress...", label),
            ActionState::Tracking {
                tx_hash, latest, ..
            } => match latest {
                Some(snapshot) => format!(
                    "{} {} submitted: {}/{} payloads executed",
                    label,
                    tx_hash,
                    snapshot.executed_count(),
                    snapshot.payloads.len()
                ),
                None => format!("{} {} submitted, waiting for status...", label, tx_hash),
            },
            ActionState::Completed { .. } => format!("{} successful!", label),
            ActionState::TimedOut { explorer_url, .. } => format!(
                "{} status polling timeout. Check {}",
                label, explorer_url
            ),
            ActionState::Failed { message } => message.clone(),
        }
    }
}

fn capitalized(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Deposit => "Deposit",
        OperationKind::Mint => "Mint",
        OperationKind::Transfer => "Transfer",
        OperationKind::Deploy => "Deployment",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let done = ActionState::Completed {
            tx_hash: "0x01".into(),
            explorer_url: "https://evmx.cloud.blockscout.com/tx/0x01".into(),
        };
        assert_eq!(done.message(OperationKind::Deposit), "Deposit successful!");
        assert!(!done.is_busy());

        let timed_out = ActionState::TimedOut {
            tx_hash: "0x01".into(),
            explorer_url: "https://evmx.cloud.blockscout.com/tx/0x01".into(),
        };
        assert!(timed_out
            .message(OperationKind::Transfer)
            .ends_with("https://evmx.cloud.blockscout.com/tx/0x01"));
        assert!(ActionState::Submitting.is_busy());
    }
}
