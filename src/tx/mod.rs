//! Hub-chain operation building and submission

mod gas;
mod orders;
mod submitter;

pub use gas::GasEstimator;
pub use orders::{DeployOrder, DepositOrder, MintOrder, Order, TransferOrder};
pub use submitter::OperationSubmitter;

use chrono::{DateTime, Utc};
use ethers::types::H256;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// The four user-visible operations routed through the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Deposit,
    Mint,
    Transfer,
    Deploy,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Deposit,
        OperationKind::Mint,
        OperationKind::Transfer,
        OperationKind::Deploy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Deposit => "deposit",
            OperationKind::Mint => "mint",
            OperationKind::Transfer => "transfer",
            OperationKind::Deploy => "deploy",
        }
    }

    /// Whether the operation carries a token permit
    pub fn needs_permit(&self) -> bool {
        matches!(self, OperationKind::Deposit | OperationKind::Transfer)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted hub-chain transaction
#[derive(Debug, Clone)]
pub struct OperationHandle {
    /// Local id used to correlate log lines
    pub id: Uuid,
    pub kind: OperationKind,
    pub tx_hash: H256,
    pub chain_id: u64,
    pub submitted_at: DateTime<Utc>,
    pub explorer_url: String,
}

impl OperationHandle {
    /// Full 0x-prefixed hash, the form the status API expects
    pub fn tx_hash_hex(&self) -> String {
        format!("{:?}", self.tx_hash)
    }
}
