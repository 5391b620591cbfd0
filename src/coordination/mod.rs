//! Coordination of user operations
//!
//! The orchestrator:
//! 1. Turns a draft into a gateway order, reading balances and addresses
//! 2. Obtains a permit where the operation pulls tokens
//! 3. Submits the order on the hub chain
//! 4. Tracks cross-chain execution and refreshes balances once it completes

mod balances;
mod draft;
mod engine;
mod slots;
mod state;

pub use balances::{BalanceBoard, BalanceScope, Balances, ChainBalance};
pub use draft::{format_amount, parse_amount, BlockReason, OperationDraft, Readiness};
pub use engine::{
    DeployedContracts, OperationOutcome, Orchestrator, TrackedOperation, TransferRoute,
};
pub use slots::ActionSlots;
pub use state::ActionState;
