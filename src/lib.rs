//! Super token orchestrator
//!
//! Client-side coordination of a cross-chain super token managed by an app
//! gateway on a hub chain: EIP-712 permit signing, gateway submission and
//! multi-chain status tracking for deposit, mint, transfer and deploy.

pub mod chain;
pub mod config;
pub mod contracts;
pub mod coordination;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod permit;
pub mod session;
pub mod status;
pub mod tx;
pub mod wallet;

pub use coordination::Orchestrator;
pub use error::{OrchestratorError, OrchestratorResult};
pub use session::SessionContext;
