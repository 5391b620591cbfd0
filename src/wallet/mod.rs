//! Signing capability used by the permit signer and the operation submitter
//!
//! The orchestrator never holds keys itself. Everything that needs the user's
//! consent (typed-data signatures, network switches, transaction submission)
//! goes through [`SigningCapability`], and any of those prompts may stay
//! pending for as long as the user leaves them unanswered.

mod local;

pub use local::{ConfirmationPolicy, LocalWalletCapability};

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, Bytes, Signature, H256, U256};
use thiserror::Error;

/// Errors reported by a wallet
#[derive(Error, Debug, Clone)]
pub enum WalletError {
    #[error("No signing capability available")]
    Unavailable,

    #[error("Request declined by user")]
    Declined,

    #[error("Chain {0} is not known to the wallet")]
    UnknownChain(u64),

    #[error("Execution reverted: {message}")]
    Reverted { data: Option<Bytes>, message: String },

    #[error("Wallet error: {0}")]
    Other(String),
}

/// Wallet-side operations the orchestrator depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SigningCapability: Send + Sync {
    /// Account that signs and submits
    fn address(&self) -> Address;

    /// Chain the wallet currently submits to
    async fn active_chain_id(&self) -> Result<u64, WalletError>;

    /// Ask the wallet to change its active chain
    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError>;

    /// Produce an EIP-712 signature over `payload`
    async fn sign_typed_data(&self, payload: &TypedData) -> Result<Signature, WalletError>;

    /// Estimate gas on the active chain; reverts surface as [`WalletError::Reverted`]
    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, WalletError>;

    /// Sign and broadcast on the active chain, returning once the hash is known
    async fn send_transaction(&self, tx: TypedTransaction) -> Result<H256, WalletError>;
}
