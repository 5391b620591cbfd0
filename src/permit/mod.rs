//! EIP-2612 permit authorizations
//!
//! A permit lets the gateway pull tokens from the user without a prior
//! `approve` transaction. It is only valid for the exact token, spender,
//! value and chain it was signed for, and only until its deadline.

mod signer;
mod typed_data;

pub use signer::{PermitSigner, SignedPermit};
pub use typed_data::{permit_digest, permit_typed_data, PermitDomain, PermitMessage};

use ethers::types::{Address, Signature, U256};

/// What a permit is about to authorize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermitRequest {
    /// Chain the token lives on; part of the signing domain
    pub chain_id: u64,
    pub token: Address,
    pub owner: Address,
    pub spender: Address,
    pub value: U256,
}

/// A signed permit together with everything it was bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermitAuthorization {
    pub chain_id: u64,
    pub token: Address,
    pub token_name: String,
    pub owner: Address,
    pub spender: Address,
    pub value: U256,
    pub nonce: U256,
    /// Unix seconds
    pub deadline: u64,
    pub v: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl PermitAuthorization {
    /// Whether the permit was signed for exactly this request
    pub fn authorizes(&self, request: &PermitRequest) -> Result<(), String> {
        if self.chain_id != request.chain_id {
            return Err(format!(
                "signed for chain {}, order is on chain {}",
                self.chain_id, request.chain_id
            ));
        }
        if self.token != request.token {
            return Err(format!("signed for token {:?}", self.token));
        }
        if self.owner != request.owner {
            return Err(format!("signed by {:?}", self.owner));
        }
        if self.spender != request.spender {
            return Err(format!("signed for spender {:?}", self.spender));
        }
        if self.value != request.value {
            return Err(format!(
                "signed for value {}, order moves {}",
                self.value, request.value
            ));
        }
        Ok(())
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        self.deadline <= now
    }

    pub fn signature(&self) -> Signature {
        Signature {
            r: U256::from_big_endian(&self.r),
            s: U256::from_big_endian(&self.s),
            v: u64::from(self.v),
        }
    }

    pub fn domain(&self) -> PermitDomain {
        PermitDomain {
            name: self.token_name.clone(),
            chain_id: self.chain_id,
            verifying_contract: self.token,
        }
    }

    pub fn message(&self) -> PermitMessage {
        PermitMessage {
            owner: self.owner,
            spender: self.spender,
            value: self.value,
            nonce: self.nonce,
            deadline: self.deadline,
        }
    }

    /// Recover the signer from the signature, as the token contract would
    pub fn recover_signer(&self) -> Result<Address, String> {
        let digest = permit_digest(&self.domain(), &self.message()).map_err(|e| e.to_string())?;
        self.signature()
            .recover(digest)
            .map_err(|e| e.to_string())
    }
}
