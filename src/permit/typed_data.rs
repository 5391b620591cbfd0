//! EIP-712 payload for the ERC-2612 `Permit` type

use crate::error::{OrchestratorError, OrchestratorResult};

use ethers::types::transaction::eip712::{Eip712, TypedData};
use ethers::types::{Address, H256, U256};
use serde_json::json;

/// Signing domain of a permit-enabled token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermitDomain {
    /// The token's `name()`
    pub name: String,
    pub chain_id: u64,
    /// The token contract itself
    pub verifying_contract: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermitMessage {
    pub owner: Address,
    pub spender: Address,
    pub value: U256,
    pub nonce: U256,
    pub deadline: u64,
}

/// Build the typed-data payload handed to the wallet
pub fn permit_typed_data(
    domain: &PermitDomain,
    message: &PermitMessage,
) -> OrchestratorResult<TypedData> {
    let payload = json!({
        "types": {
            "EIP712Domain": [
                { "name": "name", "type": "string" },
                { "name": "version", "type": "string" },
                { "name": "chainId", "type": "uint256" },
                { "name": "verifyingContract", "type": "address" }
            ],
            "Permit": [
                { "name": "owner", "type": "address" },
                { "name": "spender", "type": "address" },
                { "name": "value", "type": "uint256" },
                { "name": "nonce", "type": "uint256" },
                { "name": "deadline", "type": "uint256" }
            ]
        },
        "primaryType": "Permit",
        "domain": {
            "name": domain.name,
            "version": "1",
            "chainId": domain.chain_id,
            "verifyingContract": format!("{:?}", domain.verifying_contract)
        },
        "message": {
            "owner": format!("{:?}", message.owner),
            "spender": format!("{:?}", message.spender),
            "value": message.value.to_string(),
            "nonce": message.nonce.to_string(),
            "deadline": message.deadline
        }
    });

    serde_json::from_value(payload)
        .map_err(|e| OrchestratorError::Signing(format!("Invalid permit payload: {}", e)))
}

/// Digest the token contract checks the signature against
pub fn permit_digest(domain: &PermitDomain, message: &PermitMessage) -> OrchestratorResult<H256> {
    let typed = permit_typed_data(domain, message)?;
    typed
        .encode_eip712()
        .map(H256::from)
        .map_err(|e| OrchestratorError::Signing(format!("Failed to hash permit: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode, Token};
    use ethers::signers::{LocalWallet, Signer};
    use ethers::utils::keccak256;

    fn domain() -> PermitDomain {
        PermitDomain {
            name: "Super Token".into(),
            chain_id: 421_614,
            verifying_contract: Address::repeat_byte(0xaa),
        }
    }

    fn message(owner: Address) -> PermitMessage {
        PermitMessage {
            owner,
            spender: Address::repeat_byte(0xbb),
            value: U256::exp10(18) * 5,
            nonce: U256::from(3),
            deadline: 1_900_000_000,
        }
    }

    /// Digest computed field by field, the way an ERC20Permit contract does
    fn contract_digest(domain: &PermitDomain, message: &PermitMessage) -> H256 {
        let domain_type = keccak256(
            "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );
        let separator = keccak256(encode(&[
            Token::FixedBytes(domain_type.to_vec()),
            Token::FixedBytes(keccak256(domain.name.as_bytes()).to_vec()),
            Token::FixedBytes(keccak256("1").to_vec()),
            Token::Uint(U256::from(domain.chain_id)),
            Token::Address(domain.verifying_contract),
        ]));
        let permit_type = keccak256(
            "Permit(address owner,address spender,uint256 value,uint256 nonce,uint256 deadline)",
        );
        let struct_hash = keccak256(encode(&[
            Token::FixedBytes(permit_type.to_vec()),
            Token::Address(message.owner),
            Token::Address(message.spender),
            Token::Uint(message.value),
            Token::Uint(message.nonce),
            Token::Uint(U256::from(message.deadline)),
        ]));
        let mut preimage = vec![0x19, 0x01];
        preimage.extend_from_slice(&separator);
        preimage.extend_from_slice(&struct_hash);
        H256::from(keccak256(preimage))
    }

    #[test]
    fn test_digest_matches_contract_side_hashing() {
        let owner = Address::repeat_byte(0x01);
        let digest = permit_digest(&domain(), &message(owner)).unwrap();
        assert_eq!(digest, contract_digest(&domain(), &message(owner)));
    }

    #[test]
    fn test_chain_id_is_part_of_the_domain() {
        let owner = Address::repeat_byte(0x01);
        let mut other = domain();
        other.chain_id = 11_155_420;
        assert_ne!(
            permit_digest(&domain(), &message(owner)).unwrap(),
            permit_digest(&other, &message(owner)).unwrap()
        );
    }

    #[tokio::test]
    async fn test_wallet_signature_recovers_owner() {
        let wallet: LocalWallet =
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
                .parse()
                .unwrap();
        let message = message(wallet.address());
        let typed = permit_typed_data(&domain(), &message).unwrap();
        let signature = wallet.sign_typed_data(&typed).await.unwrap();

        let digest = contract_digest(&domain(), &message);
        assert_eq!(signature.recover(digest).unwrap(), wallet.address());
    }
}
