//! Contract bindings for the hub-chain app gateway and permit-enabled tokens
//!
//! Only the functions the orchestrator touches are bound.

mod revert;

pub use revert::GatewayRevert;

use ethers::contract::abigen;
use sha3::{Digest, Keccak256};
use std::fmt;

abigen!(
    AppGateway,
    r#"[
        struct VaultDepositOrder { uint32 chainSlug; address token; address user; uint256 amount; uint256 deadline; uint8 v; bytes32 r; bytes32 s; }
        struct PermitTransferOrder { uint32 srcChainSlug; uint32 dstChainSlug; address srcToken; address dstToken; address user; uint256 srcAmount; uint256 deadline; uint8 v; bytes32 r; bytes32 s; }
        function getOnChainAddress(bytes32 contractId, uint32 chainSlug) external view returns (address)
        function forwarderAddresses(bytes32 contractId, uint32 chainSlug) external view returns (address)
        function unmintedBalance(address user) external view returns (uint256)
        function lockedBalance(address user) external view returns (uint256)
        function depositWithPermit(VaultDepositOrder order) external
        function mint(uint32 chainSlug, uint256 amount) external
        function transferWithPermit(PermitTransferOrder order) external
        function deployContracts(uint32 originChainSlug, uint32[] dstChainSlugs) external
    ]"#
);

abigen!(
    PermitToken,
    r#"[
        function name() external view returns (string)
        function balanceOf(address owner) external view returns (uint256)
        function nonces(address owner) external view returns (uint256)
        function permit(address owner, address spender, uint256 value, uint256 deadline, uint8 v, bytes32 r, bytes32 s) external
    ]"#
);

/// Chain-independent logical key of a gateway-managed contract
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContractIdentifier([u8; 32]);

impl ContractIdentifier {
    /// keccak256 of the contract's logical name
    pub fn from_name(name: &str) -> Self {
        let digest = Keccak256::digest(name.as_bytes());
        let mut id = [0u8; 32];
        id.copy_from_slice(&digest);
        Self(id)
    }

    pub fn vault() -> Self {
        Self::from_name("vault")
    }

    pub fn super_token() -> Self {
        Self::from_name("superToken")
    }

    pub fn as_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Human label for the well-known identifiers, hex otherwise
    pub fn label(&self) -> String {
        if *self == Self::vault() {
            "vault".to_string()
        } else if *self == Self::super_token() {
            "superToken".to_string()
        } else {
            format!("0x{}", hex::encode(self.0))
        }
    }
}

impl From<[u8; 32]> for ContractIdentifier {
    fn from(id: [u8; 32]) -> Self {
        Self(id)
    }
}

impl fmt::Debug for ContractIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContractIdentifier({})", self.label())
    }
}

impl fmt::Display for ContractIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::AbiEncode;
    use ethers::types::{Address, U256};

    #[test]
    fn test_identifier_is_keccak_of_name() {
        let id = ContractIdentifier::vault();
        assert_eq!(id.as_bytes(), ethers::utils::keccak256("vault"));
        assert_ne!(id, ContractIdentifier::super_token());
        assert_eq!(id.to_string(), "vault");
    }

    #[test]
    fn test_unknown_identifier_label_is_hex() {
        let id = ContractIdentifier::from([0x11; 32]);
        assert_eq!(id.label(), format!("0x{}", "11".repeat(32)));
    }

    #[test]
    fn test_mint_calldata_selector() {
        let call = MintCall {
            chain_slug: 421_614,
            amount: U256::exp10(18),
        };
        let data = call.encode();
        assert_eq!(&data[..4], &ethers::utils::id("mint(uint32,uint256)"));
        assert_eq!(data.len(), 4 + 64);
    }

    #[test]
    fn test_deposit_calldata_selector() {
        let call = DepositWithPermitCall {
            order: VaultDepositOrder {
                chain_slug: 421_614,
                token: Address::repeat_byte(1),
                user: Address::repeat_byte(2),
                amount: U256::from(10),
                deadline: U256::from(3_600),
                v: 27,
                r: [3u8; 32],
                s: [4u8; 32],
            },
        };
        let data = call.encode();
        assert_eq!(
            &data[..4],
            &ethers::utils::id(
                "depositWithPermit((uint32,address,address,uint256,uint256,uint8,bytes32,bytes32))"
            )
        );
    }
}
