//! Decoding of gateway revert data into the contract's declared errors

use ethers::abi::{self, ParamType, Token};
use ethers::types::U256;
use std::fmt;

/// `Error(string)`
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// `Panic(uint256)`
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Reason a gateway call was rejected by the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayRevert {
    ChainNotSupported,
    InsufficientBalance,
    InvalidPromise,
    Unauthorized,
    ZeroAmount,
    /// `require(..., "reason")`
    Reason(String),
    Panic(U256),
    /// Custom error the gateway does not declare
    Unknown { selector: [u8; 4] },
    /// The node gave no revert data, only a message
    Message(String),
}

impl GatewayRevert {
    const DECLARED: [(&'static str, GatewayRevert); 5] = [
        ("ChainNotSupported()", GatewayRevert::ChainNotSupported),
        ("InsufficientBalance()", GatewayRevert::InsufficientBalance),
        ("InvalidPromise()", GatewayRevert::InvalidPromise),
        ("Unauthorized()", GatewayRevert::Unauthorized),
        ("ZeroAmount()", GatewayRevert::ZeroAmount),
    ];

    /// Decode raw revert data returned by the node
    pub fn from_revert_data(data: &[u8]) -> Self {
        if data.len() < 4 {
            return GatewayRevert::Message(format!("revert data 0x{}", hex::encode(data)));
        }

        let mut selector = [0u8; 4];
        selector.copy_from_slice(&data[..4]);

        if selector == ERROR_STRING_SELECTOR {
            if let Ok(tokens) = abi::decode(&[ParamType::String], &data[4..]) {
                if let Some(Token::String(reason)) = tokens.into_iter().next() {
                    return GatewayRevert::Reason(reason);
                }
            }
        }

        if selector == PANIC_SELECTOR {
            if let Ok(tokens) = abi::decode(&[ParamType::Uint(256)], &data[4..]) {
                if let Some(Token::Uint(code)) = tokens.into_iter().next() {
                    return GatewayRevert::Panic(code);
                }
            }
        }

        Self::DECLARED
            .iter()
            .find(|(signature, _)| ethers::utils::id(signature) == selector)
            .map(|(_, revert)| revert.clone())
            .unwrap_or(GatewayRevert::Unknown { selector })
    }
}

impl fmt::Display for GatewayRevert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayRevert::ChainNotSupported => f.write_str("ChainNotSupported"),
            GatewayRevert::InsufficientBalance => f.write_str("InsufficientBalance"),
            GatewayRevert::InvalidPromise => f.write_str("InvalidPromise"),
            GatewayRevert::Unauthorized => f.write_str("Unauthorized"),
            GatewayRevert::ZeroAmount => f.write_str("ZeroAmount"),
            GatewayRevert::Reason(reason) => f.write_str(reason),
            GatewayRevert::Panic(code) => write!(f, "panic code {:#x}", code),
            GatewayRevert::Unknown { selector } => {
                write!(f, "unknown error 0x{}", hex::encode(selector))
            }
            GatewayRevert::Message(message) => f.write_str(message),
        }
    }
}
