//! Permit creation: nonce lookup, signing, local and on-chain verification

use super::{permit_typed_data, PermitAuthorization, PermitDomain, PermitMessage, PermitRequest};
use crate::config::PermitConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::gateway::TokenReader;
use crate::wallet::{SigningCapability, WalletError};

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a permit signing round
#[derive(Debug, Clone)]
pub struct SignedPermit {
    pub authorization: PermitAuthorization,
    /// Set when the token's own dry-run rejected the permit; the permit is
    /// still returned so the user can decide whether to submit it
    pub warning: Option<OrchestratorError>,
}

pub struct PermitSigner {
    tokens: Arc<dyn TokenReader>,
    config: PermitConfig,
}

impl PermitSigner {
    pub fn new(tokens: Arc<dyn TokenReader>, config: PermitConfig) -> Self {
        Self { tokens, config }
    }

    /// Sign a permit for `request` with the user's wallet
    pub async fn create_permit(
        &self,
        request: &PermitRequest,
        wallet: &dyn SigningCapability,
    ) -> OrchestratorResult<SignedPermit> {
        if request.value.is_zero() {
            return Err(OrchestratorError::InvalidAmount {
                amount: "0".into(),
                reason: "permit value must be greater than zero".into(),
            });
        }

        let (token_name, nonce) = tokio::try_join!(
            self.tokens.name(request.chain_id, request.token),
            self.tokens
                .nonce(request.chain_id, request.token, request.owner),
        )?;

        let deadline = Utc::now().timestamp().max(0) as u64 + self.config.deadline_window_secs;
        let domain = PermitDomain {
            name: token_name.clone(),
            chain_id: request.chain_id,
            verifying_contract: request.token,
        };
        let message = PermitMessage {
            owner: request.owner,
            spender: request.spender,
            value: request.value,
            nonce,
            deadline,
        };
        let typed = permit_typed_data(&domain, &message)?;

        debug!(
            "Requesting permit signature: token {:?} on chain {}, nonce {}, deadline {}",
            request.token, request.chain_id, nonce, deadline
        );
        let signature = wallet
            .sign_typed_data(&typed)
            .await
            .map_err(|e| match e {
                WalletError::Declined => OrchestratorError::UserDeclined,
                other => OrchestratorError::Signing(other.to_string()),
            })?;

        // Wallets disagree on 0/1 versus 27/28
        let v = if signature.v < 27 {
            signature.v + 27
        } else {
            signature.v
        };
        let v = u8::try_from(v)
            .map_err(|_| OrchestratorError::Signing(format!("Invalid recovery id {}", v)))?;

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        signature.r.to_big_endian(&mut r);
        signature.s.to_big_endian(&mut s);

        let authorization = PermitAuthorization {
            chain_id: request.chain_id,
            token: request.token,
            token_name,
            owner: request.owner,
            spender: request.spender,
            value: request.value,
            nonce,
            deadline,
            v,
            r,
            s,
        };

        let recovered = authorization
            .recover_signer()
            .map_err(OrchestratorError::Signing)?;
        if recovered != request.owner {
            return Err(OrchestratorError::Signing(format!(
                "Signature recovers to {:?}, expected {:?}",
                recovered, request.owner
            )));
        }

        let warning = if self.config.verify_with_dry_run {
            match self.tokens.dry_run_permit(&authorization).await {
                Ok(()) => None,
                Err(e) => {
                    warn!("Permit dry-run failed: {}", e);
                    Some(match e {
                        OrchestratorError::PermitInvalid { .. } => e,
                        other => OrchestratorError::PermitInvalid {
                            reason: other.to_string(),
                        },
                    })
                }
            }
        } else {
            None
        };

        crate::metrics::record_permit_signed(request.chain_id, warning.is_none());
        info!(
            "Permit signed for {} on chain {} (deadline {})",
            request.value, request.chain_id, deadline
        );

        Ok(SignedPermit {
            authorization,
            warning,
        })
    }
}
