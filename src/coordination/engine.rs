//! Orchestrator for deposit, mint, transfer and deploy
//!
//! Each operation runs validate → permit → submit → track, strictly in that
//! order. Operations of different kinds run independently; a new operation
//! of a kind supersedes the previous one of that kind.

use super::balances::{BalanceBoard, BalanceScope, Balances};
use super::draft::{format_amount, BlockReason, OperationDraft, Readiness};
use super::slots::ActionSlots;
use super::ActionState;
use crate::contracts::ContractIdentifier;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::gateway::ResolutionScope;
use crate::permit::{PermitAuthorization, PermitRequest, PermitSigner};
use crate::session::SessionContext;
use crate::status::{
    CompletionPolicy, StatusSnapshot, StatusTracker, TerminalCallback, TrackOutcome,
};
use crate::tx::{
    DeployOrder, DepositOrder, MintOrder, OperationHandle, OperationKind, OperationSubmitter,
    Order, TransferOrder,
};
use crate::wallet::SigningCapability;

use ethers::types::{Address, U256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

/// Addresses resolved once a deployment completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedContracts {
    pub origin_chain_id: u64,
    pub vault: Option<Address>,
    pub super_tokens: BTreeMap<u64, Option<Address>>,
}

/// How a tracked operation ended
#[derive(Debug, Clone)]
pub enum OperationOutcome {
    Completed {
        snapshot: StatusSnapshot,
        deployed: Option<DeployedContracts>,
    },
    /// Timeout or an inconsistent status report
    Failed(OrchestratorError),
    /// Superseded by a newer operation of the same kind, or cancelled
    Cancelled,
}

/// A submitted operation whose status is being tracked
pub struct TrackedOperation {
    pub handle: OperationHandle,
    pub progress: watch::Receiver<Option<StatusSnapshot>>,
    outcome: oneshot::Receiver<OperationOutcome>,
}

impl TrackedOperation {
    pub async fn outcome(self) -> OperationOutcome {
        self.outcome.await.unwrap_or(OperationOutcome::Cancelled)
    }
}

/// Tokens involved in a transfer between two chains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRoute {
    pub permit_token: Address,
    pub spender: Address,
    pub src_token: Address,
    pub dst_token: Address,
}

enum Plan {
    Deposit {
        request: PermitRequest,
    },
    Mint {
        chain_id: u64,
    },
    Transfer {
        request: PermitRequest,
        route: TransferRoute,
        src_chain_id: u64,
        dst_chain_id: u64,
    },
}

/// Everything read from chain for a draft
struct Prepared {
    amount: U256,
    available: U256,
    plan: Plan,
}

impl Prepared {
    fn permit_request(&self) -> Option<&PermitRequest> {
        match &self.plan {
            Plan::Deposit { request } | Plan::Transfer { request, .. } => Some(request),
            Plan::Mint { .. } => None,
        }
    }

    fn into_order(self, permit: Option<PermitAuthorization>) -> OrchestratorResult<Order> {
        let missing = |kind| OrchestratorError::StalePermit {
            kind,
            reason: "no permit signed for the current amount and chains".into(),
        };

        Ok(match self.plan {
            Plan::Deposit { request } => Order::Deposit(DepositOrder {
                chain_id: request.chain_id,
                token: request.token,
                vault: request.spender,
                user: request.owner,
                amount: self.amount,
                available: self.available,
                permit: permit.ok_or_else(|| missing(OperationKind::Deposit))?,
            }),
            Plan::Mint { chain_id } => Order::Mint(MintOrder {
                chain_id,
                amount: self.amount,
                available: self.available,
            }),
            Plan::Transfer {
                request,
                route,
                src_chain_id,
                dst_chain_id,
            } => Order::Transfer(TransferOrder {
                src_chain_id,
                dst_chain_id,
                permit_token: route.permit_token,
                spender: route.spender,
                src_token: route.src_token,
                dst_token: route.dst_token,
                user: request.owner,
                amount: self.amount,
                available: self.available,
                permit: permit.ok_or_else(|| missing(OperationKind::Transfer))?,
            }),
        })
    }
}

pub struct Orchestrator {
    ctx: Arc<SessionContext>,
    wallet: Arc<dyn SigningCapability>,
    permit_signer: PermitSigner,
    submitter: OperationSubmitter,
    tracker: StatusTracker,
    slots: Arc<ActionSlots>,
    balances: Arc<BalanceBoard>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<SessionContext>, wallet: Arc<dyn SigningCapability>) -> Self {
        let balances = Arc::new(BalanceBoard::new(
            ctx.gateway.clone(),
            ctx.tokens.clone(),
            ctx.resolver.clone(),
            BalanceScope {
                user: wallet.address(),
                home_chain_id: ctx.home_chain_id(),
                home_token: ctx.home_token(),
                spoke_chains: ctx.spoke_chain_ids(),
            },
        ));

        Self {
            permit_signer: PermitSigner::new(ctx.tokens.clone(), ctx.settings.permit.clone()),
            submitter: OperationSubmitter::new(ctx.registry.clone()),
            tracker: StatusTracker::new(ctx.status.clone()),
            slots: Arc::new(ActionSlots::new()),
            balances,
            wallet,
            ctx,
        }
    }

    pub fn user(&self) -> Address {
        self.wallet.address()
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn state(&self, kind: OperationKind) -> ActionState {
        self.slots.state(kind)
    }

    pub async fn balances(&self) -> Balances {
        self.balances.snapshot().await
    }

    pub async fn refresh_balances(&self) -> OrchestratorResult<Balances> {
        self.balances.refresh().await
    }

    /// Abandon the current operation of `kind`
    pub fn cancel(&self, kind: OperationKind) {
        info!("Cancelling current {} operation", kind);
        self.slots.cancel(kind);
    }

    pub fn shutdown(&self) {
        self.slots.cancel_all();
    }

    /// Chains an operation kind may target
    fn supports(&self, kind: OperationKind, chain_id: u64) -> bool {
        let hub = self.ctx.hub_chain_id();
        if !self.ctx.registry.is_known(chain_id) || chain_id == hub {
            return false;
        }
        match kind {
            OperationKind::Mint => chain_id != self.ctx.home_chain_id(),
            _ => true,
        }
    }

    fn require_supported(&self, kind: OperationKind, chain_id: u64) -> OrchestratorResult<()> {
        if self.supports(kind, chain_id) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidOrder(format!(
                "chain {} is not supported for {}",
                chain_id, kind
            )))
        }
    }

    /// Token on `chain_id` as the gateway addresses it in a transfer order
    async fn gateway_token(&self, scope: &ResolutionScope, chain_id: u64) -> OrchestratorResult<Address> {
        if chain_id == self.ctx.home_chain_id() {
            Ok(self.ctx.home_token())
        } else {
            scope
                .require_forwarder(ContractIdentifier::super_token(), chain_id)
                .await
        }
    }

    /// Resolve the tokens a transfer moves between `src` and `dst`
    pub async fn transfer_route(
        &self,
        scope: &ResolutionScope,
        src: u64,
        dst: u64,
    ) -> OrchestratorResult<TransferRoute> {
        let home = self.ctx.home_chain_id();

        let (permit_token, spender) = if src == home {
            let vault = scope.require(ContractIdentifier::vault(), home).await?;
            (self.ctx.home_token(), vault)
        } else {
            let super_token = scope
                .require(ContractIdentifier::super_token(), src)
                .await?;
            (super_token, super_token)
        };

        Ok(TransferRoute {
            permit_token,
            spender,
            src_token: self.gateway_token(scope, src).await?,
            dst_token: self.gateway_token(scope, dst).await?,
        })
    }

    async fn prepare(
        &self,
        draft: &OperationDraft,
        scope: &ResolutionScope,
    ) -> OrchestratorResult<Prepared> {
        let amount = draft.parsed_amount(self.ctx.decimals())?;
        let user = self.user();

        match draft.kind() {
            OperationKind::Deposit => {
                let home = self.ctx.home_chain_id();
                let vault = scope.require(ContractIdentifier::vault(), home).await?;
                let available = self
                    .ctx
                    .tokens
                    .balance_of(home, self.ctx.home_token(), user)
                    .await?;

                Ok(Prepared {
                    amount,
                    available,
                    plan: Plan::Deposit {
                        request: PermitRequest {
                            chain_id: home,
                            token: self.ctx.home_token(),
                            owner: user,
                            spender: vault,
                            value: amount,
                        },
                    },
                })
            }
            OperationKind::Mint => {
                let chain_id = draft.destination_chain().ok_or_else(|| {
                    OrchestratorError::InvalidOrder("mint needs a target chain".into())
                })?;
                self.require_supported(OperationKind::Mint, chain_id)?;
                scope
                    .require(ContractIdentifier::super_token(), chain_id)
                    .await?;

                let (unminted, locked) = tokio::try_join!(
                    self.ctx.gateway.unminted_balance(user),
                    self.ctx.gateway.locked_balance(user),
                )?;

                Ok(Prepared {
                    amount,
                    available: unminted.saturating_sub(locked),
                    plan: Plan::Mint { chain_id },
                })
            }
            OperationKind::Transfer => {
                let (src, dst) = match (draft.source_chain(), draft.destination_chain()) {
                    (Some(src), Some(dst)) => (src, dst),
                    _ => {
                        return Err(OrchestratorError::InvalidOrder(
                            "transfer needs a source and a destination chain".into(),
                        ))
                    }
                };
                self.require_supported(OperationKind::Transfer, src)?;
                self.require_supported(OperationKind::Transfer, dst)?;

                let route = self.transfer_route(scope, src, dst).await?;
                let available = self
                    .ctx
                    .tokens
                    .balance_of(src, route.permit_token, user)
                    .await?;

                Ok(Prepared {
                    amount,
                    available,
                    plan: Plan::Transfer {
                        request: PermitRequest {
                            chain_id: src,
                            token: route.permit_token,
                            owner: user,
                            spender: route.spender,
                            value: amount,
                        },
                        route,
                        src_chain_id: src,
                        dst_chain_id: dst,
                    },
                })
            }
            OperationKind::Deploy => Err(OrchestratorError::InvalidOrder(
                "deployments are started with a chain list, not a draft".into(),
            )),
        }
    }

    /// Whether the draft's action can run now, and if not, why
    pub async fn readiness(&self, draft: &OperationDraft) -> OrchestratorResult<Readiness> {
        let kind = draft.kind();

        let state = self.slots.state(kind);
        if state.is_busy() {
            return Ok(Readiness::Blocked(match state {
                ActionState::Tracking { tx_hash, .. } => BlockReason::Tracking { tx_hash },
                _ => BlockReason::InProgress,
            }));
        }

        if let Some(reason) = draft.local_block_reason(self.ctx.decimals()) {
            return Ok(Readiness::Blocked(reason));
        }

        for chain_id in [draft.source_chain(), draft.destination_chain()]
            .into_iter()
            .flatten()
        {
            if !self.supports(kind, chain_id) {
                return Ok(Readiness::Blocked(BlockReason::UnsupportedChain(chain_id)));
            }
        }

        if kind == OperationKind::Deploy {
            return Ok(Readiness::Ready);
        }

        let scope = self.ctx.resolver.scope();
        let prepared = match self.prepare(draft, &scope).await {
            Ok(prepared) => prepared,
            Err(OrchestratorError::ResolutionFailure { contract, chain_id }) => {
                return Ok(Readiness::Blocked(BlockReason::NotDeployed {
                    contract,
                    chain_id,
                }))
            }
            Err(e) => return Err(e),
        };

        if prepared.amount > prepared.available {
            return Ok(Readiness::Blocked(BlockReason::InsufficientBalance {
                available: format_amount(prepared.available, self.ctx.decimals()),
            }));
        }

        if kind.needs_permit() && draft.permit().is_none() {
            return Ok(Readiness::Blocked(BlockReason::PermitRequired));
        }

        Ok(Readiness::Ready)
    }

    /// Sign a permit for the draft's current selection and attach it.
    /// Returns the token's dry-run rejection, if any, as a warning.
    pub async fn sign_permit(
        &self,
        draft: &mut OperationDraft,
    ) -> OrchestratorResult<Option<OrchestratorError>> {
        let kind = draft.kind();
        if !kind.needs_permit() {
            return Err(OrchestratorError::InvalidOrder(format!(
                "{} does not take a permit",
                kind
            )));
        }
        if let Some(reason) = draft.local_block_reason(self.ctx.decimals()) {
            return Err(OrchestratorError::InvalidOrder(reason.to_string()));
        }

        let scope = self.ctx.resolver.scope();
        let prepared = self.prepare(draft, &scope).await?;
        if prepared.amount > prepared.available {
            return Err(OrchestratorError::InvalidAmount {
                amount: draft.amount().to_string(),
                reason: format!(
                    "exceeds available balance {}",
                    format_amount(prepared.available, self.ctx.decimals())
                ),
            });
        }
        let request = prepared
            .permit_request()
            .cloned()
            .ok_or_else(|| OrchestratorError::Internal("permit request missing".into()))?;

        let generation = self.slots.begin(kind, ActionState::Signing)?;
        match self
            .permit_signer
            .create_permit(&request, self.wallet.as_ref())
            .await
        {
            Ok(signed) => {
                draft.attach_permit(signed.authorization);
                let warning = signed.warning;
                self.slots.set_state(
                    kind,
                    generation,
                    ActionState::PermitReady {
                        warning: warning.as_ref().map(|w| w.to_string()),
                    },
                );
                Ok(warning)
            }
            Err(e) => {
                self.slots.set_state(
                    kind,
                    generation,
                    ActionState::Failed {
                        message: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    /// Submit the draft's operation and start tracking it
    pub async fn submit(&self, draft: &OperationDraft) -> OrchestratorResult<TrackedOperation> {
        let kind = draft.kind();
        if let Some(reason) = draft.local_block_reason(self.ctx.decimals()) {
            return Err(OrchestratorError::InvalidOrder(reason.to_string()));
        }

        let permit = if kind.needs_permit() {
            Some(draft.require_permit()?.clone())
        } else {
            None
        };

        let scope = self.ctx.resolver.scope();
        let order = self.prepare(draft, &scope).await?.into_order(permit)?;
        self.launch(order, None).await
    }

    /// Deploy the vault on `origin` and super tokens on `destinations`
    pub async fn deploy(
        &self,
        origin: u64,
        destinations: Vec<u64>,
    ) -> OrchestratorResult<TrackedOperation> {
        self.require_supported(OperationKind::Deploy, origin)?;
        for chain_id in &destinations {
            self.require_supported(OperationKind::Deploy, *chain_id)?;
        }

        let order = DeployOrder {
            origin_chain_id: origin,
            dst_chain_ids: destinations,
        };
        self.launch(Order::Deploy(order.clone()), Some(order)).await
    }

    async fn launch(
        &self,
        order: Order,
        deployment: Option<DeployOrder>,
    ) -> OrchestratorResult<TrackedOperation> {
        let kind = order.kind();
        let generation = self.slots.begin(kind, ActionState::Submitting)?;

        let handle = match self.submitter.submit(&order, self.wallet.as_ref()).await {
            Ok(handle) => handle,
            Err(e) => {
                self.slots.set_state(
                    kind,
                    generation,
                    ActionState::Failed {
                        message: e.to_string(),
                    },
                );
                return Err(e);
            }
        };

        self.slots.set_state(
            kind,
            generation,
            ActionState::Tracking {
                tx_hash: handle.tx_hash_hex(),
                explorer_url: handle.explorer_url.clone(),
                latest: None,
            },
        );

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let callback = self.terminal_callback(generation, handle.clone(), deployment, outcome_tx);
        let tracker = self.tracker.track(
            &handle,
            CompletionPolicy::for_kind(kind),
            self.ctx.tracking_options(kind),
            callback,
        );
        let progress = tracker.progress();
        self.slots.attach_tracker(kind, generation, tracker);

        Ok(TrackedOperation {
            handle,
            progress,
            outcome: outcome_rx,
        })
    }

    fn terminal_callback(
        &self,
        generation: u64,
        handle: OperationHandle,
        deployment: Option<DeployOrder>,
        outcome_tx: oneshot::Sender<OperationOutcome>,
    ) -> TerminalCallback {
        let slots = self.slots.clone();
        let balances = self.balances.clone();
        let ctx = self.ctx.clone();

        Box::new(move |outcome| {
            Box::pin(async move {
                let kind = handle.kind;
                if !slots.is_current(kind, generation) {
                    debug!("Dropping late result for superseded {} {}", kind, handle.tx_hash_hex());
                    return;
                }

                let tx_hash = handle.tx_hash_hex();
                let explorer_url = handle.explorer_url.clone();

                let result = match outcome {
                    TrackOutcome::Completed { snapshot, .. } => {
                        let deployed = match &deployment {
                            Some(order) => Some(resolve_deployment(&ctx, order).await),
                            None => None,
                        };

                        match balances
                            .refresh_if(|| slots.is_current(kind, generation))
                            .await
                        {
                            Ok(Some(_)) => {}
                            Ok(None) => {
                                debug!("{} {} superseded during balance refresh", kind, tx_hash);
                                return;
                            }
                            Err(e) => warn!("Balance refresh after {} failed: {}", kind, e),
                        }

                        slots.finish(
                            kind,
                            generation,
                            ActionState::Completed {
                                tx_hash,
                                explorer_url,
                            },
                        );
                        OperationOutcome::Completed { snapshot, deployed }
                    }
                    TrackOutcome::TimedOut { elapsed, .. } => {
                        slots.finish(
                            kind,
                            generation,
                            ActionState::TimedOut {
                                tx_hash: tx_hash.clone(),
                                explorer_url: explorer_url.clone(),
                            },
                        );
                        OperationOutcome::Failed(OrchestratorError::PollingTimeout {
                            tx_hash,
                            elapsed,
                            explorer_url,
                        })
                    }
                    TrackOutcome::Inconsistent(e) => {
                        slots.finish(
                            kind,
                            generation,
                            ActionState::Failed {
                                message: e.to_string(),
                            },
                        );
                        OperationOutcome::Failed(e)
                    }
                };

                let _ = outcome_tx.send(result);
            })
        })
    }
}

/// Look up the contracts a completed deployment created
async fn resolve_deployment(ctx: &SessionContext, order: &DeployOrder) -> DeployedContracts {
    let scope = ctx.resolver.scope();

    let vault = match scope
        .resolve(ContractIdentifier::vault(), order.origin_chain_id)
        .await
    {
        Ok(resolution) => resolution.address(),
        Err(e) => {
            warn!("Could not resolve deployed vault: {}", e);
            None
        }
    };

    let mut super_tokens = BTreeMap::new();
    for chain_id in &order.dst_chain_ids {
        let address = match scope
            .resolve(ContractIdentifier::super_token(), *chain_id)
            .await
        {
            Ok(resolution) => resolution.address(),
            Err(e) => {
                warn!("Could not resolve super token on chain {}: {}", chain_id, e);
                None
            }
        };
        super_tokens.insert(*chain_id, address);
    }

    DeployedContracts {
        origin_chain_id: order.origin_chain_id,
        vault,
        super_tokens,
    }
}
