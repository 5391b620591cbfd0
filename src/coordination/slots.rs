//! One slot per operation kind: the current generation, its tracker and state
//!
//! Starting a new operation of a kind bumps the slot's generation and cancels
//! the tracker of the previous one. Work that finishes late checks its
//! generation before touching the slot, so a superseded operation can never
//! overwrite the state of its successor.

use super::ActionState;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::status::TrackerHandle;
use crate::tx::OperationKind;

use dashmap::DashMap;
use tracing::debug;

struct Slot {
    generation: u64,
    tracker: Option<TrackerHandle>,
    state: ActionState,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            generation: 0,
            tracker: None,
            state: ActionState::Idle,
        }
    }
}

#[derive(Default)]
pub struct ActionSlots {
    slots: DashMap<OperationKind, Slot>,
}

impl ActionSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for a new operation, superseding whatever ran before.
    /// Fails while a wallet prompt of the same kind is still outstanding.
    pub fn begin(&self, kind: OperationKind, state: ActionState) -> OrchestratorResult<u64> {
        let mut slot = self.slots.entry(kind).or_default();

        if matches!(slot.state, ActionState::Signing | ActionState::Submitting) {
            return Err(OrchestratorError::OperationInProgress(kind));
        }

        if let Some(previous) = slot.tracker.take() {
            debug!("Superseding {} tracker for {}", kind, previous.tx_hash());
            previous.cancel();
        }

        slot.generation += 1;
        slot.state = state;
        Ok(slot.generation)
    }

    pub fn is_current(&self, kind: OperationKind, generation: u64) -> bool {
        self.slots
            .get(&kind)
            .map_or(false, |slot| slot.generation == generation)
    }

    /// Update state if `generation` still owns the slot
    pub fn set_state(&self, kind: OperationKind, generation: u64, state: ActionState) -> bool {
        match self.slots.get_mut(&kind) {
            Some(mut slot) if slot.generation == generation => {
                slot.state = state;
                true
            }
            _ => false,
        }
    }

    /// Hand a tracker to the slot; a stale generation cancels it instead
    pub fn attach_tracker(&self, kind: OperationKind, generation: u64, tracker: TrackerHandle) {
        match self.slots.get_mut(&kind) {
            Some(mut slot) if slot.generation == generation => {
                slot.tracker = Some(tracker);
            }
            _ => tracker.cancel(),
        }
    }

    /// Record the terminal state and release the tracker
    pub fn finish(&self, kind: OperationKind, generation: u64, state: ActionState) -> bool {
        let released = match self.slots.get_mut(&kind) {
            Some(mut slot) if slot.generation == generation => {
                slot.state = state;
                slot.tracker.take()
            }
            _ => return false,
        };
        drop(released);
        true
    }

    /// Current state, with the tracker's latest snapshot folded in
    pub fn state(&self, kind: OperationKind) -> ActionState {
        let Some(slot) = self.slots.get(&kind) else {
            return ActionState::Idle;
        };

        match (&slot.state, &slot.tracker) {
            (
                ActionState::Tracking {
                    tx_hash,
                    explorer_url,
                    ..
                },
                Some(tracker),
            ) => ActionState::Tracking {
                tx_hash: tx_hash.clone(),
                explorer_url: explorer_url.clone(),
                latest: tracker.progress().borrow().clone(),
            },
            (state, _) => state.clone(),
        }
    }

    /// Abandon the current operation of `kind`
    pub fn cancel(&self, kind: OperationKind) {
        if let Some(mut slot) = self.slots.get_mut(&kind) {
            if let Some(tracker) = slot.tracker.take() {
                tracker.cancel();
            }
            slot.generation += 1;
            slot.state = ActionState::Idle;
        }
    }

    pub fn cancel_all(&self) {
        for kind in OperationKind::ALL {
            self.cancel(kind);
        }
    }
}
