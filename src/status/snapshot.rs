//! Point-in-time view of a request as reported by the status API

use serde::Serialize;

/// Overall state of the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallStatus {
    /// The API does not know the request yet, or has no details for it
    Pending,
    /// Details available, request still in flight
    Success,
    Completed,
    Failed,
}

/// Execution state of one write payload on its target chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WritePayloadStatus {
    pub chain_id: u64,
    pub executed: bool,
    pub execution_tx_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub overall: OverallStatus,
    /// Ordered as the API reports them
    pub payloads: Vec<WritePayloadStatus>,
}

/// A payload that was executed in an earlier snapshot but no longer is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Regression {
    pub index: usize,
    pub chain_id: u64,
}

impl StatusSnapshot {
    pub fn pending() -> Self {
        Self {
            overall: OverallStatus::Pending,
            payloads: Vec::new(),
        }
    }

    /// The API returned details with at least one payload
    pub fn is_ready(&self) -> bool {
        self.overall != OverallStatus::Pending && !self.payloads.is_empty()
    }

    pub fn first_payload_executed(&self) -> bool {
        self.payloads.first().map_or(false, |p| p.executed)
    }

    pub fn executed_count(&self) -> usize {
        self.payloads.iter().filter(|p| p.executed).count()
    }

    /// Check that no payload went from executed back to not executed
    pub fn check_progress(&self, previous: &StatusSnapshot) -> Result<(), Regression> {
        for (index, (before, now)) in previous.payloads.iter().zip(&self.payloads).enumerate() {
            if before.chain_id == now.chain_id && before.executed && !now.executed {
                return Err(Regression {
                    index,
                    chain_id: now.chain_id,
                });
            }
        }
        Ok(())
    }
}
