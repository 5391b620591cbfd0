//! Gas limit buffering for gateway calls

use ethers::types::U256;
use tracing::debug;

/// Gas estimator for gateway transactions
pub struct GasEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
}

impl GasEstimator {
    pub fn new() -> Self {
        Self {
            gas_limit_buffer_percent: 20,
        }
    }

    pub fn with_buffer(gas_limit_buffer_percent: u64) -> Self {
        Self {
            gas_limit_buffer_percent,
        }
    }

    /// Add the configured buffer on top of a node estimate
    pub fn buffered_limit(&self, estimate: U256) -> U256 {
        let buffer = estimate * self.gas_limit_buffer_percent / 100;
        let limit = estimate.saturating_add(buffer);
        debug!("Gas estimate {} buffered to {}", estimate, limit);
        limit
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_buffer_is_twenty_percent() {
        let gas = GasEstimator::new();
        assert_eq!(gas.buffered_limit(U256::from(100_000)), U256::from(120_000));
    }

    #[test]
    fn test_zero_buffer() {
        let gas = GasEstimator::with_buffer(0);
        assert_eq!(gas.buffered_limit(U256::from(21_000)), U256::from(21_000));
    }
}
