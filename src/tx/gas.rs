//! Gas estimation by simulation with a fixed adjustment factor

use super::builder::PreparedTransaction;
use crate::error::{AgentError, AgentResult};
use crate::ledger::LedgerClient;

use std::sync::Arc;
use tracing::debug;

/// Gas estimator for transactions
pub struct ResourceEstimator {
    ledger: Arc<dyn LedgerClient>,
    /// Multiplier applied to simulated gas to absorb estimation variance
    adjustment_factor: f64,
    /// Gas limit used when estimation is not requested
    default_limit: u64,
}

impl ResourceEstimator {
    pub fn new(ledger: Arc<dyn LedgerClient>, adjustment_factor: f64, default_limit: u64) -> Self {
        Self {
            ledger,
            adjustment_factor,
            default_limit,
        }
    }

    pub fn default_limit(&self) -> u64 {
        self.default_limit
    }

    /// Simulate the draft and scale the consumed gas.
    ///
    /// A refused simulation is returned as an error, never replaced by the
    /// default limit.
    pub async fn estimate(&self, draft: &PreparedTransaction) -> AgentResult<u64> {
        let simulated = self.ledger.simulate(&draft.simulation_bytes()).await?;
        let limit = adjusted_limit(simulated, self.adjustment_factor)?;

        debug!(
            "Simulated {} gas, adjusted x{} to {}",
            simulated, self.adjustment_factor, limit
        );
        Ok(limit)
    }
}

/// `ceil(units * factor)`, rejecting results that do not fit a gas limit
pub fn adjusted_limit(units: u64, factor: f64) -> AgentResult<u64> {
    let scaled = (units as f64 * factor).ceil();
    if !scaled.is_finite() || scaled < 0.0 || scaled > u64::MAX as f64 {
        return Err(AgentError::Estimation(format!(
            "Adjusted gas out of range: {} x {}",
            units, factor
        )));
    }
    Ok(scaled as u64)
}
