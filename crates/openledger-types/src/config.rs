//! Configuration types for ledger deployments.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants;

/// Top-level ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Payout batching and retry behavior.
    pub payout: PayoutConfig,
    /// Refund retry budget.
    pub max_refund_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            payout: PayoutConfig::default(),
            max_refund_retries: constants::MAX_REFUND_RETRIES,
        }
    }
}

/// Payout batching and retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutConfig {
    /// Days between batch creation and the scheduled dispatch date.
    pub lead_days: u16,
    /// Batches below this amount are skipped and rolled into the next run.
    pub min_payout_amount: Decimal,
    /// Dispatch attempts before a payout goes terminal.
    pub max_retries: u32,
    /// Base of the exponential backoff (hours).
    pub backoff_base_hours: u32,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            lead_days: 1,
            min_payout_amount: Decimal::ZERO,
            max_retries: constants::MAX_PAYOUT_RETRIES,
            backoff_base_hours: constants::BACKOFF_BASE_HOURS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let cfg = LedgerConfig::default();
        assert_eq!(cfg.max_refund_retries, 3);
        assert_eq!(cfg.payout.max_retries, 3);
        assert_eq!(cfg.payout.backoff_base_hours, 4);
        assert_eq!(cfg.payout.min_payout_amount, Decimal::ZERO);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = LedgerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: LedgerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.payout.lead_days, cfg.payout.lead_days);
        assert_eq!(back.payout.max_retries, cfg.payout.max_retries);
    }
}
