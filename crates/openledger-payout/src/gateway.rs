//! Payout provider seam.

use openledger_types::{Currency, GatewayFailure, Money, PayoutId, StoreId};
use serde::{Deserialize, Serialize};

/// What the provider sees: one batch transfer to a seller's bank
/// account, identified by the payout-derived idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutBatch {
    pub payout_id: PayoutId,
    /// Deterministic idempotency key (same on every retry).
    pub provider_key: String,
    pub store_id: StoreId,
    pub currency: Currency,
    pub total_amount: Money,
    pub item_count: usize,
}

/// Successful dispatch: the provider's batch reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutReceipt {
    pub reference: String,
}

/// An opaque payout provider. Implementations own transport and timeout
/// policy; a timed-out call must come back as a [`GatewayFailure`].
pub trait PayoutGateway {
    fn execute(&mut self, batch: &PayoutBatch)
        -> std::result::Result<PayoutReceipt, GatewayFailure>;
}

/// Scripted in-memory payout gateway for tests. **Never use in
/// production.**
#[cfg(any(test, feature = "test-helpers"))]
pub struct ScriptedPayoutGateway {
    script: std::collections::VecDeque<std::result::Result<PayoutReceipt, GatewayFailure>>,
    calls: Vec<PayoutBatch>,
}

#[cfg(any(test, feature = "test-helpers"))]
impl ScriptedPayoutGateway {
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: std::collections::VecDeque::new(),
            calls: Vec::new(),
        }
    }

    pub fn push_success(&mut self, reference: &str) {
        self.script.push_back(Ok(PayoutReceipt {
            reference: reference.to_string(),
        }));
    }

    pub fn push_failure(&mut self, error_reference: &str, message: &str) {
        self.script.push_back(Err(GatewayFailure {
            error_reference: error_reference.to_string(),
            message: message.to_string(),
        }));
    }

    /// Every batch the gateway has seen, in order.
    #[must_use]
    pub fn calls(&self) -> &[PayoutBatch] {
        &self.calls
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Default for ScriptedPayoutGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl PayoutGateway for ScriptedPayoutGateway {
    fn execute(
        &mut self,
        batch: &PayoutBatch,
    ) -> std::result::Result<PayoutReceipt, GatewayFailure> {
        self.calls.push(batch.clone());
        self.script.pop_front().unwrap_or_else(|| {
            Err(GatewayFailure {
                error_reference: "SCRIPT-EXHAUSTED".to_string(),
                message: "scripted payout gateway has no response queued".to_string(),
            })
        })
    }
}
