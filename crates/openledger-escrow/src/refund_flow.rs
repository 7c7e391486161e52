//! Refund workflow execution.
//!
//! Drives [`Refund`] records through the payment gateway:
//! 1. PENDING → PROCESSING
//! 2. Execute at the provider under the refund's idempotency key
//! 3. Map the provider status through the fixed lookup table
//! 4. COMPLETED on a paid/refunded status, FAILED on a failure status or
//!    gateway error (message retained), PROCESSING kept on a pending
//!    status for the next sweep
//!
//! Provider failures are captured into the record and surfaced via the
//! returned status — never swallowed, never left dangling.

use std::collections::HashMap;

use tracing::{info, warn};

use openledger_types::{
    map_provider_status, LedgerError, Money, OrderId, ProviderStatus, Refund, RefundId,
    RefundStatus, Result,
};

use crate::gateway::PaymentGateway;

/// Owns all refund workflow records and executes them against the
/// payment provider.
pub struct RefundProcessor {
    refunds: HashMap<RefundId, Refund>,
}

impl RefundProcessor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            refunds: HashMap::new(),
        }
    }

    /// Create a refund intent. The idempotency key is generated here,
    /// once, so retried client requests reuse the same upstream intent.
    pub fn create_refund(
        &mut self,
        order_id: OrderId,
        amount: Money,
        reason: impl Into<String>,
    ) -> Result<RefundId> {
        let refund = Refund::new(order_id, amount, reason)?;
        let id = refund.id();
        info!(refund = %id, order = %order_id, amount = %amount, "refund intent created");
        self.refunds.insert(id, refund);
        Ok(id)
    }

    #[must_use]
    pub fn refund(&self, id: RefundId) -> Option<&Refund> {
        self.refunds.get(&id)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.refunds.len()
    }

    /// Refunds currently FAILED with retry budget left.
    #[must_use]
    pub fn retryable(&self) -> Vec<RefundId> {
        let mut ids: Vec<RefundId> = self
            .refunds
            .values()
            .filter(|r| r.can_retry())
            .map(Refund::id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Execute one pending refund at the provider. Returns the refund's
    /// status after the attempt.
    ///
    /// # Errors
    /// - [`LedgerError::RefundNotFound`] for an unknown id
    /// - state conflicts when the refund is not PENDING
    /// - [`LedgerError::UnknownProviderStatus`] when the provider answers
    ///   outside the lookup table (the refund is failed first)
    pub fn execute<G: PaymentGateway>(
        &mut self,
        refund_id: RefundId,
        gateway: &mut G,
    ) -> Result<RefundStatus> {
        let refund = self
            .refunds
            .get_mut(&refund_id)
            .ok_or(LedgerError::RefundNotFound(refund_id))?;

        refund.start_processing()?;
        let amount = refund.amount();
        let key = refund.idempotency_key().to_string();

        match gateway.execute(amount, &key) {
            Ok(receipt) => match map_provider_status(&receipt.status) {
                Ok(ProviderStatus::Paid | ProviderStatus::Refunded) => {
                    refund.complete(&receipt.transaction_id)?;
                    info!(refund = %refund_id, tx = %receipt.transaction_id, "refund completed");
                    Ok(RefundStatus::Completed)
                }
                Ok(ProviderStatus::Pending) => {
                    // Still settling at the provider; a later sweep
                    // observes the final status.
                    info!(refund = %refund_id, "refund pending at provider");
                    Ok(RefundStatus::Processing)
                }
                Ok(ProviderStatus::Failed) => {
                    refund.fail(&format!(
                        "provider reported status {}",
                        receipt.status.trim()
                    ))?;
                    warn!(refund = %refund_id, status = %receipt.status, "refund failed at provider");
                    Ok(RefundStatus::Failed)
                }
                Err(err) => {
                    refund.fail(&format!("unmappable provider status {:?}", receipt.status))?;
                    warn!(refund = %refund_id, status = %receipt.status, "unknown provider status");
                    Err(err)
                }
            },
            Err(failure) => {
                refund.fail(&failure.message)?;
                warn!(
                    refund = %refund_id,
                    reference = %failure.error_reference,
                    message = %failure.message,
                    "refund gateway failure"
                );
                Ok(RefundStatus::Failed)
            }
        }
    }

    /// Reset a failed refund for another attempt, if budget remains.
    pub fn retry(&mut self, refund_id: RefundId) -> Result<()> {
        let refund = self
            .refunds
            .get_mut(&refund_id)
            .ok_or(LedgerError::RefundNotFound(refund_id))?;
        refund.reset_for_retry()?;
        info!(refund = %refund_id, attempt = refund.retry_count() + 1, "refund reset for retry");
        Ok(())
    }

    /// Reject a refund (manual review denial). Terminal.
    pub fn reject(&mut self, refund_id: RefundId, message: &str) -> Result<()> {
        let refund = self
            .refunds
            .get_mut(&refund_id)
            .ok_or(LedgerError::RefundNotFound(refund_id))?;
        refund.reject(message)?;
        warn!(refund = %refund_id, message, "refund rejected");
        Ok(())
    }
}

impl Default for RefundProcessor {
    fn default() -> Self {
        Self::new()
    }
}
