//! Payout batching with a claim registry.
//!
//! The batcher owns every payout and a claim registry mapping each
//! allocation to the payout that holds it. A claim is taken when an item
//! is added and only given back explicitly (abandoning a terminal-failed
//! payout), so an allocation can never sit in two open payouts at once.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate};
use tracing::{debug, info};

use openledger_escrow::EscrowLedger;
use openledger_types::{
    AllocationId, Currency, LedgerError, PayoutConfig, PayoutId, PayoutStatus, Result,
    SellerPayout, StoreId,
};

/// Builds and owns seller payouts; enforces single-claim per allocation.
pub struct PayoutBatcher {
    config: PayoutConfig,
    payouts: HashMap<PayoutId, SellerPayout>,
    claims: HashMap<AllocationId, PayoutId>,
}

impl PayoutBatcher {
    #[must_use]
    pub fn new(config: PayoutConfig) -> Self {
        Self {
            config,
            payouts: HashMap::new(),
            claims: HashMap::new(),
        }
    }

    #[must_use]
    pub fn payout(&self, id: PayoutId) -> Option<&SellerPayout> {
        self.payouts.get(&id)
    }

    #[must_use]
    pub fn payout_count(&self) -> usize {
        self.payouts.len()
    }

    /// Which payout currently claims an allocation, if any.
    #[must_use]
    pub fn claimed_by(&self, allocation_id: AllocationId) -> Option<PayoutId> {
        self.claims.get(&allocation_id).copied()
    }

    /// Batch every eligible, unclaimed allocation of one store into a
    /// new payout scheduled at `scheduled_date`.
    ///
    /// Returns `None` when there is nothing to pay — no candidates, or a
    /// total below the configured minimum (those allocations roll into
    /// the next run, unclaimed).
    pub fn build_for_store(
        &mut self,
        ledger: &EscrowLedger,
        store_id: StoreId,
        currency: Currency,
        scheduled_date: NaiveDate,
    ) -> Result<Option<PayoutId>> {
        let mut payout = SellerPayout::new(store_id, currency, scheduled_date);
        let mut claimed: Vec<AllocationId> = Vec::new();

        for (_, allocation) in ledger.eligible_allocations(store_id) {
            if allocation.currency() != currency {
                continue;
            }
            if let Some(holder) = self.claimed_by(allocation.id()) {
                debug!(
                    allocation = %allocation.id(),
                    payout = %holder,
                    "allocation already claimed, skipping"
                );
                continue;
            }
            payout.add_item(allocation)?;
            claimed.push(allocation.id());
        }

        if claimed.is_empty() {
            return Ok(None);
        }
        if payout.total_amount().amount() < self.config.min_payout_amount {
            debug!(
                store = %store_id,
                total = %payout.total_amount(),
                minimum = %self.config.min_payout_amount,
                "payout below minimum, rolled into next run"
            );
            return Ok(None);
        }

        let id = payout.id();
        for allocation_id in claimed {
            self.claims.insert(allocation_id, id);
        }
        info!(
            payout = %id,
            store = %store_id,
            total = %payout.total_amount(),
            items = payout.items().len(),
            date = %scheduled_date,
            "payout batched"
        );
        self.payouts.insert(id, payout);
        Ok(Some(id))
    }

    /// Scheduled payouts whose dispatch date has arrived.
    #[must_use]
    pub fn due_scheduled(&self, on: NaiveDate) -> Vec<PayoutId> {
        let mut ids: Vec<PayoutId> = self
            .payouts
            .values()
            .filter(|p| p.status() == PayoutStatus::Scheduled && p.scheduled_date() <= on)
            .map(SellerPayout::id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Failed payouts whose backoff has elapsed.
    #[must_use]
    pub fn due_for_retry(&self, now: DateTime<chrono::Utc>) -> Vec<PayoutId> {
        let mut ids: Vec<PayoutId> = self
            .payouts
            .values()
            .filter(|p| p.is_due_for_retry(now))
            .map(SellerPayout::id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Give the claims of a terminally-failed payout back so a fresh
    /// batch can pick the allocations up (manual intervention path).
    ///
    /// # Errors
    /// - [`LedgerError::PayoutNotFound`] for an unknown id
    /// - [`LedgerError::PayoutStateConflict`] unless the payout is FAILED
    ///   with no retries left
    pub fn abandon(&mut self, payout_id: PayoutId) -> Result<()> {
        let payout = self
            .payouts
            .get(&payout_id)
            .ok_or(LedgerError::PayoutNotFound(payout_id))?;
        if payout.status() != PayoutStatus::Failed || payout.can_retry() {
            return Err(LedgerError::PayoutStateConflict {
                required: PayoutStatus::Failed,
                actual: payout.status(),
            });
        }
        self.claims.retain(|_, holder| *holder != payout_id);
        info!(payout = %payout_id, "payout abandoned, claims released");
        Ok(())
    }

    pub(crate) fn payout_mut(&mut self, id: PayoutId) -> Result<&mut SellerPayout> {
        self.payouts
            .get_mut(&id)
            .ok_or(LedgerError::PayoutNotFound(id))
    }
}
