//! # Seller payout — batched transfer of eligible escrow funds
//!
//! A [`SellerPayout`] groups eligible allocations for one seller into a
//! single payable batch, identified by `(StoreId, Currency,
//! ScheduledDate)`. Each [`SellerPayoutItem`] snapshots the allocation's
//! *remaining* seller payout at add-time; later allocation mutations do
//! not retroactively change the snapshot.
//!
//! ## State machine
//!
//! ```text
//!   ┌───────────┐  start   ┌────────────┐  mark_paid   ┌──────┐
//!   │ SCHEDULED ├─────────▶│ PROCESSING ├─────────────▶│ PAID │
//!   └───────────┘          └─────┬──────┘              └──────┘
//!               retry (due) ▲    │ mark_failed
//!                           │    ▼
//!                        ┌──┴─────┐
//!                        │ FAILED │  (terminal after MAX_RETRIES)
//!                        └────────┘
//! ```
//!
//! On failure the retry delay grows exponentially: `4^retry_count` hours
//! (4h after the first failure, 16h after the second). After the third
//! failure `next_retry_at` is cleared and the payout requires manual
//! intervention.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{LedgerError, Result};
use crate::escrow::{AllocationStatus, EscrowAllocation};
use crate::ids::{AllocationId, PayoutId, ShipmentId, StoreId};
use crate::money::{Currency, Money};

/// Lifecycle state of a payout batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayoutStatus {
    Scheduled,
    Processing,
    Paid,
    Failed,
}

impl PayoutStatus {
    /// Can this payout transition to the given target state?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Scheduled, Self::Processing)
                | (Self::Processing, Self::Paid | Self::Failed)
                | (Self::Failed, Self::Processing)
        )
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "SCHEDULED"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Paid => write!(f, "PAID"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// One allocation's contribution to a payout batch.
///
/// `amount` is snapshotted from the allocation's remaining seller payout
/// at add-time and never changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellerPayoutItem {
    allocation_id: AllocationId,
    shipment_id: ShipmentId,
    amount: Money,
    added_at: DateTime<Utc>,
}

impl SellerPayoutItem {
    #[must_use]
    pub fn allocation_id(&self) -> AllocationId {
        self.allocation_id
    }

    #[must_use]
    pub fn shipment_id(&self) -> ShipmentId {
        self.shipment_id
    }

    #[must_use]
    pub fn amount(&self) -> Money {
        self.amount
    }

    #[must_use]
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }
}

/// A batch of eligible allocation funds payable to one seller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellerPayout {
    id: PayoutId,
    store_id: StoreId,
    currency: Currency,
    scheduled_date: NaiveDate,
    items: Vec<SellerPayoutItem>,
    /// Always the sum of the items; recomputed on every item addition.
    total_amount: Money,
    status: PayoutStatus,
    retry_count: u32,
    max_retries: u32,
    next_retry_at: Option<DateTime<Utc>>,
    provider_reference: Option<String>,
    failure_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SellerPayout {
    /// Open a payout batch for `(store, currency, scheduled_date)`.
    #[must_use]
    pub fn new(store_id: StoreId, currency: Currency, scheduled_date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: PayoutId::new(),
            store_id,
            currency,
            scheduled_date,
            items: Vec::new(),
            total_amount: Money::zero(currency),
            status: PayoutStatus::Scheduled,
            retry_count: 0,
            max_retries: constants::MAX_PAYOUT_RETRIES,
            next_retry_at: None,
            provider_reference: None,
            failure_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn id(&self) -> PayoutId {
        self.id
    }

    #[must_use]
    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    #[must_use]
    pub fn currency(&self) -> Currency {
        self.currency
    }

    #[must_use]
    pub fn scheduled_date(&self) -> NaiveDate {
        self.scheduled_date
    }

    #[must_use]
    pub fn items(&self) -> &[SellerPayoutItem] {
        &self.items
    }

    #[must_use]
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    #[must_use]
    pub fn status(&self) -> PayoutStatus {
        self.status
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[must_use]
    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        self.next_retry_at
    }

    #[must_use]
    pub fn provider_reference(&self) -> Option<&str> {
        self.provider_reference.as_deref()
    }

    #[must_use]
    pub fn failure_message(&self) -> Option<&str> {
        self.failure_message.as_deref()
    }

    #[must_use]
    pub fn contains_allocation(&self, allocation_id: AllocationId) -> bool {
        self.items.iter().any(|i| i.allocation_id == allocation_id)
    }

    /// Add one eligible allocation, snapshotting its remaining seller
    /// payout. Cross-payout exclusivity is the batcher's claim registry's
    /// job; this guards everything local to the batch.
    ///
    /// # Errors
    /// - [`LedgerError::PayoutStateConflict`] unless SCHEDULED
    /// - [`LedgerError::AllocationStateConflict`] unless the allocation is HELD
    /// - [`LedgerError::AllocationNotEligible`] before delivery
    /// - [`LedgerError::CurrencyMismatch`] on a foreign-currency allocation
    /// - [`LedgerError::AllocationAlreadyClaimed`] if already in this batch
    pub fn add_item(&mut self, allocation: &EscrowAllocation) -> Result<()> {
        if self.status != PayoutStatus::Scheduled {
            return Err(LedgerError::PayoutStateConflict {
                required: PayoutStatus::Scheduled,
                actual: self.status,
            });
        }
        if allocation.status() != AllocationStatus::Held {
            return Err(LedgerError::AllocationStateConflict {
                required: AllocationStatus::Held,
                actual: allocation.status(),
            });
        }
        if !allocation.is_eligible_for_payout() {
            return Err(LedgerError::AllocationNotEligible(allocation.id()));
        }
        if allocation.currency() != self.currency {
            return Err(LedgerError::CurrencyMismatch {
                expected: self.currency,
                actual: allocation.currency(),
            });
        }
        if self.contains_allocation(allocation.id()) {
            return Err(LedgerError::AllocationAlreadyClaimed {
                allocation: allocation.id(),
                payout: self.id,
            });
        }

        self.items.push(SellerPayoutItem {
            allocation_id: allocation.id(),
            shipment_id: allocation.shipment_id(),
            amount: allocation.remaining_seller_payout(),
            added_at: Utc::now(),
        });
        self.recompute_total();
        Ok(())
    }

    /// Begin a dispatch attempt. From SCHEDULED this always succeeds;
    /// from FAILED it requires the payout to be due for retry.
    ///
    /// # Errors
    /// - [`LedgerError::EmptyPayout`] with no items
    /// - [`LedgerError::PayoutNotDueForRetry`] on a premature retry
    /// - [`LedgerError::PayoutStateConflict`] from PAID/PROCESSING
    pub fn start_processing(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.items.is_empty() {
            return Err(LedgerError::EmptyPayout(self.id));
        }
        match self.status {
            PayoutStatus::Scheduled => {}
            PayoutStatus::Failed => {
                if !self.is_due_for_retry(now) {
                    return Err(LedgerError::PayoutNotDueForRetry(self.id));
                }
            }
            _ => {
                return Err(LedgerError::PayoutStateConflict {
                    required: PayoutStatus::Scheduled,
                    actual: self.status,
                });
            }
        }
        self.status = PayoutStatus::Processing;
        self.updated_at = now;
        Ok(())
    }

    /// PROCESSING → PAID, recording the provider reference.
    pub fn mark_paid(&mut self, reference: &str) -> Result<()> {
        if reference.is_empty() {
            return Err(LedgerError::EmptyIdentifier {
                field: "provider_reference",
            });
        }
        self.require_processing()?;
        self.status = PayoutStatus::Paid;
        self.provider_reference = Some(reference.to_string());
        self.next_retry_at = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// PROCESSING → FAILED. Counts the attempt and schedules the next
    /// retry with exponential backoff, or goes terminal once the budget
    /// is spent.
    pub fn mark_failed(
        &mut self,
        reference: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.require_processing()?;
        self.status = PayoutStatus::Failed;
        self.retry_count += 1;
        self.provider_reference = Some(reference.to_string());
        self.failure_message = Some(message.to_string());
        self.next_retry_at = if self.retry_count >= self.max_retries {
            None
        } else {
            let hours = i64::from(constants::BACKOFF_BASE_HOURS.pow(self.retry_count));
            Some(now + Duration::hours(hours))
        };
        self.updated_at = now;
        Ok(())
    }

    /// Whether another dispatch attempt is still permitted.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.status == PayoutStatus::Failed && self.retry_count < self.max_retries
    }

    /// True only if FAILED, retries remain, and the backoff has elapsed.
    #[must_use]
    pub fn is_due_for_retry(&self, now: DateTime<Utc>) -> bool {
        self.can_retry() && self.next_retry_at.is_some_and(|at| now >= at)
    }

    fn require_processing(&self) -> Result<()> {
        if self.status == PayoutStatus::Processing {
            Ok(())
        } else {
            Err(LedgerError::PayoutStateConflict {
                required: PayoutStatus::Processing,
                actual: self.status,
            })
        }
    }

    fn recompute_total(&mut self) {
        let sum = self.items.iter().map(|i| i.amount.amount()).sum();
        self.total_amount = Money::new(sum, self.currency);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::EscrowPayment;
    use rust_decimal::Decimal;

    fn eligible_allocation() -> (EscrowPayment, ShipmentId) {
        let mut payment = EscrowPayment::dummy(Decimal::new(10000, 2));
        let shipment = ShipmentId::new();
        payment.dummy_allocation(StoreId::new(), shipment);
        payment.mark_shipment_delivered(shipment).unwrap();
        (payment, shipment)
    }

    fn payout_for(allocation: &EscrowAllocation) -> SellerPayout {
        SellerPayout::new(
            allocation.store_id(),
            allocation.currency(),
            NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
        )
    }

    #[test]
    fn add_item_snapshots_remaining_payout() {
        let (payment, shipment) = eligible_allocation();
        let alloc = payment.allocation(shipment).unwrap();
        let mut payout = payout_for(alloc);

        payout.add_item(alloc).unwrap();
        assert_eq!(payout.items().len(), 1);
        // seller 90 - commission 9 + shipping 10
        assert_eq!(
            payout.total_amount().amount(),
            Decimal::new(9100, 2)
        );
    }

    #[test]
    fn snapshot_survives_later_allocation_refunds() {
        let (mut payment, shipment) = eligible_allocation();
        let mut payout = payout_for(payment.allocation(shipment).unwrap());
        payout.add_item(payment.allocation(shipment).unwrap()).unwrap();

        // A partial refund after batching must not rewrite the snapshot.
        payment
            .apply_partial_refund(
                shipment,
                Money::new(Decimal::new(2000, 2), Currency::usd()),
                "RF-1",
            )
            .unwrap();
        assert_eq!(payout.total_amount().amount(), Decimal::new(9100, 2));
    }

    #[test]
    fn snapshot_reflects_prior_partial_refund() {
        let (mut payment, shipment) = eligible_allocation();
        payment
            .apply_partial_refund(
                shipment,
                Money::new(Decimal::new(4500, 2), Currency::usd()),
                "RF-1",
            )
            .unwrap();
        let alloc = payment.allocation(shipment).unwrap();
        let mut payout = payout_for(alloc);
        payout.add_item(alloc).unwrap();
        // (90-45) - (9-4.50) + 10 = 50.50
        assert_eq!(payout.total_amount().amount(), Decimal::new(5050, 2));
    }

    #[test]
    fn ineligible_allocation_rejected() {
        let mut payment = EscrowPayment::dummy(Decimal::new(10000, 2));
        let shipment = ShipmentId::new();
        payment.dummy_allocation(StoreId::new(), shipment);
        let alloc = payment.allocation(shipment).unwrap();
        let mut payout = payout_for(alloc);
        let err = payout.add_item(alloc).unwrap_err();
        assert!(matches!(err, LedgerError::AllocationNotEligible(_)));
    }

    #[test]
    fn released_allocation_rejected() {
        let (mut payment, shipment) = eligible_allocation();
        payment.release_allocation(shipment, "PAY-0").unwrap();
        let alloc = payment.allocation(shipment).unwrap();
        let mut payout = payout_for(alloc);
        let err = payout.add_item(alloc).unwrap_err();
        assert!(matches!(err, LedgerError::AllocationStateConflict { .. }));
    }

    #[test]
    fn duplicate_item_rejected() {
        let (payment, shipment) = eligible_allocation();
        let alloc = payment.allocation(shipment).unwrap();
        let mut payout = payout_for(alloc);
        payout.add_item(alloc).unwrap();
        let err = payout.add_item(alloc).unwrap_err();
        assert!(matches!(err, LedgerError::AllocationAlreadyClaimed { .. }));
    }

    #[test]
    fn currency_mismatch_rejected() {
        let (payment, shipment) = eligible_allocation();
        let alloc = payment.allocation(shipment).unwrap();
        let mut payout = SellerPayout::new(
            alloc.store_id(),
            Currency::new("EUR").unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
        );
        let err = payout.add_item(alloc).unwrap_err();
        assert!(matches!(err, LedgerError::CurrencyMismatch { .. }));
    }

    #[test]
    fn add_item_after_processing_rejected() {
        let (payment, shipment) = eligible_allocation();
        let alloc = payment.allocation(shipment).unwrap();
        let mut payout = payout_for(alloc);
        payout.add_item(alloc).unwrap();
        payout.start_processing(Utc::now()).unwrap();
        let err = payout.add_item(alloc).unwrap_err();
        assert!(matches!(err, LedgerError::PayoutStateConflict { .. }));
    }

    #[test]
    fn empty_payout_cannot_start() {
        let mut payout = SellerPayout::new(
            StoreId::new(),
            Currency::usd(),
            NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
        );
        let err = payout.start_processing(Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::EmptyPayout(_)));
    }

    #[test]
    fn paid_path_records_reference() {
        let (payment, shipment) = eligible_allocation();
        let alloc = payment.allocation(shipment).unwrap();
        let mut payout = payout_for(alloc);
        payout.add_item(alloc).unwrap();
        payout.start_processing(Utc::now()).unwrap();
        payout.mark_paid("PROV-1").unwrap();
        assert_eq!(payout.status(), PayoutStatus::Paid);
        assert_eq!(payout.provider_reference(), Some("PROV-1"));
        assert!(payout.next_retry_at().is_none());
    }

    // ------------------------------------------------------------------
    // Retry / backoff schedule
    // ------------------------------------------------------------------

    #[test]
    fn first_failure_schedules_retry_in_4h() {
        let (payment, shipment) = eligible_allocation();
        let alloc = payment.allocation(shipment).unwrap();
        let mut payout = payout_for(alloc);
        payout.add_item(alloc).unwrap();

        let now = Utc::now();
        payout.start_processing(now).unwrap();
        payout.mark_failed("ERR-1", "provider unavailable", now).unwrap();

        assert_eq!(payout.status(), PayoutStatus::Failed);
        assert_eq!(payout.retry_count(), 1);
        assert_eq!(payout.next_retry_at(), Some(now + Duration::hours(4)));
        assert!(payout.can_retry());
        assert!(!payout.is_due_for_retry(now));
        assert!(payout.is_due_for_retry(now + Duration::hours(4)));
    }

    #[test]
    fn second_failure_schedules_retry_in_16h() {
        let (payment, shipment) = eligible_allocation();
        let alloc = payment.allocation(shipment).unwrap();
        let mut payout = payout_for(alloc);
        payout.add_item(alloc).unwrap();

        let t0 = Utc::now();
        payout.start_processing(t0).unwrap();
        payout.mark_failed("ERR-1", "unavailable", t0).unwrap();

        let t1 = t0 + Duration::hours(4);
        payout.start_processing(t1).unwrap();
        payout.mark_failed("ERR-2", "unavailable", t1).unwrap();

        assert_eq!(payout.retry_count(), 2);
        assert_eq!(payout.next_retry_at(), Some(t1 + Duration::hours(16)));
    }

    #[test]
    fn third_failure_is_terminal() {
        let (payment, shipment) = eligible_allocation();
        let alloc = payment.allocation(shipment).unwrap();
        let mut payout = payout_for(alloc);
        payout.add_item(alloc).unwrap();

        let mut now = Utc::now();
        for _ in 0..3 {
            payout.start_processing(now).unwrap();
            payout.mark_failed("ERR", "unavailable", now).unwrap();
            now = payout.next_retry_at().unwrap_or(now);
        }

        assert_eq!(payout.retry_count(), 3);
        assert!(payout.next_retry_at().is_none());
        assert!(!payout.can_retry());
        assert!(!payout.is_due_for_retry(now + Duration::days(365)));
        // Manual intervention required: no automatic further retry.
        let err = payout.start_processing(now).unwrap_err();
        assert!(matches!(err, LedgerError::PayoutNotDueForRetry(_)));
    }

    #[test]
    fn premature_retry_rejected() {
        let (payment, shipment) = eligible_allocation();
        let alloc = payment.allocation(shipment).unwrap();
        let mut payout = payout_for(alloc);
        payout.add_item(alloc).unwrap();

        let now = Utc::now();
        payout.start_processing(now).unwrap();
        payout.mark_failed("ERR-1", "unavailable", now).unwrap();

        let err = payout.start_processing(now + Duration::hours(1)).unwrap_err();
        assert!(matches!(err, LedgerError::PayoutNotDueForRetry(_)));
    }

    #[test]
    fn serde_roundtrip() {
        let (payment, shipment) = eligible_allocation();
        let alloc = payment.allocation(shipment).unwrap();
        let mut payout = payout_for(alloc);
        payout.add_item(alloc).unwrap();

        let json = serde_json::to_string(&payout).unwrap();
        let back: SellerPayout = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), payout.id());
        assert_eq!(back.total_amount(), payout.total_amount());
        assert_eq!(back.items().len(), 1);
    }
}
