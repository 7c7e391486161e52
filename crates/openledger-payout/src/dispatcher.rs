//! Payout dispatch through the provider gateway.
//!
//! A dispatch attempt:
//! 1. Transitions the payout into PROCESSING (SCHEDULED, or FAILED when
//!    the backoff has elapsed)
//! 2. Executes the batch at the provider under the payout's
//!    deterministic idempotency key
//! 3. On success: PAID, then every item's allocation is released in the
//!    escrow ledger under the provider reference
//! 4. On failure (including gateway-surfaced timeouts): FAILED with the
//!    next retry scheduled, or terminal once the budget is spent

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use openledger_escrow::EscrowLedger;
use openledger_types::{PayoutId, PayoutStatus, Result};

use crate::batcher::PayoutBatcher;
use crate::gateway::{PayoutBatch, PayoutGateway};

/// Executes payouts against a payout provider.
pub struct PayoutDispatcher<G: PayoutGateway> {
    gateway: G,
}

impl<G: PayoutGateway> PayoutDispatcher<G> {
    #[must_use]
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    #[must_use]
    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    /// Run one dispatch attempt for a payout. Returns the payout's
    /// status after the attempt.
    ///
    /// # Errors
    /// State conflicts from the payout machine (already paid, premature
    /// retry, empty batch) and unknown payout/order lookups.
    pub fn dispatch(
        &mut self,
        batcher: &mut PayoutBatcher,
        ledger: &mut EscrowLedger,
        payout_id: PayoutId,
        now: DateTime<Utc>,
    ) -> Result<PayoutStatus> {
        let payout = batcher.payout_mut(payout_id)?;
        payout.start_processing(now)?;

        let batch = PayoutBatch {
            payout_id,
            provider_key: payout_id.provider_key(),
            store_id: payout.store_id(),
            currency: payout.currency(),
            total_amount: payout.total_amount(),
            item_count: payout.items().len(),
        };

        match self.gateway.execute(&batch) {
            Ok(receipt) => {
                payout.mark_paid(&receipt.reference)?;
                info!(
                    payout = %payout_id,
                    reference = %receipt.reference,
                    total = %batch.total_amount,
                    "payout paid"
                );

                // Release the funded allocations. The money already
                // moved, so a conflict here is an inconsistency to
                // surface loudly, not a reason to roll the payout back.
                let items: Vec<_> = payout
                    .items()
                    .iter()
                    .map(|i| (i.allocation_id(), i.shipment_id()))
                    .collect();
                for (allocation_id, shipment_id) in items {
                    let Some(order_id) = ledger.order_of_allocation(allocation_id) else {
                        error!(
                            payout = %payout_id,
                            allocation = %allocation_id,
                            "paid allocation missing from ledger"
                        );
                        continue;
                    };
                    if let Err(err) =
                        ledger.release_allocation(order_id, shipment_id, &receipt.reference)
                    {
                        error!(
                            payout = %payout_id,
                            allocation = %allocation_id,
                            %err,
                            "paid allocation could not be released"
                        );
                    }
                }
                Ok(PayoutStatus::Paid)
            }
            Err(failure) => {
                payout.mark_failed(&failure.error_reference, &failure.message, now)?;
                warn!(
                    payout = %payout_id,
                    reference = %failure.error_reference,
                    message = %failure.message,
                    retry = payout.retry_count(),
                    next_retry = ?payout.next_retry_at(),
                    "payout dispatch failed"
                );
                Ok(PayoutStatus::Failed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ScriptedPayoutGateway;
    use chrono::{Duration, NaiveDate};
    use openledger_types::{
        BuyerId, Currency, EscrowPaymentStatus, LedgerError, Money, OrderId, PayoutConfig,
        ShipmentId, StoreId,
    };
    use rust_decimal::Decimal;

    fn usd(cents: i64) -> Money {
        Money::new(Decimal::new(cents, 2), Currency::usd())
    }

    fn setup() -> (EscrowLedger, PayoutBatcher, PayoutId, OrderId) {
        let mut ledger = EscrowLedger::new();
        let store = StoreId::new();
        let order = OrderId::new();
        let shipment = ShipmentId::new();
        ledger.open_payment(order, BuyerId::new(), usd(10000)).unwrap();
        ledger
            .add_allocation(
                order,
                store,
                shipment,
                usd(9000),
                usd(1000),
                usd(900),
                Decimal::TEN,
            )
            .unwrap();
        ledger.mark_shipment_delivered(order, shipment).unwrap();

        let mut batcher = PayoutBatcher::new(PayoutConfig::default());
        let payout_id = batcher
            .build_for_store(
                &ledger,
                store,
                Currency::usd(),
                NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            )
            .unwrap()
            .unwrap();
        (ledger, batcher, payout_id, order)
    }

    #[test]
    fn successful_dispatch_pays_and_releases() {
        let (mut ledger, mut batcher, payout_id, order) = setup();
        let mut gateway = ScriptedPayoutGateway::new();
        gateway.push_success("BATCH-REF-1");
        let mut dispatcher = PayoutDispatcher::new(gateway);

        let status = dispatcher
            .dispatch(&mut batcher, &mut ledger, payout_id, Utc::now())
            .unwrap();
        assert_eq!(status, PayoutStatus::Paid);

        let payment = ledger.payment(order).unwrap();
        assert_eq!(payment.status(), EscrowPaymentStatus::Released);
        assert_eq!(
            payment.allocations()[0].payout_reference(),
            Some("BATCH-REF-1")
        );
    }

    #[test]
    fn provider_sees_deterministic_key_across_retries() {
        let (mut ledger, mut batcher, payout_id, _) = setup();
        let mut gateway = ScriptedPayoutGateway::new();
        gateway.push_failure("ERR-1", "provider down");
        gateway.push_success("BATCH-REF-2");
        let mut dispatcher = PayoutDispatcher::new(gateway);

        let now = Utc::now();
        assert_eq!(
            dispatcher
                .dispatch(&mut batcher, &mut ledger, payout_id, now)
                .unwrap(),
            PayoutStatus::Failed
        );

        let retry_at = batcher.payout(payout_id).unwrap().next_retry_at().unwrap();
        assert_eq!(retry_at, now + Duration::hours(4));
        assert_eq!(
            dispatcher
                .dispatch(&mut batcher, &mut ledger, payout_id, retry_at)
                .unwrap(),
            PayoutStatus::Paid
        );

        let calls = dispatcher.gateway_mut().calls().to_vec();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].provider_key, calls[1].provider_key);
        assert_eq!(calls[0].provider_key, payout_id.provider_key());
    }

    #[test]
    fn failed_dispatch_keeps_allocations_held() {
        let (mut ledger, mut batcher, payout_id, order) = setup();
        let mut gateway = ScriptedPayoutGateway::new();
        gateway.push_failure("ERR-1", "provider down");
        let mut dispatcher = PayoutDispatcher::new(gateway);

        dispatcher
            .dispatch(&mut batcher, &mut ledger, payout_id, Utc::now())
            .unwrap();
        assert_eq!(
            ledger.payment(order).unwrap().status(),
            EscrowPaymentStatus::Held
        );
    }

    #[test]
    fn dispatching_paid_payout_conflicts() {
        let (mut ledger, mut batcher, payout_id, _) = setup();
        let mut gateway = ScriptedPayoutGateway::new();
        gateway.push_success("BATCH-REF-1");
        let mut dispatcher = PayoutDispatcher::new(gateway);

        dispatcher
            .dispatch(&mut batcher, &mut ledger, payout_id, Utc::now())
            .unwrap();
        let err = dispatcher
            .dispatch(&mut batcher, &mut ledger, payout_id, Utc::now())
            .unwrap_err();
        assert!(matches!(err, LedgerError::PayoutStateConflict { .. }));
        // Only the first attempt reached the provider.
        assert_eq!(dispatcher.gateway_mut().calls().len(), 1);
    }

    #[test]
    fn unknown_payout_errors() {
        let (mut ledger, mut batcher, _, _) = setup();
        let mut dispatcher = PayoutDispatcher::new(ScriptedPayoutGateway::new());
        let err = dispatcher
            .dispatch(&mut batcher, &mut ledger, PayoutId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, LedgerError::PayoutNotFound(_)));
    }
}
