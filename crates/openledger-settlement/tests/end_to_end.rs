//! End-to-end integration tests across the ledger planes.
//!
//! These tests exercise the full money lifecycle:
//! commission resolution -> escrow allocation -> delivery eligibility ->
//! payout batching/dispatch -> monthly settlement -> billing document.
//!
//! They verify the cross-plane invariants in realistic scenarios:
//! proportional partial refunds, mixed release/refund outcomes, payout
//! retry with backoff, settlement regeneration, and invoice derivation.

use chrono::{Datelike, Duration, Utc};
use rust_decimal::Decimal;

use openledger_commission::CommissionRuleSet;
use openledger_escrow::{EscrowLedger, RefundProcessor, ScriptedGateway};
use openledger_payout::{
    sweep, PayoutBatcher, PayoutDispatcher, ScriptedPayoutGateway,
};
use openledger_settlement::{InvoiceIssuer, SettlementBook};
use openledger_types::*;

fn usd(cents: i64) -> Money {
    Money::new(Decimal::new(cents, 2), Currency::usd())
}

/// Helper: the full ledger stack wired together.
struct LedgerPipeline {
    rules: CommissionRuleSet,
    ledger: EscrowLedger,
    refunds: RefundProcessor,
    batcher: PayoutBatcher,
    dispatcher: PayoutDispatcher<ScriptedPayoutGateway>,
    book: SettlementBook,
}

impl LedgerPipeline {
    fn new() -> Self {
        let mut rules = CommissionRuleSet::new();
        rules.add_rule(
            CommissionRule::new(CommissionScope::Global, Decimal::TEN, None, None).unwrap(),
        );
        Self {
            rules,
            ledger: EscrowLedger::new(),
            refunds: RefundProcessor::new(),
            batcher: PayoutBatcher::new(PayoutConfig::default()),
            dispatcher: PayoutDispatcher::new(ScriptedPayoutGateway::new()),
            book: SettlementBook::new(),
        }
    }

    /// Confirmed order payment: open escrow and allocate one shipment,
    /// with commission resolved through the rule set.
    fn sell(
        &mut self,
        store: StoreId,
        seller_cents: i64,
        shipping_cents: i64,
    ) -> (OrderId, ShipmentId) {
        let order = OrderId::new();
        let shipment = ShipmentId::new();
        let seller = usd(seller_cents);
        let shipping = usd(shipping_cents);
        let total = seller.checked_add(shipping).unwrap();

        let rate = self.rules.resolve(store, None, Utc::now()).unwrap();
        let commission = Money::new(
            round2(seller.amount() * rate / Decimal::ONE_HUNDRED),
            Currency::usd(),
        );

        self.ledger
            .open_payment(order, BuyerId::new(), total)
            .unwrap();
        self.ledger
            .add_allocation(order, store, shipment, seller, shipping, commission, rate)
            .unwrap();
        (order, shipment)
    }

    fn deliver(&mut self, order: OrderId, shipment: ShipmentId) {
        self.ledger.mark_shipment_delivered(order, shipment).unwrap();
    }

    /// Batch everything eligible for the store and dispatch it today.
    fn pay_out(&mut self, store: StoreId) -> PayoutId {
        let now = Utc::now();
        let payout_id = self
            .batcher
            .build_for_store(&self.ledger, store, Currency::usd(), now.date_naive())
            .unwrap()
            .expect("payout should be built");
        self.dispatcher
            .dispatch(&mut self.batcher, &mut self.ledger, payout_id, now)
            .unwrap();
        payout_id
    }

    fn settle_current_month(&mut self, store: StoreId) -> (i32, u32) {
        let now = Utc::now();
        let (year, month) = (now.year(), now.month());
        self.book
            .generate(&self.ledger, store, year, month, Currency::usd(), Vec::new())
            .unwrap();
        (year, month)
    }
}

// =============================================================================
// Scenario A: partial-refund arithmetic on a single allocation
// =============================================================================
#[test]
fn e2e_partial_refund_arithmetic() {
    let mut pipeline = LedgerPipeline::new();
    let store = StoreId::new();
    let (order, shipment) = pipeline.sell(store, 9000, 1000);

    let breakdown = pipeline
        .ledger
        .apply_partial_refund(order, shipment, usd(4500), "RF-A")
        .unwrap();
    assert_eq!(breakdown.from_seller, usd(4500));
    assert_eq!(breakdown.commission, usd(450));

    let payment = pipeline.ledger.payment(order).unwrap();
    let alloc = payment.allocation(shipment).unwrap();
    assert_eq!(alloc.refunded_seller_amount(), usd(4500));
    assert_eq!(alloc.refunded_commission_amount(), usd(450));
    // (90-45) - (9-4.50) + max(0, 10-0) = 50.50 still payable.
    assert_eq!(alloc.remaining_seller_payout(), usd(5050));
    assert_eq!(payment.refunded_amount(), usd(4500));
}

// =============================================================================
// Scenario B: mixed outcomes derive PARTIALLY_RELEASED
// =============================================================================
#[test]
fn e2e_mixed_release_and_refund() {
    let mut pipeline = LedgerPipeline::new();
    let store_a = StoreId::new();
    let store_b = StoreId::new();

    let order = OrderId::new();
    let (ship_a, ship_b) = (ShipmentId::new(), ShipmentId::new());
    pipeline
        .ledger
        .open_payment(order, BuyerId::new(), usd(20000))
        .unwrap();
    for (store, shipment) in [(store_a, ship_a), (store_b, ship_b)] {
        pipeline
            .ledger
            .add_allocation(order, store, shipment, usd(9000), usd(1000), usd(900), Decimal::TEN)
            .unwrap();
    }

    pipeline.ledger.release_allocation(order, ship_a, "PAY-1").unwrap();
    pipeline.ledger.refund_allocation(order, ship_b, "RF-1").unwrap();

    let payment = pipeline.ledger.payment(order).unwrap();
    assert_eq!(payment.status(), EscrowPaymentStatus::PartiallyReleased);
    assert_eq!(payment.released_amount(), usd(10000));
    assert_eq!(payment.refunded_amount(), usd(10000));
    assert!(
        payment.released_amount().amount() + payment.refunded_amount().amount()
            <= payment.total_amount().amount()
    );
}

// =============================================================================
// Scenario C: settlement totals recompute; finalization freezes structure
// =============================================================================
#[test]
fn e2e_settlement_totals_and_finalization() {
    let mut settlement =
        Settlement::new(StoreId::new(), 2024, 6, 1, Currency::usd()).unwrap();
    let alloc = AllocationId::new();
    settlement
        .add_item(SettlementItem::sale(alloc, usd(10000), usd(0), usd(1000)).unwrap())
        .unwrap();
    settlement
        .add_item(SettlementItem::refund(alloc, usd(2000), usd(0)).unwrap())
        .unwrap();

    // 100 - 10 - 20 = 70
    assert_eq!(settlement.net_payable(), usd(7000));

    settlement.finalize().unwrap();
    let late = SettlementItem::sale(AllocationId::new(), usd(100), usd(0), usd(10)).unwrap();
    assert!(matches!(
        settlement.add_item(late).unwrap_err(),
        LedgerError::SettlementStateConflict { .. }
    ));
}

// =============================================================================
// Full pipeline: resolve -> escrow -> payout -> settlement -> invoice
// =============================================================================
#[test]
fn e2e_full_pipeline_to_invoice() {
    let mut pipeline = LedgerPipeline::new();
    let store = StoreId::new();

    // Seller-specific rule (5%) must beat the global 10% rule.
    pipeline.rules.add_rule(
        CommissionRule::new(CommissionScope::Seller(store), Decimal::new(5, 0), None, None)
            .unwrap(),
    );

    // Two orders this month; the second is partially refunded before payout.
    let (order1, ship1) = pipeline.sell(store, 9000, 1000);
    let (order2, ship2) = pipeline.sell(store, 20000, 0);
    let alloc2_rate = pipeline
        .ledger
        .payment(order2)
        .unwrap()
        .allocation(ship2)
        .unwrap()
        .commission_rate();
    assert_eq!(alloc2_rate, Decimal::new(5, 0));

    pipeline
        .ledger
        .apply_partial_refund(order2, ship2, usd(4000), "RF-1")
        .unwrap();

    pipeline.deliver(order1, ship1);
    pipeline.deliver(order2, ship2);

    // Payout: 90 - 4.50 + 10 = 95.50 plus (200-40) - (10-2) = 152.00.
    pipeline.dispatcher.gateway_mut().push_success("BATCH-1");
    let payout_id = pipeline.pay_out(store);
    let payout = pipeline.batcher.payout(payout_id).unwrap();
    assert_eq!(payout.status(), PayoutStatus::Paid);
    assert_eq!(payout.total_amount(), usd(24750));

    // Both allocations released under the provider reference.
    for order in [order1, order2] {
        assert_eq!(
            pipeline.ledger.payment(order).unwrap().status(),
            EscrowPaymentStatus::Released
        );
    }

    // Month-end settlement.
    let (year, month) = pipeline.settle_current_month(store);
    let settlement = pipeline.book.settlement(store, year, month).unwrap();
    assert_eq!(settlement.gross_sales(), usd(29000));
    assert_eq!(settlement.total_shipping(), usd(1000));
    // Commission: 4.50 + 10.00 charged, 2.00 reversed on the refund.
    assert_eq!(settlement.total_commission(), usd(1250));
    assert_eq!(settlement.total_refunds(), usd(4000));
    // 290 + 10 - 12.50 - 40 = 247.50 — reconciles with the payout total.
    assert_eq!(settlement.net_payable(), usd(24750));

    pipeline.book.finalize(store, year, month).unwrap();
    pipeline.book.approve(store, year, month, "finance-ops").unwrap();

    let issuer = InvoiceIssuer::new(Decimal::new(19, 0)).unwrap();
    let doc = issuer
        .issue(pipeline.book.settlement(store, year, month).unwrap())
        .unwrap();
    assert_eq!(doc.kind(), BillingDocumentKind::Invoice);
    assert_eq!(doc.net_amount(), usd(1250));
    assert_eq!(doc.tax_amount(), usd(238)); // 12.50 * 19% = 2.375 → 2.38
    assert_eq!(doc.gross_amount(), usd(1488));

    pipeline.book.mark_exported(store, year, month).unwrap();
}

// =============================================================================
// Payout failure, backoff, and retry sweep
// =============================================================================
#[test]
fn e2e_payout_retry_with_backoff() {
    let mut pipeline = LedgerPipeline::new();
    let store = StoreId::new();
    let (order, shipment) = pipeline.sell(store, 9000, 1000);
    pipeline.deliver(order, shipment);

    pipeline.dispatcher.gateway_mut().push_failure("ERR-1", "provider outage");
    pipeline.dispatcher.gateway_mut().push_success("BATCH-2");

    let now = Utc::now();
    let payout_id = pipeline
        .batcher
        .build_for_store(&pipeline.ledger, store, Currency::usd(), now.date_naive())
        .unwrap()
        .unwrap();
    let status = pipeline
        .dispatcher
        .dispatch(&mut pipeline.batcher, &mut pipeline.ledger, payout_id, now)
        .unwrap();
    assert_eq!(status, PayoutStatus::Failed);

    // First failure: next retry ~ 4h out; escrow still holds the funds.
    let payout = pipeline.batcher.payout(payout_id).unwrap();
    assert_eq!(payout.next_retry_at(), Some(now + Duration::hours(4)));
    assert_eq!(
        pipeline.ledger.payment(order).unwrap().status(),
        EscrowPaymentStatus::Held
    );

    // Premature sweep attempts nothing.
    let report = sweep::sweep_due_retries(
        &mut pipeline.dispatcher,
        &mut pipeline.batcher,
        &mut pipeline.ledger,
        now + Duration::hours(3),
    );
    assert_eq!(report.attempted, 0);

    // Due sweep pays out and releases escrow.
    let report = sweep::sweep_due_retries(
        &mut pipeline.dispatcher,
        &mut pipeline.batcher,
        &mut pipeline.ledger,
        now + Duration::hours(4),
    );
    assert_eq!(report.paid, 1);
    assert_eq!(
        pipeline.ledger.payment(order).unwrap().status(),
        EscrowPaymentStatus::Released
    );

    // Both provider calls carried the same idempotency key.
    let calls = pipeline.dispatcher.gateway_mut().calls().to_vec();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].provider_key, calls[1].provider_key);
}

// =============================================================================
// Refund workflow against the payment gateway
// =============================================================================
#[test]
fn e2e_refund_workflow_with_escrow() {
    let mut pipeline = LedgerPipeline::new();
    let store = StoreId::new();
    let (order, shipment) = pipeline.sell(store, 9000, 1000);

    // Buyer is owed 45.00: create the intent, apply it to escrow, then
    // execute at the provider.
    let refund_id = pipeline
        .refunds
        .create_refund(order, usd(4500), "item damaged in transit")
        .unwrap();
    pipeline
        .ledger
        .apply_partial_refund(order, shipment, usd(4500), "RF-1")
        .unwrap();

    let mut gateway = ScriptedGateway::new();
    gateway.push_failure("ERR-9", "gateway timeout");
    gateway.push_success("TX-77", "SUCCESS");

    // First attempt fails and is retried under the same idempotency key.
    assert_eq!(
        pipeline.refunds.execute(refund_id, &mut gateway).unwrap(),
        RefundStatus::Failed
    );
    pipeline.refunds.retry(refund_id).unwrap();
    assert_eq!(
        pipeline.refunds.execute(refund_id, &mut gateway).unwrap(),
        RefundStatus::Completed
    );
    assert_eq!(gateway.calls()[0].1, gateway.calls()[1].1);

    let refund = pipeline.refunds.refund(refund_id).unwrap();
    assert_eq!(refund.transaction_id(), Some("TX-77"));
    assert_eq!(
        pipeline.ledger.payment(order).unwrap().refunded_amount(),
        usd(4500)
    );
}

// =============================================================================
// Settlement regeneration with optimistic versioning
// =============================================================================
#[test]
fn e2e_settlement_regeneration_after_late_refund() {
    let mut pipeline = LedgerPipeline::new();
    let store = StoreId::new();
    let (order, shipment) = pipeline.sell(store, 9000, 1000);

    let (year, month) = pipeline.settle_current_month(store);
    pipeline.book.finalize(store, year, month).unwrap();
    let v1_net = pipeline
        .book
        .settlement(store, year, month)
        .unwrap()
        .net_payable();
    assert_eq!(v1_net, usd(9100));

    // A refund lands after finalization: regenerate at version 2.
    pipeline
        .ledger
        .apply_partial_refund(order, shipment, usd(3000), "RF-LATE")
        .unwrap();

    // A stale regeneration attempt (wrong expected version) fails loudly.
    let stale = pipeline
        .book
        .regenerate(&pipeline.ledger, store, year, month, 2, Vec::new())
        .unwrap_err();
    assert!(matches!(stale, LedgerError::SettlementVersionConflict { .. }));

    let v2 = pipeline
        .book
        .regenerate(&pipeline.ledger, store, year, month, 1, Vec::new())
        .unwrap();
    assert_eq!(v2.version(), 2);
    // 90 + 10 - (9 - 3.00 reversed) - 30 = 64.00
    assert_eq!(v2.net_payable(), usd(6400));
    // Same period, new version, new number; v1 is archived untouched.
    assert!(v2.settlement_number().ends_with("-V2"));
    let archived = pipeline.book.archived_versions(store, year, month);
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].net_payable(), usd(9100));
}
