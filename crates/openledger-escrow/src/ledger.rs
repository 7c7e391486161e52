//! The escrow ledger — owns all held payments.
//!
//! Payments are never removed once created (legal retention); the only
//! way out of escrow is through release or refund transitions on the
//! allocations.

use std::collections::HashMap;

use tracing::{info, warn};

use openledger_types::{
    AllocationId, AllocationStatus, BuyerId, EscrowAllocation, EscrowPayment, LedgerError, Money,
    OrderId, RefundBreakdown, Result, ShipmentId, StoreId,
};
use rust_decimal::Decimal;

/// Owns every escrow payment and serializes all mutations through
/// `&mut self`. Callers in multi-threaded deployments put one ledger
/// behind their own lock; the borrow rules do the rest.
pub struct EscrowLedger {
    payments: HashMap<OrderId, EscrowPayment>,
}

impl EscrowLedger {
    /// An empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            payments: HashMap::new(),
        }
    }

    /// Open an escrow for a confirmed order payment.
    ///
    /// # Errors
    /// - [`LedgerError::DuplicatePayment`] if the order already has one
    /// - [`LedgerError::InvalidAmount`] unless the total is positive
    pub fn open_payment(
        &mut self,
        order_id: OrderId,
        buyer_id: BuyerId,
        total_amount: Money,
    ) -> Result<()> {
        if self.payments.contains_key(&order_id) {
            return Err(LedgerError::DuplicatePayment(order_id));
        }
        let payment = EscrowPayment::new(order_id, buyer_id, total_amount)?;
        info!(order = %order_id, total = %total_amount, "escrow payment opened");
        self.payments.insert(order_id, payment);
        Ok(())
    }

    /// Look up a payment.
    #[must_use]
    pub fn payment(&self, order_id: OrderId) -> Option<&EscrowPayment> {
        self.payments.get(&order_id)
    }

    /// Number of payments held.
    #[must_use]
    pub fn payment_count(&self) -> usize {
        self.payments.len()
    }

    /// Add one seller shipment's allocation to a held payment.
    pub fn add_allocation(
        &mut self,
        order_id: OrderId,
        store_id: StoreId,
        shipment_id: ShipmentId,
        seller_amount: Money,
        shipping_amount: Money,
        commission_amount: Money,
        commission_rate: Decimal,
    ) -> Result<AllocationId> {
        let id = self.payment_mut(order_id)?.add_allocation(
            store_id,
            shipment_id,
            seller_amount,
            shipping_amount,
            commission_amount,
            commission_rate,
        )?;
        info!(
            order = %order_id,
            shipment = %shipment_id,
            store = %store_id,
            seller = %seller_amount,
            rate = %commission_rate,
            "allocation added"
        );
        Ok(id)
    }

    /// Shipment delivered: the allocation becomes eligible for payout.
    pub fn mark_shipment_delivered(
        &mut self,
        order_id: OrderId,
        shipment_id: ShipmentId,
    ) -> Result<()> {
        self.payment_mut(order_id)?
            .mark_shipment_delivered(shipment_id)?;
        info!(order = %order_id, shipment = %shipment_id, "allocation eligible for payout");
        Ok(())
    }

    /// Release one allocation to its seller.
    pub fn release_allocation(
        &mut self,
        order_id: OrderId,
        shipment_id: ShipmentId,
        payout_reference: &str,
    ) -> Result<()> {
        self.payment_mut(order_id)?
            .release_allocation(shipment_id, payout_reference)?;
        info!(
            order = %order_id,
            shipment = %shipment_id,
            reference = payout_reference,
            "allocation released"
        );
        Ok(())
    }

    /// Refund one allocation's remaining balance in full.
    pub fn refund_allocation(
        &mut self,
        order_id: OrderId,
        shipment_id: ShipmentId,
        reference: &str,
    ) -> Result<RefundBreakdown> {
        let breakdown = self
            .payment_mut(order_id)?
            .refund_allocation(shipment_id, reference)?;
        info!(order = %order_id, shipment = %shipment_id, "allocation refunded");
        Ok(breakdown)
    }

    /// Refund every still-held allocation of a payment.
    pub fn refund_full(&mut self, order_id: OrderId, reference: &str) -> Result<()> {
        self.payment_mut(order_id)?.refund_full(reference)?;
        info!(order = %order_id, reference, "payment fully refunded");
        Ok(())
    }

    /// Apply a partial refund to one allocation.
    pub fn apply_partial_refund(
        &mut self,
        order_id: OrderId,
        shipment_id: ShipmentId,
        amount: Money,
        reference: &str,
    ) -> Result<RefundBreakdown> {
        let result = self
            .payment_mut(order_id)?
            .apply_partial_refund(shipment_id, amount, reference);
        match &result {
            Ok(breakdown) => info!(
                order = %order_id,
                shipment = %shipment_id,
                amount = %amount,
                commission_back = %breakdown.commission,
                "partial refund applied"
            ),
            Err(err) => warn!(
                order = %order_id,
                shipment = %shipment_id,
                amount = %amount,
                %err,
                "partial refund rejected"
            ),
        }
        result
    }

    /// All HELD, payout-eligible allocations for one store, with their
    /// orders. The payout batcher scans this.
    #[must_use]
    pub fn eligible_allocations(&self, store_id: StoreId) -> Vec<(OrderId, &EscrowAllocation)> {
        let mut found: Vec<(OrderId, &EscrowAllocation)> = self
            .payments
            .values()
            .flat_map(|p| {
                p.allocations()
                    .iter()
                    .filter(|a| {
                        a.store_id() == store_id
                            && a.status() == AllocationStatus::Held
                            && a.is_eligible_for_payout()
                    })
                    .map(move |a| (p.order_id(), a))
            })
            .collect();
        // Stable order for deterministic batching.
        found.sort_by_key(|(order, a)| (*order, a.id()));
        found
    }

    /// Every allocation of one store, in deterministic order, regardless
    /// of status. Settlement generation aggregates over this.
    #[must_use]
    pub fn store_allocations(&self, store_id: StoreId) -> Vec<&EscrowAllocation> {
        let mut found: Vec<&EscrowAllocation> = self
            .payments
            .values()
            .flat_map(|p| {
                p.allocations()
                    .iter()
                    .filter(|a| a.store_id() == store_id)
            })
            .collect();
        found.sort_by_key(|a| a.id());
        found
    }

    /// Find the order a given allocation belongs to.
    #[must_use]
    pub fn order_of_allocation(&self, allocation_id: AllocationId) -> Option<OrderId> {
        self.payments.values().find_map(|p| {
            p.allocations()
                .iter()
                .any(|a| a.id() == allocation_id)
                .then(|| p.order_id())
        })
    }

    fn payment_mut(&mut self, order_id: OrderId) -> Result<&mut EscrowPayment> {
        self.payments
            .get_mut(&order_id)
            .ok_or(LedgerError::PaymentNotFound(order_id))
    }
}

impl Default for EscrowLedger {
    fn default() -> Self {
        Self::new()
    }
}
