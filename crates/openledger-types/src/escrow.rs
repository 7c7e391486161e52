//! # Escrow payment and allocation — the held-funds core
//!
//! An [`EscrowPayment`] holds one buyer's confirmed order payment. It is
//! split into one [`EscrowAllocation`] per seller shipment, each carrying
//! its own commission math and lifecycle.
//!
//! ## Allocation state machine
//!
//! ```text
//!   ┌──────┐  release    ┌──────────┐
//!   │ HELD ├────────────▶│ RELEASED │
//!   └──┬───┘             └──────────┘
//!      │ refund (full, or partials summing to total)
//!      ▼
//!   ┌──────────┐
//!   │ REFUNDED │
//!   └──────────┘
//! ```
//!
//! RELEASED and REFUNDED are terminal: no further mutation is permitted.
//! The payment's own status is a **pure function** of its allocation
//! statuses and is recomputed, together with the released/refunded
//! totals, after every mutation. Nothing is ever accumulated
//! incrementally, so the totals cannot drift from the allocations.
//!
//! ## Partial refunds
//!
//! A partial refund is applied to the seller amount first, with any
//! remainder charged to shipping (shipping carries no commission). The
//! proportional commission refund is rounded half-to-even at 2 decimals;
//! a 0.01 tolerance absorbs rounding drift in the "fully refunded" and
//! "exceeds remaining balance" checks. A refund beyond the remaining
//! balance is rejected outright — clamping would corrupt the audit trail.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::ids::{AllocationId, BuyerId, OrderId, ShipmentId, StoreId};
use crate::money::{round2, tolerance, Currency, Money};

/// Lifecycle state of a single escrow allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocationStatus {
    /// Funds are held by the platform, pending release or refund.
    Held,
    /// Funds were released to the seller. **Terminal.**
    Released,
    /// Funds were returned to the buyer in full. **Terminal.**
    Refunded,
}

impl AllocationStatus {
    /// Can this allocation transition to the given target state?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Held, Self::Released | Self::Refunded)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        *self != Self::Held
    }
}

impl std::fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Held => write!(f, "HELD"),
            Self::Released => write!(f, "RELEASED"),
            Self::Refunded => write!(f, "REFUNDED"),
        }
    }
}

/// Derived lifecycle state of the whole payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowPaymentStatus {
    /// No allocation has reached a terminal state yet.
    Held,
    /// Every allocation was released to its seller.
    Released,
    /// Every allocation was refunded to the buyer.
    Refunded,
    /// A mix: some allocations terminal, not all the same way.
    PartiallyReleased,
}

impl std::fmt::Display for EscrowPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Held => write!(f, "HELD"),
            Self::Released => write!(f, "RELEASED"),
            Self::Refunded => write!(f, "REFUNDED"),
            Self::PartiallyReleased => write!(f, "PARTIALLY_RELEASED"),
        }
    }
}

/// How a partial refund was split across the allocation's components.
/// Returned so callers (refund workflow, settlement items) can record the
/// exact breakdown without re-deriving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundBreakdown {
    /// Portion charged against the seller amount.
    pub from_seller: Money,
    /// Portion charged against shipping (no commission on this part).
    pub from_shipping: Money,
    /// Proportional commission returned to the seller's commission bill.
    pub commission: Money,
}

/// One seller's share of an escrow payment, net of commission.
///
/// Constructed only through [`EscrowPayment::add_allocation`], which
/// validates amounts and enforces shipment uniqueness. The commission
/// rate is snapshotted at creation and immutable thereafter, so later
/// rule changes never rewrite historical audit figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowAllocation {
    id: AllocationId,
    store_id: StoreId,
    shipment_id: ShipmentId,
    seller_amount: Money,
    shipping_amount: Money,
    commission_amount: Money,
    /// Commission percentage (0–100) frozen at creation.
    commission_rate: Decimal,
    status: AllocationStatus,
    is_eligible_for_payout: bool,
    /// Cumulative refunded total across all partial refunds.
    refunded_amount: Money,
    /// Portion of `refunded_amount` charged against the seller amount.
    refunded_seller_amount: Money,
    /// Cumulative proportional commission returned.
    refunded_commission_amount: Money,
    payout_reference: Option<String>,
    refund_references: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EscrowAllocation {
    fn new(
        store_id: StoreId,
        shipment_id: ShipmentId,
        seller_amount: Money,
        shipping_amount: Money,
        commission_amount: Money,
        commission_rate: Decimal,
    ) -> Result<Self> {
        if !seller_amount.is_positive() {
            return Err(LedgerError::InvalidAmount {
                reason: format!("seller amount must be positive, got {seller_amount}"),
            });
        }
        if shipping_amount.is_negative() {
            return Err(LedgerError::InvalidAmount {
                reason: format!("shipping amount must not be negative, got {shipping_amount}"),
            });
        }
        if commission_amount.is_negative() {
            return Err(LedgerError::InvalidAmount {
                reason: format!("commission must not be negative, got {commission_amount}"),
            });
        }
        if commission_rate < Decimal::ZERO || commission_rate > Decimal::ONE_HUNDRED {
            return Err(LedgerError::InvalidCommissionRate(commission_rate));
        }
        seller_amount.require_same_currency(shipping_amount)?;
        seller_amount.require_same_currency(commission_amount)?;
        if commission_amount.amount() > seller_amount.amount() {
            return Err(LedgerError::InvalidAmount {
                reason: format!(
                    "commission {commission_amount} exceeds seller amount {seller_amount}"
                ),
            });
        }

        let currency = seller_amount.currency();
        let now = Utc::now();
        Ok(Self {
            id: AllocationId::new(),
            store_id,
            shipment_id,
            seller_amount,
            shipping_amount,
            commission_amount,
            commission_rate,
            status: AllocationStatus::Held,
            is_eligible_for_payout: false,
            refunded_amount: Money::zero(currency),
            refunded_seller_amount: Money::zero(currency),
            refunded_commission_amount: Money::zero(currency),
            payout_reference: None,
            refund_references: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    #[must_use]
    pub fn id(&self) -> AllocationId {
        self.id
    }

    #[must_use]
    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    #[must_use]
    pub fn shipment_id(&self) -> ShipmentId {
        self.shipment_id
    }

    #[must_use]
    pub fn status(&self) -> AllocationStatus {
        self.status
    }

    #[must_use]
    pub fn currency(&self) -> Currency {
        self.seller_amount.currency()
    }

    #[must_use]
    pub fn seller_amount(&self) -> Money {
        self.seller_amount
    }

    #[must_use]
    pub fn shipping_amount(&self) -> Money {
        self.shipping_amount
    }

    #[must_use]
    pub fn commission_amount(&self) -> Money {
        self.commission_amount
    }

    #[must_use]
    pub fn commission_rate(&self) -> Decimal {
        self.commission_rate
    }

    #[must_use]
    pub fn refunded_amount(&self) -> Money {
        self.refunded_amount
    }

    #[must_use]
    pub fn refunded_seller_amount(&self) -> Money {
        self.refunded_seller_amount
    }

    #[must_use]
    pub fn refunded_commission_amount(&self) -> Money {
        self.refunded_commission_amount
    }

    #[must_use]
    pub fn is_eligible_for_payout(&self) -> bool {
        self.is_eligible_for_payout
    }

    #[must_use]
    pub fn payout_reference(&self) -> Option<&str> {
        self.payout_reference.as_deref()
    }

    #[must_use]
    pub fn refund_references(&self) -> &[String] {
        &self.refund_references
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Gross value of this allocation: seller amount + shipping.
    #[must_use]
    pub fn total_amount(&self) -> Money {
        Money::new(
            self.seller_amount.amount() + self.shipping_amount.amount(),
            self.currency(),
        )
    }

    /// The seller's payable figure before any refunds:
    /// `seller − commission + shipping`.
    #[must_use]
    pub fn seller_payout(&self) -> Money {
        Money::new(
            self.seller_amount.amount() - self.commission_amount.amount()
                + self.shipping_amount.amount(),
            self.currency(),
        )
    }

    /// What is still refundable: gross total minus cumulative refunds.
    #[must_use]
    pub fn remaining_balance(&self) -> Money {
        Money::new(
            self.total_amount().amount() - self.refunded_amount.amount(),
            self.currency(),
        )
    }

    /// The seller's payable figure net of all partial refunds so far.
    ///
    /// Remaining shipping is clamped at zero; remaining commission cannot
    /// go negative because each refund caps the commission portion at
    /// what is still refundable.
    #[must_use]
    pub fn remaining_seller_payout(&self) -> Money {
        let remaining_seller =
            self.seller_amount.amount() - self.refunded_seller_amount.amount();
        let remaining_commission =
            self.commission_amount.amount() - self.refunded_commission_amount.amount();
        let refunded_from_shipping =
            self.refunded_amount.amount() - self.refunded_seller_amount.amount();
        let remaining_shipping =
            (self.shipping_amount.amount() - refunded_from_shipping).max(Decimal::ZERO);
        Money::new(
            remaining_seller - remaining_commission + remaining_shipping,
            self.currency(),
        )
    }

    /// Whether cumulative refunds have consumed the whole allocation
    /// (within the 0.01 tolerance).
    #[must_use]
    pub fn is_fully_refunded(&self) -> bool {
        self.remaining_balance().amount() <= tolerance()
    }

    /// Shipment delivered: the allocation may now be batched into a payout.
    pub(crate) fn mark_eligible(&mut self) -> Result<()> {
        self.require_held()?;
        self.is_eligible_for_payout = true;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition HELD → RELEASED, recording the payout reference.
    pub(crate) fn release(&mut self, payout_reference: &str) -> Result<()> {
        self.require_held()?;
        if payout_reference.is_empty() {
            return Err(LedgerError::EmptyIdentifier {
                field: "payout_reference",
            });
        }
        self.status = AllocationStatus::Released;
        self.payout_reference = Some(payout_reference.to_string());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Refund whatever balance remains and transition HELD → REFUNDED.
    pub(crate) fn refund_remaining(&mut self, reference: &str) -> Result<RefundBreakdown> {
        let remaining = self.remaining_balance();
        let breakdown = self.apply_partial_refund(remaining, reference)?;
        // Refunding the exact remainder always crosses the tolerance line.
        debug_assert_eq!(self.status, AllocationStatus::Refunded);
        Ok(breakdown)
    }

    /// Apply a partial refund: seller amount first, remainder to
    /// shipping, proportional commission returned half-to-even.
    ///
    /// # Errors
    /// - [`LedgerError::AllocationStateConflict`] unless HELD
    /// - [`LedgerError::InvalidAmount`] if `amount ≤ 0`
    /// - [`LedgerError::CurrencyMismatch`] on a foreign-currency refund
    /// - [`LedgerError::RefundExceedsRemaining`] beyond remaining + 0.01
    pub(crate) fn apply_partial_refund(
        &mut self,
        amount: Money,
        reference: &str,
    ) -> Result<RefundBreakdown> {
        self.require_held()?;
        self.seller_amount.require_same_currency(amount)?;
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount {
                reason: format!("refund amount must be positive, got {amount}"),
            });
        }
        let remaining = self.remaining_balance().amount();
        if amount.amount() > remaining + tolerance() {
            return Err(LedgerError::RefundExceedsRemaining {
                requested: amount.amount(),
                remaining,
            });
        }

        let remaining_seller =
            (self.seller_amount.amount() - self.refunded_seller_amount.amount()).max(Decimal::ZERO);
        let from_seller = amount.amount().min(remaining_seller);
        let from_shipping = amount.amount() - from_seller;

        // Proportional commission give-back, capped at what is still
        // refundable so cumulative refunded commission never exceeds the
        // snapshot.
        let refundable_commission =
            self.commission_amount.amount() - self.refunded_commission_amount.amount();
        let commission = round2(from_seller * self.commission_rate / Decimal::ONE_HUNDRED)
            .min(refundable_commission);

        let currency = self.currency();
        self.refunded_amount =
            Money::new(self.refunded_amount.amount() + amount.amount(), currency);
        self.refunded_seller_amount = Money::new(
            self.refunded_seller_amount.amount() + from_seller,
            currency,
        );
        self.refunded_commission_amount = Money::new(
            self.refunded_commission_amount.amount() + commission,
            currency,
        );
        if !reference.is_empty() {
            self.refund_references.push(reference.to_string());
        }
        if self.is_fully_refunded() {
            self.status = AllocationStatus::Refunded;
        }
        self.updated_at = Utc::now();

        Ok(RefundBreakdown {
            from_seller: Money::new(from_seller, currency),
            from_shipping: Money::new(from_shipping, currency),
            commission: Money::new(commission, currency),
        })
    }

    fn require_held(&self) -> Result<()> {
        if self.status == AllocationStatus::Held {
            Ok(())
        } else {
            Err(LedgerError::AllocationStateConflict {
                required: AllocationStatus::Held,
                actual: self.status,
            })
        }
    }
}

/// One buyer's confirmed order payment, held in escrow and split across
/// seller shipments.
///
/// Unit of consistency: every mutation goes through `&mut self`, and the
/// released/refunded totals plus the status are recomputed from the
/// allocation set after each one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowPayment {
    order_id: OrderId,
    buyer_id: BuyerId,
    total_amount: Money,
    status: EscrowPaymentStatus,
    released_amount: Money,
    refunded_amount: Money,
    allocations: Vec<EscrowAllocation>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EscrowPayment {
    /// Open an escrow for a confirmed order payment.
    ///
    /// # Errors
    /// Returns [`LedgerError::InvalidAmount`] unless the total is positive.
    pub fn new(order_id: OrderId, buyer_id: BuyerId, total_amount: Money) -> Result<Self> {
        if !total_amount.is_positive() {
            return Err(LedgerError::InvalidAmount {
                reason: format!("escrow total must be positive, got {total_amount}"),
            });
        }
        let currency = total_amount.currency();
        let now = Utc::now();
        Ok(Self {
            order_id,
            buyer_id,
            total_amount,
            status: EscrowPaymentStatus::Held,
            released_amount: Money::zero(currency),
            refunded_amount: Money::zero(currency),
            allocations: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    #[must_use]
    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    #[must_use]
    pub fn buyer_id(&self) -> BuyerId {
        self.buyer_id
    }

    #[must_use]
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    #[must_use]
    pub fn currency(&self) -> Currency {
        self.total_amount.currency()
    }

    #[must_use]
    pub fn status(&self) -> EscrowPaymentStatus {
        self.status
    }

    #[must_use]
    pub fn released_amount(&self) -> Money {
        self.released_amount
    }

    #[must_use]
    pub fn refunded_amount(&self) -> Money {
        self.refunded_amount
    }

    #[must_use]
    pub fn allocations(&self) -> &[EscrowAllocation] {
        &self.allocations
    }

    #[must_use]
    pub fn allocation(&self, shipment_id: ShipmentId) -> Option<&EscrowAllocation> {
        self.allocations
            .iter()
            .find(|a| a.shipment_id == shipment_id)
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Sum of all allocation gross totals.
    #[must_use]
    pub fn allocated_amount(&self) -> Money {
        let sum = self
            .allocations
            .iter()
            .map(|a| a.total_amount().amount())
            .sum();
        Money::new(sum, self.currency())
    }

    /// Add one seller shipment's allocation. The commission rate is
    /// frozen here for audit consistency.
    ///
    /// # Errors
    /// - [`LedgerError::PaymentStateConflict`] unless the payment is HELD
    /// - [`LedgerError::DuplicateAllocation`] if the shipment already has one
    /// - [`LedgerError::AllocationExceedsPayment`] if the allocation sum
    ///   would pass the payment total
    /// - validation errors from the allocation constructor
    pub fn add_allocation(
        &mut self,
        store_id: StoreId,
        shipment_id: ShipmentId,
        seller_amount: Money,
        shipping_amount: Money,
        commission_amount: Money,
        commission_rate: Decimal,
    ) -> Result<AllocationId> {
        if self.status != EscrowPaymentStatus::Held {
            return Err(LedgerError::PaymentStateConflict {
                required: EscrowPaymentStatus::Held,
                actual: self.status,
            });
        }
        if self.allocation(shipment_id).is_some() {
            return Err(LedgerError::DuplicateAllocation(shipment_id));
        }
        self.total_amount.require_same_currency(seller_amount)?;

        let allocation = EscrowAllocation::new(
            store_id,
            shipment_id,
            seller_amount,
            shipping_amount,
            commission_amount,
            commission_rate,
        )?;
        let allocated = self.allocated_amount().amount() + allocation.total_amount().amount();
        if allocated > self.total_amount.amount() {
            return Err(LedgerError::AllocationExceedsPayment {
                allocated,
                total: self.total_amount.amount(),
            });
        }

        let id = allocation.id();
        self.allocations.push(allocation);
        self.updated_at = Utc::now();
        Ok(id)
    }

    /// Shipment delivered: flip the allocation's payout eligibility.
    pub fn mark_shipment_delivered(&mut self, shipment_id: ShipmentId) -> Result<()> {
        self.allocation_mut(shipment_id)?.mark_eligible()?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Release one allocation to its seller.
    ///
    /// # Errors
    /// Fails if the escrow is fully refunded, the shipment has no
    /// allocation, or the allocation is not HELD.
    pub fn release_allocation(
        &mut self,
        shipment_id: ShipmentId,
        payout_reference: &str,
    ) -> Result<()> {
        if self.status == EscrowPaymentStatus::Refunded {
            return Err(LedgerError::PaymentStateConflict {
                required: EscrowPaymentStatus::Held,
                actual: self.status,
            });
        }
        self.allocation_mut(shipment_id)?.release(payout_reference)?;
        self.recompute();
        Ok(())
    }

    /// Refund one allocation's remaining balance in full.
    pub fn refund_allocation(
        &mut self,
        shipment_id: ShipmentId,
        reference: &str,
    ) -> Result<RefundBreakdown> {
        let breakdown = self.allocation_mut(shipment_id)?.refund_remaining(reference)?;
        self.recompute();
        Ok(breakdown)
    }

    /// Refund every still-held allocation in full.
    ///
    /// # Errors
    /// Returns a state conflict if no allocation is refundable (all
    /// terminal already).
    pub fn refund_full(&mut self, reference: &str) -> Result<()> {
        let held: Vec<ShipmentId> = self
            .allocations
            .iter()
            .filter(|a| a.status() == AllocationStatus::Held)
            .map(EscrowAllocation::shipment_id)
            .collect();
        if held.is_empty() {
            return Err(LedgerError::PaymentStateConflict {
                required: EscrowPaymentStatus::Held,
                actual: self.status,
            });
        }
        for shipment_id in held {
            self.allocation_mut(shipment_id)?.refund_remaining(reference)?;
        }
        self.recompute();
        Ok(())
    }

    /// Apply a partial refund to one allocation. See
    /// [`EscrowAllocation::apply_partial_refund`] for the arithmetic.
    pub fn apply_partial_refund(
        &mut self,
        shipment_id: ShipmentId,
        amount: Money,
        reference: &str,
    ) -> Result<RefundBreakdown> {
        let breakdown = self
            .allocation_mut(shipment_id)?
            .apply_partial_refund(amount, reference)?;
        self.recompute();
        Ok(breakdown)
    }

    fn allocation_mut(&mut self, shipment_id: ShipmentId) -> Result<&mut EscrowAllocation> {
        self.allocations
            .iter_mut()
            .find(|a| a.shipment_id == shipment_id)
            .ok_or(LedgerError::AllocationNotFound(shipment_id))
    }

    /// Recompute released/refunded totals and the derived status from the
    /// current allocation set. Called after every mutation.
    fn recompute(&mut self) {
        let currency = self.currency();
        let released: Decimal = self
            .allocations
            .iter()
            .filter(|a| a.status() == AllocationStatus::Released)
            .map(|a| a.total_amount().amount() - a.refunded_amount().amount())
            .sum();
        let refunded: Decimal = self
            .allocations
            .iter()
            .map(|a| a.refunded_amount().amount())
            .sum();
        self.released_amount = Money::new(released, currency);
        self.refunded_amount = Money::new(refunded, currency);
        self.status = self.derive_status();
        self.updated_at = Utc::now();
    }

    fn derive_status(&self) -> EscrowPaymentStatus {
        if self.allocations.is_empty()
            || self
                .allocations
                .iter()
                .all(|a| a.status() == AllocationStatus::Held)
        {
            return EscrowPaymentStatus::Held;
        }
        if self
            .allocations
            .iter()
            .all(|a| a.status() == AllocationStatus::Released)
        {
            return EscrowPaymentStatus::Released;
        }
        if self
            .allocations
            .iter()
            .all(|a| a.status() == AllocationStatus::Refunded)
        {
            return EscrowPaymentStatus::Refunded;
        }
        EscrowPaymentStatus::PartiallyReleased
    }
}

/// Dummy constructors for tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl EscrowPayment {
    /// A USD payment for a fresh order/buyer pair.
    pub fn dummy(total: Decimal) -> Self {
        Self::new(
            OrderId::new(),
            BuyerId::new(),
            Money::new(total, Currency::usd()),
        )
        .expect("dummy total must be positive")
    }

    /// Add a standard allocation: seller 90, shipping 10, 10% commission.
    pub fn dummy_allocation(&mut self, store_id: StoreId, shipment_id: ShipmentId) -> AllocationId {
        self.add_allocation(
            store_id,
            shipment_id,
            Money::new(Decimal::new(9000, 2), Currency::usd()),
            Money::new(Decimal::new(1000, 2), Currency::usd()),
            Money::new(Decimal::new(900, 2), Currency::usd()),
            Decimal::TEN,
        )
        .expect("dummy allocation must fit")
    }
}
