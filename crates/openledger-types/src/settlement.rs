//! # Settlement — monthly, versioned reconciliation of seller activity
//!
//! One [`Settlement`] exists per `(StoreId, Year, Month, Version)`.
//! It owns one [`SettlementItem`] per allocation contribution and any
//! number of [`SettlementAdjustment`]s for corrections attributable to
//! prior periods.
//!
//! The six aggregate totals are **always recomputed** from the current
//! item/adjustment collections on every mutation — never incrementally
//! accumulated — so they cannot drift.
//!
//! ## State machine
//!
//! ```text
//!   ┌───────┐ finalize ┌───────────┐ approve ┌──────────┐ export ┌──────────┐
//!   │ DRAFT ├─────────▶│ FINALIZED ├────────▶│ APPROVED ├───────▶│ EXPORTED │
//!   └───────┘          └───────────┘         └──────────┘        └──────────┘
//! ```
//!
//! Items and adjustments are mutable only in DRAFT. EXPORTED is a
//! terminal, idempotent marker. The settlement number is a pure function
//! of `(store, year, month, version)`, so regenerating the same draft is
//! idempotent in its identifier.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{LedgerError, Result};
use crate::ids::{AllocationId, SettlementId, StoreId};
use crate::money::{Currency, Money};

/// Lifecycle state of a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementStatus {
    Draft,
    Finalized,
    Approved,
    Exported,
}

impl SettlementStatus {
    /// Can this settlement transition to the given target state?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Draft, Self::Finalized)
                | (Self::Finalized, Self::Approved)
                | (Self::Approved, Self::Exported)
        )
    }
}

impl std::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "DRAFT"),
            Self::Finalized => write!(f, "FINALIZED"),
            Self::Approved => write!(f, "APPROVED"),
            Self::Exported => write!(f, "EXPORTED"),
        }
    }
}

/// What a settlement item records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementItemKind {
    /// The allocation's sale-side figures (gross, shipping, commission).
    Sale,
    /// Refund activity against the allocation in this period.
    Refund,
}

impl std::fmt::Display for SettlementItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sale => write!(f, "SALE"),
            Self::Refund => write!(f, "REFUND"),
        }
    }
}

/// One allocation's contribution to a settlement period.
///
/// Amount columns are summed per-column into the settlement totals. A
/// refund item's commission column is the *reversal* of commission on the
/// refunded portion, stored negative so the commission total shrinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementItem {
    allocation_id: AllocationId,
    kind: SettlementItemKind,
    gross_amount: Money,
    shipping_amount: Money,
    commission_amount: Money,
    refund_amount: Money,
}

impl SettlementItem {
    /// Sale-side item for an allocation.
    ///
    /// # Errors
    /// Rejects negative gross/shipping/commission and mixed currencies.
    pub fn sale(
        allocation_id: AllocationId,
        gross_amount: Money,
        shipping_amount: Money,
        commission_amount: Money,
    ) -> Result<Self> {
        for (name, amount) in [
            ("gross", gross_amount),
            ("shipping", shipping_amount),
            ("commission", commission_amount),
        ] {
            if amount.is_negative() {
                return Err(LedgerError::InvalidAmount {
                    reason: format!("sale item {name} must not be negative, got {amount}"),
                });
            }
        }
        gross_amount.require_same_currency(shipping_amount)?;
        gross_amount.require_same_currency(commission_amount)?;
        let currency = gross_amount.currency();
        Ok(Self {
            allocation_id,
            kind: SettlementItemKind::Sale,
            gross_amount,
            shipping_amount,
            commission_amount,
            refund_amount: Money::zero(currency),
        })
    }

    /// Refund item: `refund_amount` is the positive refunded figure,
    /// `commission_reversal` the (non-negative) commission given back.
    ///
    /// # Errors
    /// Rejects a non-positive refund, a negative reversal, and mixed
    /// currencies.
    pub fn refund(
        allocation_id: AllocationId,
        refund_amount: Money,
        commission_reversal: Money,
    ) -> Result<Self> {
        if !refund_amount.is_positive() {
            return Err(LedgerError::InvalidAmount {
                reason: format!("refund item must be positive, got {refund_amount}"),
            });
        }
        if commission_reversal.is_negative() {
            return Err(LedgerError::InvalidAmount {
                reason: format!(
                    "commission reversal must not be negative, got {commission_reversal}"
                ),
            });
        }
        refund_amount.require_same_currency(commission_reversal)?;
        let currency = refund_amount.currency();
        Ok(Self {
            allocation_id,
            kind: SettlementItemKind::Refund,
            gross_amount: Money::zero(currency),
            shipping_amount: Money::zero(currency),
            commission_amount: Money::new(-commission_reversal.amount(), currency),
            refund_amount,
        })
    }

    #[must_use]
    pub fn allocation_id(&self) -> AllocationId {
        self.allocation_id
    }

    #[must_use]
    pub fn kind(&self) -> SettlementItemKind {
        self.kind
    }

    #[must_use]
    pub fn gross_amount(&self) -> Money {
        self.gross_amount
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
    pub fn refund_amount(&self) -> Money {
        self.refund_amount
    }

    #[must_use]
    pub fn currency(&self) -> Currency {
        self.gross_amount.currency()
    }
}

/// A signed correction attributable to a prior period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementAdjustment {
    amount: Money,
    description: String,
    /// The period the correction belongs to.
    source_year: i32,
    source_month: u32,
    created_at: DateTime<Utc>,
}

impl SettlementAdjustment {
    /// A signed adjustment; positive increases the seller's net payable.
    ///
    /// # Errors
    /// Rejects a zero amount and an empty description.
    pub fn new(
        amount: Money,
        description: impl Into<String>,
        source_year: i32,
        source_month: u32,
    ) -> Result<Self> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount {
                reason: "adjustment amount must not be zero".to_string(),
            });
        }
        let description = description.into();
        if description.is_empty() {
            return Err(LedgerError::EmptyIdentifier {
                field: "adjustment description",
            });
        }
        Ok(Self {
            amount,
            description,
            source_year,
            source_month,
            created_at: Utc::now(),
        })
    }

    #[must_use]
    pub fn amount(&self) -> Money {
        self.amount
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn source_period(&self) -> (i32, u32) {
        (self.source_year, self.source_month)
    }
}

/// Monthly, versioned aggregation of one seller's allocation activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    id: SettlementId,
    store_id: StoreId,
    year: i32,
    month: u32,
    version: u32,
    settlement_number: String,
    currency: Currency,
    status: SettlementStatus,
    items: Vec<SettlementItem>,
    adjustments: Vec<SettlementAdjustment>,
    gross_sales: Money,
    total_shipping: Money,
    total_commission: Money,
    total_refunds: Money,
    total_adjustments: Money,
    net_payable: Money,
    approved_by: Option<String>,
    finalized_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    exported_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Settlement {
    /// Open a draft settlement for `(store, year, month)` at the given
    /// version.
    ///
    /// # Errors
    /// Rejects an out-of-range month and a zero version.
    pub fn new(
        store_id: StoreId,
        year: i32,
        month: u32,
        version: u32,
        currency: Currency,
    ) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(LedgerError::Configuration(format!(
                "settlement month must be 1-12, got {month}"
            )));
        }
        if version == 0 {
            return Err(LedgerError::Configuration(
                "settlement version starts at 1".to_string(),
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: SettlementId::new(),
            store_id,
            year,
            month,
            version,
            settlement_number: Self::derive_number(store_id, year, month, version),
            currency,
            status: SettlementStatus::Draft,
            items: Vec::new(),
            adjustments: Vec::new(),
            gross_sales: Money::zero(currency),
            total_shipping: Money::zero(currency),
            total_commission: Money::zero(currency),
            total_refunds: Money::zero(currency),
            total_adjustments: Money::zero(currency),
            net_payable: Money::zero(currency),
            approved_by: None,
            finalized_at: None,
            approved_at: None,
            exported_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Deterministic settlement number: same inputs, same number, on
    /// every regeneration of the same draft.
    #[must_use]
    pub fn derive_number(store_id: StoreId, year: i32, month: u32, version: u32) -> String {
        format!(
            "{}-{}-{year}{month:02}-V{version}",
            constants::SETTLEMENT_NUMBER_PREFIX,
            store_id.short().to_uppercase(),
        )
    }

    #[must_use]
    pub fn id(&self) -> SettlementId {
        self.id
    }

    #[must_use]
    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    #[must_use]
    pub fn period(&self) -> (i32, u32) {
        (self.year, self.month)
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn settlement_number(&self) -> &str {
        &self.settlement_number
    }

    #[must_use]
    pub fn currency(&self) -> Currency {
        self.currency
    }

    #[must_use]
    pub fn status(&self) -> SettlementStatus {
        self.status
    }

    #[must_use]
    pub fn items(&self) -> &[SettlementItem] {
        &self.items
    }

    #[must_use]
    pub fn adjustments(&self) -> &[SettlementAdjustment] {
        &self.adjustments
    }

    #[must_use]
    pub fn gross_sales(&self) -> Money {
        self.gross_sales
    }

    #[must_use]
    pub fn total_shipping(&self) -> Money {
        self.total_shipping
    }

    #[must_use]
    pub fn total_commission(&self) -> Money {
        self.total_commission
    }

    #[must_use]
    pub fn total_refunds(&self) -> Money {
        self.total_refunds
    }

    #[must_use]
    pub fn total_adjustments(&self) -> Money {
        self.total_adjustments
    }

    #[must_use]
    pub fn net_payable(&self) -> Money {
        self.net_payable
    }

    #[must_use]
    pub fn approved_by(&self) -> Option<&str> {
        self.approved_by.as_deref()
    }

    #[must_use]
    pub fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.finalized_at
    }

    /// Add one item. DRAFT only; duplicate `(allocation, kind)` rejected.
    pub fn add_item(&mut self, item: SettlementItem) -> Result<()> {
        self.require_draft()?;
        if item.currency() != self.currency {
            return Err(LedgerError::CurrencyMismatch {
                expected: self.currency,
                actual: item.currency(),
            });
        }
        if self
            .items
            .iter()
            .any(|i| i.allocation_id == item.allocation_id && i.kind == item.kind)
        {
            return Err(LedgerError::DuplicateSettlementItem(item.allocation_id));
        }
        self.items.push(item);
        self.recompute_totals();
        Ok(())
    }

    /// Add one signed adjustment. DRAFT only.
    pub fn add_adjustment(&mut self, adjustment: SettlementAdjustment) -> Result<()> {
        self.require_draft()?;
        if adjustment.amount.currency() != self.currency {
            return Err(LedgerError::CurrencyMismatch {
                expected: self.currency,
                actual: adjustment.amount.currency(),
            });
        }
        self.adjustments.push(adjustment);
        self.recompute_totals();
        Ok(())
    }

    /// Drop all items for regeneration. DRAFT only.
    pub fn clear_items(&mut self) -> Result<()> {
        self.require_draft()?;
        self.items.clear();
        self.recompute_totals();
        Ok(())
    }

    /// Drop all adjustments for regeneration. DRAFT only.
    pub fn clear_adjustments(&mut self) -> Result<()> {
        self.require_draft()?;
        self.adjustments.clear();
        self.recompute_totals();
        Ok(())
    }

    /// DRAFT → FINALIZED: no further structural changes.
    pub fn finalize(&mut self) -> Result<()> {
        self.transition(SettlementStatus::Finalized)?;
        self.finalized_at = Some(Utc::now());
        Ok(())
    }

    /// FINALIZED → APPROVED, recording who approved.
    pub fn approve(&mut self, approver: &str) -> Result<()> {
        if approver.trim().is_empty() {
            return Err(LedgerError::ApproverRequired);
        }
        self.transition(SettlementStatus::Approved)?;
        self.approved_by = Some(approver.to_string());
        self.approved_at = Some(Utc::now());
        Ok(())
    }

    /// APPROVED → EXPORTED. Idempotent: repeated calls once exported
    /// succeed without change.
    pub fn mark_exported(&mut self) -> Result<()> {
        if self.status == SettlementStatus::Exported {
            return Ok(());
        }
        self.transition(SettlementStatus::Exported)?;
        self.exported_at = Some(Utc::now());
        Ok(())
    }

    fn require_draft(&self) -> Result<()> {
        if self.status == SettlementStatus::Draft {
            Ok(())
        } else {
            Err(LedgerError::SettlementStateConflict {
                required: SettlementStatus::Draft,
                actual: self.status,
            })
        }
    }

    fn transition(&mut self, target: SettlementStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(LedgerError::SettlementStateConflict {
                required: match target {
                    SettlementStatus::Finalized => SettlementStatus::Draft,
                    SettlementStatus::Approved => SettlementStatus::Finalized,
                    _ => SettlementStatus::Approved,
                },
                actual: self.status,
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Recompute all six totals from the current collections.
    /// `net = gross + shipping − commission − refunds + adjustments`.
    fn recompute_totals(&mut self) {
        let gross: Decimal = self.items.iter().map(|i| i.gross_amount.amount()).sum();
        let shipping: Decimal = self.items.iter().map(|i| i.shipping_amount.amount()).sum();
        let commission: Decimal = self
            .items
            .iter()
            .map(|i| i.commission_amount.amount())
            .sum();
        let refunds: Decimal = self.items.iter().map(|i| i.refund_amount.amount()).sum();
        let adjustments: Decimal = self.adjustments.iter().map(|a| a.amount.amount()).sum();

        self.gross_sales = Money::new(gross, self.currency);
        self.total_shipping = Money::new(shipping, self.currency);
        self.total_commission = Money::new(commission, self.currency);
        self.total_refunds = Money::new(refunds, self.currency);
        self.total_adjustments = Money::new(adjustments, self.currency);
        self.net_payable = Money::new(
            gross + shipping - commission - refunds + adjustments,
            self.currency,
        );
        self.updated_at = Utc::now();
    }
}
