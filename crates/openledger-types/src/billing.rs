//! Billing documents derived from finalized settlements.
//!
//! A [`BillingDocument`] is the legal record of the platform's commission
//! charge for one settlement period: a commission invoice when the
//! period's net commission is positive, a credit note when refunds drove
//! it negative. The document number is derived from the settlement
//! number, so regeneration of the same settlement version yields the
//! same document identity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::ids::{DocumentId, StoreId};
use crate::money::{round2, Currency, Money};

/// Invoice or credit note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BillingDocumentKind {
    /// The platform bills the seller for commission.
    Invoice,
    /// The platform credits commission back (net commission negative).
    CreditNote,
}

impl BillingDocumentKind {
    #[must_use]
    pub fn number_prefix(&self) -> &'static str {
        match self {
            Self::Invoice => "INV",
            Self::CreditNote => "CRN",
        }
    }
}

impl std::fmt::Display for BillingDocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invoice => write!(f, "INVOICE"),
            Self::CreditNote => write!(f, "CREDIT_NOTE"),
        }
    }
}

/// A commission invoice or credit note for one settlement period.
///
/// `net_amount` is the absolute commission base, `tax_amount` the tax
/// applied to it at `tax_rate` (half-to-even, 2 decimals), and
/// `gross_amount` their sum. The sign convention lives in `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingDocument {
    id: DocumentId,
    kind: BillingDocumentKind,
    document_number: String,
    store_id: StoreId,
    settlement_number: String,
    period_year: i32,
    period_month: u32,
    net_amount: Money,
    tax_rate: Decimal,
    tax_amount: Money,
    gross_amount: Money,
    issued_at: DateTime<Utc>,
}

impl BillingDocument {
    /// Build a document over a commission base. The base must be
    /// positive — the caller picks Invoice or CreditNote from the sign
    /// of the settlement's net commission and passes the magnitude.
    ///
    /// # Errors
    /// Rejects a non-positive base and a tax rate outside 0–100.
    pub fn new(
        kind: BillingDocumentKind,
        store_id: StoreId,
        settlement_number: &str,
        period_year: i32,
        period_month: u32,
        commission_base: Money,
        tax_rate: Decimal,
    ) -> Result<Self> {
        if !commission_base.is_positive() {
            return Err(LedgerError::InvalidAmount {
                reason: format!(
                    "billing document base must be positive, got {commission_base}"
                ),
            });
        }
        if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE_HUNDRED {
            return Err(LedgerError::Configuration(format!(
                "tax rate must be 0-100, got {tax_rate}"
            )));
        }
        let currency = commission_base.currency();
        let tax = round2(commission_base.amount() * tax_rate / Decimal::ONE_HUNDRED);
        Ok(Self {
            id: DocumentId::new(),
            kind,
            document_number: format!("{}-{settlement_number}", kind.number_prefix()),
            store_id,
            settlement_number: settlement_number.to_string(),
            period_year,
            period_month,
            net_amount: commission_base,
            tax_rate,
            tax_amount: Money::new(tax, currency),
            gross_amount: Money::new(commission_base.amount() + tax, currency),
            issued_at: Utc::now(),
        })
    }

    #[must_use]
    pub fn id(&self) -> DocumentId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> BillingDocumentKind {
        self.kind
    }

    #[must_use]
    pub fn document_number(&self) -> &str {
        &self.document_number
    }

    #[must_use]
    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    #[must_use]
    pub fn settlement_number(&self) -> &str {
        &self.settlement_number
    }

    #[must_use]
    pub fn period(&self) -> (i32, u32) {
        (self.period_year, self.period_month)
    }

    #[must_use]
    pub fn net_amount(&self) -> Money {
        self.net_amount
    }

    #[must_use]
    pub fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    #[must_use]
    pub fn tax_amount(&self) -> Money {
        self.tax_amount
    }

    #[must_use]
    pub fn gross_amount(&self) -> Money {
        self.gross_amount
    }

    #[must_use]
    pub fn currency(&self) -> Currency {
        self.net_amount.currency()
    }

    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}
