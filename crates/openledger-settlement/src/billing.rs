//! Billing document issuance.
//!
//! Once a settlement is finalized, the platform's commission charge for
//! the period becomes a legal document: an invoice when net commission
//! is positive, a credit note when refund reversals drove it negative.
//! Tax-jurisdiction determination happens upstream; the issuer applies
//! the rate it is given.

use rust_decimal::Decimal;
use tracing::info;

use openledger_types::{
    BillingDocument, BillingDocumentKind, LedgerError, Money, Result, Settlement, SettlementStatus,
};

/// Derives commission invoices and credit notes from settlements.
pub struct InvoiceIssuer {
    tax_rate: Decimal,
}

impl InvoiceIssuer {
    /// An issuer applying the given tax rate (percent, 0–100).
    ///
    /// # Errors
    /// Returns [`LedgerError::Configuration`] for a rate out of range.
    pub fn new(tax_rate: Decimal) -> Result<Self> {
        if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE_HUNDRED {
            return Err(LedgerError::Configuration(format!(
                "tax rate must be 0-100, got {tax_rate}"
            )));
        }
        Ok(Self { tax_rate })
    }

    #[must_use]
    pub fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    /// Issue the billing document for a settlement.
    ///
    /// # Errors
    /// - [`LedgerError::SettlementStateConflict`] while still DRAFT
    /// - [`LedgerError::InvalidAmount`] when net commission is zero
    ///   (nothing to bill)
    pub fn issue(&self, settlement: &Settlement) -> Result<BillingDocument> {
        if settlement.status() == SettlementStatus::Draft {
            return Err(LedgerError::SettlementStateConflict {
                required: SettlementStatus::Finalized,
                actual: settlement.status(),
            });
        }

        let commission = settlement.total_commission();
        if commission.is_zero() {
            return Err(LedgerError::InvalidAmount {
                reason: format!(
                    "settlement {} has no commission to bill",
                    settlement.settlement_number()
                ),
            });
        }
        let kind = if commission.is_negative() {
            BillingDocumentKind::CreditNote
        } else {
            BillingDocumentKind::Invoice
        };
        let base = Money::new(commission.amount().abs(), commission.currency());
        let (year, month) = settlement.period();

        let document = BillingDocument::new(
            kind,
            settlement.store_id(),
            settlement.settlement_number(),
            year,
            month,
            base,
            self.tax_rate,
        )?;
        info!(
            number = document.document_number(),
            kind = %document.kind(),
            gross = %document.gross_amount(),
            "billing document issued"
        );
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openledger_types::{AllocationId, Currency, SettlementItem, StoreId};

    fn usd(cents: i64) -> Money {
        Money::new(Decimal::new(cents, 2), Currency::usd())
    }

    /// Finalized settlement with 100 gross at 10% commission.
    fn finalized_settlement() -> Settlement {
        let mut s = Settlement::new(StoreId::new(), 2024, 6, 1, Currency::usd()).unwrap();
        s.add_item(
            SettlementItem::sale(AllocationId::new(), usd(10000), usd(0), usd(1000)).unwrap(),
        )
        .unwrap();
        s.finalize().unwrap();
        s
    }

    #[test]
    fn issues_invoice_for_positive_commission() {
        let settlement = finalized_settlement();
        let issuer = InvoiceIssuer::new(Decimal::new(19, 0)).unwrap();
        let doc = issuer.issue(&settlement).unwrap();

        assert_eq!(doc.kind(), BillingDocumentKind::Invoice);
        assert_eq!(doc.net_amount(), usd(1000));
        assert_eq!(doc.tax_amount(), usd(190));
        assert_eq!(doc.gross_amount(), usd(1190));
        assert_eq!(
            doc.document_number(),
            format!("INV-{}", settlement.settlement_number())
        );
    }

    #[test]
    fn issues_credit_note_for_negative_commission() {
        // Refund reversal larger than the period's charged commission.
        let mut s = Settlement::new(StoreId::new(), 2024, 6, 1, Currency::usd()).unwrap();
        let alloc = AllocationId::new();
        s.add_item(SettlementItem::sale(alloc, usd(10000), usd(0), usd(300)).unwrap())
            .unwrap();
        s.add_item(SettlementItem::refund(alloc, usd(9000), usd(900)).unwrap())
            .unwrap();
        s.finalize().unwrap();
        assert_eq!(s.total_commission(), usd(-600));

        let issuer = InvoiceIssuer::new(Decimal::ZERO).unwrap();
        let doc = issuer.issue(&s).unwrap();
        assert_eq!(doc.kind(), BillingDocumentKind::CreditNote);
        assert_eq!(doc.net_amount(), usd(600));
        assert!(doc.document_number().starts_with("CRN-"));
    }

    #[test]
    fn draft_settlement_rejected() {
        let mut s = Settlement::new(StoreId::new(), 2024, 6, 1, Currency::usd()).unwrap();
        s.add_item(
            SettlementItem::sale(AllocationId::new(), usd(10000), usd(0), usd(1000)).unwrap(),
        )
        .unwrap();

        let issuer = InvoiceIssuer::new(Decimal::TEN).unwrap();
        let err = issuer.issue(&s).unwrap_err();
        assert!(matches!(err, LedgerError::SettlementStateConflict { .. }));
    }

    #[test]
    fn zero_commission_rejected() {
        let mut s = Settlement::new(StoreId::new(), 2024, 6, 1, Currency::usd()).unwrap();
        s.add_item(SettlementItem::sale(AllocationId::new(), usd(10000), usd(0), usd(0)).unwrap())
            .unwrap();
        s.finalize().unwrap();

        let issuer = InvoiceIssuer::new(Decimal::TEN).unwrap();
        let err = issuer.issue(&s).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));
    }

    #[test]
    fn invalid_tax_rate_rejected() {
        assert!(InvoiceIssuer::new(Decimal::new(-1, 0)).is_err());
        assert!(InvoiceIssuer::new(Decimal::new(101, 0)).is_err());
    }

    #[test]
    fn approved_settlement_also_billable() {
        let mut settlement = finalized_settlement();
        settlement.approve("finance-ops").unwrap();
        let issuer = InvoiceIssuer::new(Decimal::TEN).unwrap();
        assert!(issuer.issue(&settlement).is_ok());
    }
}
