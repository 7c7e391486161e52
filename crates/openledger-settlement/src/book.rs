//! The settlement book — one live settlement per (store, year, month).
//!
//! Generation walks the escrow ledger's allocations for the store and
//! period: one Sale item per allocation created in the period, one
//! Refund item per allocation with refund activity. Corrections that
//! surface after a period closed flow into the *next* settlement as
//! adjustments — historical settlements are archived on regeneration,
//! never mutated or deleted.

use std::collections::HashMap;

use chrono::Datelike;
use tracing::{info, warn};

use openledger_escrow::EscrowLedger;
use openledger_types::{
    Currency, EscrowAllocation, LedgerError, Result, Settlement, SettlementAdjustment,
    SettlementItem, SettlementStatus, StoreId,
};

/// Owns settlements and their version history.
pub struct SettlementBook {
    live: HashMap<(StoreId, i32, u32), Settlement>,
    /// Superseded versions, kept for legal retention.
    archive: Vec<Settlement>,
}

impl SettlementBook {
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: HashMap::new(),
            archive: Vec::new(),
        }
    }

    /// The live settlement for a period.
    #[must_use]
    pub fn settlement(&self, store_id: StoreId, year: i32, month: u32) -> Option<&Settlement> {
        self.live.get(&(store_id, year, month))
    }

    /// The live version for a period, for optimistic regeneration.
    #[must_use]
    pub fn current_version(&self, store_id: StoreId, year: i32, month: u32) -> Option<u32> {
        self.settlement(store_id, year, month).map(Settlement::version)
    }

    /// Superseded settlement versions for a period, oldest first.
    #[must_use]
    pub fn archived_versions(&self, store_id: StoreId, year: i32, month: u32) -> Vec<&Settlement> {
        self.archive
            .iter()
            .filter(|s| s.store_id() == store_id && s.period() == (year, month))
            .collect()
    }

    /// Generate the first settlement (version 1) for a period from the
    /// ledger's allocation activity.
    ///
    /// # Errors
    /// [`LedgerError::SettlementVersionConflict`] if the period already
    /// has a settlement — use [`Self::regenerate`] instead.
    pub fn generate(
        &mut self,
        ledger: &EscrowLedger,
        store_id: StoreId,
        year: i32,
        month: u32,
        currency: Currency,
        adjustments: Vec<SettlementAdjustment>,
    ) -> Result<&Settlement> {
        if let Some(existing) = self.current_version(store_id, year, month) {
            return Err(LedgerError::SettlementVersionConflict {
                expected: 0,
                actual: existing,
            });
        }
        let settlement = build_settlement(ledger, store_id, year, month, 1, currency, adjustments)?;
        info!(
            number = settlement.settlement_number(),
            net = %settlement.net_payable(),
            items = settlement.items().len(),
            "settlement generated"
        );
        let key = (store_id, year, month);
        self.live.insert(key, settlement);
        Ok(&self.live[&key])
    }

    /// Regenerate a period's settlement from current ledger state.
    ///
    /// `expected_version` is the optimistic concurrency check: it must
    /// match the live version or the call fails loudly. A live Draft is
    /// rebuilt **in place** (same version, same settlement number); a
    /// finalized/approved/exported settlement is archived and a new
    /// Draft opens at `version + 1`.
    ///
    /// # Errors
    /// - [`LedgerError::SettlementNotFound`] with no live settlement
    /// - [`LedgerError::SettlementVersionConflict`] on a stale
    ///   `expected_version`
    pub fn regenerate(
        &mut self,
        ledger: &EscrowLedger,
        store_id: StoreId,
        year: i32,
        month: u32,
        expected_version: u32,
        adjustments: Vec<SettlementAdjustment>,
    ) -> Result<&Settlement> {
        let key = (store_id, year, month);
        let current = self
            .live
            .get(&key)
            .ok_or(LedgerError::SettlementNotFound { store: store_id, year, month })?;

        if current.version() != expected_version {
            warn!(
                store = %store_id,
                year,
                month,
                expected = expected_version,
                actual = current.version(),
                "conflicting settlement regeneration rejected"
            );
            return Err(LedgerError::SettlementVersionConflict {
                expected: expected_version,
                actual: current.version(),
            });
        }

        let currency = current.currency();
        let next_version = if current.status() == SettlementStatus::Draft {
            current.version()
        } else {
            current.version() + 1
        };
        let rebuilt =
            build_settlement(ledger, store_id, year, month, next_version, currency, adjustments)?;
        info!(
            number = rebuilt.settlement_number(),
            version = rebuilt.version(),
            net = %rebuilt.net_payable(),
            "settlement regenerated"
        );

        if let Some(old) = self.live.insert(key, rebuilt) {
            if old.status() != SettlementStatus::Draft {
                self.archive.push(old);
            }
        }
        Ok(&self.live[&key])
    }

    /// DRAFT → FINALIZED.
    pub fn finalize(&mut self, store_id: StoreId, year: i32, month: u32) -> Result<()> {
        let settlement = self.live_mut(store_id, year, month)?;
        settlement.finalize()?;
        info!(number = settlement.settlement_number(), "settlement finalized");
        Ok(())
    }

    /// FINALIZED → APPROVED under an approver identity.
    pub fn approve(
        &mut self,
        store_id: StoreId,
        year: i32,
        month: u32,
        approver: &str,
    ) -> Result<()> {
        let settlement = self.live_mut(store_id, year, month)?;
        settlement.approve(approver)?;
        info!(
            number = settlement.settlement_number(),
            approver, "settlement approved"
        );
        Ok(())
    }

    /// APPROVED → EXPORTED (idempotent).
    pub fn mark_exported(&mut self, store_id: StoreId, year: i32, month: u32) -> Result<()> {
        let settlement = self.live_mut(store_id, year, month)?;
        settlement.mark_exported()?;
        info!(number = settlement.settlement_number(), "settlement exported");
        Ok(())
    }

    fn live_mut(&mut self, store_id: StoreId, year: i32, month: u32) -> Result<&mut Settlement> {
        self.live
            .get_mut(&(store_id, year, month))
            .ok_or(LedgerError::SettlementNotFound { store: store_id, year, month })
    }

}

/// Build a Draft from the ledger's current allocation state.
fn build_settlement(
    ledger: &EscrowLedger,
    store_id: StoreId,
    year: i32,
    month: u32,
    version: u32,
    currency: Currency,
    adjustments: Vec<SettlementAdjustment>,
) -> Result<Settlement> {
    let mut settlement = Settlement::new(store_id, year, month, version, currency)?;
    for allocation in ledger.store_allocations(store_id) {
        if !in_period(allocation, year, month) || allocation.currency() != currency {
            continue;
        }
        settlement.add_item(SettlementItem::sale(
            allocation.id(),
            allocation.seller_amount(),
            allocation.shipping_amount(),
            allocation.commission_amount(),
        )?)?;
        if allocation.refunded_amount().is_positive() {
            settlement.add_item(SettlementItem::refund(
                allocation.id(),
                allocation.refunded_amount(),
                allocation.refunded_commission_amount(),
            )?)?;
        }
    }
    for adjustment in adjustments {
        settlement.add_adjustment(adjustment)?;
    }
    Ok(settlement)
}

fn in_period(allocation: &EscrowAllocation, year: i32, month: u32) -> bool {
    let created = allocation.created_at();
    created.year() == year && created.month() == month
}

impl Default for SettlementBook {
    fn default() -> Self {
        Self::new()
    }
}
