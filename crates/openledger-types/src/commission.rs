//! Commission rule model.
//!
//! A rule binds a commission percentage to a scope — the whole platform,
//! one category, or one seller — optionally limited to an effective date
//! window. Resolution precedence (Seller > Category > Global, then
//! latest `effective_from`) lives in `openledger-commission`; this module
//! only models the rule itself.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::ids::{CategoryId, RuleId, StoreId};

/// What a commission rule applies to. More specific scopes win during
/// resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommissionScope {
    /// Platform-wide fallback.
    Global,
    /// Every product in one category.
    Category(CategoryId),
    /// One seller's store.
    Seller(StoreId),
}

impl CommissionScope {
    /// Resolution rank: higher wins. Seller > Category > Global.
    #[must_use]
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Global => 0,
            Self::Category(_) => 1,
            Self::Seller(_) => 2,
        }
    }
}

impl std::fmt::Display for CommissionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "GLOBAL"),
            Self::Category(id) => write!(f, "CATEGORY({id})"),
            Self::Seller(id) => write!(f, "SELLER({id})"),
        }
    }
}

/// A commission percentage scoped to part of the marketplace, effective
/// within an optional date window (open bounds are unbounded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionRule {
    id: RuleId,
    scope: CommissionScope,
    /// Percentage in 0–100.
    rate: Decimal,
    effective_from: Option<DateTime<Utc>>,
    effective_to: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl CommissionRule {
    /// Create an active rule.
    ///
    /// # Errors
    /// Rejects a rate outside 0–100 and an inverted date window.
    pub fn new(
        scope: CommissionScope,
        rate: Decimal,
        effective_from: Option<DateTime<Utc>>,
        effective_to: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
            return Err(LedgerError::InvalidCommissionRate(rate));
        }
        if let (Some(from), Some(to)) = (effective_from, effective_to) {
            if from > to {
                return Err(LedgerError::Configuration(format!(
                    "rule window is inverted: {from} > {to}"
                )));
            }
        }
        Ok(Self {
            id: RuleId::new(),
            scope,
            rate,
            effective_from,
            effective_to,
            is_active: true,
            created_at: Utc::now(),
        })
    }

    #[must_use]
    pub fn id(&self) -> RuleId {
        self.id
    }

    #[must_use]
    pub fn scope(&self) -> CommissionScope {
        self.scope
    }

    #[must_use]
    pub fn rate(&self) -> Decimal {
        self.rate
    }

    #[must_use]
    pub fn effective_from(&self) -> Option<DateTime<Utc>> {
        self.effective_from
    }

    #[must_use]
    pub fn effective_to(&self) -> Option<DateTime<Utc>> {
        self.effective_to
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Take this rule out of resolution without deleting history.
    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    /// Active and inside the effective window at `at`.
    #[must_use]
    pub fn is_effective_at(&self, at: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if self.effective_from.is_some_and(|from| at < from) {
            return false;
        }
        if self.effective_to.is_some_and(|to| at > to) {
            return false;
        }
        true
    }

    /// Whether this rule's scope covers the given store/category.
    #[must_use]
    pub fn applies_to(&self, store_id: StoreId, category_id: Option<CategoryId>) -> bool {
        match self.scope {
            CommissionScope::Global => true,
            CommissionScope::Category(c) => category_id == Some(c),
            CommissionScope::Seller(s) => s == store_id,
        }
    }
}
