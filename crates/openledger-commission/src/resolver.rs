//! The commission rule set and its deterministic resolver.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use openledger_types::{
    CategoryId, CommissionRule, LedgerError, Result, RuleId, StoreId,
};

/// Holds all commission rules and resolves the applicable rate for a
/// `(store, category, instant)` triple.
///
/// Rules are append-only; retiring one goes through
/// [`Self::deactivate`] so historical allocations keep pointing at a
/// rule that still exists.
pub struct CommissionRuleSet {
    rules: Vec<CommissionRule>,
}

impl CommissionRuleSet {
    /// An empty rule set. Resolution against it always fails — install a
    /// Global rule before taking traffic.
    #[must_use]
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Install a rule (already validated by its constructor).
    pub fn add_rule(&mut self, rule: CommissionRule) -> RuleId {
        let id = rule.id();
        debug!(rule = %id, scope = %rule.scope(), rate = %rule.rate(), "commission rule installed");
        self.rules.push(rule);
        id
    }

    /// Take a rule out of resolution. Its history stays intact.
    ///
    /// # Errors
    /// Returns [`LedgerError::Configuration`] if the rule is unknown.
    pub fn deactivate(&mut self, rule_id: RuleId) -> Result<()> {
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.id() == rule_id)
            .ok_or_else(|| LedgerError::Configuration(format!("unknown rule {rule_id}")))?;
        rule.deactivate();
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// All rules that could apply to the triple, for audit tooling.
    #[must_use]
    pub fn candidates(
        &self,
        store_id: StoreId,
        category_id: Option<CategoryId>,
        at: DateTime<Utc>,
    ) -> Vec<&CommissionRule> {
        self.rules
            .iter()
            .filter(|r| r.is_effective_at(at) && r.applies_to(store_id, category_id))
            .collect()
    }

    /// Resolve the applicable commission rate (0–100 percent).
    ///
    /// # Errors
    /// Returns [`LedgerError::NoCommissionRule`] when nothing matches —
    /// a fatal configuration error, never a silent default.
    pub fn resolve(
        &self,
        store_id: StoreId,
        category_id: Option<CategoryId>,
        at: DateTime<Utc>,
    ) -> Result<Decimal> {
        let winner = self
            .candidates(store_id, category_id, at)
            .into_iter()
            // Total order: scope precedence, then latest effective_from
            // (None sorts earliest), then rule id.
            .max_by_key(|r| (r.scope().precedence(), r.effective_from(), r.id()))
            .ok_or(LedgerError::NoCommissionRule { store: store_id, at })?;

        debug!(
            store = %store_id,
            rule = %winner.id(),
            scope = %winner.scope(),
            rate = %winner.rate(),
            "commission resolved"
        );
        Ok(winner.rate())
    }
}

impl Default for CommissionRuleSet {
    fn default() -> Self {
        Self::new()
    }
}
