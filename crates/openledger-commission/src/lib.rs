//! # openledger-commission
//!
//! Commission rule resolution for the OpenLedger marketplace ledger.
//!
//! Given a store, an optional category, and an instant, the resolver
//! returns the applicable commission percentage:
//!
//! 1. Candidates are filtered to active rules whose effective window
//!    contains the instant (open bounds are unbounded).
//! 2. The most specific scope wins: Seller > Category > Global.
//! 3. Within one scope level, the latest `effective_from` wins; rules
//!    with no `effective_from` sort earliest. Remaining ties fall back
//!    to the rule id, so resolution is a total order and deterministic.
//! 4. No candidate at all is a fatal configuration error — commission is
//!    never silently defaulted.

pub mod resolver;

pub use resolver::CommissionRuleSet;
