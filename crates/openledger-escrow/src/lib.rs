//! # openledger-escrow
//!
//! **Escrow plane**: holds buyer payments, tracks the per-shipment
//! allocation lifecycle, and drives the refund workflow against the
//! payment provider.
//!
//! ## Architecture
//!
//! - [`EscrowLedger`] owns every [`EscrowPayment`] and is the single
//!   mutation path. All operations take `&mut self`, so mutations on one
//!   payment and its allocations are serialized per ledger instance —
//!   a concurrent release and refund of the same allocation cannot both
//!   succeed.
//! - [`RefundProcessor`] owns the standalone [`Refund`] workflow records
//!   and executes them through the [`PaymentGateway`] seam, mapping
//!   provider status strings through the fixed lookup table.
//! - The payout plane reads eligible allocations from the ledger and
//!   releases them back through it on successful dispatch.
//!
//! [`EscrowPayment`]: openledger_types::EscrowPayment
//! [`Refund`]: openledger_types::Refund

pub mod gateway;
pub mod ledger;
pub mod refund_flow;

pub use gateway::PaymentGateway;
pub use ledger::EscrowLedger;
pub use refund_flow::RefundProcessor;

#[cfg(any(test, feature = "test-helpers"))]
pub use gateway::ScriptedGateway;
