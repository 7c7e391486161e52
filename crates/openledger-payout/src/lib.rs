//! # openledger-payout
//!
//! **Payout plane**: batches eligible escrow allocations into per-seller
//! payouts, dispatches them through the payout provider, and sweeps
//! failed payouts back through retry with exponential backoff.
//!
//! ## Architecture
//!
//! - [`PayoutBatcher`] scans the escrow ledger for eligible allocations
//!   and groups them per `(store, currency, scheduled date)`. Its claim
//!   registry guarantees an allocation is claimed by **at most one**
//!   open payout.
//! - [`PayoutDispatcher`] executes a payout at the [`PayoutGateway`].
//!   The provider idempotency key is derived from the payout's identity,
//!   never from the retry count, so every retry is idempotent upstream.
//!   Success releases the underlying allocations in the escrow ledger.
//! - [`sweep::sweep_due_retries`] re-dispatches payouts whose backoff
//!   has elapsed; [`sweep::dispatch_due_scheduled`] runs the daily batch.

pub mod batcher;
pub mod dispatcher;
pub mod gateway;
pub mod sweep;

pub use batcher::PayoutBatcher;
pub use dispatcher::PayoutDispatcher;
pub use gateway::{PayoutBatch, PayoutGateway, PayoutReceipt};
pub use sweep::SweepReport;

#[cfg(any(test, feature = "test-helpers"))]
pub use gateway::ScriptedPayoutGateway;
