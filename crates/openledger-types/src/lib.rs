//! # openledger-types
//!
//! Shared types, errors, and configuration for the **OpenLedger**
//! marketplace settlement ledger.
//!
//! This crate is the leaf dependency of the workspace — every other
//! crate depends on it. It defines:
//!
//! - **Identifiers**: [`OrderId`], [`BuyerId`], [`StoreId`], [`ShipmentId`],
//!   [`CategoryId`], [`AllocationId`], [`PayoutId`], [`RefundId`],
//!   [`SettlementId`], [`DocumentId`], [`RuleId`]
//! - **Money model**: [`Money`], [`Currency`], half-to-even rounding
//! - **Escrow model**: [`EscrowPayment`], [`EscrowAllocation`] with the
//!   partial-refund arithmetic
//! - **Refund model**: [`Refund`] retryable workflow record
//! - **Payout model**: [`SellerPayout`], [`SellerPayoutItem`] with
//!   exponential retry backoff
//! - **Settlement model**: [`Settlement`], [`SettlementItem`],
//!   [`SettlementAdjustment`]
//! - **Commission model**: [`CommissionRule`], [`CommissionScope`]
//! - **Billing model**: [`BillingDocument`]
//! - **Provider surface**: [`ProviderStatus`], [`GatewayReceipt`],
//!   [`GatewayFailure`]
//! - **Errors**: [`LedgerError`] with `OL_ERR_` prefix codes
//! - **Configuration**: [`LedgerConfig`], [`PayoutConfig`]
//! - **Constants**: retry budgets, rounding scale, tolerance

pub mod billing;
pub mod commission;
pub mod config;
pub mod constants;
pub mod error;
pub mod escrow;
pub mod ids;
pub mod money;
pub mod payout;
pub mod provider;
pub mod refund;
pub mod settlement;

// Re-export all primary types at crate root for ergonomic imports:
//   use openledger_types::{EscrowPayment, SellerPayout, Settlement, ...};

pub use billing::*;
pub use commission::*;
pub use config::*;
pub use error::*;
pub use escrow::*;
pub use ids::*;
pub use money::*;
pub use payout::*;
pub use provider::*;
pub use refund::*;
pub use settlement::*;

// Constants are accessed via `openledger_types::constants::FOO`
// (not re-exported to avoid name collisions).
