//! Error types for the OpenLedger settlement ledger.
//!
//! All errors use the `OL_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors
//! - 2xx: Escrow / allocation errors (state conflicts, reconciliation)
//! - 3xx: Refund workflow errors
//! - 4xx: Payout errors
//! - 5xx: Settlement errors
//! - 6xx: Commission resolution errors
//! - 7xx: Provider gateway errors
//! - 9xx: General / internal errors
//!
//! State-conflict variants carry the required vs. actual status so callers
//! can tell *why* an operation was rejected, not just that it was.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::escrow::{AllocationStatus, EscrowPaymentStatus};
use crate::ids::{AllocationId, OrderId, PayoutId, RefundId, ShipmentId, StoreId};
use crate::money::Currency;
use crate::payout::PayoutStatus;
use crate::refund::RefundStatus;
use crate::settlement::SettlementStatus;

/// Central error enum for all OpenLedger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// A monetary amount failed validation (non-positive where positive
    /// is required, wrong sign, etc.).
    #[error("OL_ERR_100: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// The currency code is not three ASCII uppercase letters.
    #[error("OL_ERR_101: Invalid currency code: {code:?}")]
    InvalidCurrency { code: String },

    /// Two monetary values from different currencies met in one operation.
    #[error("OL_ERR_102: Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: Currency, actual: Currency },

    /// Commission rate outside the 0–100 percent range.
    #[error("OL_ERR_103: Invalid commission rate: {0} (must be 0-100)")]
    InvalidCommissionRate(Decimal),

    /// A required identifier field was empty.
    #[error("OL_ERR_104: Empty identifier: {field}")]
    EmptyIdentifier { field: &'static str },

    // =================================================================
    // Escrow / Allocation Errors (2xx)
    // =================================================================
    /// No escrow payment exists for this order.
    #[error("OL_ERR_200: Escrow payment not found for {0}")]
    PaymentNotFound(OrderId),

    /// No allocation exists for this shipment.
    #[error("OL_ERR_201: No allocation for {0}")]
    AllocationNotFound(ShipmentId),

    /// An allocation for this shipment already exists on the payment.
    #[error("OL_ERR_202: Duplicate allocation for {0}")]
    DuplicateAllocation(ShipmentId),

    /// The payment is not in the status the operation requires.
    #[error("OL_ERR_203: Payment is {actual}, operation requires {required}")]
    PaymentStateConflict {
        required: EscrowPaymentStatus,
        actual: EscrowPaymentStatus,
    },

    /// The allocation is not in the status the operation requires.
    #[error("OL_ERR_204: Allocation is {actual}, operation requires {required}")]
    AllocationStateConflict {
        required: AllocationStatus,
        actual: AllocationStatus,
    },

    /// A refund would exceed the allocation's remaining balance beyond
    /// tolerance. Never clamped — clamping would corrupt the audit trail.
    #[error("OL_ERR_205: Refund {requested} exceeds remaining balance {remaining}")]
    RefundExceedsRemaining {
        requested: Decimal,
        remaining: Decimal,
    },

    /// Adding this allocation would push the allocation sum past the
    /// payment total.
    #[error("OL_ERR_206: Allocations {allocated} would exceed payment total {total}")]
    AllocationExceedsPayment { allocated: Decimal, total: Decimal },

    /// An escrow payment already exists for this order.
    #[error("OL_ERR_207: Escrow payment already exists for {0}")]
    DuplicatePayment(OrderId),

    // =================================================================
    // Refund Workflow Errors (3xx)
    // =================================================================
    /// The refund is not in the status the operation requires.
    #[error("OL_ERR_300: Refund is {actual}, operation requires {required}")]
    RefundStateConflict {
        required: RefundStatus,
        actual: RefundStatus,
    },

    /// The refund has used up its retry budget.
    #[error("OL_ERR_301: Refund {0} has exhausted its retries")]
    RefundRetriesExhausted(RefundId),

    /// Completion requires a non-empty provider transaction id.
    #[error("OL_ERR_302: Refund completion requires a provider transaction id")]
    MissingTransactionId,

    /// The requested refund record was not found.
    #[error("OL_ERR_303: Refund not found: {0}")]
    RefundNotFound(RefundId),

    // =================================================================
    // Payout Errors (4xx)
    // =================================================================
    /// The requested payout was not found.
    #[error("OL_ERR_400: Payout not found: {0}")]
    PayoutNotFound(PayoutId),

    /// The payout is not in the status the operation requires.
    #[error("OL_ERR_401: Payout is {actual}, operation requires {required}")]
    PayoutStateConflict {
        required: PayoutStatus,
        actual: PayoutStatus,
    },

    /// The allocation is not eligible for payout (shipment not delivered).
    #[error("OL_ERR_402: Allocation not eligible for payout: {0}")]
    AllocationNotEligible(AllocationId),

    /// The allocation is already claimed by an open payout.
    #[error("OL_ERR_403: Allocation {allocation} already claimed by {payout}")]
    AllocationAlreadyClaimed {
        allocation: AllocationId,
        payout: PayoutId,
    },

    /// A retry was attempted before `next_retry_at`, or with no retries left.
    #[error("OL_ERR_404: Payout {0} is not due for retry")]
    PayoutNotDueForRetry(PayoutId),

    /// Dispatch was attempted on a payout with no items.
    #[error("OL_ERR_405: Payout {0} has no items")]
    EmptyPayout(PayoutId),

    // =================================================================
    // Settlement Errors (5xx)
    // =================================================================
    /// The settlement is not in the status the operation requires.
    #[error("OL_ERR_500: Settlement is {actual}, operation requires {required}")]
    SettlementStateConflict {
        required: SettlementStatus,
        actual: SettlementStatus,
    },

    /// An item for this allocation (and item kind) already exists.
    #[error("OL_ERR_501: Settlement already has an item for {0}")]
    DuplicateSettlementItem(AllocationId),

    /// Optimistic concurrency check failed during regeneration.
    #[error("OL_ERR_502: Settlement version conflict: expected {expected}, found {actual}")]
    SettlementVersionConflict { expected: u32, actual: u32 },

    /// No settlement exists for this (store, year, month).
    #[error("OL_ERR_503: No settlement for {store} {year}-{month:02}")]
    SettlementNotFound { store: StoreId, year: i32, month: u32 },

    /// Approval requires a non-empty approver identity.
    #[error("OL_ERR_504: Settlement approval requires an approver identity")]
    ApproverRequired,

    // =================================================================
    // Commission Errors (6xx)
    // =================================================================
    /// No active commission rule resolves for the given scope and instant.
    /// This is a fatal configuration error, never a silent default.
    #[error("OL_ERR_600: No commission rule resolves for {store} at {at}")]
    NoCommissionRule { store: StoreId, at: DateTime<Utc> },

    // =================================================================
    // Provider Gateway Errors (7xx)
    // =================================================================
    /// The external gateway reported a failure.
    #[error("OL_ERR_700: Provider failure [{reference}]: {message}")]
    ProviderFailure { reference: String, message: String },

    /// The provider returned a status string outside the fixed lookup table.
    #[error("OL_ERR_701: Unknown provider status: {0:?}")]
    UnknownProviderStatus(String),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("OL_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Configuration error (invalid config values, missing rules, etc.).
    #[error("OL_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, LedgerError>;
