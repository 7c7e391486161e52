//! System-wide constants for the OpenLedger settlement ledger.

/// Decimal places for all monetary amounts.
pub const MONEY_SCALE: u32 = 2;

/// Reconciliation tolerance in hundredths of a currency unit (0.01).
pub const TOLERANCE_HUNDREDTHS: i64 = 1;

/// Maximum payout dispatch attempts before the payout becomes terminal
/// and requires manual intervention.
pub const MAX_PAYOUT_RETRIES: u32 = 3;

/// Maximum refund execution attempts.
pub const MAX_REFUND_RETRIES: u32 = 3;

/// Base of the payout retry backoff: delay = BACKOFF_BASE ^ retry_count hours.
pub const BACKOFF_BASE_HOURS: u32 = 4;

/// Prefix of refund idempotency keys.
pub const REFUND_KEY_PREFIX: &str = "REFUND";

/// Prefix of derived settlement numbers.
pub const SETTLEMENT_NUMBER_PREFIX: &str = "STL";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Ledger name.
pub const LEDGER_NAME: &str = "OpenLedger";
