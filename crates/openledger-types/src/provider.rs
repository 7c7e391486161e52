//! Provider gateway surface: receipts, failures, and the fixed status
//! lookup table.
//!
//! Payment and payout providers are opaque external gateways. Their
//! status strings are mapped to the internal [`ProviderStatus`] through
//! a fixed keyword table; anything outside the table is a typed error,
//! never a silent default bucket.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

/// Internal view of a provider-reported payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Paid => write!(f, "PAID"),
            Self::Failed => write!(f, "FAILED"),
            Self::Refunded => write!(f, "REFUNDED"),
        }
    }
}

/// Map a provider status string through the fixed lookup table.
///
/// Matching is case-insensitive on the trimmed input:
/// - `SUCCESS | COMPLETED | PAID` → [`ProviderStatus::Paid`]
/// - `PENDING | PROCESSING` → [`ProviderStatus::Pending`]
/// - `FAILED | DECLINED | CANCELLED` → [`ProviderStatus::Failed`]
/// - `REFUNDED | CHARGEBACK` → [`ProviderStatus::Refunded`]
///
/// # Errors
/// Returns [`LedgerError::UnknownProviderStatus`] for anything else.
pub fn map_provider_status(raw: &str) -> Result<ProviderStatus> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "SUCCESS" | "COMPLETED" | "PAID" => Ok(ProviderStatus::Paid),
        "PENDING" | "PROCESSING" => Ok(ProviderStatus::Pending),
        "FAILED" | "DECLINED" | "CANCELLED" => Ok(ProviderStatus::Failed),
        "REFUNDED" | "CHARGEBACK" => Ok(ProviderStatus::Refunded),
        _ => Err(LedgerError::UnknownProviderStatus(raw.to_string())),
    }
}

/// Successful gateway execution: the provider's transaction id plus its
/// raw status string (mapped by the caller via [`map_provider_status`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayReceipt {
    pub transaction_id: String,
    pub status: String,
}

/// A gateway-reported failure. Timeouts must surface through this shape
/// too — a provider call is never left hanging in Processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayFailure {
    pub error_reference: String,
    pub message: String,
}

impl From<GatewayFailure> for LedgerError {
    fn from(failure: GatewayFailure) -> Self {
        LedgerError::ProviderFailure {
            reference: failure.error_reference,
            message: failure.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paid_keywords() {
        for raw in ["SUCCESS", "COMPLETED", "PAID", "paid", " Success "] {
            assert_eq!(map_provider_status(raw).unwrap(), ProviderStatus::Paid);
        }
    }

    #[test]
    fn pending_keywords() {
        for raw in ["PENDING", "PROCESSING", "processing"] {
            assert_eq!(map_provider_status(raw).unwrap(), ProviderStatus::Pending);
        }
    }

    #[test]
    fn failed_keywords() {
        for raw in ["FAILED", "DECLINED", "CANCELLED", "declined"] {
            assert_eq!(map_provider_status(raw).unwrap(), ProviderStatus::Failed);
        }
    }

    #[test]
    fn refunded_keywords() {
        for raw in ["REFUNDED", "CHARGEBACK"] {
            assert_eq!(map_provider_status(raw).unwrap(), ProviderStatus::Refunded);
        }
    }

    #[test]
    fn unknown_status_is_typed_error() {
        let err = map_provider_status("HELD_AT_BANK").unwrap_err();
        assert!(matches!(err, LedgerError::UnknownProviderStatus(s) if s == "HELD_AT_BANK"));
    }

    #[test]
    fn gateway_failure_converts_to_provider_error() {
        let failure = GatewayFailure {
            error_reference: "ERR-42".to_string(),
            message: "connection timed out".to_string(),
        };
        let err: LedgerError = failure.into();
        let msg = format!("{err}");
        assert!(msg.contains("OL_ERR_700"));
        assert!(msg.contains("ERR-42"));
        assert!(msg.contains("timed out"));
    }
}
