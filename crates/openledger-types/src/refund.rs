//! # Refund — a standalone retryable unit of work
//!
//! A [`Refund`] records the intent to send money back to a buyer,
//! independent of which allocation(s) it affects. It is driven by the
//! refund workflow against the payment provider and may be retried a
//! bounded number of times.
//!
//! ## State machine
//!
//! ```text
//!   ┌─────────┐  start   ┌────────────┐  complete   ┌───────────┐
//!   │ PENDING ├─────────▶│ PROCESSING ├────────────▶│ COMPLETED │
//!   └────▲────┘          └──────┬─────┘             └───────────┘
//!        │ reset_for_retry      │ fail / reject
//!        │ (retry budget left)  ▼
//!        │               ┌────────┐   ┌──────────┐
//!        └───────────────┤ FAILED │   │ REJECTED │
//!                        └────────┘   └──────────┘
//! ```
//!
//! COMPLETED and REJECTED are terminal. FAILED returns to PENDING only
//! through [`Refund::reset_for_retry`], gated by the retry budget.
//! Completion requires a non-empty provider transaction id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{LedgerError, Result};
use crate::ids::{OrderId, RefundId};
use crate::money::Money;

/// Lifecycle state of a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefundStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Rejected,
}

impl RefundStatus {
    /// Can this refund transition to the given target state?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Processing | Self::Rejected)
                | (
                    Self::Processing,
                    Self::Completed | Self::Failed | Self::Rejected
                )
                | (Self::Failed, Self::Pending)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }
}

impl std::fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// A refund intent with retry accounting and a creation-unique
/// idempotency key, so retried client requests do not create duplicate
/// refund intents upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    id: RefundId,
    order_id: OrderId,
    amount: Money,
    reason: String,
    status: RefundStatus,
    retry_count: u32,
    max_retries: u32,
    /// `"REFUND-{orderId}-{random}"`, generated once at creation.
    idempotency_key: String,
    /// Provider transaction id, set on completion.
    transaction_id: Option<String>,
    /// Last provider failure message, if any.
    failure_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Refund {
    /// Create a refund intent for an order.
    ///
    /// # Errors
    /// Returns [`LedgerError::InvalidAmount`] unless the amount is positive.
    pub fn new(order_id: OrderId, amount: Money, reason: impl Into<String>) -> Result<Self> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount {
                reason: format!("refund amount must be positive, got {amount}"),
            });
        }
        let now = Utc::now();
        Ok(Self {
            id: RefundId::new(),
            order_id,
            amount,
            reason: reason.into(),
            status: RefundStatus::Pending,
            retry_count: 0,
            max_retries: constants::MAX_REFUND_RETRIES,
            idempotency_key: Self::generate_idempotency_key(order_id),
            transaction_id: None,
            failure_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn generate_idempotency_key(order_id: OrderId) -> String {
        let entropy: u64 = rand::random();
        format!(
            "{}-{}-{:016x}",
            constants::REFUND_KEY_PREFIX,
            order_id.0.simple(),
            entropy
        )
    }

    #[must_use]
    pub fn id(&self) -> RefundId {
        self.id
    }

    #[must_use]
    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    #[must_use]
    pub fn amount(&self) -> Money {
        self.amount
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    #[must_use]
    pub fn status(&self) -> RefundStatus {
        self.status
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[must_use]
    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    #[must_use]
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    #[must_use]
    pub fn failure_message(&self) -> Option<&str> {
        self.failure_message.as_deref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether a failed refund may still be reset for another attempt.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.status == RefundStatus::Failed && self.retry_count < self.max_retries
    }

    /// PENDING → PROCESSING.
    pub fn start_processing(&mut self) -> Result<()> {
        self.transition(RefundStatus::Processing)
    }

    /// PROCESSING → COMPLETED. Requires a non-empty provider transaction id.
    pub fn complete(&mut self, transaction_id: &str) -> Result<()> {
        if transaction_id.is_empty() {
            return Err(LedgerError::MissingTransactionId);
        }
        self.transition(RefundStatus::Completed)?;
        self.transaction_id = Some(transaction_id.to_string());
        Ok(())
    }

    /// PROCESSING → FAILED, counting the attempt and keeping the message.
    pub fn fail(&mut self, message: &str) -> Result<()> {
        self.transition(RefundStatus::Failed)?;
        self.retry_count += 1;
        self.failure_message = Some(message.to_string());
        Ok(())
    }

    /// PENDING|PROCESSING → REJECTED (terminal; e.g. manual review denial).
    pub fn reject(&mut self, message: &str) -> Result<()> {
        self.transition(RefundStatus::Rejected)?;
        self.failure_message = Some(message.to_string());
        Ok(())
    }

    /// FAILED → PENDING, if the retry budget allows.
    ///
    /// # Errors
    /// [`LedgerError::RefundRetriesExhausted`] once `retry_count` reaches
    /// the cap; a state conflict if the refund is not FAILED.
    pub fn reset_for_retry(&mut self) -> Result<()> {
        if self.status == RefundStatus::Failed && self.retry_count >= self.max_retries {
            return Err(LedgerError::RefundRetriesExhausted(self.id));
        }
        self.transition(RefundStatus::Pending)
    }

    fn transition(&mut self, target: RefundStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(LedgerError::RefundStateConflict {
                required: match target {
                    RefundStatus::Processing => RefundStatus::Pending,
                    RefundStatus::Pending => RefundStatus::Failed,
                    _ => RefundStatus::Processing,
                },
                actual: self.status,
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }
}
