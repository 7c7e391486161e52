//! Fixed-point money values tied to a currency code.
//!
//! Every monetary field in the ledger is a [`Money`]: a `rust_decimal`
//! amount plus a validated 3-letter [`Currency`] code. Arithmetic across
//! currencies is a typed error, never a silent coercion — an aggregate
//! (payment, payout, settlement) holds exactly one currency.
//!
//! Rounding is always **half-to-even** (banker's rounding) at 2 decimal
//! places, so commission-refund math is reproducible across runs and
//! across reimplementations.

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{LedgerError, Result};

// ---------------------------------------------------------------------------
// Currency
// ---------------------------------------------------------------------------

/// A 3-letter uppercase ISO-4217 style currency code (e.g., "USD", "EUR").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Currency([u8; 3]);

impl Currency {
    /// Parse and validate a currency code: exactly three ASCII uppercase
    /// letters.
    ///
    /// # Errors
    /// Returns [`LedgerError::InvalidCurrency`] otherwise.
    pub fn new(code: &str) -> Result<Self> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_uppercase) {
            return Err(LedgerError::InvalidCurrency {
                code: code.to_string(),
            });
        }
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    /// The code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Constructor guarantees ASCII uppercase.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }

    /// Convenience constructor for tests and defaults.
    #[must_use]
    pub fn usd() -> Self {
        Self(*b"USD")
    }
}

impl FromStr for Currency {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Currency {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Self::new(&code).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Rounding
// ---------------------------------------------------------------------------

/// Round to 2 decimal places using half-to-even (banker's rounding).
#[must_use]
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(constants::MONEY_SCALE, RoundingStrategy::MidpointNearestEven)
}

/// The reconciliation tolerance: 0.01 currency units. Absorbs rounding
/// drift when checking "fully refunded" or "exceeds remaining balance".
#[must_use]
pub fn tolerance() -> Decimal {
    Decimal::new(constants::TOLERANCE_HUNDREDTHS, constants::MONEY_SCALE)
}

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// A fixed-point monetary value in a single currency.
///
/// Fields are private: construction goes through [`Money::new`] /
/// [`Money::zero`], and all arithmetic goes through the checked ops so a
/// cross-currency sum is unrepresentable in the result type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// A money value. Negative amounts are legal (settlement adjustments
    /// are signed); operations that require positivity check it themselves.
    #[must_use]
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Zero in the given currency.
    #[must_use]
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    #[must_use]
    pub fn currency(&self) -> Currency {
        self.currency
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// Same-currency addition.
    ///
    /// # Errors
    /// Returns [`LedgerError::CurrencyMismatch`] if the currencies differ.
    pub fn checked_add(&self, other: Money) -> Result<Money> {
        self.require_same_currency(other)?;
        Ok(Self::new(self.amount + other.amount, self.currency))
    }

    /// Same-currency subtraction.
    ///
    /// # Errors
    /// Returns [`LedgerError::CurrencyMismatch`] if the currencies differ.
    pub fn checked_sub(&self, other: Money) -> Result<Money> {
        self.require_same_currency(other)?;
        Ok(Self::new(self.amount - other.amount, self.currency))
    }

    /// This value rounded to 2 decimals, half-to-even.
    #[must_use]
    pub fn rounded(&self) -> Money {
        Self::new(round2(self.amount), self.currency)
    }

    /// Guard that `other` is in the same currency as `self`.
    ///
    /// # Errors
    /// Returns [`LedgerError::CurrencyMismatch`] if the currencies differ.
    pub fn require_same_currency(&self, other: Money) -> Result<()> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(LedgerError::CurrencyMismatch {
                expected: self.currency,
                actual: other.currency,
            })
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}
