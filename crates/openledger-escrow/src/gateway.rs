//! Payment provider seam.
//!
//! The provider is an opaque external gateway. Implementations own their
//! transport and timeout policy; a timed-out call must come back as a
//! [`GatewayFailure`], never hang the workflow in Processing.

use openledger_types::{GatewayFailure, GatewayReceipt, Money};

/// An opaque payment provider executing captures and refunds.
pub trait PaymentGateway {
    /// Execute a transfer of `amount` under the caller's idempotent
    /// `reference`. Returns the provider's transaction id and raw status
    /// string.
    fn execute(
        &mut self,
        amount: Money,
        reference: &str,
    ) -> std::result::Result<GatewayReceipt, GatewayFailure>;
}

/// Scripted in-memory gateway for tests: plays back queued responses and
/// records every call. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
pub struct ScriptedGateway {
    script: std::collections::VecDeque<std::result::Result<GatewayReceipt, GatewayFailure>>,
    calls: Vec<(Money, String)>,
}

#[cfg(any(test, feature = "test-helpers"))]
impl ScriptedGateway {
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: std::collections::VecDeque::new(),
            calls: Vec::new(),
        }
    }

    /// Queue a successful response with the given transaction id and raw
    /// provider status string.
    pub fn push_success(&mut self, transaction_id: &str, status: &str) {
        self.script.push_back(Ok(GatewayReceipt {
            transaction_id: transaction_id.to_string(),
            status: status.to_string(),
        }));
    }

    /// Queue a failure response.
    pub fn push_failure(&mut self, error_reference: &str, message: &str) {
        self.script.push_back(Err(GatewayFailure {
            error_reference: error_reference.to_string(),
            message: message.to_string(),
        }));
    }

    /// Every `(amount, reference)` the gateway has seen, in order.
    #[must_use]
    pub fn calls(&self) -> &[(Money, String)] {
        &self.calls
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl PaymentGateway for ScriptedGateway {
    fn execute(
        &mut self,
        amount: Money,
        reference: &str,
    ) -> std::result::Result<GatewayReceipt, GatewayFailure> {
        self.calls.push((amount, reference.to_string()));
        self.script.pop_front().unwrap_or_else(|| {
            Err(GatewayFailure {
                error_reference: "SCRIPT-EXHAUSTED".to_string(),
                message: "scripted gateway has no response queued".to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openledger_types::Currency;
    use rust_decimal::Decimal;

    #[test]
    fn scripted_gateway_plays_back_in_order() {
        let mut gw = ScriptedGateway::new();
        gw.push_success("TX-1", "SUCCESS");
        gw.push_failure("ERR-1", "declined");

        let amount = Money::new(Decimal::new(100, 2), Currency::usd());
        let first = gw.execute(amount, "REF-1").unwrap();
        assert_eq!(first.transaction_id, "TX-1");

        let second = gw.execute(amount, "REF-2").unwrap_err();
        assert_eq!(second.error_reference, "ERR-1");

        // Exhausted script fails loudly instead of fabricating success.
        let third = gw.execute(amount, "REF-3").unwrap_err();
        assert_eq!(third.error_reference, "SCRIPT-EXHAUSTED");

        assert_eq!(gw.calls().len(), 3);
        assert_eq!(gw.calls()[0].1, "REF-1");
    }
}
