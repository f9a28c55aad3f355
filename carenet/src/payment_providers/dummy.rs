//! Deterministic in-memory payment provider for development and tests.

use super::{InitiatedPayment, PaymentProvider, ProviderError, VerifyOutcome};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

/// Every initiated checkout verifies as confirmed, with the settled
/// transaction id derived from the gateway reference. Refunds are recorded
/// so tests can assert on them, and repeating a refund is a no-op.
#[derive(Debug, Default)]
pub struct DummyProvider {
    refunded: Mutex<HashSet<String>>,
}

impl DummyProvider {
    /// Whether a refund was issued for this transaction id.
    pub fn was_refunded(&self, transaction_id: &str) -> bool {
        self.refunded.lock().unwrap().contains(transaction_id)
    }
}

#[async_trait::async_trait]
impl PaymentProvider for DummyProvider {
    fn name(&self) -> &'static str {
        "dummy"
    }

    async fn initiate(
        &self,
        _invoice_number: &str,
        _amount: Decimal,
        _currency: &str,
    ) -> Result<InitiatedPayment, ProviderError> {
        Ok(InitiatedPayment {
            gateway_ref: format!("DUMMY-{}", Uuid::new_v4().simple()),
            redirect_url: None,
        })
    }

    async fn verify(&self, gateway_ref: &str) -> Result<VerifyOutcome, ProviderError> {
        if let Some(suffix) = gateway_ref.strip_prefix("DUMMY-") {
            Ok(VerifyOutcome::Confirmed {
                transaction_id: format!("DTXN-{suffix}"),
            })
        } else {
            Ok(VerifyOutcome::Declined)
        }
    }

    async fn refund(&self, transaction_id: &str, _amount: Decimal, _currency: &str) -> Result<(), ProviderError> {
        self.refunded.lock().unwrap().insert(transaction_id.to_string());
        Ok(())
    }
}
