//! Payment gateway integrations.
//!
//! A [`PaymentProvider`] initiates checkout, verifies completion, and issues
//! refunds against an external gateway. The bKash and Nagad providers speak
//! JSON over HTTPS to configured base URLs; the dummy provider is
//! deterministic and in-memory for development and tests.
//!
//! Refunds are idempotent at the gateway, keyed by transaction id, so the
//! refund path can be retried after a crash between the gateway call and the
//! local commit.

pub mod bkash;
pub mod dummy;
pub mod nagad;

use crate::config::PaymentConfig;
use rust_decimal::Decimal;
use std::sync::Arc;
use url::Url;

pub use bkash::BkashProvider;
pub use dummy::DummyProvider;
pub use nagad::NagadProvider;

/// Gateway-side errors, kept separate from [`crate::errors::Error`] so
/// handlers can decide how a gateway failure maps onto the response.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP call itself failed (connect, timeout, TLS)
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered but rejected the request
    #[error("gateway rejected the request: {0}")]
    Rejected(String),

    /// The gateway answered with a payload we could not interpret
    #[error("unexpected gateway response: {0}")]
    Malformed(String),
}

/// A newly initiated checkout.
#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    /// Gateway reference for this checkout, stored as the payment's
    /// transaction id until confirmation replaces it with the final one
    pub gateway_ref: String,
    /// Hosted checkout page to send the payer to, when the gateway uses one
    pub redirect_url: Option<Url>,
}

/// Result of asking the gateway whether a checkout completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Payer completed checkout; `transaction_id` is the settled gateway
    /// transaction id
    Confirmed { transaction_id: String },
    /// Payer abandoned or the gateway declined
    Declined,
}

#[async_trait::async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Short provider name for logs and audit metadata
    fn name(&self) -> &'static str;

    /// Start a checkout for the given invoice.
    async fn initiate(&self, invoice_number: &str, amount: Decimal, currency: &str)
        -> Result<InitiatedPayment, ProviderError>;

    /// Ask the gateway whether the checkout behind `gateway_ref` completed.
    async fn verify(&self, gateway_ref: &str) -> Result<VerifyOutcome, ProviderError>;

    /// Refund a settled transaction. Idempotent per transaction id.
    async fn refund(&self, transaction_id: &str, amount: Decimal, currency: &str) -> Result<(), ProviderError>;
}

/// Build the provider selected by configuration.
pub fn from_config(config: &PaymentConfig) -> Result<Arc<dyn PaymentProvider>, ProviderError> {
    let provider: Arc<dyn PaymentProvider> = match config {
        PaymentConfig::Bkash(gateway) => Arc::new(BkashProvider::new(gateway)?),
        PaymentConfig::Nagad(gateway) => Arc::new(NagadProvider::new(gateway)?),
        PaymentConfig::Dummy => Arc::new(DummyProvider::default()),
    };
    Ok(provider)
}
