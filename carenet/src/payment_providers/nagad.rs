//! Nagad payment gateway client.

use super::{InitiatedPayment, PaymentProvider, ProviderError, VerifyOutcome};
use crate::config::GatewayConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

pub struct NagadProvider {
    client: reqwest::Client,
    base_url: Url,
    merchant_id: String,
    merchant_key: String,
}

#[derive(Debug, Serialize)]
struct CheckoutRequest<'a> {
    #[serde(rename = "merchantId")]
    merchant_id: &'a str,
    #[serde(rename = "orderId")]
    order_id: &'a str,
    amount: String,
    currency: &'a str,
}

#[derive(Debug, Deserialize)]
struct CheckoutResponse {
    status: String,
    #[serde(rename = "paymentReferenceId")]
    payment_reference_id: String,
    #[serde(rename = "callBackUrl")]
    callback_url: Option<Url>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: String,
    #[serde(rename = "issuerPaymentRefNo")]
    issuer_payment_ref: Option<String>,
}

#[derive(Debug, Serialize)]
struct RefundRequest<'a> {
    #[serde(rename = "merchantId")]
    merchant_id: &'a str,
    #[serde(rename = "originalRefNo")]
    original_ref: &'a str,
    amount: String,
    currency: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    status: String,
    message: Option<String>,
}

impl NagadProvider {
    pub fn new(config: &GatewayConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            merchant_id: config.app_key.clone(),
            merchant_key: config.app_secret.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::Malformed(format!("invalid gateway path {path}: {e}")))
    }
}

#[async_trait::async_trait]
impl PaymentProvider for NagadProvider {
    fn name(&self) -> &'static str {
        "nagad"
    }

    async fn initiate(
        &self,
        invoice_number: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<InitiatedPayment, ProviderError> {
        let response: CheckoutResponse = self
            .client
            .post(self.endpoint("api/dfs/check-out/initialize")?)
            .header("X-KM-Api-Key", &self.merchant_key)
            .json(&CheckoutRequest {
                merchant_id: &self.merchant_id,
                order_id: invoice_number,
                amount: amount.to_string(),
                currency,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.status != "Success" {
            return Err(ProviderError::Rejected(
                response.message.unwrap_or(response.status),
            ));
        }

        Ok(InitiatedPayment {
            gateway_ref: response.payment_reference_id,
            redirect_url: response.callback_url,
        })
    }

    async fn verify(&self, gateway_ref: &str) -> Result<VerifyOutcome, ProviderError> {
        let response: VerifyResponse = self
            .client
            .get(self.endpoint(&format!("api/dfs/verify/payment/{gateway_ref}"))?)
            .header("X-KM-Api-Key", &self.merchant_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response.status.as_str() {
            "Success" => {
                let transaction_id = response
                    .issuer_payment_ref
                    .ok_or_else(|| ProviderError::Malformed("successful payment without reference".to_string()))?;
                Ok(VerifyOutcome::Confirmed { transaction_id })
            }
            _ => Ok(VerifyOutcome::Declined),
        }
    }

    async fn refund(&self, transaction_id: &str, amount: Decimal, currency: &str) -> Result<(), ProviderError> {
        let response: RefundResponse = self
            .client
            .post(self.endpoint("api/dfs/refund")?)
            .header("X-KM-Api-Key", &self.merchant_key)
            .json(&RefundRequest {
                merchant_id: &self.merchant_id,
                original_ref: transaction_id,
                amount: amount.to_string(),
                currency,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.status != "Success" {
            return Err(ProviderError::Rejected(
                response.message.unwrap_or(response.status),
            ));
        }
        Ok(())
    }
}
