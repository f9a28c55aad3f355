//! bKash tokenized checkout gateway client.

use super::{InitiatedPayment, PaymentProvider, ProviderError, VerifyOutcome};
use crate::config::GatewayConfig;
use base64::Engine;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

pub struct BkashProvider {
    client: reqwest::Client,
    base_url: Url,
    auth_header: String,
}

#[derive(Debug, Serialize)]
struct CreatePaymentRequest<'a> {
    #[serde(rename = "merchantInvoiceNumber")]
    merchant_invoice_number: &'a str,
    amount: String,
    currency: &'a str,
    intent: &'static str,
}

#[derive(Debug, Deserialize)]
struct CreatePaymentResponse {
    #[serde(rename = "paymentID")]
    payment_id: String,
    #[serde(rename = "bkashURL")]
    bkash_url: Option<Url>,
    #[serde(rename = "statusCode")]
    status_code: String,
    #[serde(rename = "statusMessage")]
    status_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryPaymentResponse {
    #[serde(rename = "transactionStatus")]
    transaction_status: String,
    #[serde(rename = "trxID")]
    trx_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct RefundRequest<'a> {
    #[serde(rename = "trxID")]
    trx_id: &'a str,
    amount: String,
    currency: &'a str,
    reason: &'static str,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    #[serde(rename = "statusCode")]
    status_code: String,
    #[serde(rename = "statusMessage")]
    status_message: Option<String>,
}

// bKash's success code for the tokenized checkout API
const STATUS_OK: &str = "0000";

impl BkashProvider {
    pub fn new(config: &GatewayConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let credentials = format!("{}:{}", config.app_key, config.app_secret);
        let auth_header = format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(credentials));

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            auth_header,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::Malformed(format!("invalid gateway path {path}: {e}")))
    }
}

#[async_trait::async_trait]
impl PaymentProvider for BkashProvider {
    fn name(&self) -> &'static str {
        "bkash"
    }

    async fn initiate(
        &self,
        invoice_number: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<InitiatedPayment, ProviderError> {
        let response: CreatePaymentResponse = self
            .client
            .post(self.endpoint("checkout/create")?)
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .json(&CreatePaymentRequest {
                merchant_invoice_number: invoice_number,
                amount: amount.to_string(),
                currency,
                intent: "sale",
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.status_code != STATUS_OK {
            return Err(ProviderError::Rejected(
                response.status_message.unwrap_or(response.status_code),
            ));
        }

        Ok(InitiatedPayment {
            gateway_ref: response.payment_id,
            redirect_url: response.bkash_url,
        })
    }

    async fn verify(&self, gateway_ref: &str) -> Result<VerifyOutcome, ProviderError> {
        let response: QueryPaymentResponse = self
            .client
            .get(self.endpoint(&format!("checkout/payment/status/{gateway_ref}"))?)
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response.transaction_status.as_str() {
            "Completed" => {
                let transaction_id = response
                    .trx_id
                    .ok_or_else(|| ProviderError::Malformed("completed payment without trxID".to_string()))?;
                Ok(VerifyOutcome::Confirmed { transaction_id })
            }
            _ => Ok(VerifyOutcome::Declined),
        }
    }

    async fn refund(&self, transaction_id: &str, amount: Decimal, currency: &str) -> Result<(), ProviderError> {
        let response: RefundResponse = self
            .client
            .post(self.endpoint("checkout/payment/refund")?)
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .json(&RefundRequest {
                trx_id: transaction_id,
                amount: amount.to_string(),
                currency,
                reason: "escrow refund",
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.status_code != STATUS_OK {
            return Err(ProviderError::Rejected(
                response.status_message.unwrap_or(response.status_code),
            ));
        }
        Ok(())
    }
}
