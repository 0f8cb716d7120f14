use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{config::StripeConfig, errors::ServiceError};

/// A freshly created payment intent, as returned by the gateway.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub gateway_payment_id: String,
    pub client_secret: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentResponse {
    id: String,
    client_secret: String,
    status: String,
}

/// Converts a decimal amount to integer minor currency units (cents),
/// rounding half-up.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| {
            ServiceError::InternalError(format!("amount {} out of minor-unit range", amount))
        })
}

/// Outbound Stripe client. All transport and API failures surface as
/// `ServiceError::ServiceUnavailable` — never silently swallowed.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    api_base_url: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(config: &StripeConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client init: {}", e)))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    /// Creates a payment intent for an order. Currency is fixed to "usd";
    /// the order id travels in the intent metadata for webhook correlation.
    #[instrument(skip(self), fields(order_id = %order_id, amount = %amount))]
    pub async fn create_payment_intent(
        &self,
        amount: Decimal,
        order_id: Uuid,
    ) -> Result<PaymentIntent, ServiceError> {
        let amount_minor = to_minor_units(amount)?;
        let url = format!("{}/v1/payment_intents", self.api_base_url);

        let params = [
            ("amount", amount_minor.to_string()),
            ("currency", "usd".to_string()),
            ("metadata[order_id]", order_id.to_string()),
        ];

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!(order_id = %order_id, error = %e, "payment gateway unreachable");
                ServiceError::ServiceUnavailable(format!("payment gateway: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(order_id = %order_id, %status, "payment intent creation rejected");
            return Err(ServiceError::ServiceUnavailable(format!(
                "payment gateway returned {}: {}",
                status, body
            )));
        }

        let intent: PaymentIntentResponse = response.json().await.map_err(|e| {
            ServiceError::ServiceUnavailable(format!("payment gateway response: {}", e))
        })?;

        info!(
            order_id = %order_id,
            gateway_payment_id = %intent.id,
            status = %intent.status,
            "payment intent created"
        );

        Ok(PaymentIntent {
            gateway_payment_id: intent.id,
            client_secret: intent.client_secret,
            status: intent.status,
        })
    }
}
