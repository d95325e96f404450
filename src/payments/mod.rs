use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, instrument};

use crate::errors::ServiceError;

/// Line item forwarded to the hosted checkout page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayLineItem {
    pub name: String,
    pub quantity: i32,
    pub unit_amount: Decimal,
    pub currency: String,
}

/// Request for a hosted checkout session.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSessionRequest {
    pub reference: String,
    pub customer_email: String,
    pub line_items: Vec<GatewayLineItem>,
    pub discount_amount: Decimal,
    pub credit_amount: Decimal,
    pub shipping_amount: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Request for a supplementary payment link on an existing order.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentLinkRequest {
    pub reference: String,
    pub customer_email: String,
    pub line_items: Vec<GatewayLineItem>,
    pub total: Decimal,
    pub currency: String,
    pub note: Option<String>,
}

/// Hosted session handle returned by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySession {
    pub session_id: String,
    pub checkout_url: String,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<String>,
}

/// Hosted-payment collaborator boundary.
///
/// The composer never performs payment-network I/O itself; everything
/// crosses this trait so tests can substitute a recording mock.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<GatewaySession, ServiceError>;

    async fn create_payment_link(
        &self,
        request: PaymentLinkRequest,
    ) -> Result<GatewaySession, ServiceError>;
}

/// Stripe-shaped HTTP implementation of [`PaymentGateway`].
#[derive(Clone)]
pub struct StripeCheckoutGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl StripeCheckoutGateway {
    pub fn new(base_url: String, secret_key: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
        }
    }

    async fn post_session<B: Serialize + std::fmt::Debug>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<GatewaySession, ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!("payment gateway request to {} failed: {}", url, e);
                ServiceError::ExternalServiceError(format!(
                    "Payment gateway unreachable: {}",
                    e
                ))
            })?;

        let status = response.status();
        if status.is_success() {
            response.json::<GatewaySession>().await.map_err(|e| {
                ServiceError::ExternalServiceError(format!(
                    "Invalid payment gateway response: {}",
                    e
                ))
            })
        } else {
            // Backend-reported failures carry the message plus any
            // structured error details, concatenated for display.
            let parsed = response.json::<GatewayErrorBody>().await.ok();
            let message = match parsed {
                Some(body) => {
                    let mut msg = body
                        .message
                        .unwrap_or_else(|| format!("Gateway returned {}", status));
                    if !body.errors.is_empty() {
                        msg = format!("{}: {}", msg, body.errors.join("; "));
                    }
                    msg
                }
                None => format!("Gateway returned {}", status),
            };
            Err(ServiceError::PaymentFailed(message))
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeCheckoutGateway {
    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        self.post_session("/checkout/sessions", &request).await
    }

    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn create_payment_link(
        &self,
        request: PaymentLinkRequest,
    ) -> Result<GatewaySession, ServiceError> {
        self.post_session("/payment_links", &request).await
    }
}
