use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{order, Order},
    errors::ServiceError,
    events::{Event, EventSender},
    payments::{GatewayLineItem, PaymentGateway, PaymentLinkRequest},
    services::totals::parse_money,
};

/// Supplemental item an operator adds to an existing order.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AdditionalItemInput {
    pub product_name: String,
    pub quantity: i32,
    #[serde(default)]
    pub unit_price: Option<Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePaymentLinkInput {
    pub order_id: Uuid,
    pub additional_items: Vec<AdditionalItemInput>,
    pub customer_email: Option<String>,
    pub order_note: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentLinkResult {
    pub success: bool,
    pub session_id: String,
    pub checkout_url: String,
    pub total: Decimal,
    pub message: String,
}

/// Follow-up payment requests for extra items discovered after the original
/// checkout (upsells, rush fees). Independent of the discount/credit/reorder
/// state of the main flow.
#[derive(Clone)]
pub struct PaymentLinkService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    gateway: Arc<dyn PaymentGateway>,
}

struct ValidItem {
    name: String,
    quantity: i32,
    unit_price: Decimal,
}

impl PaymentLinkService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            db,
            event_sender,
            gateway,
        }
    }

    /// A valid item has a non-empty name, quantity > 0 and unit price > 0.
    /// Invalid rows are dropped with a warning; the request is rejected
    /// before any gateway call when nothing valid remains.
    fn validate_items(items: &[AdditionalItemInput]) -> Vec<ValidItem> {
        items
            .iter()
            .filter_map(|item| {
                let name = item.product_name.trim();
                let unit_price = parse_money(item.unit_price.as_ref());
                if name.is_empty() || item.quantity <= 0 || unit_price <= Decimal::ZERO {
                    warn!(
                        "dropping invalid additional item (name={:?}, qty={}, price={})",
                        item.product_name, item.quantity, unit_price
                    );
                    return None;
                }
                Some(ValidItem {
                    name: name.to_string(),
                    quantity: item.quantity,
                    unit_price,
                })
            })
            .collect()
    }

    #[instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub async fn create_link(
        &self,
        input: CreatePaymentLinkInput,
    ) -> Result<PaymentLinkResult, ServiceError> {
        let valid_items = Self::validate_items(&input.additional_items);
        if valid_items.is_empty() {
            return Err(ServiceError::InvalidInput(
                "At least one valid item (name, quantity > 0, price > 0) is required".to_string(),
            ));
        }

        let order_row: order::Model = Order::find_by_id(input.order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", input.order_id))
            })?;

        let customer_email = input
            .customer_email
            .clone()
            .unwrap_or_else(|| order_row.customer_email.clone());

        let total: Decimal = valid_items
            .iter()
            .map(|i| i.unit_price * Decimal::from(i.quantity))
            .sum::<Decimal>()
            .round_dp(2);

        let session = self
            .gateway
            .create_payment_link(PaymentLinkRequest {
                reference: format!("{}-ADD", order_row.order_number),
                customer_email,
                line_items: valid_items
                    .iter()
                    .map(|i| GatewayLineItem {
                        name: i.name.clone(),
                        quantity: i.quantity,
                        unit_amount: i.unit_price,
                        currency: order_row.currency.clone(),
                    })
                    .collect(),
                total,
                currency: order_row.currency.clone(),
                note: input.order_note.clone(),
            })
            .await?;

        self.event_sender
            .send(Event::PaymentLinkCreated {
                order_id: order_row.id,
                gateway_session_id: session.session_id.clone(),
            })
            .await;

        info!(
            "Payment link {} created for order {}",
            session.session_id, order_row.id
        );

        Ok(PaymentLinkResult {
            success: true,
            session_id: session.session_id,
            checkout_url: session.checkout_url,
            total,
            message: "Payment link created".to_string(),
        })
    }
}
