use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{discount_code::DiscountType, order, order_item},
    errors::ServiceError,
    events::{Event, EventSender},
    payments::{CheckoutSessionRequest, GatewayLineItem, PaymentGateway},
    services::{
        discount_codes::{DiscountCodeService, DiscountLookup},
        reorder::{ReorderDiscountPolicy, ReorderDiscountState},
        sessions::DiscountSessionStore,
        totals::{line_total, parse_money, DiscountSource, OrderTotalComposer, OrderTotals},
    },
};

const DEFAULT_CURRENCY: &str = "USD";

/// Cart line item as submitted by the storefront. Prices arrive as loose
/// JSON because upstream cart data can carry missing or malformed fields;
/// they are coerced defensively, never trusted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItemInput {
    pub product_id: String,
    pub product_name: String,
    pub product_category: Option<String>,
    pub sku: Option<String>,
    pub quantity: i32,
    #[serde(default)]
    pub unit_price: Option<Value>,
    #[serde(default)]
    pub total_price: Option<Value>,
    pub calculator_selections: Option<Value>,
    pub custom_files: Option<Value>,
    pub customer_notes: Option<String>,
    pub instagram_handle: Option<String>,
    #[serde(default)]
    pub instagram_opt_in: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCheckoutSessionInput {
    #[validate(length(min = 1, message = "Cart must contain at least one item"))]
    pub items: Vec<CartItemInput>,
    #[validate(email)]
    pub customer_email: String,
    pub customer_id: Option<Uuid>,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
    pub order_note: Option<String>,
    /// Discount session to settle and discard once the order is placed.
    pub discount_session_id: Option<Uuid>,
    pub discount_code: Option<String>,
    /// Client-computed discount, used only for drift detection.
    #[serde(default)]
    pub discount_amount: Option<Value>,
    #[serde(default)]
    pub credits_to_apply: Option<Value>,
    #[serde(default)]
    pub has_reorder_discount: bool,
    #[serde(default)]
    pub reorder_discount_amount: Option<Value>,
    #[serde(default)]
    pub shipping_amount: Option<Value>,
    #[serde(default)]
    pub tax_amount: Option<Value>,
    #[serde(default)]
    pub blind_shipment: bool,
    #[serde(default)]
    pub is_guest: bool,
    pub currency: Option<String>,
}

/// Successful hand-off to the hosted payment page.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutSessionResult {
    pub success: bool,
    pub session_id: String,
    pub checkout_url: String,
    pub customer_order: order::Model,
    pub totals: OrderTotals,
    pub message: String,
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    discount_codes: Arc<DiscountCodeService>,
    sessions: Arc<DiscountSessionStore>,
    gateway: Arc<dyn PaymentGateway>,
    policy: Arc<ReorderDiscountPolicy>,
    success_url: String,
    cancel_url: String,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        discount_codes: Arc<DiscountCodeService>,
        sessions: Arc<DiscountSessionStore>,
        gateway: Arc<dyn PaymentGateway>,
        policy: ReorderDiscountPolicy,
        success_url: String,
        cancel_url: String,
    ) -> Self {
        Self {
            db,
            event_sender,
            discount_codes,
            sessions,
            gateway,
            policy: Arc::new(policy),
            success_url,
            cancel_url,
        }
    }

    /// Composes the order total and creates a hosted checkout session.
    ///
    /// Exactly one of {discount code, reorder discount} may contribute, and
    /// store credit never combines with a code. The discount code is
    /// re-validated server-side against the computed subtotal; the usage
    /// count is consumed here, when the order is placed, not at validation.
    #[instrument(skip(self, input), fields(customer = %input.customer_email))]
    pub async fn create_session(
        &self,
        input: CreateCheckoutSessionInput,
    ) -> Result<CheckoutSessionResult, ServiceError> {
        input.validate()?;

        let currency = input
            .currency
            .clone()
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        // Coerce every line defensively before any math.
        let lines: Vec<SanitizedLine> = input.items.iter().map(SanitizedLine::from).collect();
        let subtotal: Decimal = lines.iter().map(|l| l.total_price).sum();

        let credit_amount = parse_money(input.credits_to_apply.as_ref());
        let (source, free_shipping, code_id) =
            self.resolve_discount_source(&input, subtotal, credit_amount).await?;

        let shipping_amount = if free_shipping {
            Decimal::ZERO
        } else {
            parse_money(input.shipping_amount.as_ref())
        };
        let tax_amount = parse_money(input.tax_amount.as_ref());

        let totals = OrderTotalComposer::compose(
            subtotal,
            &source,
            credit_amount,
            shipping_amount,
            tax_amount,
        );

        let order_id = Uuid::new_v4();
        let order_number = format!("SS-{}", &order_id.simple().to_string()[..8].to_uppercase());

        let session = self
            .gateway
            .create_checkout_session(CheckoutSessionRequest {
                reference: order_number.clone(),
                customer_email: input.customer_email.clone(),
                line_items: lines
                    .iter()
                    .map(|l| GatewayLineItem {
                        name: l.product_name.clone(),
                        quantity: l.quantity,
                        unit_amount: l.unit_price,
                        currency: currency.clone(),
                    })
                    .collect(),
                discount_amount: totals.discount_amount,
                credit_amount: totals.credit_amount,
                shipping_amount: totals.shipping_amount,
                tax_amount: totals.tax_amount,
                total: totals.total,
                currency: currency.clone(),
                success_url: self.success_url.clone(),
                cancel_url: self.cancel_url.clone(),
            })
            .await?;

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number),
            customer_email: Set(input.customer_email.clone()),
            customer_id: Set(input.customer_id),
            status: Set("pending".to_string()),
            payment_status: Set("awaiting_payment".to_string()),
            subtotal: Set(totals.subtotal),
            discount_code: Set(source.code().map(str::to_string)),
            discount_amount: Set(totals.discount_amount),
            credit_amount: Set(totals.credit_amount),
            shipping_amount: Set(totals.shipping_amount),
            tax_amount: Set(totals.tax_amount),
            total: Set(totals.total),
            currency: Set(currency),
            gateway_session_id: Set(Some(session.session_id.clone())),
            shipping_address: Set(input.shipping_address.as_ref().map(Value::to_string)),
            billing_address: Set(input.billing_address.as_ref().map(Value::to_string)),
            order_note: Set(input.order_note.clone()),
            blind_shipment: Set(input.blind_shipment),
            is_guest: Set(input.is_guest),
            created_at: Set(now),
            updated_at: Set(None),
        };
        let order_row = order_model.insert(&txn).await?;

        for (line, item) in lines.iter().zip(input.items.iter()) {
            let item_model = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id.clone()),
                product_name: Set(line.product_name.clone()),
                product_category: Set(item.product_category.clone()),
                sku: Set(item.sku.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                total_price: Set(line.total_price),
                calculator_selections: Set(item.calculator_selections.clone()),
                custom_files: Set(item.custom_files.clone()),
                customer_notes: Set(item.customer_notes.clone()),
                instagram_handle: Set(item.instagram_handle.clone()),
                instagram_opt_in: Set(item.instagram_opt_in),
                created_at: Set(now),
            };
            item_model.insert(&txn).await?;
        }

        txn.commit().await?;

        // The order is placed: consume the code's usage exactly once. A
        // failure here must not unwind the already-created payment session.
        if let Some(code_id) = code_id {
            match self.discount_codes.increment_usage(code_id).await {
                Ok(()) => {
                    self.event_sender
                        .send(Event::DiscountUsageRecorded {
                            discount_code_id: code_id,
                            order_id,
                        })
                        .await;
                }
                Err(e) => warn!("failed to record discount usage: {}", e),
            }
        }

        if let Some(session_id) = input.discount_session_id {
            self.sessions.discard(session_id);
        }

        self.event_sender.send(Event::OrderCreated(order_id)).await;
        self.event_sender
            .send(Event::CheckoutSessionCreated {
                order_id,
                gateway_session_id: session.session_id.clone(),
            })
            .await;

        info!(
            "Checkout session {} created for order {}",
            session.session_id, order_id
        );

        Ok(CheckoutSessionResult {
            success: true,
            session_id: session.session_id,
            checkout_url: session.checkout_url,
            customer_order: order_row,
            totals,
            message: "Checkout session created".to_string(),
        })
    }

    /// Resolves which single discount source applies, enforcing the
    /// exclusivity rules before any money moves. Returns the source, whether
    /// it grants free shipping, and the code id to charge usage against.
    async fn resolve_discount_source(
        &self,
        input: &CreateCheckoutSessionInput,
        subtotal: Decimal,
        credit_amount: Decimal,
    ) -> Result<(DiscountSource, bool, Option<Uuid>), ServiceError> {
        let code = input
            .discount_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        if code.is_some() && input.has_reorder_discount {
            return Err(ServiceError::Conflict(
                "Cannot combine a discount code with the reorder discount".to_string(),
            ));
        }

        if let Some(code) = code {
            if credit_amount > Decimal::ZERO {
                return Err(ServiceError::Conflict(
                    "Cannot apply discount codes with store credit. Remove store credit to use discount codes."
                        .to_string(),
                ));
            }

            let validation = self
                .discount_codes
                .validate_code(code, subtotal, input.discount_session_id)
                .await?;
            if !validation.valid {
                return Err(ServiceError::InvalidOperation(validation.message));
            }

            let summary = validation.discount_code.ok_or_else(|| {
                ServiceError::InternalError("validation result missing code summary".to_string())
            })?;
            let amount = validation.discount_amount.unwrap_or(Decimal::ZERO);

            let client_amount = parse_money(input.discount_amount.as_ref());
            if input.discount_amount.is_some() && client_amount != amount {
                warn!(
                    "client discount amount {} drifted from server amount {} for {}",
                    client_amount, amount, summary.code
                );
            }

            let free_shipping = matches!(summary.discount_type, DiscountType::FreeShipping);
            return Ok((
                DiscountSource::Code {
                    code: summary.code.clone(),
                    amount,
                },
                free_shipping,
                Some(summary.id),
            ));
        }

        if input.has_reorder_discount {
            let state = ReorderDiscountState::active(
                input
                    .reorder_discount_amount
                    .as_ref()
                    .map(|v| parse_money(Some(v))),
            );
            let amount = self.policy.amount_for(&state, subtotal);
            return Ok((DiscountSource::Reorder { amount }, false, None));
        }

        Ok((DiscountSource::None, false, None))
    }
}

/// A cart line after defensive coercion.
struct SanitizedLine {
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
    total_price: Decimal,
}

impl From<&CartItemInput> for SanitizedLine {
    fn from(item: &CartItemInput) -> Self {
        let quantity = item.quantity.max(0);
        if item.quantity < 0 {
            warn!(
                "negative quantity {} for {}, coercing to 0",
                item.quantity, item.product_name
            );
        }
        let unit_price = parse_money(item.unit_price.as_ref());
        let explicit_total = item.total_price.as_ref().map(|v| parse_money(Some(v)));
        let total_price = line_total(
            quantity,
            unit_price,
            explicit_total.filter(|t| *t > Decimal::ZERO),
        );

        Self {
            product_name: item.product_name.clone(),
            quantity,
            unit_price,
            total_price,
        }
    }
}
