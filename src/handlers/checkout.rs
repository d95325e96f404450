use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::handlers::common::validate_input;
use crate::services::checkout::CreateCheckoutSessionInput;
use crate::services::discount_flow::{ApplyOutcome, PricingContext};
use crate::services::reorder::ReorderDiscountState;
use crate::services::store_credit::StoreCreditState;
use crate::services::totals::parse_money;
use crate::AppState;

/// Discount application request for an in-progress checkout. The pricing
/// context travels with the request because discount sessions hold only the
/// applied code, not the cart.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ApplyDiscountRequest {
    pub session_id: Option<Uuid>,
    pub code: String,
    #[serde(default)]
    pub order_amount: Option<Value>,
    #[serde(default)]
    pub has_store_credit: bool,
    #[serde(default)]
    pub store_credit_amount: Option<Value>,
    #[serde(default)]
    pub has_reorder_discount: bool,
    #[serde(default)]
    pub reorder_discount_amount: Option<Value>,
}

impl ApplyDiscountRequest {
    fn pricing_context(&self) -> PricingContext {
        PricingContext {
            store_credit: StoreCreditState {
                active: self.has_store_credit,
                amount: parse_money(self.store_credit_amount.as_ref()),
            },
            reorder: ReorderDiscountState {
                active: self.has_reorder_discount,
                amount: self
                    .reorder_discount_amount
                    .as_ref()
                    .map(|v| parse_money(Some(v))),
            },
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApplyDiscountResponse {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub outcome: ApplyOutcome,
}

/// Applies a discount code to a checkout session.
///
/// Store credit and reorder discounts block codes before any lookup runs;
/// re-applying the already-applied code answers success without a lookup;
/// a different code is rejected until the current one is removed.
pub async fn apply_discount(
    State(state): State<AppState>,
    Json(payload): Json<ApplyDiscountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = payload.pricing_context();
    let order_amount = parse_money(payload.order_amount.as_ref());
    let (session_id, outcome) = state
        .services
        .sessions
        .apply(
            payload.session_id,
            &payload.code,
            order_amount,
            &ctx,
            state.services.discount_codes.as_ref(),
        )
        .await?;
    Ok(Json(ApplyDiscountResponse {
        session_id,
        outcome,
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DiscountSessionRequest {
    pub session_id: Uuid,
}

/// Removes the applied discount from a session. The session state clears
/// before this responds; code bookkeeping catches up in the background.
pub async fn remove_discount(
    State(state): State<AppState>,
    Json(payload): Json<DiscountSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.services.sessions.remove(payload.session_id).await;
    Ok(Json(outcome))
}

/// Recovery hatch for a stuck discount session: clears the state and rotates
/// the session identifier so stale in-flight responses cannot land.
pub async fn reset_discount(
    State(state): State<AppState>,
    Json(payload): Json<DiscountSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .sessions
        .force_reset(payload.session_id)
        .await;
    Ok(Json(outcome))
}

/// Creates a hosted checkout session: recomputes the order total
/// server-side, records the pending order, and hands back the payment URL.
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Json(payload): Json<CreateCheckoutSessionInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let result = state.services.checkout.create_session(payload).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout/discount/apply", post(apply_discount))
        .route("/checkout/discount/remove", post(remove_discount))
        .route("/checkout/discount/reset", post(reset_discount))
        .route("/checkout/session", post(create_checkout_session))
}
