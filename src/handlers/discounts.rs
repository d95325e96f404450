use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::handlers::common::{validate_input, PaginatedResponse, PaginationParams};
use crate::services::discount_codes::{
    CreateDiscountCodeInput, DiscountLookup, UpdateDiscountCodeInput,
};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateCodeRequest {
    pub code: String,
    pub order_amount: Decimal,
    pub session_id: Option<Uuid>,
}

/// Validates a discount code against an order amount.
///
/// Invalid codes answer 200 with `valid: false` and a user-facing message;
/// only transport and database failures surface as errors. Validation never
/// consumes a use.
pub async fn validate_code(
    State(state): State<AppState>,
    Json(payload): Json<ValidateCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let validation = state
        .services
        .discount_codes
        .validate_code(&payload.code, payload.order_amount, payload.session_id)
        .await?;
    Ok(Json(validation))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SessionRemoveRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionRemoveResponse {
    pub success: bool,
    pub session_id: Uuid,
}

/// Clears any discount bookkeeping held for a session. Always reports
/// success, including for sessions this process has never seen.
pub async fn remove_session(
    State(state): State<AppState>,
    Json(payload): Json<SessionRemoveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.services.sessions.remove(payload.session_id).await;
    Ok(Json(SessionRemoveResponse {
        success: outcome.success,
        session_id: outcome.session_id,
    }))
}

pub async fn create_discount_code(
    State(state): State<AppState>,
    Json(payload): Json<CreateDiscountCodeInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let model = state.services.discount_codes.create(payload).await?;
    Ok((StatusCode::CREATED, Json(model)))
}

pub async fn list_discount_codes(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (items, total) = state
        .services
        .discount_codes
        .list(params.page, params.per_page)
        .await?;
    Ok(Json(PaginatedResponse::new(
        items,
        params.page,
        params.per_page,
        total,
    )))
}

pub async fn get_discount_code(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let model = state.services.discount_codes.get(id).await?;
    Ok(Json(model))
}

pub async fn update_discount_code(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDiscountCodeInput>,
) -> Result<impl IntoResponse, ApiError> {
    let model = state.services.discount_codes.update(id, payload).await?;
    Ok(Json(model))
}

/// Deletes a code. Codes that have already been used are deactivated
/// instead, so historical orders keep a resolvable reference.
pub async fn delete_discount_code(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state.services.discount_codes.delete(id).await?;
    Ok(Json(json!({
        "success": true,
        "removed": removed,
        "deactivated": !removed,
    })))
}

pub async fn get_discount_code_stats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.services.discount_codes.stats(id).await?;
    Ok(Json(stats))
}

/// Public discount routes.
pub fn discount_routes() -> Router<AppState> {
    Router::new()
        .route("/discounts/validate", post(validate_code))
        .route("/discounts/session/remove", post(remove_session))
}

/// Admin CRUD over discount codes. Mounted behind the API-key guard.
pub fn admin_discount_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/discount-codes",
            get(list_discount_codes).post(create_discount_code),
        )
        .route(
            "/discount-codes/:id",
            get(get_discount_code)
                .put(update_discount_code)
                .delete(delete_discount_code),
        )
        .route("/discount-codes/:id/stats", get(get_discount_code_stats))
}
