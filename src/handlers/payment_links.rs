use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};

use crate::errors::ApiError;
use crate::services::payment_links::CreatePaymentLinkInput;
use crate::AppState;

/// Creates a payment link for additional items on an existing order.
/// Items are validated server-side; a request with no chargeable item is
/// rejected before the gateway is touched.
pub async fn create_payment_link(
    State(state): State<AppState>,
    Json(payload): Json<CreatePaymentLinkInput>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.services.payment_links.create_link(payload).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

pub fn payment_link_routes() -> Router<AppState> {
    Router::new().route("/payment-links", post(create_payment_link))
}
