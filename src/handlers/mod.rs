use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::payments::PaymentGateway;
use crate::services::checkout::CheckoutService;
use crate::services::discount_codes::DiscountCodeService;
use crate::services::payment_links::PaymentLinkService;
use crate::services::reorder::ReorderDiscountPolicy;
use crate::services::sessions::DiscountSessionStore;
use crate::AppState;

pub mod checkout;
pub mod common;
pub mod discounts;
pub mod health;
pub mod payment_links;

/// Container for the service layer, shared by all handlers.
#[derive(Clone)]
pub struct AppServices {
    pub discount_codes: Arc<DiscountCodeService>,
    pub sessions: Arc<DiscountSessionStore>,
    pub checkout: Arc<CheckoutService>,
    pub payment_links: Arc<PaymentLinkService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        config: &AppConfig,
    ) -> Self {
        let policy = ReorderDiscountPolicy::new(config.reorder_discount_percent);
        let discount_codes = Arc::new(DiscountCodeService::new(db.clone(), event_sender.clone()));
        let sessions = Arc::new(DiscountSessionStore::new(event_sender.clone(), policy));
        let checkout = Arc::new(CheckoutService::new(
            db.clone(),
            event_sender.clone(),
            discount_codes.clone(),
            sessions.clone(),
            gateway.clone(),
            policy,
            config.checkout_success_url.clone(),
            config.checkout_cancel_url.clone(),
        ));
        let payment_links = Arc::new(PaymentLinkService::new(db, event_sender, gateway));

        Self {
            discount_codes,
            sessions,
            checkout,
            payment_links,
        }
    }
}

/// Rejects admin requests whose `x-api-key` header does not match the
/// configured key. Constant responses keep key probing uninformative.
pub async fn require_admin_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(key) if key == state.config.admin_api_key => next.run(request).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "unauthorized",
                "message": "A valid x-api-key header is required",
            })),
        )
            .into_response(),
    }
}

/// All public and admin routes for the v1 API surface.
pub fn api_v1_routes(state: AppState) -> Router<AppState> {
    let admin = Router::new()
        .merge(discounts::admin_discount_routes())
        .layer(middleware::from_fn_with_state(state, require_admin_key));

    Router::new()
        .merge(discounts::discount_routes())
        .merge(checkout::checkout_routes())
        .merge(payment_links::payment_link_routes())
        .nest("/admin", admin)
}
