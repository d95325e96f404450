pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod payments;
pub mod services;

use std::sync::Arc;

use axum::Router;
use sea_orm::DatabaseConnection;

pub use errors::{ApiError, AppError, ServiceError};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: Arc<events::EventSender>,
        gateway: Arc<dyn payments::PaymentGateway>,
    ) -> Self {
        let services = handlers::AppServices::new(db.clone(), event_sender.clone(), gateway, &config);
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

/// The full v1 API surface, health probe included.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .merge(handlers::health::health_routes())
        .nest("/api/v1", handlers::api_v1_routes(state.clone()))
        .with_state(state)
}
