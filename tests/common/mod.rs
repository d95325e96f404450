use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use storefront_checkout_api::{
    config::AppConfig,
    db,
    errors::ServiceError,
    events::{self, EventSender},
    payments::{
        CheckoutSessionRequest, GatewaySession, PaymentGateway, PaymentLinkRequest,
    },
    AppState,
};

pub const TEST_ADMIN_KEY: &str = "test-admin-key-0123456789";

/// Payment gateway double. Answers with canned sessions and counts calls so
/// tests can assert the gateway is never touched on rejected requests.
#[derive(Default)]
pub struct MockGateway {
    pub checkout_calls: AtomicUsize,
    pub link_calls: AtomicUsize,
    pub fail_next: std::sync::atomic::AtomicBool,
}

impl MockGateway {
    pub fn checkout_call_count(&self) -> usize {
        self.checkout_calls.load(Ordering::SeqCst)
    }

    pub fn link_call_count(&self) -> usize {
        self.link_calls.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.fail_next.swap(false, Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_checkout_session(
        &self,
        _request: CheckoutSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        self.checkout_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_failure() {
            return Err(ServiceError::PaymentFailed(
                "gateway rejected the session".into(),
            ));
        }
        Ok(GatewaySession {
            session_id: format!("cs_test_{}", self.checkout_call_count()),
            checkout_url: "https://pay.example/cs_test".into(),
        })
    }

    async fn create_payment_link(
        &self,
        _request: PaymentLinkRequest,
    ) -> Result<GatewaySession, ServiceError> {
        self.link_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_failure() {
            return Err(ServiceError::PaymentFailed(
                "gateway rejected the link".into(),
            ));
        }
        Ok(GatewaySession {
            session_id: format!("plink_test_{}", self.link_call_count()),
            checkout_url: "https://pay.example/plink_test".into(),
        })
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        host: "127.0.0.1".into(),
        port: 18080,
        environment: "test".into(),
        log_level: "debug".into(),
        log_json: false,
        auto_migrate: true,
        cors_allowed_origins: None,
        cors_allow_any_origin: true,
        admin_api_key: TEST_ADMIN_KEY.into(),
        payment_gateway_base_url: "https://pay.example".into(),
        payment_gateway_secret_key: "sk_test_mock".into(),
        checkout_success_url: "https://shop.example/order-success".into(),
        checkout_cancel_url: "https://shop.example/cart".into(),
        reorder_discount_percent: 10,
        gateway_timeout_secs: 5,
    }
}

/// Test harness backed by an in-memory SQLite database and a mock gateway.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<MockGateway>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let cfg = test_config();

        // A single connection keeps every query on the same in-memory
        // database.
        let pool = db::establish_connection_with_config(&db::DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(MockGateway::default());
        let state = AppState::new(
            db_arc,
            cfg,
            event_sender,
            gateway.clone() as Arc<dyn PaymentGateway>,
        );
        let router = storefront_checkout_api::app_router(state.clone());

        Self {
            router,
            state,
            gateway,
            _event_task: event_task,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// JSON request without credentials.
    pub async fn request_json(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, &[]).await
    }

    /// JSON request carrying the admin API key.
    pub async fn request_admin(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, &[("x-api-key", TEST_ADMIN_KEY)])
            .await
    }
}

/// Reads a response body as JSON.
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).expect("response body was not valid json")
}
