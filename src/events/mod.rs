use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Sends domain events into the processing channel.
///
/// Delivery is fire-and-forget: a full or closed channel is logged and never
/// fails the state transition that produced the event.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously; failures are logged, not propagated.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("Failed to send event: {}", e);
        }
    }
}

// The various events the pricing flow can emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Discount flow events
    DiscountApplied {
        session_id: Uuid,
        code: String,
        amount: Decimal,
    },
    DiscountRemoved {
        session_id: Uuid,
    },
    DiscountSessionReset {
        old_session_id: Uuid,
        new_session_id: Uuid,
    },
    DiscountUsageRecorded {
        discount_code_id: Uuid,
        order_id: Uuid,
    },

    // Admin discount-code lifecycle
    DiscountCodeCreated(Uuid),
    DiscountCodeUpdated(Uuid),
    DiscountCodeDeactivated(Uuid),
    DiscountCodeDeleted(Uuid),

    // Checkout events
    CheckoutSessionCreated {
        order_id: Uuid,
        gateway_session_id: String,
    },
    OrderCreated(Uuid),
    PaymentLinkCreated {
        order_id: Uuid,
        gateway_session_id: String,
    },
}

/// Consumes the event channel for the lifetime of the process.
///
/// Events currently only feed structured logs; notification fan-out
/// (Klaviyo, Discord) hangs off this loop when enabled.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::DiscountApplied {
                session_id,
                code,
                amount,
            } => {
                info!(
                    %session_id,
                    code,
                    %amount,
                    "discount applied to checkout session"
                );
            }
            Event::DiscountSessionReset {
                old_session_id,
                new_session_id,
            } => {
                info!(%old_session_id, %new_session_id, "discount session rotated");
            }
            Event::CheckoutSessionCreated {
                order_id,
                gateway_session_id,
            } => {
                info!(%order_id, gateway_session_id, "checkout session created");
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}
