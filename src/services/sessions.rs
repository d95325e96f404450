use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        discount_codes::DiscountLookup,
        discount_flow::{ApplyOutcome, DiscountFlow, PricingContext},
        reorder::ReorderDiscountPolicy,
    },
};

/// In-memory store of per-session discount flows, keyed by the
/// client-generated session UUID.
///
/// Sessions live as long as the checkout flow; no durability beyond the
/// process lifetime is promised. Removal is synchronous locally with
/// backend bookkeeping pushed onto a detached task, so a slow or failing
/// cleanup can never block clearing the state the user sees.
#[derive(Clone)]
pub struct DiscountSessionStore {
    flows: Arc<DashMap<Uuid, Arc<Mutex<DiscountFlow>>>>,
    event_sender: Arc<EventSender>,
    policy: Arc<ReorderDiscountPolicy>,
}

/// Result of a remove-session call; always succeeds from the caller's view.
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct RemovalOutcome {
    pub success: bool,
    pub session_id: Uuid,
}

/// Result of a forced reset: the rotated session identifier.
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct ResetOutcome {
    pub success: bool,
    pub old_session_id: Uuid,
    pub new_session_id: Uuid,
}

impl DiscountSessionStore {
    pub fn new(event_sender: Arc<EventSender>, policy: ReorderDiscountPolicy) -> Self {
        Self {
            flows: Arc::new(DashMap::new()),
            event_sender,
            policy: Arc::new(policy),
        }
    }

    /// Fetches the flow for a session, creating it on first touch. A missing
    /// session id mints a fresh one (the client persists it afterwards).
    pub fn get_or_create(&self, session_id: Option<Uuid>) -> (Uuid, Arc<Mutex<DiscountFlow>>) {
        let id = session_id.unwrap_or_else(Uuid::new_v4);
        let flow = self
            .flows
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(DiscountFlow::new(id))))
            .clone();
        (id, flow)
    }

    /// Applies a code to a session's order, running the full rule chain.
    pub async fn apply(
        &self,
        session_id: Option<Uuid>,
        code: &str,
        order_amount: Decimal,
        ctx: &PricingContext,
        lookup: &dyn DiscountLookup,
    ) -> Result<(Uuid, ApplyOutcome), ServiceError> {
        let (id, flow) = self.get_or_create(session_id);
        let outcome =
            DiscountFlow::apply(&flow, code, order_amount, ctx, &self.policy, lookup).await?;

        if outcome.valid {
            if let Some(applied) = &outcome.applied {
                self.event_sender
                    .send(Event::DiscountApplied {
                        session_id: id,
                        code: applied.code.clone(),
                        amount: applied.amount,
                    })
                    .await;
            }
        }

        Ok((id, outcome))
    }

    /// Removes a session's applied discount. Local state clears
    /// synchronously; the bookkeeping notification is fire-and-forget and
    /// its failure is logged, never surfaced.
    pub async fn remove(&self, session_id: Uuid) -> RemovalOutcome {
        let cleared = match self.flows.get(&session_id) {
            Some(entry) => {
                let flow = entry.clone();
                drop(entry);
                let mut guard = flow.lock().await;
                guard.remove()
            }
            None => {
                debug!(%session_id, "remove for unknown discount session");
                false
            }
        };

        if cleared {
            let events = self.event_sender.clone();
            tokio::spawn(async move {
                events.send(Event::DiscountRemoved { session_id }).await;
            });
        }

        RemovalOutcome {
            success: true,
            session_id,
        }
    }

    /// Force-resets a stuck session: clears its state, rotates the
    /// identifier, and re-keys the flow so in-flight responses against the
    /// old id are orphaned. The old entry is dropped best-effort.
    pub async fn force_reset(&self, session_id: Uuid) -> ResetOutcome {
        let (_, flow) = self.get_or_create(Some(session_id));

        let new_id = {
            let mut guard = flow.lock().await;
            guard.force_reset()
        };

        self.flows.remove(&session_id);
        self.flows.insert(new_id, flow);

        info!(%session_id, %new_id, "discount session force-reset");
        let events = self.event_sender.clone();
        tokio::spawn(async move {
            events
                .send(Event::DiscountSessionReset {
                    old_session_id: session_id,
                    new_session_id: new_id,
                })
                .await;
        });

        ResetOutcome {
            success: true,
            old_session_id: session_id,
            new_session_id: new_id,
        }
    }

    /// Drops a completed session after checkout. Best-effort.
    pub fn discard(&self, session_id: Uuid) {
        if self.flows.remove(&session_id).is_none() {
            warn!(%session_id, "discard for unknown discount session");
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.flows.len()
    }
}
