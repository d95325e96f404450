use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::{
        discount_codes::{canonicalize_code, DiscountLookup},
        reorder::{ReorderDiscountPolicy, ReorderDiscountState},
        store_credit::{CreditApplier, StoreCreditState},
    },
};

/// The single currently-applied discount for an in-progress order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AppliedDiscount {
    pub code: String,
    pub amount: Decimal,
}

/// Client-side pricing state the flow validates against.
#[derive(Debug, Clone, Copy, Default)]
pub struct PricingContext {
    pub store_credit: StoreCreditState,
    pub reorder: ReorderDiscountState,
}

/// Outcome of one apply attempt. Conflicts and invalid codes are normal
/// results, never errors; `show_reset_option` marks the states the force
/// reset recovers from.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApplyOutcome {
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<AppliedDiscount>,
    pub show_reset_option: bool,
}

impl ApplyOutcome {
    fn rejected(message: impl Into<String>, applied: Option<AppliedDiscount>) -> Self {
        Self {
            valid: false,
            message: message.into(),
            applied,
            show_reset_option: false,
        }
    }

    fn multiple_codes(existing: &AppliedDiscount) -> Self {
        Self {
            valid: false,
            message: format!(
                "Cannot apply multiple discount codes. Remove \"{}\" first to use a different discount code.",
                existing.code
            ),
            applied: Some(existing.clone()),
            show_reset_option: true,
        }
    }
}

enum Preflight {
    Settled(ApplyOutcome),
    Lookup { seq: u64, session_id: Uuid },
}

/// Per-session discount flow state machine.
///
/// `apply`, `remove` and `force_reset` are the only transitions. At most one
/// discount is applied at any time. Every lookup attempt carries a
/// monotonically increasing sequence number; a response is applied only when
/// its sequence is still current, so the latest user intent always wins over
/// a stale in-flight response.
#[derive(Debug)]
pub struct DiscountFlow {
    session_id: Uuid,
    applied: Option<AppliedDiscount>,
    attempt_seq: u64,
}

impl DiscountFlow {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            applied: None,
            attempt_seq: 0,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn applied(&self) -> Option<&AppliedDiscount> {
        self.applied.as_ref()
    }

    /// Precondition checks, first match wins:
    /// 1. store credit active
    /// 2. reorder discount active
    /// 3. a different code already applied
    /// 4. the same code already applied (short-circuit success, no lookup)
    fn preflight(
        &mut self,
        canonical: &str,
        ctx: &PricingContext,
        policy: &ReorderDiscountPolicy,
    ) -> Preflight {
        if let Some(message) = CreditApplier::rejects_discount_codes(&ctx.store_credit) {
            return Preflight::Settled(ApplyOutcome::rejected(message, self.applied.clone()));
        }

        if let Some(message) = policy.rejects_discount_codes(&ctx.reorder) {
            return Preflight::Settled(ApplyOutcome::rejected(message, self.applied.clone()));
        }

        if let Some(existing) = &self.applied {
            if existing.code != canonical {
                return Preflight::Settled(ApplyOutcome::multiple_codes(existing));
            }
            return Preflight::Settled(ApplyOutcome {
                valid: true,
                message: format!("Discount code {} is already applied", existing.code),
                applied: Some(existing.clone()),
                show_reset_option: false,
            });
        }

        self.attempt_seq += 1;
        Preflight::Lookup {
            seq: self.attempt_seq,
            session_id: self.session_id,
        }
    }

    /// Attempts to apply a code to the order.
    ///
    /// The lock is released across the lookup so a newer attempt (or a
    /// reset) can proceed; the response is then re-checked against both the
    /// attempt sequence and the currently applied code before it lands.
    pub async fn apply(
        flow: &Arc<Mutex<DiscountFlow>>,
        code: &str,
        order_amount: Decimal,
        ctx: &PricingContext,
        policy: &ReorderDiscountPolicy,
        lookup: &dyn DiscountLookup,
    ) -> Result<ApplyOutcome, ServiceError> {
        let canonical = canonicalize_code(code);
        if canonical.is_empty() {
            return Ok(ApplyOutcome::rejected(
                "Please enter a discount code",
                flow.lock().await.applied.clone(),
            ));
        }

        let (seq, session_id) = {
            let mut guard = flow.lock().await;
            match guard.preflight(&canonical, ctx, policy) {
                Preflight::Settled(outcome) => return Ok(outcome),
                Preflight::Lookup { seq, session_id } => (seq, session_id),
            }
        };

        let result = lookup
            .validate_code(&canonical, order_amount, Some(session_id))
            .await;

        let mut guard = flow.lock().await;

        // A newer attempt or a session rotation supersedes this response.
        if guard.attempt_seq != seq || guard.session_id != session_id {
            debug!(code = %canonical, "discarding stale validation response");
            return Ok(ApplyOutcome::rejected(
                "Discount request was superseded by a newer attempt",
                guard.applied.clone(),
            ));
        }

        let validation = match result {
            Ok(validation) => validation,
            Err(e) => {
                warn!("discount validation lookup failed: {}", e);
                guard.applied = None;
                return Ok(ApplyOutcome::rejected("Error validating discount code", None));
            }
        };

        if !validation.valid {
            return Ok(ApplyOutcome::rejected(validation.message, None));
        }

        // Defensive re-check on the returned code: the lookup result may
        // name a different code than the one requested.
        let returned_code = validation
            .discount_code
            .as_ref()
            .map(|c| canonicalize_code(&c.code))
            .unwrap_or_else(|| canonical.clone());

        if let Some(existing) = &guard.applied {
            if existing.code != returned_code {
                return Ok(ApplyOutcome::multiple_codes(existing));
            }
        }

        let amount = validation
            .discount_amount
            .unwrap_or(Decimal::ZERO)
            .max(Decimal::ZERO)
            .min(order_amount.max(Decimal::ZERO));

        let applied = AppliedDiscount {
            code: returned_code,
            amount,
        };
        guard.applied = Some(applied.clone());

        Ok(ApplyOutcome {
            valid: true,
            message: validation.message,
            applied: Some(applied),
            show_reset_option: false,
        })
    }

    /// Clears the applied discount synchronously and unconditionally, and
    /// invalidates any in-flight validation attempt so a response that was
    /// pending when the user removed cannot land afterwards. Returns true
    /// when a discount was actually cleared. Backend session cleanup is the
    /// caller's (detached, best-effort) concern.
    pub fn remove(&mut self) -> bool {
        self.attempt_seq += 1;
        self.applied.take().is_some()
    }

    /// Stronger recovery path: clears state, rotates to a brand-new session
    /// identifier, and invalidates every in-flight attempt so stale
    /// responses cannot resurrect the old state. Returns the new id.
    pub fn force_reset(&mut self) -> Uuid {
        self.applied = None;
        self.attempt_seq += 1;
        self.session_id = Uuid::new_v4();
        self.session_id
    }
}
