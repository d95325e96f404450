use crate::{
    entities::discount_code::{self, DiscountType, Entity as DiscountCode},
    errors::ServiceError,
    events::{Event, EventSender},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Canonical form of a user-entered code: trimmed and uppercased.
/// Every lookup and equality check goes through this.
pub fn canonicalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Summary of a matched code returned by the validation lookup.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DiscountCodeSummary {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
}

/// Result of the discount validation lookup.
///
/// Invalid codes are a normal unsuccessful result, never an error: the
/// message travels verbatim to the user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CodeValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_code: Option<DiscountCodeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<Decimal>,
    pub message: String,
}

impl CodeValidation {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            discount_code: None,
            discount_amount: None,
            message: message.into(),
        }
    }
}

/// Validation lookup boundary consumed by the checkout discount flow.
/// Tests substitute a counting mock to assert short-circuit behavior.
#[async_trait]
pub trait DiscountLookup: Send + Sync {
    async fn validate_code(
        &self,
        code: &str,
        order_amount: Decimal,
        session_id: Option<Uuid>,
    ) -> Result<CodeValidation, ServiceError>;
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateDiscountCodeInput {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default)]
    pub minimum_order_amount: Decimal,
    pub usage_limit: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateDiscountCodeInput {
    pub description: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<Decimal>,
    pub minimum_order_amount: Option<Decimal>,
    pub usage_limit: Option<Option<i32>>,
    pub valid_until: Option<Option<DateTime<Utc>>>,
    pub active: Option<bool>,
}

/// Usage statistics for one code.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DiscountCodeStats {
    pub id: Uuid,
    pub code: String,
    pub active: bool,
    pub usage_count: i32,
    pub usage_limit: Option<i32>,
    pub remaining_uses: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DiscountCodeService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl DiscountCodeService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a new discount code. The code is stored in canonical
    /// uppercase form; duplicates are rejected.
    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create(
        &self,
        input: CreateDiscountCodeInput,
    ) -> Result<discount_code::Model, ServiceError> {
        input.validate()?;

        if input.discount_value < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Discount value must not be negative".to_string(),
            ));
        }
        if matches!(input.discount_type, DiscountType::Percentage)
            && input.discount_value > Decimal::from(100)
        {
            return Err(ServiceError::ValidationError(
                "Percentage discount cannot exceed 100".to_string(),
            ));
        }

        let code = canonicalize_code(&input.code);
        let existing = DiscountCode::find()
            .filter(discount_code::Column::Code.eq(code.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Discount code {} already exists",
                code
            )));
        }

        let now = Utc::now();
        let model = discount_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            description: Set(input.description),
            discount_type: Set(input.discount_type),
            discount_value: Set(input.discount_value),
            minimum_order_amount: Set(input.minimum_order_amount),
            usage_limit: Set(input.usage_limit),
            usage_count: Set(0),
            valid_from: Set(input.valid_from.unwrap_or(now)),
            valid_until: Set(input.valid_until),
            active: Set(input.active),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db).await?;
        self.event_sender
            .send(Event::DiscountCodeCreated(created.id))
            .await;
        info!("Created discount code {}", created.code);
        Ok(created)
    }

    /// Updates an existing code. The code string itself is immutable once
    /// created; canonical identity never changes under redemptions.
    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        id: Uuid,
        input: UpdateDiscountCodeInput,
    ) -> Result<discount_code::Model, ServiceError> {
        let existing = DiscountCode::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Discount code {} not found", id)))?;

        if let Some(value) = input.discount_value {
            if value < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Discount value must not be negative".to_string(),
                ));
            }
        }
        if let Some(Some(limit)) = input.usage_limit {
            if limit < existing.usage_count {
                return Err(ServiceError::ValidationError(format!(
                    "Usage limit {} is below the current usage count {}",
                    limit, existing.usage_count
                )));
            }
        }

        let mut active_model: discount_code::ActiveModel = existing.into();
        if let Some(description) = input.description {
            active_model.description = Set(Some(description));
        }
        if let Some(discount_type) = input.discount_type {
            active_model.discount_type = Set(discount_type);
        }
        if let Some(value) = input.discount_value {
            active_model.discount_value = Set(value);
        }
        if let Some(min) = input.minimum_order_amount {
            active_model.minimum_order_amount = Set(min);
        }
        if let Some(limit) = input.usage_limit {
            active_model.usage_limit = Set(limit);
        }
        if let Some(until) = input.valid_until {
            active_model.valid_until = Set(until);
        }
        if let Some(active) = input.active {
            active_model.active = Set(active);
        }
        active_model.updated_at = Set(Utc::now());

        let updated = active_model.update(&*self.db).await?;
        self.event_sender
            .send(Event::DiscountCodeUpdated(updated.id))
            .await;
        Ok(updated)
    }

    /// Deletes a code, or soft-disables it when it has already been
    /// redeemed (`usage_count > 0`) so order history keeps resolving.
    /// Returns true when the row was actually removed.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<bool, ServiceError> {
        let existing = DiscountCode::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Discount code {} not found", id)))?;

        if existing.usage_count > 0 {
            let mut active_model: discount_code::ActiveModel = existing.into();
            active_model.active = Set(false);
            active_model.updated_at = Set(Utc::now());
            active_model.update(&*self.db).await?;
            self.event_sender
                .send(Event::DiscountCodeDeactivated(id))
                .await;
            return Ok(false);
        }

        DiscountCode::delete_by_id(id).exec(&*self.db).await?;
        self.event_sender.send(Event::DiscountCodeDeleted(id)).await;
        Ok(true)
    }

    /// Lists codes ordered by creation, newest first.
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<discount_code::Model>, u64), ServiceError> {
        let paginator = DiscountCode::find()
            .order_by_desc(discount_code::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    pub async fn get(&self, id: Uuid) -> Result<discount_code::Model, ServiceError> {
        DiscountCode::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Discount code {} not found", id)))
    }

    pub async fn stats(&self, id: Uuid) -> Result<DiscountCodeStats, ServiceError> {
        let model = self.get(id).await?;
        Ok(DiscountCodeStats {
            id: model.id,
            code: model.code,
            active: model.active,
            usage_count: model.usage_count,
            usage_limit: model.usage_limit,
            remaining_uses: model
                .usage_limit
                .map(|limit| (limit - model.usage_count).max(0)),
            updated_at: model.updated_at,
        })
    }

    /// Computes the monetary effect of a code against an order amount.
    ///
    /// Percentage discounts round to cents; fixed amounts are capped at the
    /// order amount; free shipping contributes nothing to the item discount.
    /// The result is always in `[0, order_amount]`.
    pub fn calculate_discount(
        &self,
        model: &discount_code::Model,
        order_amount: Decimal,
    ) -> Decimal {
        let raw = match model.discount_type {
            DiscountType::Percentage => {
                (order_amount * model.discount_value / Decimal::from(100)).round_dp(2)
            }
            DiscountType::FixedAmount => model.discount_value,
            DiscountType::FreeShipping => Decimal::ZERO,
        };

        raw.max(Decimal::ZERO).min(order_amount.max(Decimal::ZERO))
    }

    /// Increments the usage count for a code, exactly once per placed order.
    ///
    /// The increment is a single conditional UPDATE so concurrent checkouts
    /// racing on the last use of a limited code cannot both redeem it: the
    /// row only changes while `usage_count < usage_limit`, and zero affected
    /// rows means the limit was already reached.
    #[instrument(skip(self))]
    pub async fn increment_usage(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = DiscountCode::update_many()
            .col_expr(
                discount_code::Column::UsageCount,
                Expr::col(discount_code::Column::UsageCount).add(1),
            )
            .col_expr(discount_code::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(discount_code::Column::Id.eq(id))
            .filter(
                Condition::any()
                    .add(discount_code::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(discount_code::Column::UsageCount)
                            .lt(Expr::col(discount_code::Column::UsageLimit)),
                    ),
            )
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            // Either the id is unknown or the code is exhausted; re-read to
            // tell the two apart.
            let model = self.get(id).await?;
            return Err(ServiceError::InvalidOperation(format!(
                "Discount code {} has reached its usage limit",
                model.code
            )));
        }

        Ok(())
    }

    /// Finds an active, in-window, non-exhausted code by canonical form.
    async fn find_usable(
        &self,
        canonical: &str,
    ) -> Result<Result<discount_code::Model, String>, ServiceError> {
        let now = Utc::now();
        let model = DiscountCode::find()
            .filter(discount_code::Column::Code.eq(canonical))
            .one(&*self.db)
            .await?;

        let Some(model) = model else {
            return Ok(Err("Invalid discount code".to_string()));
        };

        if !model.active {
            return Ok(Err("This discount code is no longer active".to_string()));
        }
        if !model.is_within_window(now) {
            let message = if model.valid_from > now {
                "This discount code is not active yet".to_string()
            } else {
                "This discount code has expired".to_string()
            };
            return Ok(Err(message));
        }
        if model.is_exhausted() {
            warn!("Discount code {} has reached its usage limit", model.code);
            return Ok(Err(
                "This discount code has reached its usage limit".to_string()
            ));
        }

        Ok(Ok(model))
    }
}

#[async_trait]
impl DiscountLookup for DiscountCodeService {
    /// Idempotent validation: computes the discount without consuming usage.
    /// Usage is only recorded when an order is finally placed.
    #[instrument(skip(self), fields(code = %code))]
    async fn validate_code(
        &self,
        code: &str,
        order_amount: Decimal,
        session_id: Option<Uuid>,
    ) -> Result<CodeValidation, ServiceError> {
        let canonical = canonicalize_code(code);
        if canonical.is_empty() {
            return Ok(CodeValidation::rejected("Please enter a discount code"));
        }

        let model = match self.find_usable(&canonical).await? {
            Ok(model) => model,
            Err(message) => return Ok(CodeValidation::rejected(message)),
        };

        if order_amount < model.minimum_order_amount {
            return Ok(CodeValidation::rejected(format!(
                "This discount code requires a minimum order of ${:.2}",
                model.minimum_order_amount
            )));
        }

        let amount = self.calculate_discount(&model, order_amount);
        debug!(
            session_id = ?session_id,
            "code {} valid for amount {}", model.code, amount
        );

        Ok(CodeValidation {
            valid: true,
            message: format!("Discount code {} applied", model.code),
            discount_amount: Some(amount),
            discount_code: Some(DiscountCodeSummary {
                id: model.id,
                code: model.code.clone(),
                discount_type: model.discount_type.clone(),
                discount_value: model.discount_value,
            }),
        })
    }
}
