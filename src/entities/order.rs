use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Pending customer order snapshot created when a checkout session is opened.
///
/// `discount_amount` and `credit_amount` are never both nonzero with a reorder
/// discount; the composer enforces the exclusivity before the row is written.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_number: String,
    pub customer_email: String,
    pub customer_id: Option<Uuid>,
    pub status: String,
    pub payment_status: String,
    pub subtotal: Decimal,
    pub discount_code: Option<String>,
    pub discount_amount: Decimal,
    pub credit_amount: Decimal,
    pub shipping_amount: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub gateway_session_id: Option<String>,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub order_note: Option<String>,
    pub blind_shipment: bool,
    pub is_guest: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
