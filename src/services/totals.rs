use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use utoipa::ToSchema;

/// The single discount source applied to an order.
///
/// Code and reorder discounts are mutually exclusive; the enum makes the
/// "never both" invariant unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscountSource {
    None,
    Code { code: String, amount: Decimal },
    Reorder { amount: Decimal },
}

impl DiscountSource {
    pub fn amount(&self) -> Decimal {
        match self {
            DiscountSource::None => Decimal::ZERO,
            DiscountSource::Code { amount, .. } | DiscountSource::Reorder { amount } => *amount,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            DiscountSource::Code { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Composed monetary breakdown of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub credit_amount: Decimal,
    pub shipping_amount: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

/// Parses a loose JSON money value, coercing anything non-numeric (missing
/// field, null, NaN/infinite float, unparseable string) to zero with a
/// warning instead of letting it poison the total.
pub fn parse_money(value: Option<&Value>) -> Decimal {
    let parsed = match value {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .and_then(Decimal::from_f64),
        Some(Value::String(s)) => s.trim().parse::<Decimal>().ok(),
        Some(other) => {
            warn!("non-numeric money value {:?}, coercing to 0", other);
            return Decimal::ZERO;
        }
    };

    match parsed {
        Some(amount) if amount >= Decimal::ZERO => amount.round_dp(2),
        Some(amount) => {
            warn!("negative money value {}, coercing to 0", amount);
            Decimal::ZERO
        }
        None => {
            if value.is_some() {
                warn!("unparseable money value {:?}, coercing to 0", value);
            }
            Decimal::ZERO
        }
    }
}

/// Line total with fallback: prefer the explicit total, otherwise
/// `quantity * unit_price`.
pub fn line_total(quantity: i32, unit_price: Decimal, total_price: Option<Decimal>) -> Decimal {
    match total_price {
        Some(total) if total > Decimal::ZERO => total,
        _ => (unit_price * Decimal::from(quantity.max(0))).round_dp(2),
    }
}

/// Combines subtotal, at most one discount source, optional credit, shipping
/// and tax into the final payable total.
pub struct OrderTotalComposer;

impl OrderTotalComposer {
    /// `total = max(0, subtotal - discount - credit + shipping + tax)`.
    ///
    /// The discount is clamped to `[0, subtotal]` and credit to the amount
    /// still outstanding after the discount, so the total can never go
    /// negative and never carries NaN (Decimal has no NaN representation).
    pub fn compose(
        subtotal: Decimal,
        discount: &DiscountSource,
        credit_amount: Decimal,
        shipping_amount: Decimal,
        tax_amount: Decimal,
    ) -> OrderTotals {
        let subtotal = subtotal.max(Decimal::ZERO).round_dp(2);
        let discount_amount = discount
            .amount()
            .max(Decimal::ZERO)
            .min(subtotal)
            .round_dp(2);

        let after_discount = subtotal - discount_amount;
        let credit_amount = credit_amount
            .max(Decimal::ZERO)
            .min(after_discount)
            .round_dp(2);

        let shipping_amount = shipping_amount.max(Decimal::ZERO).round_dp(2);
        let tax_amount = tax_amount.max(Decimal::ZERO).round_dp(2);

        let total = (subtotal - discount_amount - credit_amount + shipping_amount + tax_amount)
            .max(Decimal::ZERO)
            .round_dp(2);

        OrderTotals {
            subtotal,
            discount_amount,
            credit_amount,
            shipping_amount,
            tax_amount,
            total,
        }
    }
}
