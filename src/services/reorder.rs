use rust_decimal::Decimal;

/// Automatic discount granted when a customer re-orders a previous purchase.
///
/// While active it is mutually exclusive with manual discount codes. It is
/// not revocable through the discount-code surface; the surrounding order
/// flow owns its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReorderDiscountState {
    pub active: bool,
    /// Fixed amount when the storefront has already computed it.
    pub amount: Option<Decimal>,
}

impl ReorderDiscountState {
    pub fn inactive() -> Self {
        Self::default()
    }

    pub fn active(amount: Option<Decimal>) -> Self {
        Self {
            active: true,
            amount,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReorderDiscountPolicy {
    /// Percentage used when no fixed amount is known (commonly 10).
    fallback_percent: u32,
}

impl Default for ReorderDiscountPolicy {
    fn default() -> Self {
        Self {
            fallback_percent: 10,
        }
    }
}

impl ReorderDiscountPolicy {
    pub fn new(fallback_percent: u32) -> Self {
        Self { fallback_percent }
    }

    /// Renders the active discount for user-facing messages: currency when a
    /// fixed amount is known, a percentage placeholder otherwise.
    pub fn display(&self, state: &ReorderDiscountState) -> String {
        match state.amount {
            Some(amount) => format!("${:.2}", amount),
            None => format!("{}%", self.fallback_percent),
        }
    }

    /// Returns the rejection message when an active reorder discount blocks
    /// a manual code.
    pub fn rejects_discount_codes(&self, state: &ReorderDiscountState) -> Option<String> {
        state.active.then(|| {
            format!(
                "Cannot apply discount codes with your active reorder discount ({}). The reorder discount is applied automatically.",
                self.display(state)
            )
        })
    }

    /// Monetary effect of the reorder discount against an order amount.
    pub fn amount_for(&self, state: &ReorderDiscountState, order_amount: Decimal) -> Decimal {
        if !state.active {
            return Decimal::ZERO;
        }
        let raw = match state.amount {
            Some(amount) => amount,
            None => {
                (order_amount * Decimal::from(self.fallback_percent) / Decimal::from(100))
                    .round_dp(2)
            }
        };
        raw.max(Decimal::ZERO).min(order_amount.max(Decimal::ZERO))
    }
}
