use rust_decimal::Decimal;

/// Store-credit state for the order in progress.
///
/// Credit bookkeeping lives with the account service; this side only needs
/// presence (which gates discount codes) and the amount for total
/// composition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCreditState {
    pub active: bool,
    pub amount: Decimal,
}

impl StoreCreditState {
    pub fn inactive() -> Self {
        Self::default()
    }

    pub fn active(amount: Decimal) -> Self {
        Self {
            active: true,
            amount,
        }
    }
}

/// Gates discount-code usage against active store credit. Store credit and
/// discount codes are never combined in the same order, and the refusal
/// happens before any lookup is attempted.
pub struct CreditApplier;

impl CreditApplier {
    pub const CONFLICT_MESSAGE: &'static str =
        "Cannot apply discount codes with store credit. Remove store credit to use discount codes.";

    /// Returns the rejection message when credit blocks code application.
    pub fn rejects_discount_codes(state: &StoreCreditState) -> Option<&'static str> {
        state.active.then_some(Self::CONFLICT_MESSAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn inactive_credit_does_not_gate() {
        assert!(CreditApplier::rejects_discount_codes(&StoreCreditState::inactive()).is_none());
    }

    #[test]
    fn active_credit_gates_regardless_of_amount() {
        let gated = CreditApplier::rejects_discount_codes(&StoreCreditState::active(dec!(0)));
        assert_eq!(gated, Some(CreditApplier::CONFLICT_MESSAGE));

        let gated = CreditApplier::rejects_discount_codes(&StoreCreditState::active(dec!(25.00)));
        assert!(gated.is_some());
    }
}
