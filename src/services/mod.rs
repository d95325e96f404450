// Discount rules engine
pub mod discount_codes;
pub mod discount_flow;
pub mod reorder;
pub mod sessions;
pub mod store_credit;

// Pricing and payment hand-off
pub mod checkout;
pub mod payment_links;
pub mod totals;
