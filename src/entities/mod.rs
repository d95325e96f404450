pub mod discount_code;
pub mod order;
pub mod order_item;

pub use discount_code::Entity as DiscountCode;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
