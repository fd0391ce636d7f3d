//! Database entities.

pub mod cart;
pub mod cart_item;
pub mod category;
pub mod medicine;
pub mod order;
pub mod order_item;
pub mod stock_movement;
pub mod user;
pub mod user_profile;

pub use order::OrderStatus;
pub use stock_movement::MovementType;
