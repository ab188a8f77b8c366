//! Domain model of the checkout subsystem.

pub mod order;

pub use order::{LineItem, Order, OrderStatus, ShippingSummary, StatusWrite};
