//! Storefront Checkout Service
//!
//! The order checkout and payment reconciliation core of the storefront:
//! turns a cart into a persisted order, reserves stock, opens a session
//! with the external payment processor, and later reconciles the order's
//! final status from asynchronous webhook notifications.
//!
//! ## Subsystems
//! - Checkout orchestration ([`checkout`])
//! - Payment gateway adapter ([`gateway`])
//! - Webhook reconciliation ([`webhook`])
//! - Order aggregate and state machine ([`domain`])

use thiserror::Error;

pub mod checkout;
pub mod config;
pub mod domain;
pub mod events;
pub mod gateway;
pub mod http;
pub mod stores;
pub mod webhook;

pub use checkout::{CheckoutCommand, CheckoutItem, CheckoutOutcome, CheckoutService};
pub use domain::{LineItem, Order, OrderStatus, ShippingSummary, StatusWrite};
pub use webhook::{WebhookDisposition, WebhookService};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("Cart has no items")]
    EmptyItems,

    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Insufficient stock for product {product}")]
    InsufficientStock { product: String },

    #[error("Order not found")]
    OrderNotFound,

    #[error(transparent)]
    Gateway(#[from] gateway::GatewayError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CheckoutError {
    /// Stable machine-readable code surfaced to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyItems => "empty_items",
            Self::InvalidItem(_) => "invalid_item",
            Self::ProductNotFound(_) => "product_not_found",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::OrderNotFound => "order_not_found",
            Self::Gateway(_) => "gateway_error",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Whether the caller can correct the request and retry (400-class).
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyItems
                | Self::InvalidItem(_)
                | Self::ProductNotFound(_)
                | Self::InsufficientStock { .. }
        )
    }
}

impl From<sqlx::Error> for CheckoutError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
