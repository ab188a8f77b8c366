//! Checkout orchestration.
//!
//! Converts a submitted cart into a durable order, reserves inventory and
//! obtains a payable checkout session, strictly in that sequence. All
//! validation happens before anything is written; the order insert and the
//! stock reservation commit together, so a losing concurrent checkout
//! leaves neither an order nor a decrement behind.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::{LineItem, Order, OrderStatus, ShippingSummary, StatusWrite};
use crate::events::EventPublisher;
use crate::gateway::{CreateSessionRequest, PaymentGateway};
use crate::stores::{OrderStore, ProductStockStore};
use crate::{CheckoutError, Result};

/// Provider label recorded on orders alongside the session reference.
const PAYMENT_PROVIDER: &str = "mercadopago";

#[derive(Clone, Debug)]
pub struct CheckoutItem {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Clone, Debug)]
pub struct CheckoutCommand {
    pub user_id: String,
    pub items: Vec<CheckoutItem>,
    pub shipping: Option<ShippingSummary>,
    pub currency: String,
    pub success_url: String,
    pub failure_url: String,
    pub pending_url: String,
}

#[derive(Clone, Debug)]
pub struct CheckoutOutcome {
    pub order_id: String,
    pub total: Decimal,
    pub currency: String,
    pub checkout_url: String,
}

#[derive(Clone)]
pub struct CheckoutService {
    orders: Arc<dyn OrderStore>,
    products: Arc<dyn ProductStockStore>,
    gateway: Arc<dyn PaymentGateway>,
    events: EventPublisher,
    sandbox: bool,
}

impl CheckoutService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        products: Arc<dyn ProductStockStore>,
        gateway: Arc<dyn PaymentGateway>,
        events: EventPublisher,
        sandbox: bool,
    ) -> Self {
        Self {
            orders,
            products,
            gateway,
            events,
            sandbox,
        }
    }

    #[instrument(skip_all, fields(user_id = %command.user_id))]
    pub async fn checkout(&self, command: CheckoutCommand) -> Result<CheckoutOutcome> {
        if command.items.is_empty() {
            return Err(CheckoutError::EmptyItems);
        }

        // Validate and snapshot, in cart order, short-circuiting on the
        // first bad item. No state is touched in this phase.
        let mut line_items = Vec::with_capacity(command.items.len());
        for item in &command.items {
            if item.product_id.trim().is_empty() {
                return Err(CheckoutError::InvalidItem("product id is blank".into()));
            }
            if item.quantity == 0 {
                return Err(CheckoutError::InvalidItem(format!(
                    "quantity for product {} must be positive",
                    item.product_id
                )));
            }
            // Stock counters are 32-bit; anything larger would wrap the
            // availability checks.
            if item.quantity > i32::MAX as u32 {
                return Err(CheckoutError::InvalidItem(format!(
                    "quantity for product {} is too large",
                    item.product_id
                )));
            }
            let record = self
                .products
                .product(&item.product_id)
                .await?
                .ok_or_else(|| CheckoutError::ProductNotFound(item.product_id.clone()))?;
            if record.available < item.quantity as i32 {
                return Err(CheckoutError::InsufficientStock {
                    product: record.name,
                });
            }
            line_items.push(LineItem {
                product_id: record.id,
                name: record.name,
                unit_price: record.unit_price,
                quantity: item.quantity,
            });
        }

        let order_id = Uuid::now_v7().to_string();
        let order = Order::new(
            order_id.as_str(),
            command.user_id.as_str(),
            command.currency.as_str(),
            line_items,
            command.shipping.clone(),
        );

        // Order insert and stock decrements commit atomically; a concurrent
        // checkout that drained the stock fails here with nothing persisted.
        self.orders.create_reserving_stock(&order).await?;
        info!(order_id, total = %order.total(), "order created");
        self.events
            .publish(
                "order.created",
                json!({ "order_id": order_id, "user_id": command.user_id, "total": order.total(), "currency": command.currency }),
            )
            .await;

        // If the gateway call fails past this point the order stays in
        // pending_payment with stock held and no payment reference; the
        // abandoned-order sweep cancels it and restores the stock.
        let session = self
            .gateway
            .create_checkout_session(CreateSessionRequest {
                description: format!("Order {order_id}"),
                amount: order.total(),
                currency: command.currency.clone(),
                success_url: command.success_url,
                failure_url: command.failure_url,
                pending_url: command.pending_url,
                external_reference: order_id.clone(),
                payer_email: None,
            })
            .await?;

        self.orders
            .set_payment_reference(&order_id, PAYMENT_PROVIDER, &session.id)
            .await?;

        Ok(CheckoutOutcome {
            checkout_url: session.redirect_url(self.sandbox).to_string(),
            order_id,
            total: order.total(),
            currency: command.currency,
        })
    }

    /// Cancels orders stuck in `pending_payment` with no payment reference
    /// for longer than `ttl` and returns their stock. Safe to run
    /// concurrently: only the sweep instance whose status write actually
    /// lands releases the stock.
    #[instrument(skip(self))]
    pub async fn release_abandoned(&self, ttl: Duration) -> Result<usize> {
        let cutoff = Utc::now() - ttl;
        let mut released = 0;
        for order in self.orders.abandoned_pending(cutoff).await? {
            match self
                .orders
                .set_status(order.id(), OrderStatus::Cancelled)
                .await?
            {
                StatusWrite::Updated => {}
                _ => continue,
            }
            for item in order.items() {
                self.products.release(&item.product_id, item.quantity).await?;
            }
            warn!(order_id = %order.id(), "cancelled abandoned order and restored stock");
            self.events
                .publish(
                    "order.status_changed",
                    json!({ "order_id": order.id(), "status": OrderStatus::Cancelled.as_str() }),
                )
                .await;
            released += 1;
        }
        Ok(released)
    }
}
