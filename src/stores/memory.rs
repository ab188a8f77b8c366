//! In-memory store used by tests and local development.
//!
//! One mutex guards both the order book and the stock counters, which
//! gives `create_reserving_stock` the same all-or-nothing behavior as the
//! Postgres transaction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{Order, OrderStatus, StatusWrite};
use crate::stores::{OrderStore, ProductStockStore, StockRecord};
use crate::{CheckoutError, Result};

#[derive(Default)]
struct Inner {
    products: HashMap<String, StockRecord>,
    orders: HashMap<String, Order>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a product record, replacing any existing one with the same id.
    pub async fn put_product(&self, record: StockRecord) {
        let mut inner = self.inner.lock().await;
        inner.products.insert(record.id.clone(), record);
    }

    pub async fn order_count(&self) -> usize {
        self.inner.lock().await.orders.len()
    }
}

#[async_trait]
impl ProductStockStore for MemoryStore {
    async fn product(&self, id: &str) -> Result<Option<StockRecord>> {
        Ok(self.inner.lock().await.products.get(id).cloned())
    }

    async fn reserve(&self, id: &str, qty: u32) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.products.get_mut(id) {
            Some(p) if p.available >= qty as i32 => {
                p.available -= qty as i32;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CheckoutError::ProductNotFound(id.to_string())),
        }
    }

    async fn release(&self, id: &str, qty: u32) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(p) = inner.products.get_mut(id) {
            p.available += qty as i32;
        }
        Ok(())
    }

    async fn set_stock(&self, id: &str, qty: i32) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.products.get_mut(id) {
            Some(p) => {
                p.available = qty;
                Ok(())
            }
            None => Err(CheckoutError::ProductNotFound(id.to_string())),
        }
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_reserving_stock(&self, order: &Order) -> Result<()> {
        let mut inner = self.inner.lock().await;
        // Sequential conditional decrements, like the Postgres transaction:
        // a cart listing the same product twice sees its own earlier
        // decrements. A miss undoes everything already reserved.
        let mut failure = None;
        let mut reserved = 0;
        for item in order.items() {
            match inner.products.get_mut(&item.product_id) {
                Some(p) if p.available >= item.quantity as i32 => {
                    p.available -= item.quantity as i32;
                    reserved += 1;
                }
                Some(_) => {
                    failure = Some(CheckoutError::InsufficientStock {
                        product: item.name.clone(),
                    });
                    break;
                }
                None => {
                    failure = Some(CheckoutError::ProductNotFound(item.product_id.clone()));
                    break;
                }
            }
        }
        if let Some(err) = failure {
            for item in &order.items()[..reserved] {
                if let Some(p) = inner.products.get_mut(&item.product_id) {
                    p.available += item.quantity as i32;
                }
            }
            return Err(err);
        }
        inner.orders.insert(order.id().to_string(), order.clone());
        Ok(())
    }

    async fn order(&self, id: &str) -> Result<Option<Order>> {
        Ok(self.inner.lock().await.orders.get(id).cloned())
    }

    async fn set_payment_reference(
        &self,
        id: &str,
        provider: &str,
        reference: &str,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let order = inner
            .orders
            .get_mut(id)
            .ok_or(CheckoutError::OrderNotFound)?;
        order.attach_payment_reference(provider, reference);
        Ok(())
    }

    async fn set_status(&self, id: &str, status: OrderStatus) -> Result<StatusWrite> {
        let mut inner = self.inner.lock().await;
        let order = inner
            .orders
            .get_mut(id)
            .ok_or(CheckoutError::OrderNotFound)?;
        Ok(order.apply_status(status))
    }

    async fn abandoned_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<Order>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .orders
            .values()
            .filter(|o| {
                o.status() == &OrderStatus::PendingPayment
                    && o.payment_reference().is_none()
                    && o.created_at() < older_than
            })
            .cloned()
            .collect())
    }
}
