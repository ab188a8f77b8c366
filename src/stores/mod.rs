//! Store interfaces the checkout core depends on.
//!
//! The product catalog and order book live in external storage; the core
//! only sees the narrow operations below. `OrderStore::create_reserving_stock`
//! is deliberately one atomic unit (order insert + conditional stock
//! decrements) so a failed reservation can never leave either a stray
//! order or a stray decrement behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{Order, OrderStatus, StatusWrite};
use crate::Result;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PgOrderStore, PgProductStockStore};

/// Projection of a catalog product as this core sees it: a price/name
/// snapshot source and a mutable stock counter.
#[derive(Clone, Debug)]
pub struct StockRecord {
    pub id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub available: i32,
}

#[async_trait]
pub trait ProductStockStore: Send + Sync {
    async fn product(&self, id: &str) -> Result<Option<StockRecord>>;

    /// Atomically decrements stock by `qty` if at least `qty` units are
    /// available. Returns false (without mutating) when they are not.
    async fn reserve(&self, id: &str, qty: u32) -> Result<bool>;

    /// Compensating increment for a previously successful [`reserve`].
    ///
    /// [`reserve`]: ProductStockStore::reserve
    async fn release(&self, id: &str, qty: u32) -> Result<()>;

    /// Absolute stock write (seeding / admin paths).
    async fn set_stock(&self, id: &str, qty: i32) -> Result<()>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists the order and decrements stock for every line item in a
    /// single atomic unit. Fails with `InsufficientStock` (and persists
    /// nothing) if any item's conditional decrement misses.
    async fn create_reserving_stock(&self, order: &Order) -> Result<()>;

    async fn order(&self, id: &str) -> Result<Option<Order>>;

    /// Attaches the payment session reference. Reapplying the same value
    /// is a no-op. Fails with `OrderNotFound` for unknown ids.
    async fn set_payment_reference(&self, id: &str, provider: &str, reference: &str)
        -> Result<()>;

    /// Applies a status through the order state machine. Same-status
    /// writes report `Unchanged`; illegal transitions report `Refused`
    /// and leave the order untouched. Fails with `OrderNotFound` for
    /// unknown ids.
    async fn set_status(&self, id: &str, status: OrderStatus) -> Result<StatusWrite>;

    /// Orders still in `pending_payment` with no payment reference,
    /// created before the cutoff. Feeds the abandoned-order sweep.
    async fn abandoned_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<Order>>;
}
