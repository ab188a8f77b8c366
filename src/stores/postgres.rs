//! Postgres-backed stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::domain::{LineItem, Order, OrderStatus, ShippingSummary, StatusWrite};
use crate::stores::{OrderStore, ProductStockStore, StockRecord};
use crate::{CheckoutError, Result};

#[derive(Clone)]
pub struct PgProductStockStore {
    pool: PgPool,
}

impl PgProductStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    price: Decimal,
    stock: i32,
}

impl From<ProductRow> for StockRecord {
    fn from(r: ProductRow) -> Self {
        StockRecord {
            id: r.id,
            name: r.name,
            unit_price: r.price,
            available: r.stock,
        }
    }
}

#[async_trait]
impl ProductStockStore for PgProductStockStore {
    async fn product(&self, id: &str) -> Result<Option<StockRecord>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, price, stock FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(StockRecord::from))
    }

    async fn reserve(&self, id: &str, qty: u32) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE products SET stock = stock - $2, updated_at = NOW() \
             WHERE id = $1 AND stock >= $2",
        )
        .bind(id)
        .bind(qty as i32)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, id: &str, qty: u32) -> Result<()> {
        sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(qty as i32)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_stock(&self, id: &str, qty: i32) -> Result<()> {
        let result =
            sqlx::query("UPDATE products SET stock = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(qty)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(CheckoutError::ProductNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn items(&self, order_id: &str) -> Result<Vec<LineItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(
            "SELECT product_id, name, unit_price, quantity FROM order_items \
             WHERE order_id = $1 ORDER BY position",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(LineItem::from).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    user_id: String,
    status: String,
    currency: String,
    total: Decimal,
    shipping: Option<serde_json::Value>,
    payment_provider: Option<String>,
    payment_reference: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    product_id: String,
    name: String,
    unit_price: Decimal,
    quantity: i32,
}

impl From<ItemRow> for LineItem {
    fn from(r: ItemRow) -> Self {
        LineItem {
            product_id: r.product_id,
            name: r.name,
            unit_price: r.unit_price,
            quantity: r.quantity.max(0) as u32,
        }
    }
}

impl OrderRow {
    fn into_order(self, items: Vec<LineItem>) -> Result<Order> {
        let shipping = match self.shipping {
            Some(v) => Some(
                serde_json::from_value::<ShippingSummary>(v)
                    .map_err(|e| CheckoutError::Storage(e.to_string()))?,
            ),
            None => None,
        };
        Ok(Order::hydrate(
            self.id,
            self.user_id,
            OrderStatus::from(self.status),
            self.currency,
            self.total,
            items,
            shipping,
            self.payment_provider,
            self.payment_reference,
            self.created_at,
            self.updated_at,
        ))
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create_reserving_stock(&self, order: &Order) -> Result<()> {
        let shipping = order
            .shipping()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| CheckoutError::Storage(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO orders (id, user_id, status, currency, total, shipping, \
             payment_provider, payment_reference, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NULL, NULL, $7, $8)",
        )
        .bind(order.id())
        .bind(order.user_id())
        .bind(order.status().as_str())
        .bind(order.currency())
        .bind(order.total())
        .bind(&shipping)
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *tx)
        .await?;

        for (position, item) in order.items().iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (order_id, position, product_id, name, unit_price, quantity) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(order.id())
            .bind(position as i32)
            .bind(&item.product_id)
            .bind(&item.name)
            .bind(item.unit_price)
            .bind(item.quantity as i32)
            .execute(&mut *tx)
            .await?;

            // Conditional decrement: a concurrent checkout that drained the
            // stock makes this miss, which aborts the whole transaction.
            let reserved = sqlx::query(
                "UPDATE products SET stock = stock - $2, updated_at = NOW() \
                 WHERE id = $1 AND stock >= $2",
            )
            .bind(&item.product_id)
            .bind(item.quantity as i32)
            .execute(&mut *tx)
            .await?;
            if reserved.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(CheckoutError::InsufficientStock {
                    product: item.name.clone(),
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn order(&self, id: &str) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let items = self.items(id).await?;
                Ok(Some(row.into_order(items)?))
            }
            None => Ok(None),
        }
    }

    async fn set_payment_reference(
        &self,
        id: &str,
        provider: &str,
        reference: &str,
    ) -> Result<()> {
        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(CheckoutError::OrderNotFound);
        }
        // IS DISTINCT FROM keeps the reapply-same-value case a true no-op.
        sqlx::query(
            "UPDATE orders SET payment_provider = $2, payment_reference = $3, updated_at = NOW() \
             WHERE id = $1 AND (payment_provider IS DISTINCT FROM $2 \
             OR payment_reference IS DISTINCT FROM $3)",
        )
        .bind(id)
        .bind(provider)
        .bind(reference)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(&self, id: &str, status: OrderStatus) -> Result<StatusWrite> {
        let mut tx = self.pool.begin().await?;
        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = match current {
            Some((s,)) => OrderStatus::from(s),
            None => return Err(CheckoutError::OrderNotFound),
        };
        if current == status {
            return Ok(StatusWrite::Unchanged);
        }
        if !current.can_transition(&status) {
            return Ok(StatusWrite::Refused);
        }
        sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(StatusWrite::Updated)
    }

    async fn abandoned_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE status = 'pending_payment' \
             AND payment_reference IS NULL AND created_at < $1",
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let items = self.items(&row.id).await?;
            orders.push(row.into_order(items)?);
        }
        Ok(orders)
    }
}
