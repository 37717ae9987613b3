use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::error::ErrorKind;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use crate::{
    LockedOrder, Money, NewOrder, NewOrderItem, NewPayment, NewProduct, NewUser, OrderDetails,
    OrderId, OrderItemDetails, OrderLine, OrderStatus, OrderUser, PaymentId, PaymentRecord,
    ProductId, ProductRecord, Result, StoreError, UserId, UserRecord,
    store::{Storage, Transaction},
};

/// PostgreSQL-backed storage implementation.
///
/// Row locks are taken with `SELECT ... FOR UPDATE`; the `stock >= 0` check
/// and the foreign keys are enforced by the schema.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new PostgreSQL store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool bounded to `max_connections` concurrent transactions.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        tracing::debug!(max_connections, "opened PostgreSQL pool");
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::debug!("migrations up to date");
        Ok(())
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn row_to_product(row: PgRow) -> Result<ProductRecord> {
        Ok(ProductRecord {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            price: Money::new(row.try_get::<Decimal, _>("price")?),
            stock: row.try_get("stock")?,
        })
    }
}

/// Translates constraint violations into their storage error.
fn map_constraint(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && let Some(constraint) = db_err.constraint()
    {
        let constraint = constraint.to_string();
        match db_err.kind() {
            ErrorKind::CheckViolation => return StoreError::CheckViolation { constraint },
            ErrorKind::UniqueViolation => return StoreError::UniqueViolation { constraint },
            _ => {}
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl Storage for PgStore {
    type Tx = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction> {
        let tx = self.pool.begin().await?;
        Ok(PgTransaction { tx })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<ProductRecord>> {
        let rows = sqlx::query("SELECT id, name, price, stock FROM products ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<ProductRecord>> {
        let row = sqlx::query("SELECT id, name, price, stock FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn get_order_details(&self, id: OrderId) -> Result<Option<OrderDetails>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT o.id, o.status, o.total_amount, o.created_at, u.id AS user_id, u.email
            FROM orders o
            JOIN users u ON u.id = o.user_id
            WHERE o.id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let item_rows = sqlx::query(
            r#"
            SELECT oi.product_id, p.name AS product_name, oi.quantity, oi.price
            FROM order_items oi
            JOIN products p ON p.id = oi.product_id
            WHERE oi.order_id = $1
            ORDER BY oi.line_seq ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let items = item_rows
            .into_iter()
            .map(|r| {
                Ok(OrderItemDetails {
                    product_id: ProductId::from_uuid(r.try_get::<Uuid, _>("product_id")?),
                    product_name: r.try_get("product_name")?,
                    quantity: r.try_get("quantity")?,
                    price: Money::new(r.try_get::<Decimal, _>("price")?),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(OrderDetails {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            status: OrderStatus::from(row.try_get::<String, _>("status")?),
            total_amount: Money::new(row.try_get::<Decimal, _>("total_amount")?),
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            user: OrderUser {
                id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
                email: row.try_get("email")?,
            },
            items,
        }))
    }

    async fn get_payment(&self, order_id: OrderId) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query(
            "SELECT id, order_id, amount, status, created_at FROM payments WHERE order_id = $1",
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(PaymentRecord {
                id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
                order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
                amount: Money::new(row.try_get::<Decimal, _>("amount")?),
                status: row.try_get("status")?,
                created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserRecord> {
        let id = UserId::new();
        let created_at: DateTime<Utc> = sqlx::query_scalar(
            "INSERT INTO users (id, email, password) VALUES ($1, $2, $3) RETURNING created_at",
        )
        .bind(id.as_uuid())
        .bind(&user.email)
        .bind(&user.password)
        .fetch_one(&self.pool)
        .await
        .map_err(map_constraint)?;

        Ok(UserRecord {
            id,
            email: user.email,
            created_at,
        })
    }

    async fn insert_product(&self, product: NewProduct) -> Result<ProductRecord> {
        let id = ProductId::new();
        sqlx::query("INSERT INTO products (id, name, price, stock) VALUES ($1, $2, $3, $4)")
            .bind(id.as_uuid())
            .bind(&product.name)
            .bind(product.price.amount())
            .bind(product.stock)
            .execute(&self.pool)
            .await
            .map_err(map_constraint)?;

        Ok(ProductRecord {
            id,
            name: product.name,
            price: product.price,
            stock: product.stock,
        })
    }
}

/// A PostgreSQL transaction.
///
/// Dropping it without commit rolls back, as `sqlx::Transaction` does.
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn insert_order(&mut self, order: NewOrder) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders (id, user_id, status, total_amount) VALUES ($1, $2, $3, $4)",
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.total_amount.amount())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && matches!(db_err.kind(), ErrorKind::ForeignKeyViolation)
            {
                return StoreError::UserNotFound(order.user_id);
            }
            map_constraint(e)
        })?;

        Ok(())
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<ProductRecord>> {
        let row = sqlx::query("SELECT id, name, price, stock FROM products WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(PgStore::row_to_product).transpose()
    }

    async fn adjust_stock(&mut self, id: ProductId, delta: i32) -> Result<()> {
        let result = sqlx::query("UPDATE products SET stock = stock + $1 WHERE id = $2")
            .bind(delta)
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(map_constraint)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(id));
        }
        Ok(())
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, product_id, quantity, price)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(item.order_id.as_uuid())
        .bind(item.product_id.as_uuid())
        .bind(item.quantity)
        .bind(item.price.amount())
        .execute(&mut *self.tx)
        .await
        .map_err(map_constraint)?;

        Ok(())
    }

    async fn set_order_total(&mut self, id: OrderId, total: Money) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET total_amount = $1 WHERE id = $2")
            .bind(total.amount())
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(id));
        }
        Ok(())
    }

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<()> {
        sqlx::query("INSERT INTO payments (id, order_id, amount, status) VALUES ($1, $2, $3, $4)")
            .bind(payment.id.as_uuid())
            .bind(payment.order_id.as_uuid())
            .bind(payment.amount.amount())
            .bind(payment.status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(map_constraint)?;

        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<LockedOrder>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(status.map(|s| LockedOrder {
            id,
            status: OrderStatus::from(s),
        }))
    }

    async fn order_lines(&mut self, id: OrderId) -> Result<Vec<OrderLine>> {
        let rows = sqlx::query(
            "SELECT product_id, quantity FROM order_items WHERE order_id = $1 ORDER BY line_seq",
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(OrderLine {
                    product_id: ProductId::from_uuid(r.try_get::<Uuid, _>("product_id")?),
                    quantity: r.try_get("quantity")?,
                })
            })
            .collect()
    }

    async fn set_order_status(&mut self, id: OrderId, status: &OrderStatus) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(id));
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
