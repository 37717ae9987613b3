use async_trait::async_trait;

use crate::{
    LockedOrder, Money, NewOrder, NewOrderItem, NewPayment, NewProduct, NewUser, OrderDetails,
    OrderId, OrderLine, OrderStatus, PaymentRecord, ProductId, ProductRecord, Result, UserRecord,
};

/// Core trait for storage implementations.
///
/// A storage hands out [`Transaction`] units of work and answers the
/// read-only queries that do not need row locks. All implementations must be
/// thread-safe (Send + Sync); the handle is passed explicitly to every engine.
#[async_trait]
pub trait Storage: Send + Sync {
    /// The unit of work type produced by [`Storage::begin`].
    type Tx: Transaction;

    /// Opens a transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Performs a trivial round trip to check the store is reachable.
    async fn ping(&self) -> Result<()>;

    /// Lists all products ordered by id.
    async fn list_products(&self) -> Result<Vec<ProductRecord>>;

    /// Retrieves a single product.
    async fn get_product(&self, id: ProductId) -> Result<Option<ProductRecord>>;

    /// Retrieves an order joined with its owner and line items.
    ///
    /// Returns None if the order doesn't exist.
    async fn get_order_details(&self, id: OrderId) -> Result<Option<OrderDetails>>;

    /// Retrieves the payment recorded for an order.
    async fn get_payment(&self, order_id: OrderId) -> Result<Option<PaymentRecord>>;

    /// Registers a user. Fails with `UniqueViolation` on a duplicate email.
    async fn insert_user(&self, user: NewUser) -> Result<UserRecord>;

    /// Adds a product to the catalogue.
    async fn insert_product(&self, product: NewProduct) -> Result<ProductRecord>;
}

/// A unit of work against the store.
///
/// Writes become visible to other lockers only after [`Transaction::commit`].
/// Row locks taken with `lock_*` are held until the transaction ends.
/// A transaction dropped without commit or rollback is rolled back.
#[async_trait]
pub trait Transaction: Send {
    /// Inserts an order row. Fails with `UserNotFound` if the owner is missing.
    async fn insert_order(&mut self, order: NewOrder) -> Result<()>;

    /// Locks a product row exclusively and reads it.
    ///
    /// Returns None if the product doesn't exist.
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<ProductRecord>>;

    /// Adds `delta` to a product's stock. Fails with `CheckViolation` if the
    /// result would be negative.
    async fn adjust_stock(&mut self, id: ProductId, delta: i32) -> Result<()>;

    /// Inserts a line item.
    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<()>;

    /// Sets an order's total amount.
    async fn set_order_total(&mut self, id: OrderId, total: Money) -> Result<()>;

    /// Inserts a payment row.
    async fn insert_payment(&mut self, payment: NewPayment) -> Result<()>;

    /// Locks an order row exclusively and reads its status.
    ///
    /// Returns None if the order doesn't exist.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<LockedOrder>>;

    /// Reads the product and quantity of every line item of an order.
    async fn order_lines(&mut self, id: OrderId) -> Result<Vec<OrderLine>>;

    /// Sets an order's status.
    async fn set_order_status(&mut self, id: OrderId, status: &OrderStatus) -> Result<()>;

    /// Makes all writes durable and releases the row locks.
    async fn commit(self) -> Result<()>;

    /// Discards all writes and releases the row locks.
    async fn rollback(self) -> Result<()>;
}
