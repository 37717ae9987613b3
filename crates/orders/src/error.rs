//! Engine error types.

use common::{OrderId, OrderStatus, ProductId, UserId};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while creating, cancelling or reading orders.
///
/// Everything except [`OrderError::Storage`] reflects real state and is not
/// worth retrying.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The request was malformed; no transaction was opened.
    #[error("Invalid order request: {0}")]
    InvalidRequest(String),

    /// The ordering user does not exist.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// A cart line referenced a product that does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A cart line asked for more units than are in stock.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: i32,
    },

    /// The order's status does not allow the requested change.
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// The storage layer failed.
    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl OrderError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::InvalidRequest(_) => "invalid_request",
            OrderError::UserNotFound(_) => "user_not_found",
            OrderError::ProductNotFound(_) => "product_not_found",
            OrderError::OrderNotFound(_) => "order_not_found",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::InvalidTransition { .. } => "invalid_transition",
            OrderError::Storage(_) => "storage",
        }
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(id) => OrderError::UserNotFound(id),
            other => OrderError::Storage(other),
        }
    }
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, OrderError>;
