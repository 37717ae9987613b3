use thiserror::Error;

use crate::{OrderId, ProductId, UserId};

/// Errors that can occur when interacting with the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An order referenced a user that does not exist.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// A write targeted a product row that does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// A write targeted an order row that does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A check constraint rejected the write (e.g. `stock >= 0`).
    #[error("Check constraint '{constraint}' violated")]
    CheckViolation { constraint: String },

    /// A unique constraint rejected the write.
    #[error("Unique constraint '{constraint}' violated")]
    UniqueViolation { constraint: String },

    /// The store is not reachable.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
