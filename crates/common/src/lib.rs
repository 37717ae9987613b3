//! Shared types used across the storage, engine and API crates.

pub mod money;
pub mod status;
pub mod types;

pub use money::Money;
pub use status::{OrderStatus, PaymentStatus};
pub use types::{OrderId, PaymentId, ProductId, UserId};
