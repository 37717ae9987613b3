//! Order transaction engines.
//!
//! This crate provides:
//! - the creation engine, which turns a cart into an order while locking and
//!   decrementing stock, recording line items and a payment atomically
//! - the cancellation engine, which restores stock idempotently and refuses
//!   illegal transitions
//! - the transaction settling helper shared by both

pub mod commands;
pub mod error;
pub mod service;
mod transaction;

pub use commands::{CartItem, CreateOrder, OrderCancelled, OrderPlaced};
pub use error::{OrderError, Result};
pub use service::OrderService;
