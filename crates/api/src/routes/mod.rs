//! HTTP route handlers and the state they share.

pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;

use ::orders::OrderService;
use store::Storage;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Storage> {
    pub order_service: OrderService<S>,
}

impl<S: Storage> AppState<S> {
    pub fn new(storage: S) -> Self {
        Self {
            order_service: OrderService::new(storage),
        }
    }
}
