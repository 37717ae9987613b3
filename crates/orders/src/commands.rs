//! Engine inputs and results.

use common::{Money, OrderId, OrderStatus, ProductId, UserId};

use crate::error::{OrderError, Result};

/// One line of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CartItem {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Command to turn a cart into an order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    /// None when the caller supplied no user.
    pub user_id: Option<UserId>,
    pub items: Vec<CartItem>,
}

impl CreateOrder {
    /// Creates a command for a known user.
    pub fn new(user_id: UserId, items: Vec<CartItem>) -> Self {
        Self {
            user_id: Some(user_id),
            items,
        }
    }

    /// Checks the command's shape without touching storage.
    pub(crate) fn validate(&self) -> Result<(UserId, Vec<ValidLine>)> {
        let user_id = self
            .user_id
            .ok_or_else(|| OrderError::InvalidRequest("userId is required".to_string()))?;

        if self.items.is_empty() {
            return Err(OrderError::InvalidRequest(
                "items must be a non-empty list".to_string(),
            ));
        }

        let lines = self
            .items
            .iter()
            .map(|item| {
                let quantity = i32::try_from(item.quantity)
                    .ok()
                    .filter(|q| *q > 0)
                    .ok_or_else(|| {
                        OrderError::InvalidRequest(format!(
                            "quantity for product {} must be between 1 and {}",
                            item.product_id,
                            i32::MAX
                        ))
                    })?;
                Ok(ValidLine {
                    product_id: item.product_id,
                    requested: item.quantity,
                    quantity,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((user_id, lines))
    }
}

/// A cart line whose quantity fits the `order_items.quantity` column.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ValidLine {
    pub product_id: ProductId,
    pub requested: u32,
    pub quantity: i32,
}

/// Result of a successful order creation.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub total_amount: Money,
}

/// Result of a cancellation; identical whether or not this call did the work.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub status: OrderStatus,
}
