//! Order and payment status values.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// processing ──┬──► cancelled ──► cancelled (no-op)
///              │
///              └──► shipped (external fulfillment, terminal)
/// ```
///
/// Statuses written by other processes are preserved in [`OrderStatus::Other`]
/// and are never cancellable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    /// Order has been placed and stock is reserved.
    #[default]
    Processing,

    /// Order has left the warehouse (terminal state).
    Shipped,

    /// Order was cancelled and its stock restored (terminal state).
    Cancelled,

    /// Any status this core does not model.
    Other(String),
}

impl OrderStatus {
    /// Returns true if cancelling from this status restores stock.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Processing)
    }

    /// Returns true if the order can be handed to fulfillment.
    pub fn can_ship(&self) -> bool {
        matches!(self, OrderStatus::Processing)
    }

    /// Returns the status as stored in the `orders.status` column.
    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Other(s) => s,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for OrderStatus {
    fn from(s: &str) -> Self {
        match s {
            "processing" => OrderStatus::Processing,
            "shipped" => OrderStatus::Shipped,
            "cancelled" => OrderStatus::Cancelled,
            other => OrderStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(s: String) -> Self {
        OrderStatus::from(s.as_str())
    }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Outcome recorded on a payment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Succeeded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Succeeded => "succeeded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
