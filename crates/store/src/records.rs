//! Row types exchanged with the storage layer.

use chrono::{DateTime, Utc};

use crate::{Money, OrderId, OrderStatus, PaymentId, PaymentStatus, ProductId, UserId};

/// A user to register.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    /// Stored as given; hashing belongs to the authentication collaborator.
    pub password: String,
}

impl NewUser {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// A persisted user, without its credential.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A product to add to the catalogue.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub stock: i32,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, price: Money, stock: i32) -> Self {
        Self {
            name: name.into(),
            price,
            stock,
        }
    }
}

/// A product row.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: i32,
}

/// An order row to insert.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Money,
}

/// An order row read under an exclusive lock.
#[derive(Debug, Clone, PartialEq)]
pub struct LockedOrder {
    pub id: OrderId,
    pub status: OrderStatus,
}

/// A line item to insert, carrying the price snapshotted at purchase time.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub price: Money,
}

/// The product and quantity of a persisted line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// A payment row to insert.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub status: PaymentStatus,
}

/// A persisted payment.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// The owner of an order, as shown on the order details.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderUser {
    pub id: UserId,
    pub email: String,
}

/// A line item joined with its product's name.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItemDetails {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    pub price: Money,
}

/// An order joined with its owner and line items.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDetails {
    pub id: OrderId,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub user: OrderUser,
    pub items: Vec<OrderItemDetails>,
}

impl OrderDetails {
    /// Sum of quantity × snapshotted price over all line items.
    pub fn items_total(&self) -> Money {
        self.items
            .iter()
            .map(|item| item.price.times(i64::from(item.quantity)))
            .sum()
    }
}
