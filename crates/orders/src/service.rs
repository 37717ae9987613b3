//! Order service hosting the creation and cancellation engines.

use std::collections::HashMap;
use std::time::Instant;

use common::{Money, OrderId, OrderStatus, PaymentId, PaymentStatus, ProductId, UserId};
use store::{
    NewOrder, NewOrderItem, NewPayment, OrderDetails, ProductRecord, Storage, Transaction,
};

use crate::commands::{CreateOrder, OrderCancelled, OrderPlaced, ValidLine};
use crate::error::{OrderError, Result};
use crate::transaction::settle;

/// What a cancellation call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelOutcome {
    Cancelled,
    AlreadyCancelled,
}

impl CancelOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            CancelOutcome::Cancelled => "cancelled",
            CancelOutcome::AlreadyCancelled => "already_cancelled",
        }
    }
}

/// Service for placing and cancelling orders.
///
/// Each write operation runs in a single storage transaction: it either
/// commits every change or rolls back all of them. Contending operations on
/// the same product or order are serialized by the store's row locks.
pub struct OrderService<S: Storage> {
    storage: S,
}

impl<S: Storage> OrderService<S> {
    /// Creates a new order service over the given storage.
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Returns a reference to the underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Converts a cart into an order, reserving stock and recording payment.
    ///
    /// Products are locked in ascending id order before any line is
    /// processed, so two carts sharing products cannot deadlock. Lines are
    /// then applied in the order given; a product listed twice is checked
    /// against what the earlier line left.
    #[tracing::instrument(skip(self, cmd), fields(user_id = tracing::field::Empty, items = cmd.items.len()))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<OrderPlaced> {
        let (user_id, lines) = match cmd.validate() {
            Ok(validated) => validated,
            Err(err) => {
                metrics::counter!("orders_rejected_total", "reason" => err.kind()).increment(1);
                return Err(err);
            }
        };
        tracing::Span::current().record("user_id", tracing::field::display(user_id));

        let started = Instant::now();
        let result = match self.storage.begin().await {
            Ok(mut tx) => {
                let outcome = place_order(&mut tx, user_id, &lines).await;
                settle(tx, "create_order", outcome).await
            }
            Err(err) => Err(err.into()),
        };

        metrics::histogram!("order_transaction_duration_seconds", "operation" => "create_order")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(placed) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(order_id = %placed.order_id, total = %placed.total_amount, "order placed");
            }
            Err(err) => {
                metrics::counter!("orders_rejected_total", "reason" => err.kind()).increment(1);
                tracing::info!(error = %err, "order rejected");
            }
        }
        result
    }

    /// Cancels an order and restores its stock.
    ///
    /// Cancelling an already cancelled order succeeds without changes.
    /// Shipped orders and any status other than `processing` are refused.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<OrderCancelled> {
        let started = Instant::now();
        let result = match self.storage.begin().await {
            Ok(mut tx) => {
                let outcome = revoke_order(&mut tx, order_id).await;
                settle(tx, "cancel_order", outcome).await
            }
            Err(err) => Err(err.into()),
        };

        metrics::histogram!("order_transaction_duration_seconds", "operation" => "cancel_order")
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(outcome) => {
                metrics::counter!("orders_cancelled_total", "outcome" => outcome.as_str())
                    .increment(1);
                tracing::info!(outcome = outcome.as_str(), "order cancelled");
                Ok(OrderCancelled {
                    order_id,
                    status: OrderStatus::Cancelled,
                })
            }
            Err(err) => {
                metrics::counter!("orders_cancelled_total", "outcome" => err.kind()).increment(1);
                tracing::info!(error = %err, "cancellation refused");
                Err(err)
            }
        }
    }

    /// Hands a processing order to fulfillment by marking it shipped.
    ///
    /// Stands in for the external fulfillment process. Marking a shipped
    /// order again is a no-op; any other status is refused.
    #[tracing::instrument(skip(self))]
    pub async fn mark_shipped(&self, order_id: OrderId) -> Result<OrderStatus> {
        let mut tx = self.storage.begin().await?;
        let outcome = ship_order(&mut tx, order_id).await;
        settle(tx, "mark_shipped", outcome).await
    }

    /// Loads an order with its owner and line items.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<OrderDetails> {
        self.storage
            .get_order_details(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))
    }

    /// Lists the catalogue ordered by product id.
    #[tracing::instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<ProductRecord>> {
        Ok(self.storage.list_products().await?)
    }

    /// Returns true if the storage answers a round trip.
    pub async fn is_healthy(&self) -> bool {
        match self.storage.ping().await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "storage health check failed");
                false
            }
        }
    }
}

// -- Creation engine --

async fn place_order<Tx: Transaction>(
    tx: &mut Tx,
    user_id: UserId,
    lines: &[ValidLine],
) -> Result<OrderPlaced> {
    let order_id = OrderId::new();
    tx.insert_order(NewOrder {
        id: order_id,
        user_id,
        status: OrderStatus::Processing,
        total_amount: Money::zero(),
    })
    .await?;

    let mut products = lock_products(tx, lines.iter().map(|line| line.product_id)).await?;

    let mut total = Money::zero();
    for line in lines {
        let product = products
            .get_mut(&line.product_id)
            .ok_or(OrderError::ProductNotFound(line.product_id))?;

        if line.quantity > product.stock {
            return Err(OrderError::InsufficientStock {
                product_id: line.product_id,
                requested: line.requested,
                available: product.stock,
            });
        }

        total += product.price.times(i64::from(line.quantity));
        tx.adjust_stock(product.id, -line.quantity).await?;
        product.stock -= line.quantity;

        tx.insert_order_item(NewOrderItem {
            order_id,
            product_id: product.id,
            quantity: line.quantity,
            price: product.price,
        })
        .await?;
    }

    tx.set_order_total(order_id, total).await?;
    tx.insert_payment(NewPayment {
        id: PaymentId::new(),
        order_id,
        amount: total,
        status: PaymentStatus::Succeeded,
    })
    .await?;

    Ok(OrderPlaced {
        order_id,
        status: OrderStatus::Processing,
        total_amount: total,
    })
}

/// Locks every distinct product in ascending id order.
async fn lock_products<Tx: Transaction>(
    tx: &mut Tx,
    ids: impl Iterator<Item = ProductId>,
) -> Result<HashMap<ProductId, ProductRecord>> {
    let mut ids: Vec<ProductId> = ids.collect();
    ids.sort();
    ids.dedup();

    let mut locked = HashMap::with_capacity(ids.len());
    for id in ids {
        let product = tx
            .lock_product(id)
            .await?
            .ok_or(OrderError::ProductNotFound(id))?;
        locked.insert(id, product);
    }
    Ok(locked)
}

// -- Cancellation engine --

async fn revoke_order<Tx: Transaction>(tx: &mut Tx, order_id: OrderId) -> Result<CancelOutcome> {
    let order = tx
        .lock_order(order_id)
        .await?
        .ok_or(OrderError::OrderNotFound(order_id))?;

    match order.status {
        OrderStatus::Cancelled => return Ok(CancelOutcome::AlreadyCancelled),
        ref status if !status.can_cancel() => {
            return Err(OrderError::InvalidTransition {
                order_id,
                from: status.clone(),
                to: OrderStatus::Cancelled,
            });
        }
        _ => {}
    }

    let lines = tx.order_lines(order_id).await?;
    lock_products(tx, lines.iter().map(|line| line.product_id)).await?;
    for line in &lines {
        tx.adjust_stock(line.product_id, line.quantity).await?;
    }

    tx.set_order_status(order_id, &OrderStatus::Cancelled).await?;
    Ok(CancelOutcome::Cancelled)
}

async fn ship_order<Tx: Transaction>(tx: &mut Tx, order_id: OrderId) -> Result<OrderStatus> {
    let order = tx
        .lock_order(order_id)
        .await?
        .ok_or(OrderError::OrderNotFound(order_id))?;

    match order.status {
        OrderStatus::Shipped => Ok(OrderStatus::Shipped),
        ref status if status.can_ship() => {
            tx.set_order_status(order_id, &OrderStatus::Shipped).await?;
            Ok(OrderStatus::Shipped)
        }
        status => Err(OrderError::InvalidTransition {
            order_id,
            from: status,
            to: OrderStatus::Shipped,
        }),
    }
}
