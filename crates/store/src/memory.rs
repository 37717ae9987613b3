use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use crate::{
    LockedOrder, Money, NewOrder, NewOrderItem, NewPayment, NewProduct, NewUser, OrderDetails,
    OrderId, OrderItemDetails, OrderLine, OrderStatus, OrderUser, PaymentRecord, ProductId,
    ProductRecord, Result, StoreError, UserId, UserRecord,
    store::{Storage, Transaction},
};

const STOCK_CONSTRAINT: &str = "stock_non_negative";
const EMAIL_CONSTRAINT: &str = "users_email_key";

#[derive(Debug, Clone)]
struct UserRow {
    record: UserRecord,
    #[allow(dead_code)] // Kept for parity with the users table
    password: String,
}

#[derive(Debug, Clone)]
struct OrderRow {
    user_id: UserId,
    status: OrderStatus,
    total_amount: Money,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct OrderItemRow {
    seq: u64,
    order_id: OrderId,
    product_id: ProductId,
    quantity: i32,
    price: Money,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, UserRow>,
    products: BTreeMap<ProductId, ProductRecord>,
    orders: HashMap<OrderId, OrderRow>,
    order_items: Vec<OrderItemRow>,
    payments: Vec<PaymentRecord>,
    next_item_seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Product(ProductId),
    Order(OrderId),
}

fn lock_tables(tables: &Mutex<Tables>) -> MutexGuard<'_, Tables> {
    tables.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory storage implementation for testing and local runs.
///
/// Each transaction buffers its writes and applies them to the shared tables
/// in one step on commit, so reads outside a transaction only ever see
/// committed rows. Row locks are async mutexes held until the transaction
/// ends, so contending transactions on the same product or order are
/// serialized exactly as `SELECT ... FOR UPDATE` would.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    row_locks: Arc<Mutex<HashMap<RowKey, Arc<RowLock<()>>>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `Unavailable`, or restores service.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of orders stored.
    pub fn order_count(&self) -> usize {
        lock_tables(&self.tables).orders.len()
    }

    /// Returns the number of line items stored.
    pub fn order_item_count(&self) -> usize {
        lock_tables(&self.tables).order_items.len()
    }

    /// Returns the number of payments stored.
    pub fn payment_count(&self) -> usize {
        lock_tables(&self.tables).payments.len()
    }

    /// Overwrites an order's status, as an external process would.
    pub fn force_order_status(&self, id: OrderId, status: OrderStatus) -> Result<()> {
        let mut tables = lock_tables(&self.tables);
        let order = tables
            .orders
            .get_mut(&id)
            .ok_or(StoreError::OrderNotFound(id))?;
        order.status = status;
        Ok(())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        self.check_available()?;
        Ok(InMemoryTransaction {
            tables: self.tables.clone(),
            row_locks: self.row_locks.clone(),
            held: HashMap::new(),
            writes: WriteSet::default(),
        })
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    async fn list_products(&self) -> Result<Vec<ProductRecord>> {
        self.check_available()?;
        Ok(lock_tables(&self.tables).products.values().cloned().collect())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<ProductRecord>> {
        self.check_available()?;
        Ok(lock_tables(&self.tables).products.get(&id).cloned())
    }

    async fn get_order_details(&self, id: OrderId) -> Result<Option<OrderDetails>> {
        self.check_available()?;
        let tables = lock_tables(&self.tables);

        let Some(order) = tables.orders.get(&id) else {
            return Ok(None);
        };
        let Some(user) = tables.users.get(&order.user_id) else {
            return Ok(None);
        };

        let items = tables
            .order_items
            .iter()
            .filter(|item| item.order_id == id)
            .filter_map(|item| {
                let product = tables.products.get(&item.product_id)?;
                Some(OrderItemDetails {
                    product_id: item.product_id,
                    product_name: product.name.clone(),
                    quantity: item.quantity,
                    price: item.price,
                })
            })
            .collect();

        Ok(Some(OrderDetails {
            id,
            status: order.status.clone(),
            total_amount: order.total_amount,
            created_at: order.created_at,
            user: OrderUser {
                id: user.record.id,
                email: user.record.email.clone(),
            },
            items,
        }))
    }

    async fn get_payment(&self, order_id: OrderId) -> Result<Option<PaymentRecord>> {
        self.check_available()?;
        Ok(lock_tables(&self.tables)
            .payments
            .iter()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserRecord> {
        self.check_available()?;
        let mut tables = lock_tables(&self.tables);

        if tables.users.values().any(|u| u.record.email == user.email) {
            return Err(StoreError::UniqueViolation {
                constraint: EMAIL_CONSTRAINT.to_string(),
            });
        }

        let record = UserRecord {
            id: UserId::new(),
            email: user.email,
            created_at: Utc::now(),
        };
        tables.users.insert(
            record.id,
            UserRow {
                record: record.clone(),
                password: user.password,
            },
        );
        Ok(record)
    }

    async fn insert_product(&self, product: NewProduct) -> Result<ProductRecord> {
        self.check_available()?;
        if product.stock < 0 {
            return Err(StoreError::CheckViolation {
                constraint: STOCK_CONSTRAINT.to_string(),
            });
        }

        let record = ProductRecord {
            id: ProductId::new(),
            name: product.name,
            price: product.price,
            stock: product.stock,
        };
        lock_tables(&self.tables)
            .products
            .insert(record.id, record.clone());
        Ok(record)
    }
}

/// Rows written by a transaction that are not yet visible to anyone else.
#[derive(Debug, Default)]
struct WriteSet {
    orders: HashMap<OrderId, OrderRow>,
    stock: HashMap<ProductId, i32>,
    order_items: Vec<OrderItemRow>,
    payments: Vec<PaymentRecord>,
}

impl WriteSet {
    fn len(&self) -> usize {
        self.orders.len() + self.stock.len() + self.order_items.len() + self.payments.len()
    }
}

/// A transaction over an [`InMemoryStore`].
///
/// Dropping it without commit discards its write set and releases its
/// row locks.
pub struct InMemoryTransaction {
    tables: Arc<Mutex<Tables>>,
    row_locks: Arc<Mutex<HashMap<RowKey, Arc<RowLock<()>>>>>,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    writes: WriteSet,
}

impl InMemoryTransaction {
    async fn lock_row(&mut self, key: RowKey) {
        if self.held.contains_key(&key) {
            return;
        }

        let lock = {
            let mut locks = self
                .row_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            locks.entry(key).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        self.held.insert(key, guard);
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        lock_tables(&self.tables)
    }

    /// The product as this transaction sees it.
    fn product(&self, id: ProductId) -> Option<ProductRecord> {
        let mut product = self.tables().products.get(&id).cloned()?;
        if let Some(stock) = self.writes.stock.get(&id) {
            product.stock = *stock;
        }
        Some(product)
    }

    fn order_exists(&self, id: OrderId) -> bool {
        self.writes.orders.contains_key(&id) || self.tables().orders.contains_key(&id)
    }

    /// Working copy of an order, taken from the committed row on first write.
    fn order_mut(&mut self, id: OrderId) -> Result<&mut OrderRow> {
        match self.writes.orders.entry(id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let row = lock_tables(&self.tables)
                    .orders
                    .get(&id)
                    .cloned()
                    .ok_or(StoreError::OrderNotFound(id))?;
                Ok(entry.insert(row))
            }
        }
    }

    fn apply_writes(&mut self) {
        let writes = std::mem::take(&mut self.writes);
        let mut tables = self.tables();

        tables.orders.extend(writes.orders);
        for (id, stock) in writes.stock {
            if let Some(product) = tables.products.get_mut(&id) {
                product.stock = stock;
            }
        }
        for mut item in writes.order_items {
            tables.next_item_seq += 1;
            item.seq = tables.next_item_seq;
            tables.order_items.push(item);
        }
        tables.payments.extend(writes.payments);
    }

    /// Releases held row locks and forgets those no other transaction wants.
    fn release_locks(&mut self) {
        if self.held.is_empty() {
            return;
        }

        let keys: Vec<RowKey> = self.held.keys().copied().collect();
        self.held.clear();

        let mut locks = self
            .row_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            if locks
                .get(&key)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(&key);
            }
        }
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn insert_order(&mut self, order: NewOrder) -> Result<()> {
        if !self.tables().users.contains_key(&order.user_id) {
            return Err(StoreError::UserNotFound(order.user_id));
        }

        self.writes.orders.insert(
            order.id,
            OrderRow {
                user_id: order.user_id,
                status: order.status,
                total_amount: order.total_amount,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<ProductRecord>> {
        self.lock_row(RowKey::Product(id)).await;
        Ok(self.product(id))
    }

    async fn adjust_stock(&mut self, id: ProductId, delta: i32) -> Result<()> {
        self.lock_row(RowKey::Product(id)).await;
        let product = self.product(id).ok_or(StoreError::ProductNotFound(id))?;

        let updated = product
            .stock
            .checked_add(delta)
            .filter(|stock| *stock >= 0)
            .ok_or_else(|| StoreError::CheckViolation {
                constraint: STOCK_CONSTRAINT.to_string(),
            })?;
        self.writes.stock.insert(id, updated);
        Ok(())
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<()> {
        if !self.order_exists(item.order_id) {
            return Err(StoreError::OrderNotFound(item.order_id));
        }
        if !self.tables().products.contains_key(&item.product_id) {
            return Err(StoreError::ProductNotFound(item.product_id));
        }

        self.writes.order_items.push(OrderItemRow {
            seq: 0,
            order_id: item.order_id,
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
        });
        Ok(())
    }

    async fn set_order_total(&mut self, id: OrderId, total: Money) -> Result<()> {
        self.lock_row(RowKey::Order(id)).await;
        self.order_mut(id)?.total_amount = total;
        Ok(())
    }

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<()> {
        if !self.order_exists(payment.order_id) {
            return Err(StoreError::OrderNotFound(payment.order_id));
        }

        self.writes.payments.push(PaymentRecord {
            id: payment.id,
            order_id: payment.order_id,
            amount: payment.amount,
            status: payment.status.as_str().to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<LockedOrder>> {
        self.lock_row(RowKey::Order(id)).await;
        let status = match self.writes.orders.get(&id) {
            Some(order) => Some(order.status.clone()),
            None => self.tables().orders.get(&id).map(|order| order.status.clone()),
        };
        Ok(status.map(|status| LockedOrder { id, status }))
    }

    async fn order_lines(&mut self, id: OrderId) -> Result<Vec<OrderLine>> {
        let line = |item: &OrderItemRow| OrderLine {
            product_id: item.product_id,
            quantity: item.quantity,
        };

        let mut lines: Vec<OrderLine> = self
            .tables()
            .order_items
            .iter()
            .filter(|item| item.order_id == id)
            .map(line)
            .collect();
        lines.extend(
            self.writes
                .order_items
                .iter()
                .filter(|item| item.order_id == id)
                .map(line),
        );
        Ok(lines)
    }

    async fn set_order_status(&mut self, id: OrderId, status: &OrderStatus) -> Result<()> {
        self.lock_row(RowKey::Order(id)).await;
        self.order_mut(id)?.status = status.clone();
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        self.apply_writes();
        self.release_locks();
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        self.writes = WriteSet::default();
        self.release_locks();
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        let pending = self.writes.len();
        if pending > 0 {
            tracing::debug!(writes = pending, "transaction dropped, rolling back");
        }
        self.release_locks();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::{PaymentId, PaymentStatus};

    async fn seed(store: &InMemoryStore, stock: i32) -> (UserRecord, ProductRecord) {
        let user = store
            .insert_user(NewUser::new("buyer@example.com", "secret"))
            .await
            .unwrap();
        let product = store
            .insert_product(NewProduct::new("Widget", Money::new(dec!(10.00)), stock))
            .await
            .unwrap();
        (user, product)
    }

    #[tokio::test]
    async fn commit_keeps_writes() {
        let store = InMemoryStore::new();
        let (user, product) = seed(&store, 5).await;
        let order_id = OrderId::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(NewOrder {
            id: order_id,
            user_id: user.id,
            status: OrderStatus::Processing,
            total_amount: Money::zero(),
        })
        .await
        .unwrap();
        tx.adjust_stock(product.id, -2).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.order_count(), 1);
        let product = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.stock, 3);
    }

    #[tokio::test]
    async fn rollback_reverts_every_write() {
        let store = InMemoryStore::new();
        let (user, product) = seed(&store, 5).await;
        let order_id = OrderId::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(NewOrder {
            id: order_id,
            user_id: user.id,
            status: OrderStatus::Processing,
            total_amount: Money::zero(),
        })
        .await
        .unwrap();
        tx.adjust_stock(product.id, -2).await.unwrap();
        tx.insert_order_item(NewOrderItem {
            order_id,
            product_id: product.id,
            quantity: 2,
            price: product.price,
        })
        .await
        .unwrap();
        tx.set_order_total(order_id, Money::new(dec!(20.00)))
            .await
            .unwrap();
        tx.insert_payment(NewPayment {
            id: PaymentId::new(),
            order_id,
            amount: Money::new(dec!(20.00)),
            status: PaymentStatus::Succeeded,
        })
        .await
        .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.order_count(), 0);
        assert_eq!(store.order_item_count(), 0);
        assert_eq!(store.payment_count(), 0);
        let product = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.stock, 5);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryStore::new();
        let (_, product) = seed(&store, 5).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.adjust_stock(product.id, -5).await.unwrap();
        }

        let product = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.stock, 5);
    }

    #[tokio::test]
    async fn negative_stock_violates_check() {
        let store = InMemoryStore::new();
        let (_, product) = seed(&store, 1).await;

        let mut tx = store.begin().await.unwrap();
        let result = tx.adjust_stock(product.id, -2).await;
        assert!(matches!(result, Err(StoreError::CheckViolation { .. })));
    }

    #[tokio::test]
    async fn order_requires_existing_user() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let user_id = UserId::new();

        let result = tx
            .insert_order(NewOrder {
                id: OrderId::new(),
                user_id,
                status: OrderStatus::Processing,
                total_amount: Money::zero(),
            })
            .await;
        assert!(matches!(result, Err(StoreError::UserNotFound(id)) if id == user_id));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryStore::new();
        seed(&store, 1).await;

        let result = store
            .insert_user(NewUser::new("buyer@example.com", "other"))
            .await;
        assert!(matches!(result, Err(StoreError::UniqueViolation { .. })));
    }

    #[tokio::test]
    async fn product_lock_blocks_second_transaction_until_release() {
        let store = InMemoryStore::new();
        let (_, product) = seed(&store, 1).await;

        let mut first = store.begin().await.unwrap();
        first.lock_product(product.id).await.unwrap();
        first.adjust_stock(product.id, -1).await.unwrap();

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut second = store.begin().await.unwrap();
                let seen = second.lock_product(product.id).await.unwrap().unwrap();
                second.rollback().await.unwrap();
                seen.stock
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        first.commit().await.unwrap();
        assert_eq!(contender.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn relocking_a_held_row_does_not_deadlock() {
        let store = InMemoryStore::new();
        let (_, product) = seed(&store, 3).await;

        let mut tx = store.begin().await.unwrap();
        tx.lock_product(product.id).await.unwrap();
        let again = tx.lock_product(product.id).await.unwrap();
        assert_eq!(again.map(|p| p.stock), Some(3));
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn list_products_is_ordered_by_id() {
        let store = InMemoryStore::new();
        for name in ["a", "b", "c"] {
            store
                .insert_product(NewProduct::new(name, Money::from_cents(100), 1))
                .await
                .unwrap();
        }

        let products = store.list_products().await.unwrap();
        let ids: Vec<_> = products.iter().map(|p| p.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn unavailable_store_fails_ping() {
        let store = InMemoryStore::new();
        assert!(store.ping().await.is_ok());

        store.set_unavailable(true);
        assert!(matches!(
            store.ping().await,
            Err(StoreError::Unavailable(_))
        ));
    }

    async fn stage_order(
        tx: &mut InMemoryTransaction,
        user: &UserRecord,
        product: &ProductRecord,
    ) -> OrderId {
        let order_id = OrderId::new();
        tx.insert_order(NewOrder {
            id: order_id,
            user_id: user.id,
            status: OrderStatus::Processing,
            total_amount: Money::zero(),
        })
        .await
        .unwrap();
        tx.lock_product(product.id).await.unwrap();
        tx.adjust_stock(product.id, -5).await.unwrap();
        tx.insert_order_item(NewOrderItem {
            order_id,
            product_id: product.id,
            quantity: 5,
            price: product.price,
        })
        .await
        .unwrap();
        tx.set_order_total(order_id, Money::new(dec!(50.00)))
            .await
            .unwrap();
        tx.insert_payment(NewPayment {
            id: PaymentId::new(),
            order_id,
            amount: Money::new(dec!(50.00)),
            status: PaymentStatus::Succeeded,
        })
        .await
        .unwrap();
        order_id
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible_outside_the_transaction() {
        let store = InMemoryStore::new();
        let (user, product) = seed(&store, 5).await;

        let mut tx = store.begin().await.unwrap();
        let order_id = stage_order(&mut tx, &user, &product).await;

        let listed = store.list_products().await.unwrap();
        assert_eq!(listed[0].stock, 5);
        let fetched = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(fetched.stock, 5);
        assert!(store.get_order_details(order_id).await.unwrap().is_none());
        assert!(store.get_payment(order_id).await.unwrap().is_none());
        assert_eq!(store.order_count(), 0);
        assert_eq!(store.order_item_count(), 0);
        assert_eq!(store.payment_count(), 0);

        tx.commit().await.unwrap();

        let listed = store.list_products().await.unwrap();
        assert_eq!(listed[0].stock, 0);
        let details = store.get_order_details(order_id).await.unwrap().unwrap();
        assert_eq!(details.total_amount, Money::new(dec!(50.00)));
        assert_eq!(details.items.len(), 1);
        assert_eq!(details.items[0].quantity, 5);
        assert!(store.get_payment(order_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn transaction_reads_its_own_writes() {
        let store = InMemoryStore::new();
        let (user, product) = seed(&store, 5).await;

        let mut tx = store.begin().await.unwrap();
        let order_id = stage_order(&mut tx, &user, &product).await;

        let seen = tx.lock_product(product.id).await.unwrap().unwrap();
        assert_eq!(seen.stock, 0);
        let order = tx.lock_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        let lines = tx.order_lines(order_id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 5);

        tx.set_order_status(order_id, &OrderStatus::Cancelled)
            .await
            .unwrap();
        let order = tx.lock_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        tx.rollback().await.unwrap();

        assert!(store.get_order_details(order_id).await.unwrap().is_none());
        let product = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.stock, 5);
    }

    #[tokio::test]
    async fn status_change_on_committed_order_is_staged_until_commit() {
        let store = InMemoryStore::new();
        let (user, product) = seed(&store, 5).await;

        let mut tx = store.begin().await.unwrap();
        let order_id = stage_order(&mut tx, &user, &product).await;
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.lock_order(order_id).await.unwrap();
        tx.set_order_status(order_id, &OrderStatus::Cancelled)
            .await
            .unwrap();
        tx.adjust_stock(product.id, 5).await.unwrap();

        let details = store.get_order_details(order_id).await.unwrap().unwrap();
        assert_eq!(details.status, OrderStatus::Processing);
        assert_eq!(details.total_amount, Money::new(dec!(50.00)));

        tx.commit().await.unwrap();
        let details = store.get_order_details(order_id).await.unwrap().unwrap();
        assert_eq!(details.status, OrderStatus::Cancelled);
        assert_eq!(details.total_amount, Money::new(dec!(50.00)));
        let product = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.stock, 5);
    }

    fn lock_entries(store: &InMemoryStore) -> usize {
        store.row_locks.lock().unwrap().len()
    }

    #[tokio::test]
    async fn finished_transactions_leave_no_row_locks_behind() {
        let store = InMemoryStore::new();
        let (user, product) = seed(&store, 20).await;

        for _ in 0..3 {
            let mut tx = store.begin().await.unwrap();
            let order_id = stage_order(&mut tx, &user, &product).await;
            tx.lock_order(order_id).await.unwrap();
            assert_eq!(lock_entries(&store), 2);
            tx.rollback().await.unwrap();
            assert_eq!(lock_entries(&store), 0);
        }

        let mut tx = store.begin().await.unwrap();
        stage_order(&mut tx, &user, &product).await;
        tx.commit().await.unwrap();
        assert_eq!(lock_entries(&store), 0);

        {
            let mut tx = store.begin().await.unwrap();
            tx.lock_product(product.id).await.unwrap();
        }
        assert_eq!(lock_entries(&store), 0);
    }

    #[tokio::test]
    async fn row_lock_survives_while_another_transaction_waits() {
        let store = InMemoryStore::new();
        let (_, product) = seed(&store, 1).await;

        let mut first = store.begin().await.unwrap();
        first.lock_product(product.id).await.unwrap();

        let (locked_tx, locked_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let contender = {
            let store = store.clone();
            let product_id = product.id;
            tokio::spawn(async move {
                let mut second = store.begin().await.unwrap();
                second.lock_product(product_id).await.unwrap();
                locked_tx.send(()).unwrap();
                release_rx.await.unwrap();
                second.commit().await.unwrap();
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        first.commit().await.unwrap();
        locked_rx.await.unwrap();
        assert_eq!(lock_entries(&store), 1);

        release_tx.send(()).unwrap();
        contender.await.unwrap();
        assert_eq!(lock_entries(&store), 0);
    }
}
