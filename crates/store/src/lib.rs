pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use common::{Money, OrderId, OrderStatus, PaymentId, PaymentStatus, ProductId, UserId};
pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use postgres::{PgStore, PgTransaction};
pub use records::{
    LockedOrder, NewOrder, NewOrderItem, NewPayment, NewProduct, NewUser, OrderDetails,
    OrderItemDetails, OrderLine, OrderUser, PaymentRecord, ProductRecord, UserRecord,
};
pub use store::{Storage, Transaction};
