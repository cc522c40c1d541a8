//! Entity store boundary.
//!
//! Traits describing what the ledger, locator and analyzer need from durable storage, plus an
//! in-memory implementation (tests/dev) and a PostgreSQL implementation.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{
    NoticeStore, OperationLog, ReferenceData, StockStore, StoreError, StoreResult, WarehouseStore,
    bounded,
};
