//! Inventory domain module.
//!
//! This crate contains the warehouse data model and the stock arithmetic, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod model;
pub mod notice;
pub mod stock;

pub use model::{Category, Product, ProductSummary, Region, Storage, StorageSummary};
pub use notice::{AnalysisNotice, ChangeDirection, NewNotice};
pub use stock::{
    NewOperation, OperationKind, OperationRecord, StockChange, StockMovement, StockRecord,
};
