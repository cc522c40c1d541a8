//! `warehouse-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod version;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CategoryId, IdParseError, NoticeId, OperationId, ProductId, RegionId, StockRecordId, StorageId};
pub use version::ExpectedVersion;
