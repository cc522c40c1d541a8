use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use warehouse_core::{CategoryId, DomainError, ProductId, RegionId, StorageId};
use warehouse_inventory::{
    AnalysisNotice, Category, NewNotice, OperationRecord, Product, ProductSummary, Region,
    StockChange, StockRecord, Storage,
};

/// Entity store operation error.
///
/// These are **infrastructure errors** (storage, concurrency, connectivity) as opposed to
/// domain errors (validation, invariants). Callers above the store see them as `DomainError`
/// through the `From` conversion below.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The stock record changed (or appeared) since it was read.
    #[error("optimistic concurrency check failed: {0}")]
    VersionConflict(String),

    /// A uniquely named reference row already exists.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// A row references a product, storage, region or category that does not exist.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// A stored row could not be decoded into the domain model.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict(_) | StoreError::Duplicate(_) => {
                DomainError::conflict(err.to_string())
            }
            StoreError::InvalidReference(msg) => DomainError::not_found(msg),
            StoreError::Unavailable(_) | StoreError::Timeout(_) | StoreError::Corrupt(_) => {
                DomainError::transient(err.to_string())
            }
        }
    }
}

/// Bound a store call by `limit`; an elapsed timer becomes `StoreError::Timeout`.
pub async fn bounded<T, F>(limit: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Read access to reference data owned by the catalog collaborator.
///
/// The core never creates or deletes these rows; it only resolves identifiers and names.
#[async_trait]
pub trait ReferenceData: Send + Sync {
    async fn product(&self, id: ProductId) -> StoreResult<Option<Product>>;

    async fn storage(&self, id: StorageId) -> StoreResult<Option<Storage>>;

    async fn region(&self, id: RegionId) -> StoreResult<Option<Region>>;

    async fn region_by_name(&self, name: &str) -> StoreResult<Option<Region>>;

    /// Storages of a region, ordered by id.
    async fn storages_in_region(&self, region_id: RegionId) -> StoreResult<Vec<Storage>>;

    async fn category_by_name(&self, name: &str) -> StoreResult<Option<Category>>;
}

/// Stock records: one per (product, storage) pair, mutated only through `commit_movement`.
#[async_trait]
pub trait StockStore: Send + Sync {
    async fn stock_record(
        &self,
        product_id: ProductId,
        storage_id: StorageId,
    ) -> StoreResult<Option<StockRecord>>;

    /// Commit a decided change: write the stock record and append its operation record as one
    /// unit of work, only if the stored record is still at `change.expected`.
    ///
    /// Returns `StoreError::VersionConflict` (and writes nothing) when the check fails.
    async fn commit_movement(
        &self,
        change: StockChange,
    ) -> StoreResult<(StockRecord, OperationRecord)>;

    /// Storages in `region_id` holding at least `min_count` units of `product_id`, ordered by id.
    async fn storages_with_stock(
        &self,
        product_id: ProductId,
        region_id: RegionId,
        min_count: i64,
    ) -> StoreResult<Vec<Storage>>;

    /// Products stocked in a storage, optionally restricted to a category, ordered by product id.
    async fn products_in_storage(
        &self,
        storage_id: StorageId,
        category_id: Option<CategoryId>,
    ) -> StoreResult<Vec<ProductSummary>>;
}

/// Append-only audit trail of loadings and shipments.
#[async_trait]
pub trait OperationLog: Send + Sync {
    /// All operation records with `occurred_at >= from`, oldest first.
    async fn operations_since(&self, from: DateTime<Utc>) -> StoreResult<Vec<OperationRecord>>;
}

/// Append-only store of analyzer recommendations.
#[async_trait]
pub trait NoticeStore: Send + Sync {
    /// Persist a batch of notices atomically: all of them or none.
    async fn append_notices(&self, notices: Vec<NewNotice>) -> StoreResult<Vec<AnalysisNotice>>;

    /// Notices with `from <= generated_at <= to`, ordered by generation time then id.
    async fn notices_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<AnalysisNotice>>;
}

/// Everything the warehouse services need from one backing store.
pub trait WarehouseStore: ReferenceData + StockStore + OperationLog + NoticeStore + 'static {}

impl<T> WarehouseStore for T where T: ReferenceData + StockStore + OperationLog + NoticeStore + 'static {}
