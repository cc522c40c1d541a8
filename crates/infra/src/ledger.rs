//! Stock ledger: the only writer of stock records and the operation audit trail.
//!
//! Each movement is a read-decide-commit cycle. The commit is conditional on the record version
//! observed by the read, so two concurrent movements on the same (product, storage) pair cannot
//! both apply against the same count; the loser re-reads and decides again.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use warehouse_core::{DomainError, DomainResult, OperationId, ProductId, StorageId};
use warehouse_inventory::{OperationKind, StockMovement};

use crate::store::{ReferenceData, StockStore, StoreError, bounded};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 16;

/// Result of a committed movement.
///
/// `Display` renders the confirmation shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockReceipt {
    pub product_id: ProductId,
    pub storage_id: StorageId,
    pub kind: OperationKind,
    pub new_count: i64,
    pub operation_id: OperationId,
}

impl fmt::Display for StockReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total count of product with id='{}' on storage with id='{}': {}",
            self.product_id, self.storage_id, self.new_count
        )
    }
}

pub struct StockLedger<S: ?Sized> {
    store: Arc<S>,
    timeout: Duration,
    max_attempts: u32,
}

impl<S: ?Sized> Clone for StockLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            timeout: self.timeout,
            max_attempts: self.max_attempts,
        }
    }
}

impl<S> StockLedger<S>
where
    S: ReferenceData + StockStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            timeout: DEFAULT_STORE_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Bound on each individual store call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How many read-decide-commit cycles to try before reporting a conflict. At least 1.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Record a loading of `amount` units.
    pub async fn increase(
        &self,
        product_id: ProductId,
        storage_id: StorageId,
        amount: i64,
    ) -> DomainResult<StockReceipt> {
        self.apply(StockMovement::loading(product_id, storage_id, amount, Utc::now()))
            .await
    }

    /// Record a shipment of `amount` units.
    pub async fn decrease(
        &self,
        product_id: ProductId,
        storage_id: StorageId,
        amount: i64,
    ) -> DomainResult<StockReceipt> {
        self.apply(StockMovement::shipment(product_id, storage_id, amount, Utc::now()))
            .await
    }

    pub async fn apply(&self, movement: StockMovement) -> DomainResult<StockReceipt> {
        movement.validate_amount()?;
        self.ensure_references(movement.product_id, movement.storage_id)
            .await?;

        let (product_id, storage_id) = (movement.product_id, movement.storage_id);

        for attempt in 1..=self.max_attempts {
            let current =
                bounded(self.timeout, self.store.stock_record(product_id, storage_id)).await?;
            let change = movement.decide(current.as_ref())?;

            match bounded(self.timeout, self.store.commit_movement(change)).await {
                Ok((record, op)) => {
                    info!(
                        product_id = %product_id,
                        storage_id = %storage_id,
                        kind = %movement.kind,
                        amount = movement.amount,
                        new_count = record.count,
                        version = record.version,
                        attempt,
                        "stock movement committed"
                    );
                    return Ok(StockReceipt {
                        product_id,
                        storage_id,
                        kind: movement.kind,
                        new_count: record.count,
                        operation_id: op.id,
                    });
                }
                Err(StoreError::VersionConflict(reason)) => {
                    debug!(
                        product_id = %product_id,
                        storage_id = %storage_id,
                        attempt,
                        %reason,
                        "stock movement lost a concurrent update; retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            product_id = %product_id,
            storage_id = %storage_id,
            attempts = self.max_attempts,
            "stock movement abandoned after repeated conflicts"
        );
        Err(DomainError::conflict(format!(
            "stock of product with id='{}' on storage with id='{}' kept changing; gave up after {} attempts",
            product_id, storage_id, self.max_attempts
        )))
    }

    async fn ensure_references(
        &self,
        product_id: ProductId,
        storage_id: StorageId,
    ) -> DomainResult<()> {
        if bounded(self.timeout, self.store.storage(storage_id))
            .await?
            .is_none()
        {
            return Err(DomainError::not_found(format!(
                "Storage with id='{storage_id}' not found"
            )));
        }
        if bounded(self.timeout, self.store.product(product_id))
            .await?
            .is_none()
        {
            return Err(DomainError::not_found(format!(
                "Product with id='{product_id}' not found"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use warehouse_core::{CategoryId, RegionId};
    use warehouse_inventory::{
        Category, OperationRecord, Product, ProductSummary, Region, StockChange, StockRecord,
        Storage,
    };

    use crate::store::{InMemoryStore, StoreResult};

    fn seeded() -> (Arc<InMemoryStore>, ProductId, StorageId) {
        let store = InMemoryStore::new();
        let cat = store.insert_category("Tools").unwrap();
        let region = store.insert_region("Sochi").unwrap();
        let storage = store.insert_storage("Sochi-1", region.id).unwrap();
        let product = store.insert_product("Hammer", 500, cat.id).unwrap();
        (Arc::new(store), product.id, storage.id)
    }

    /// Wraps the in-memory store, failing the first `conflicts` commits and optionally stalling.
    struct Flaky {
        inner: Arc<InMemoryStore>,
        conflicts: AtomicU32,
        stall: Option<Duration>,
    }

    #[async_trait]
    impl ReferenceData for Flaky {
        async fn product(&self, id: ProductId) -> StoreResult<Option<Product>> {
            self.inner.product(id).await
        }
        async fn storage(&self, id: StorageId) -> StoreResult<Option<Storage>> {
            self.inner.storage(id).await
        }
        async fn region(&self, id: RegionId) -> StoreResult<Option<Region>> {
            self.inner.region(id).await
        }
        async fn region_by_name(&self, name: &str) -> StoreResult<Option<Region>> {
            self.inner.region_by_name(name).await
        }
        async fn storages_in_region(&self, region_id: RegionId) -> StoreResult<Vec<Storage>> {
            self.inner.storages_in_region(region_id).await
        }
        async fn category_by_name(&self, name: &str) -> StoreResult<Option<Category>> {
            self.inner.category_by_name(name).await
        }
    }

    #[async_trait]
    impl StockStore for Flaky {
        async fn stock_record(
            &self,
            product_id: ProductId,
            storage_id: StorageId,
        ) -> StoreResult<Option<StockRecord>> {
            self.inner.stock_record(product_id, storage_id).await
        }
        async fn commit_movement(
            &self,
            change: StockChange,
        ) -> StoreResult<(StockRecord, OperationRecord)> {
            if let Some(d) = self.stall {
                tokio::time::sleep(d).await;
            }
            let left = self.conflicts.load(Ordering::SeqCst);
            if left > 0 {
                self.conflicts.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::VersionConflict("injected".into()));
            }
            self.inner.commit_movement(change).await
        }
        async fn storages_with_stock(
            &self,
            product_id: ProductId,
            region_id: RegionId,
            min_count: i64,
        ) -> StoreResult<Vec<Storage>> {
            self.inner
                .storages_with_stock(product_id, region_id, min_count)
                .await
        }
        async fn products_in_storage(
            &self,
            storage_id: StorageId,
            category_id: Option<CategoryId>,
        ) -> StoreResult<Vec<ProductSummary>> {
            self.inner.products_in_storage(storage_id, category_id).await
        }
    }

    #[tokio::test]
    async fn first_loading_creates_the_record_and_one_audit_entry() {
        let (store, p, s) = seeded();
        let ledger = StockLedger::new(store.clone());

        let receipt = ledger.increase(p, s, 25).await.unwrap();
        assert_eq!(receipt.new_count, 25);
        assert_eq!(receipt.kind, OperationKind::Loading);
        assert_eq!(
            receipt.to_string(),
            format!("Total count of product with id='{p}' on storage with id='{s}': 25")
        );

        let ops = store.operations().unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::Loading);
        assert_eq!(ops[0].count, 25);
        assert_eq!(ops[0].id, receipt.operation_id);
    }

    #[tokio::test]
    async fn oversized_shipment_reports_requested_and_available_without_writing() {
        let (store, p, s) = seeded();
        let ledger = StockLedger::new(store.clone());
        ledger.increase(p, s, 25).await.unwrap();

        let err = ledger.decrease(p, s, 30).await.unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                product_id: p,
                storage_id: s,
                requested: 30,
                available: 25,
            }
        );
        assert_eq!(store.operations().unwrap().len(), 1);
        assert_eq!(store.stock_records().unwrap()[0].count, 25);
    }

    #[tokio::test]
    async fn shipping_the_exact_count_leaves_zero() {
        let (store, p, s) = seeded();
        let ledger = StockLedger::new(store.clone());
        ledger.increase(p, s, 7).await.unwrap();

        assert!(matches!(
            ledger.decrease(p, s, 8).await,
            Err(DomainError::InsufficientStock { .. })
        ));
        assert_eq!(ledger.decrease(p, s, 7).await.unwrap().new_count, 0);
    }

    #[tokio::test]
    async fn increase_then_decrease_restores_the_count() {
        let (store, p, s) = seeded();
        let ledger = StockLedger::new(store);
        ledger.increase(p, s, 40).await.unwrap();

        ledger.increase(p, s, 10).await.unwrap();
        let back = ledger.decrease(p, s, 10).await.unwrap();
        assert_eq!(back.new_count, 40);
    }

    #[tokio::test]
    async fn rejects_bad_amounts_and_unknown_references() {
        let (store, p, s) = seeded();
        let ledger = StockLedger::new(store.clone());

        assert_eq!(ledger.increase(p, s, 0).await.unwrap_err().kind(), "invalid_amount");
        assert_eq!(ledger.decrease(p, s, -3).await.unwrap_err().kind(), "invalid_amount");

        let err = ledger.increase(ProductId::new(99), s, 1).await.unwrap_err();
        assert_eq!(err, DomainError::not_found("Product with id='99' not found"));
        let err = ledger.increase(p, StorageId::new(77), 1).await.unwrap_err();
        assert_eq!(err, DomainError::not_found("Storage with id='77' not found"));

        // Nothing to ship from.
        let err = ledger.decrease(p, s, 1).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");

        assert!(store.operations().unwrap().is_empty());
    }

    #[tokio::test]
    async fn conflicts_are_retried_until_the_commit_lands() {
        let (inner, p, s) = seeded();
        let flaky = Arc::new(Flaky {
            inner: inner.clone(),
            conflicts: AtomicU32::new(3),
            stall: None,
        });
        let ledger = StockLedger::new(flaky);

        let receipt = ledger.increase(p, s, 5).await.unwrap();
        assert_eq!(receipt.new_count, 5);
        assert_eq!(inner.operations().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_conflict() {
        let (inner, p, s) = seeded();
        let flaky = Arc::new(Flaky {
            inner: inner.clone(),
            conflicts: AtomicU32::new(10),
            stall: None,
        });
        let ledger = StockLedger::new(flaky).with_max_attempts(3);

        let err = ledger.increase(p, s, 5).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert!(inner.operations().unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_stalled_store_is_a_transient_failure() {
        let (inner, p, s) = seeded();
        let flaky = Arc::new(Flaky {
            inner: inner.clone(),
            conflicts: AtomicU32::new(0),
            stall: Some(Duration::from_secs(5)),
        });
        let ledger = StockLedger::new(flaky).with_timeout(Duration::from_millis(20));

        let err = ledger.increase(p, s, 5).await.unwrap_err();
        assert_eq!(err.kind(), "transient");
        assert!(inner.operations().unwrap().is_empty());
    }
}
