//! Read-only stock queries: where a product can be loaded or shipped, and what a storage holds.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use warehouse_core::{DomainError, DomainResult, ProductId, RegionId, StorageId};
use warehouse_inventory::{OperationKind, ProductSummary, Region, StorageSummary};

use crate::ledger::DEFAULT_STORE_TIMEOUT;
use crate::store::{ReferenceData, StockStore, bounded};

pub struct StockLocator<S: ?Sized> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: ?Sized> Clone for StockLocator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            timeout: self.timeout,
        }
    }
}

impl<S> StockLocator<S>
where
    S: ReferenceData + StockStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Every storage of the region; loading has no quantity constraint.
    pub async fn resolve_for_loading(&self, region_id: RegionId) -> DomainResult<Vec<StorageSummary>> {
        let region = self.region(region_id).await?;
        self.loading_candidates(&region).await
    }

    /// Storages of the region holding at least `amount` units of the product.
    ///
    /// An empty result is not an error; a region without any storage is.
    pub async fn resolve_for_shipment(
        &self,
        product_id: ProductId,
        region_id: RegionId,
        amount: i64,
    ) -> DomainResult<Vec<StorageSummary>> {
        ensure_positive(amount, OperationKind::Shipment)?;
        let region = self.region(region_id).await?;
        self.shipment_candidates(product_id, &region, amount).await
    }

    /// Caller-facing resolution by region name, dispatching on the operation kind.
    pub async fn resolve(
        &self,
        product_id: ProductId,
        region_name: &str,
        amount: i64,
        kind: OperationKind,
    ) -> DomainResult<Vec<StorageSummary>> {
        ensure_positive(amount, kind)?;

        if bounded(self.timeout, self.store.product(product_id))
            .await?
            .is_none()
        {
            return Err(DomainError::not_found(format!(
                "Product with id='{product_id}' not found"
            )));
        }

        let region = bounded(self.timeout, self.store.region_by_name(region_name))
            .await?
            .ok_or_else(|| missing_storage(region_name, kind))?;

        let found = match kind {
            OperationKind::Loading => self.loading_candidates(&region).await?,
            OperationKind::Shipment => {
                self.shipment_candidates(product_id, &region, amount)
                    .await?
            }
        };

        debug!(
            product_id = %product_id,
            region = %region.name,
            kind = %kind,
            amount,
            candidates = found.len(),
            "resolved storages"
        );
        Ok(found)
    }

    /// Products stocked in a storage, optionally only those of the named category.
    pub async fn list_stock_by_storage(
        &self,
        storage_id: StorageId,
        category: Option<&str>,
    ) -> DomainResult<Vec<ProductSummary>> {
        if bounded(self.timeout, self.store.storage(storage_id))
            .await?
            .is_none()
        {
            return Err(DomainError::not_found(format!(
                "Storage with id='{storage_id}' not found"
            )));
        }

        let category_id = match category.map(str::trim).filter(|c| !c.is_empty()) {
            Some(name) => Some(
                bounded(self.timeout, self.store.category_by_name(name))
                    .await?
                    .ok_or_else(|| {
                        DomainError::not_found(format!("Category with name='{name}' not found"))
                    })?
                    .id,
            ),
            None => None,
        };

        Ok(bounded(
            self.timeout,
            self.store.products_in_storage(storage_id, category_id),
        )
        .await?)
    }

    async fn region(&self, region_id: RegionId) -> DomainResult<Region> {
        bounded(self.timeout, self.store.region(region_id))
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Region with id='{region_id}' not found")))
    }

    async fn loading_candidates(&self, region: &Region) -> DomainResult<Vec<StorageSummary>> {
        let storages = bounded(self.timeout, self.store.storages_in_region(region.id)).await?;
        if storages.is_empty() {
            return Err(missing_storage(&region.name, OperationKind::Loading));
        }
        Ok(storages
            .iter()
            .map(|s| StorageSummary::of(s, region))
            .collect())
    }

    async fn shipment_candidates(
        &self,
        product_id: ProductId,
        region: &Region,
        amount: i64,
    ) -> DomainResult<Vec<StorageSummary>> {
        let in_region = bounded(self.timeout, self.store.storages_in_region(region.id)).await?;
        if in_region.is_empty() {
            return Err(missing_storage(&region.name, OperationKind::Shipment));
        }

        let storages = bounded(
            self.timeout,
            self.store.storages_with_stock(product_id, region.id, amount),
        )
        .await?;
        Ok(storages
            .iter()
            .map(|s| StorageSummary::of(s, region))
            .collect())
    }
}

fn ensure_positive(amount: i64, kind: OperationKind) -> DomainResult<()> {
    if amount <= 0 {
        return Err(DomainError::invalid_amount(format!(
            "{kind} amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

fn missing_storage(region: &str, kind: OperationKind) -> DomainError {
    DomainError::not_found(format!(
        "Storage is missing in region {region}. {kind} is not possible."
    ))
}
