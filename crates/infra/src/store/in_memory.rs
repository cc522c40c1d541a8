use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use warehouse_core::{CategoryId, Entity, ProductId, RegionId, StockRecordId, StorageId};
use warehouse_inventory::{
    AnalysisNotice, Category, NewNotice, OperationRecord, Product, ProductSummary, Region,
    StockChange, StockRecord, Storage,
};

use super::r#trait::{
    NoticeStore, OperationLog, ReferenceData, StockStore, StoreError, StoreResult,
};

/// Rows of one entity type keyed by id, with a monotonically increasing id sequence.
#[derive(Debug)]
struct Table<E: Entity> {
    rows: BTreeMap<E::Id, E>,
    last_id: i64,
}

impl<E: Entity> Default for Table<E> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            last_id: 0,
        }
    }
}

impl<E> Table<E>
where
    E: Entity + Clone,
    E::Id: Ord + From<i64>,
{
    fn get(&self, id: E::Id) -> Option<&E> {
        self.rows.get(&id)
    }

    fn contains(&self, id: E::Id) -> bool {
        self.rows.contains_key(&id)
    }

    fn values(&self) -> impl Iterator<Item = &E> {
        self.rows.values()
    }

    /// Assign the next id and store the row built from it.
    fn insert_with(&mut self, build: impl FnOnce(E::Id) -> E) -> E {
        self.last_id += 1;
        let row = build(E::Id::from(self.last_id));
        self.rows.insert(row.id(), row.clone());
        row
    }

    fn replace(&mut self, row: E) {
        self.rows.insert(row.id(), row);
    }
}

#[derive(Debug, Default)]
struct Tables {
    categories: Table<Category>,
    products: Table<Product>,
    regions: Table<Region>,
    storages: Table<Storage>,
    stock: Table<StockRecord>,
    stock_by_pair: HashMap<(ProductId, StorageId), StockRecordId>,
    operations: Table<OperationRecord>,
    notices: Table<AnalysisNotice>,
}

impl Tables {
    fn stock_for(&self, product_id: ProductId, storage_id: StorageId) -> Option<&StockRecord> {
        self.stock_by_pair
            .get(&(product_id, storage_id))
            .and_then(|id| self.stock.get(*id))
    }

    fn check_pair(&self, product_id: ProductId, storage_id: StorageId) -> StoreResult<()> {
        if !self.products.contains(product_id) {
            return Err(StoreError::InvalidReference(format!(
                "Product with id='{product_id}' not found"
            )));
        }
        if !self.storages.contains(storage_id) {
            return Err(StoreError::InvalidReference(format!(
                "Storage with id='{storage_id}' not found"
            )));
        }
        Ok(())
    }
}

/// In-memory entity store.
///
/// Intended for tests/dev. Every mutation runs inside a single write section, which gives
/// `commit_movement` and `append_notices` their all-or-nothing semantics.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    pub fn insert_category(&self, name: &str) -> StoreResult<Category> {
        let mut t = self.write()?;
        if t.categories.values().any(|c| c.name == name) {
            return Err(StoreError::Duplicate(format!(
                "Category with name='{name}' already exist"
            )));
        }
        Ok(t.categories.insert_with(|id| Category {
            id,
            name: name.to_string(),
        }))
    }

    pub fn insert_region(&self, name: &str) -> StoreResult<Region> {
        let mut t = self.write()?;
        if t.regions.values().any(|r| r.name == name) {
            return Err(StoreError::Duplicate(format!(
                "Region with name='{name}' already exist"
            )));
        }
        Ok(t.regions.insert_with(|id| Region {
            id,
            name: name.to_string(),
        }))
    }

    pub fn insert_storage(&self, name: &str, region_id: RegionId) -> StoreResult<Storage> {
        let mut t = self.write()?;
        if !t.regions.contains(region_id) {
            return Err(StoreError::InvalidReference(format!(
                "Region with id='{region_id}' not found"
            )));
        }
        if t.storages.values().any(|s| s.name == name) {
            return Err(StoreError::Duplicate(format!(
                "Storage with name='{name}' already exist"
            )));
        }
        Ok(t.storages.insert_with(|id| Storage {
            id,
            name: name.to_string(),
            region_id,
        }))
    }

    pub fn insert_product(
        &self,
        name: &str,
        price: u64,
        category_id: CategoryId,
    ) -> StoreResult<Product> {
        let mut t = self.write()?;
        if !t.categories.contains(category_id) {
            return Err(StoreError::InvalidReference(format!(
                "Category with id='{category_id}' not found"
            )));
        }
        if t.products.values().any(|p| p.name == name) {
            return Err(StoreError::Duplicate(format!(
                "Product with name='{name}' already exist"
            )));
        }
        Ok(t.products.insert_with(|id| Product {
            id,
            name: name.to_string(),
            price,
            category_id,
        }))
    }

    /// A store pre-populated with a small catalog for local runs.
    ///
    /// Region "Kazan" deliberately has no storages.
    pub fn with_demo_data() -> StoreResult<Self> {
        let store = Self::new();

        let electronics = store.insert_category("Electronics")?;
        let furniture = store.insert_category("Furniture")?;

        let sochi = store.insert_region("Sochi")?;
        let moscow = store.insert_region("Moscow")?;
        store.insert_region("Kazan")?;

        store.insert_storage("Sochi Central", sochi.id)?;
        store.insert_storage("Moscow North", moscow.id)?;
        store.insert_storage("Moscow South", moscow.id)?;

        store.insert_product("Laptop", 120_000, electronics.id)?;
        store.insert_product("Monitor", 30_000, electronics.id)?;
        store.insert_product("Office chair", 8_500, furniture.id)?;

        Ok(store)
    }

    /// Full audit trail in append order.
    pub fn operations(&self) -> StoreResult<Vec<OperationRecord>> {
        Ok(self.read()?.operations.values().cloned().collect())
    }

    pub fn stock_records(&self) -> StoreResult<Vec<StockRecord>> {
        Ok(self.read()?.stock.values().cloned().collect())
    }
}

#[async_trait]
impl ReferenceData for InMemoryStore {
    async fn product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(self.read()?.products.get(id).cloned())
    }

    async fn storage(&self, id: StorageId) -> StoreResult<Option<Storage>> {
        Ok(self.read()?.storages.get(id).cloned())
    }

    async fn region(&self, id: RegionId) -> StoreResult<Option<Region>> {
        Ok(self.read()?.regions.get(id).cloned())
    }

    async fn region_by_name(&self, name: &str) -> StoreResult<Option<Region>> {
        Ok(self
            .read()?
            .regions
            .values()
            .find(|r| r.name == name)
            .cloned())
    }

    async fn storages_in_region(&self, region_id: RegionId) -> StoreResult<Vec<Storage>> {
        Ok(self
            .read()?
            .storages
            .values()
            .filter(|s| s.region_id == region_id)
            .cloned()
            .collect())
    }

    async fn category_by_name(&self, name: &str) -> StoreResult<Option<Category>> {
        Ok(self
            .read()?
            .categories
            .values()
            .find(|c| c.name == name)
            .cloned())
    }
}

#[async_trait]
impl StockStore for InMemoryStore {
    async fn stock_record(
        &self,
        product_id: ProductId,
        storage_id: StorageId,
    ) -> StoreResult<Option<StockRecord>> {
        Ok(self.read()?.stock_for(product_id, storage_id).cloned())
    }

    async fn commit_movement(
        &self,
        change: StockChange,
    ) -> StoreResult<(StockRecord, OperationRecord)> {
        let mut guard = self.write()?;
        let t = &mut *guard;

        t.check_pair(change.product_id, change.storage_id)?;

        let current = t.stock_for(change.product_id, change.storage_id);
        let actual = current.map(|r| r.version);
        if !change.expected.matches(actual) {
            return Err(StoreError::VersionConflict(format!(
                "stock of product {} in storage {}: expected {:?}, found {:?}",
                change.product_id, change.storage_id, change.expected, actual
            )));
        }
        if change.new_count < 0 {
            return Err(StoreError::Corrupt(format!(
                "stock of product {} in storage {} would become {}",
                change.product_id, change.storage_id, change.new_count
            )));
        }

        let record = match current.map(|r| r.id) {
            Some(id) => {
                let record = change.record(id);
                t.stock.replace(record.clone());
                record
            }
            None => {
                let record = t.stock.insert_with(|id| change.record(id));
                t.stock_by_pair
                    .insert((record.product_id, record.storage_id), record.id);
                record
            }
        };

        let operation = change.operation;
        let op = t.operations.insert_with(|id| operation.persisted(id));

        Ok((record, op))
    }

    async fn storages_with_stock(
        &self,
        product_id: ProductId,
        region_id: RegionId,
        min_count: i64,
    ) -> StoreResult<Vec<Storage>> {
        let t = self.read()?;
        Ok(t.storages
            .values()
            .filter(|s| s.region_id == region_id)
            .filter(|s| {
                t.stock_for(product_id, s.id)
                    .is_some_and(|r| r.count >= min_count)
            })
            .cloned()
            .collect())
    }

    async fn products_in_storage(
        &self,
        storage_id: StorageId,
        category_id: Option<CategoryId>,
    ) -> StoreResult<Vec<ProductSummary>> {
        let t = self.read()?;
        let mut out = Vec::new();

        for rec in t.stock.values().filter(|r| r.storage_id == storage_id) {
            let product = t.products.get(rec.product_id).ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "stock record {} references missing product {}",
                    rec.id, rec.product_id
                ))
            })?;
            if category_id.is_some_and(|c| c != product.category_id) {
                continue;
            }
            let category = t.categories.get(product.category_id).ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "product {} references missing category {}",
                    product.id, product.category_id
                ))
            })?;
            out.push(ProductSummary {
                id: product.id,
                name: product.name.clone(),
                price: product.price,
                category: category.name.clone(),
                count: rec.count,
            });
        }

        out.sort_by_key(|p| p.id);
        Ok(out)
    }
}

#[async_trait]
impl OperationLog for InMemoryStore {
    async fn operations_since(&self, from: DateTime<Utc>) -> StoreResult<Vec<OperationRecord>> {
        let mut ops: Vec<OperationRecord> = self
            .read()?
            .operations
            .values()
            .filter(|op| op.occurred_at >= from)
            .cloned()
            .collect();
        ops.sort_by_key(|op| (op.occurred_at, op.id));
        Ok(ops)
    }
}

#[async_trait]
impl NoticeStore for InMemoryStore {
    async fn append_notices(&self, notices: Vec<NewNotice>) -> StoreResult<Vec<AnalysisNotice>> {
        let mut guard = self.write()?;
        let t = &mut *guard;

        // Validate the whole batch before writing any of it.
        for n in &notices {
            t.check_pair(n.product_id, n.storage_id)?;
        }

        Ok(notices
            .into_iter()
            .map(|n| t.notices.insert_with(|id| n.persisted(id)))
            .collect())
    }

    async fn notices_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<AnalysisNotice>> {
        let mut notices: Vec<AnalysisNotice> = self
            .read()?
            .notices
            .values()
            .filter(|n| n.generated_at >= from && n.generated_at <= to)
            .cloned()
            .collect();
        notices.sort_by_key(|n| (n.generated_at, n.id));
        Ok(notices)
    }
}
