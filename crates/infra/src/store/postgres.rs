//! Postgres-backed entity store.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `VersionConflict` / `Duplicate` | Concurrent first loading of a pair (stock rows) / duplicate name (reference rows) |
//! | Database (foreign key violation) | `23503` | `InvalidReference` | Unknown product, storage, region or category |
//! | Database (check constraint violation) | `23514` | `Corrupt` | Negative count or unknown kind reached the database |
//! | Database (other) | Any other | `Unavailable` | Other database errors |
//! | PoolClosed / PoolTimedOut / Io / Tls | N/A | `Unavailable` | Connectivity |
//! | Decode / ColumnDecode / ColumnNotFound / RowNotFound | N/A | `Corrupt` | Row does not match the schema |
//!
//! ## Optimistic Concurrency
//!
//! `commit_movement` runs in one transaction:
//! 1. Write the stock row: `INSERT` when the pair is expected absent (the
//!    `UNIQUE(product_id, storage_id)` constraint rejects a concurrent creator), or
//!    `UPDATE ... WHERE version = $expected` otherwise (zero rows means a concurrent writer won)
//! 2. Insert the operation record
//! 3. Commit
//!
//! Any failure rolls the transaction back, so the stock row and its audit entry are either both
//! visible or neither is.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Row};
use tracing::{Span, instrument};

use warehouse_core::{
    CategoryId, ExpectedVersion, NoticeId, OperationId, ProductId, RegionId, StockRecordId,
    StorageId,
};
use warehouse_inventory::{
    AnalysisNotice, Category, ChangeDirection, NewNotice, OperationKind, OperationRecord, Product,
    ProductSummary, Region, StockChange, StockRecord, Storage,
};

use super::r#trait::{
    NoticeStore, OperationLog, ReferenceData, StockStore, StoreError, StoreResult,
};

const SCHEMA: &str = include_str!("../../migrations/0001_warehouse.sql");

/// Postgres-backed entity store.
///
/// `Send + Sync`; all access goes through the SQLx connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `url`. `acquire_timeout` bounds waiting for a free connection.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the schema. Every statement is `IF NOT EXISTS`, so this is safe on each start.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl ReferenceData for PostgresStore {
    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        let row = sqlx::query("SELECT id, name, price, category_id FROM products WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("product", e))?;
        row.map(|r| decode::<ProductRow>(&r).and_then(Product::try_from))
            .transpose()
    }

    #[instrument(skip(self), fields(storage_id = %id), err)]
    async fn storage(&self, id: StorageId) -> StoreResult<Option<Storage>> {
        let row = sqlx::query("SELECT id, name, region_id FROM storages WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("storage", e))?;
        row.map(|r| decode::<StorageRow>(&r).map(Storage::from))
            .transpose()
    }

    #[instrument(skip(self), fields(region_id = %id), err)]
    async fn region(&self, id: RegionId) -> StoreResult<Option<Region>> {
        let row = sqlx::query("SELECT id, name FROM regions WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("region", e))?;
        row.map(|r| decode::<NamedRow>(&r).map(Region::from))
            .transpose()
    }

    #[instrument(skip(self), err)]
    async fn region_by_name(&self, name: &str) -> StoreResult<Option<Region>> {
        let row = sqlx::query("SELECT id, name FROM regions WHERE name = $1")
            .bind(name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("region_by_name", e))?;
        row.map(|r| decode::<NamedRow>(&r).map(Region::from))
            .transpose()
    }

    #[instrument(skip(self), fields(region_id = %region_id, rows = tracing::field::Empty), err)]
    async fn storages_in_region(&self, region_id: RegionId) -> StoreResult<Vec<Storage>> {
        let rows = sqlx::query(
            "SELECT id, name, region_id FROM storages WHERE region_id = $1 ORDER BY id ASC",
        )
        .bind(region_id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("storages_in_region", e))?;

        Span::current().record("rows", rows.len());
        rows.iter()
            .map(|r| decode::<StorageRow>(r).map(Storage::from))
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn category_by_name(&self, name: &str) -> StoreResult<Option<Category>> {
        let row = sqlx::query("SELECT id, name FROM categories WHERE name = $1")
            .bind(name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("category_by_name", e))?;
        row.map(|r| decode::<NamedRow>(&r).map(Category::from))
            .transpose()
    }
}

#[async_trait]
impl StockStore for PostgresStore {
    #[instrument(skip(self), fields(product_id = %product_id, storage_id = %storage_id), err)]
    async fn stock_record(
        &self,
        product_id: ProductId,
        storage_id: StorageId,
    ) -> StoreResult<Option<StockRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, storage_id, count, version
            FROM stock_records
            WHERE product_id = $1 AND storage_id = $2
            "#,
        )
        .bind(product_id.get())
        .bind(storage_id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stock_record", e))?;
        row.map(|r| decode::<StockRow>(&r).and_then(StockRecord::try_from))
            .transpose()
    }

    #[instrument(
        skip(self, change),
        fields(
            product_id = %change.product_id,
            storage_id = %change.storage_id,
            expected_version = ?change.expected,
            new_count = change.new_count
        ),
        err
    )]
    async fn commit_movement(
        &self,
        change: StockChange,
    ) -> StoreResult<(StockRecord, OperationRecord)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let stock_row = match change.expected {
            ExpectedVersion::Absent => sqlx::query(
                r#"
                INSERT INTO stock_records (product_id, storage_id, count, version)
                VALUES ($1, $2, $3, $4)
                RETURNING id, product_id, storage_id, count, version
                "#,
            )
            .bind(change.product_id.get())
            .bind(change.storage_id.get())
            .bind(change.new_count)
            .bind(to_db_version(change.expected.next())?)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::VersionConflict(format!(
                        "stock of product {} in storage {} was created concurrently",
                        change.product_id, change.storage_id
                    ))
                } else {
                    map_sqlx_error("insert_stock_record", e)
                }
            })?,
            ExpectedVersion::Exact(version) => sqlx::query(
                r#"
                UPDATE stock_records
                SET count = $1, version = $2
                WHERE product_id = $3 AND storage_id = $4 AND version = $5
                RETURNING id, product_id, storage_id, count, version
                "#,
            )
            .bind(change.new_count)
            .bind(to_db_version(change.expected.next())?)
            .bind(change.product_id.get())
            .bind(change.storage_id.get())
            .bind(to_db_version(version)?)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_stock_record", e))?
            .ok_or_else(|| {
                StoreError::VersionConflict(format!(
                    "stock of product {} in storage {} is no longer at version {}",
                    change.product_id, change.storage_id, version
                ))
            })?,
        };
        let record = decode::<StockRow>(&stock_row).and_then(StockRecord::try_from)?;

        let op = &change.operation;
        let op_row = sqlx::query(
            r#"
            INSERT INTO operation_records (kind, count, occurred_at, product_id, storage_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(op.kind.as_str())
        .bind(op.count)
        .bind(op.occurred_at)
        .bind(op.product_id.get())
        .bind(op.storage_id.get())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_operation_record", e))?;
        let op_id: i64 = op_row
            .try_get("id")
            .map_err(|e| map_sqlx_error("insert_operation_record", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok((record, change.operation.persisted(OperationId::new(op_id))))
    }

    #[instrument(
        skip(self),
        fields(product_id = %product_id, region_id = %region_id, rows = tracing::field::Empty),
        err
    )]
    async fn storages_with_stock(
        &self,
        product_id: ProductId,
        region_id: RegionId,
        min_count: i64,
    ) -> StoreResult<Vec<Storage>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.name, s.region_id
            FROM storages s
            JOIN stock_records sr ON sr.storage_id = s.id
            WHERE sr.product_id = $1 AND s.region_id = $2 AND sr.count >= $3
            ORDER BY s.id ASC
            "#,
        )
        .bind(product_id.get())
        .bind(region_id.get())
        .bind(min_count)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("storages_with_stock", e))?;

        Span::current().record("rows", rows.len());
        rows.iter()
            .map(|r| decode::<StorageRow>(r).map(Storage::from))
            .collect()
    }

    #[instrument(
        skip(self),
        fields(storage_id = %storage_id, rows = tracing::field::Empty),
        err
    )]
    async fn products_in_storage(
        &self,
        storage_id: StorageId,
        category_id: Option<CategoryId>,
    ) -> StoreResult<Vec<ProductSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.name, p.price, c.name AS category, sr.count
            FROM stock_records sr
            JOIN products p ON p.id = sr.product_id
            JOIN categories c ON c.id = p.category_id
            WHERE sr.storage_id = $1
                AND ($2::bigint IS NULL OR p.category_id = $2)
            ORDER BY p.id ASC
            "#,
        )
        .bind(storage_id.get())
        .bind(category_id.map(|c| c.get()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("products_in_storage", e))?;

        Span::current().record("rows", rows.len());
        rows.iter()
            .map(|r| decode::<ProductSummaryRow>(r).and_then(ProductSummary::try_from))
            .collect()
    }
}

#[async_trait]
impl OperationLog for PostgresStore {
    #[instrument(skip(self), fields(from = %from, rows = tracing::field::Empty), err)]
    async fn operations_since(&self, from: DateTime<Utc>) -> StoreResult<Vec<OperationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, count, occurred_at, product_id, storage_id
            FROM operation_records
            WHERE occurred_at >= $1
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .bind(from)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("operations_since", e))?;

        Span::current().record("rows", rows.len());
        rows.iter()
            .map(|r| decode::<OperationRow>(r).and_then(OperationRecord::try_from))
            .collect()
    }
}

#[async_trait]
impl NoticeStore for PostgresStore {
    #[instrument(skip(self, notices), fields(notice_count = notices.len()), err)]
    async fn append_notices(&self, notices: Vec<NewNotice>) -> StoreResult<Vec<AnalysisNotice>> {
        if notices.is_empty() {
            return Ok(vec![]);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut saved = Vec::with_capacity(notices.len());
        for notice in notices {
            let row = sqlx::query(
                r#"
                INSERT INTO analysis_notices (product_id, storage_id, operation, direction, generated_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(notice.product_id.get())
            .bind(notice.storage_id.get())
            .bind(notice.operation.as_str())
            .bind(notice.direction.as_str())
            .bind(notice.generated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_notice", e))?;
            let id: i64 = row
                .try_get("id")
                .map_err(|e| map_sqlx_error("insert_notice", e))?;
            saved.push(notice.persisted(NoticeId::new(id)));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(saved)
    }

    #[instrument(skip(self), fields(from = %from, to = %to, rows = tracing::field::Empty), err)]
    async fn notices_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<AnalysisNotice>> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, storage_id, operation, direction, generated_at
            FROM analysis_notices
            WHERE generated_at >= $1 AND generated_at <= $2
            ORDER BY generated_at ASC, id ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("notices_between", e))?;

        Span::current().record("rows", rows.len());
        rows.iter()
            .map(|r| decode::<NoticeRow>(r).and_then(AnalysisNotice::try_from))
            .collect()
    }
}

/// Map SQLx errors to store errors.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                // Unique violation
                Some("23505") => StoreError::Duplicate(msg),
                // Foreign key violation
                Some("23503") => StoreError::InvalidReference(msg),
                // Check constraint violation
                Some("23514") => StoreError::Corrupt(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::RowNotFound
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("row mismatch in {}: {}", operation, err))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

fn decode<'r, T: FromRow<'r, PgRow>>(row: &'r PgRow) -> StoreResult<T> {
    T::from_row(row).map_err(|e| map_sqlx_error("decode_row", e))
}

fn to_db_version(version: u64) -> StoreResult<i64> {
    i64::try_from(version).map_err(|_| StoreError::Corrupt(format!("version {version} overflows BIGINT")))
}

fn from_db_u64(column: &str, value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

fn parse_kind(raw: &str) -> StoreResult<OperationKind> {
    OperationKind::parse(raw)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown operation kind '{raw}'")))
}

// SQLx row types

#[derive(Debug)]
struct NamedRow {
    id: i64,
    name: String,
}

impl<'r> FromRow<'r, PgRow> for NamedRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(NamedRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
        })
    }
}

impl From<NamedRow> for Region {
    fn from(row: NamedRow) -> Self {
        Region {
            id: RegionId::new(row.id),
            name: row.name,
        }
    }
}

impl From<NamedRow> for Category {
    fn from(row: NamedRow) -> Self {
        Category {
            id: CategoryId::new(row.id),
            name: row.name,
        }
    }
}

#[derive(Debug)]
struct StorageRow {
    id: i64,
    name: String,
    region_id: i64,
}

impl<'r> FromRow<'r, PgRow> for StorageRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StorageRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            region_id: row.try_get("region_id")?,
        })
    }
}

impl From<StorageRow> for Storage {
    fn from(row: StorageRow) -> Self {
        Storage {
            id: StorageId::new(row.id),
            name: row.name,
            region_id: RegionId::new(row.region_id),
        }
    }
}

#[derive(Debug)]
struct ProductRow {
    id: i64,
    name: String,
    price: i64,
    category_id: i64,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            price: row.try_get("price")?,
            category_id: row.try_get("category_id")?,
        })
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: ProductId::new(row.id),
            name: row.name,
            price: from_db_u64("price", row.price)?,
            category_id: CategoryId::new(row.category_id),
        })
    }
}

#[derive(Debug)]
struct ProductSummaryRow {
    id: i64,
    name: String,
    price: i64,
    category: String,
    count: i64,
}

impl<'r> FromRow<'r, PgRow> for ProductSummaryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductSummaryRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            price: row.try_get("price")?,
            category: row.try_get("category")?,
            count: row.try_get("count")?,
        })
    }
}

impl TryFrom<ProductSummaryRow> for ProductSummary {
    type Error = StoreError;

    fn try_from(row: ProductSummaryRow) -> Result<Self, Self::Error> {
        Ok(ProductSummary {
            id: ProductId::new(row.id),
            name: row.name,
            price: from_db_u64("price", row.price)?,
            category: row.category,
            count: row.count,
        })
    }
}

#[derive(Debug)]
struct StockRow {
    id: i64,
    product_id: i64,
    storage_id: i64,
    count: i64,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for StockRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StockRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            storage_id: row.try_get("storage_id")?,
            count: row.try_get("count")?,
            version: row.try_get("version")?,
        })
    }
}

impl TryFrom<StockRow> for StockRecord {
    type Error = StoreError;

    fn try_from(row: StockRow) -> Result<Self, Self::Error> {
        Ok(StockRecord {
            id: StockRecordId::new(row.id),
            product_id: ProductId::new(row.product_id),
            storage_id: StorageId::new(row.storage_id),
            count: row.count,
            version: from_db_u64("version", row.version)?,
        })
    }
}

#[derive(Debug)]
struct OperationRow {
    id: i64,
    kind: String,
    count: i64,
    occurred_at: DateTime<Utc>,
    product_id: i64,
    storage_id: i64,
}

impl<'r> FromRow<'r, PgRow> for OperationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OperationRow {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            count: row.try_get("count")?,
            occurred_at: row.try_get("occurred_at")?,
            product_id: row.try_get("product_id")?,
            storage_id: row.try_get("storage_id")?,
        })
    }
}

impl TryFrom<OperationRow> for OperationRecord {
    type Error = StoreError;

    fn try_from(row: OperationRow) -> Result<Self, Self::Error> {
        Ok(OperationRecord {
            id: OperationId::new(row.id),
            kind: parse_kind(&row.kind)?,
            count: row.count,
            occurred_at: row.occurred_at,
            product_id: ProductId::new(row.product_id),
            storage_id: StorageId::new(row.storage_id),
        })
    }
}

#[derive(Debug)]
struct NoticeRow {
    id: i64,
    product_id: i64,
    storage_id: i64,
    operation: String,
    direction: String,
    generated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for NoticeRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(NoticeRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            storage_id: row.try_get("storage_id")?,
            operation: row.try_get("operation")?,
            direction: row.try_get("direction")?,
            generated_at: row.try_get("generated_at")?,
        })
    }
}

impl TryFrom<NoticeRow> for AnalysisNotice {
    type Error = StoreError;

    fn try_from(row: NoticeRow) -> Result<Self, Self::Error> {
        let direction = ChangeDirection::parse(&row.direction).ok_or_else(|| {
            StoreError::Corrupt(format!("unknown change direction '{}'", row.direction))
        })?;
        Ok(AnalysisNotice {
            id: NoticeId::new(row.id),
            product_id: ProductId::new(row.product_id),
            storage_id: StorageId::new(row.storage_id),
            operation: parse_kind(&row.operation)?,
            direction,
            generated_at: row.generated_at,
        })
    }
}
