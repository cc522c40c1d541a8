use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warehouse_core::{
    DomainError, DomainResult, Entity, ExpectedVersion, OperationId, ProductId, StockRecordId,
    StorageId,
};

/// Kind of stock-changing event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    /// Inbound: increases on-hand quantity.
    Loading,
    /// Outbound: decreases on-hand quantity.
    Shipment,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Loading => "LOADING",
            OperationKind::Shipment => "SHIPMENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOADING" => Some(OperationKind::Loading),
            "SHIPMENT" => Some(OperationKind::Shipment),
            _ => None,
        }
    }
}

impl core::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current on-hand quantity of one product at one storage.
///
/// At most one record exists per (product, storage) pair and `count` is never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub id: StockRecordId,
    pub product_id: ProductId,
    pub storage_id: StorageId,
    pub count: i64,
    /// Optimistic concurrency version (1 on creation, +1 per write).
    pub version: u64,
}

impl Entity for StockRecord {
    type Id = StockRecordId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Immutable audit entry for one loading or shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: OperationId,
    pub kind: OperationKind,
    pub count: i64,
    pub occurred_at: DateTime<Utc>,
    pub product_id: ProductId,
    pub storage_id: StorageId,
}

impl Entity for OperationRecord {
    type Id = OperationId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Audit entry that has not been appended yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOperation {
    pub kind: OperationKind,
    pub count: i64,
    pub occurred_at: DateTime<Utc>,
    pub product_id: ProductId,
    pub storage_id: StorageId,
}

impl NewOperation {
    pub fn persisted(self, id: OperationId) -> OperationRecord {
        OperationRecord {
            id,
            kind: self.kind,
            count: self.count,
            occurred_at: self.occurred_at,
            product_id: self.product_id,
            storage_id: self.storage_id,
        }
    }
}

/// Request to move `amount` units of a product into or out of a storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub product_id: ProductId,
    pub storage_id: StorageId,
    pub kind: OperationKind,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Outcome of deciding a movement against the current record.
///
/// The store must write `new_count` and append `operation` in one unit of work, and only
/// if the stored record is still at `expected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub expected: ExpectedVersion,
    pub product_id: ProductId,
    pub storage_id: StorageId,
    pub new_count: i64,
    pub operation: NewOperation,
}

impl StockChange {
    /// Materialize the record as it will look once the change is committed.
    pub fn record(&self, id: StockRecordId) -> StockRecord {
        StockRecord {
            id,
            product_id: self.product_id,
            storage_id: self.storage_id,
            count: self.new_count,
            version: self.expected.next(),
        }
    }
}

impl StockMovement {
    pub fn loading(
        product_id: ProductId,
        storage_id: StorageId,
        amount: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            product_id,
            storage_id,
            kind: OperationKind::Loading,
            amount,
            occurred_at,
        }
    }

    pub fn shipment(
        product_id: ProductId,
        storage_id: StorageId,
        amount: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            product_id,
            storage_id,
            kind: OperationKind::Shipment,
            amount,
            occurred_at,
        }
    }

    pub fn validate_amount(&self) -> DomainResult<()> {
        if self.amount <= 0 {
            return Err(DomainError::invalid_amount(format!(
                "{} amount must be positive, got {}",
                self.kind, self.amount
            )));
        }
        Ok(())
    }

    /// Decide the stock change for this movement given the current record (if any).
    ///
    /// Pure: never mutates `current`.
    pub fn decide(&self, current: Option<&StockRecord>) -> DomainResult<StockChange> {
        self.validate_amount()?;

        if let Some(rec) = current {
            if rec.product_id != self.product_id || rec.storage_id != self.storage_id {
                return Err(DomainError::conflict(format!(
                    "stock record {} belongs to product {} / storage {}, not {} / {}",
                    rec.id, rec.product_id, rec.storage_id, self.product_id, self.storage_id
                )));
            }
        }

        let (expected, new_count) = match (self.kind, current) {
            (OperationKind::Loading, None) => (ExpectedVersion::Absent, self.amount),
            (OperationKind::Loading, Some(rec)) => {
                let total = rec.count.checked_add(self.amount).ok_or_else(|| {
                    DomainError::invalid_amount(format!(
                        "loading {} onto count {} overflows",
                        self.amount, rec.count
                    ))
                })?;
                (ExpectedVersion::Exact(rec.version), total)
            }
            (OperationKind::Shipment, None) => {
                return Err(DomainError::not_found(format!(
                    "Product with id='{}' in storage with id='{}' not found",
                    self.product_id, self.storage_id
                )));
            }
            (OperationKind::Shipment, Some(rec)) => {
                if rec.count < self.amount {
                    return Err(DomainError::InsufficientStock {
                        product_id: self.product_id,
                        storage_id: self.storage_id,
                        requested: self.amount,
                        available: rec.count,
                    });
                }
                (ExpectedVersion::Exact(rec.version), rec.count - self.amount)
            }
        };

        Ok(StockChange {
            expected,
            product_id: self.product_id,
            storage_id: self.storage_id,
            new_count,
            operation: NewOperation {
                kind: self.kind,
                count: self.amount,
                occurred_at: self.occurred_at,
                product_id: self.product_id,
                storage_id: self.storage_id,
            },
        })
    }
}
