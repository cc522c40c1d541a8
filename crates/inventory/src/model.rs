//! Reference data (products, categories, regions, storages) and their read summaries.
//!
//! The core never creates these; it only reads them to validate references.

use serde::{Deserialize, Serialize};

use warehouse_core::{CategoryId, Entity, ProductId, RegionId, StorageId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Price in the smallest currency unit.
    pub price: u64,
    pub category_id: CategoryId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
}

/// A physical location. Belongs to exactly one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storage {
    pub id: StorageId,
    pub name: String,
    pub region_id: RegionId,
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Entity for Region {
    type Id = RegionId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Entity for Storage {
    type Id = StorageId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// A product stocked at a storage, as listed by `ListStockByStorage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub price: u64,
    pub category: String,
    pub count: i64,
}

/// A storage candidate returned by the locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSummary {
    pub id: StorageId,
    pub name: String,
    pub region: String,
}

impl StorageSummary {
    pub fn of(storage: &Storage, region: &Region) -> Self {
        Self {
            id: storage.id,
            name: storage.name.clone(),
            region: region.name.clone(),
        }
    }
}
