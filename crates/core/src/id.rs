//! Strongly-typed identifiers used across the domain.
//!
//! Records reference each other by identifier only; there are no back-pointers between
//! regions and storages or between categories and products.

use core::num::ParseIntError;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A string that is not an integer identifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind} '{input}' is not a valid id: {source}")]
pub struct IdParseError {
    pub kind: &'static str,
    pub input: String,
    #[source]
    pub source: ParseIntError,
}

/// Identifier of a product.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(i64);

/// Identifier of a product category.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(i64);

/// Identifier of a region.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(i64);

/// Identifier of a storage (physical location).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageId(i64);

/// Identifier of a stock record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockRecordId(i64);

/// Identifier of an operation (audit) record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(i64);

/// Identifier of an analysis notice.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoticeId(i64);

macro_rules! impl_int_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Wrap a raw (store-assigned) identifier.
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|source| IdParseError {
                        kind: $name,
                        input: s.to_string(),
                        source,
                    })?;
                Ok(Self(raw))
            }
        }
    };
}

impl_int_newtype!(ProductId, "ProductId");
impl_int_newtype!(CategoryId, "CategoryId");
impl_int_newtype!(RegionId, "RegionId");
impl_int_newtype!(StorageId, "StorageId");
impl_int_newtype!(StockRecordId, "StockRecordId");
impl_int_newtype!(OperationId, "OperationId");
impl_int_newtype!(NoticeId, "NoticeId");
