//! Replenishment recommendations produced by the analyzer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warehouse_core::{Entity, NoticeId, ProductId, StorageId};

use crate::stock::OperationKind;

/// Recommended direction for future volume of an operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeDirection {
    Increase,
    Decrease,
}

impl ChangeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeDirection::Increase => "INCREASE",
            ChangeDirection::Decrease => "DECREASE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INCREASE" => Some(ChangeDirection::Increase),
            "DECREASE" => Some(ChangeDirection::Decrease),
            _ => None,
        }
    }
}

/// A notice that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotice {
    pub product_id: ProductId,
    pub storage_id: StorageId,
    pub operation: OperationKind,
    pub direction: ChangeDirection,
    pub generated_at: DateTime<Utc>,
}

/// Persisted, append-only recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisNotice {
    pub id: NoticeId,
    pub product_id: ProductId,
    pub storage_id: StorageId,
    pub operation: OperationKind,
    pub direction: ChangeDirection,
    pub generated_at: DateTime<Utc>,
}

impl NewNotice {
    pub fn persisted(self, id: NoticeId) -> AnalysisNotice {
        AnalysisNotice {
            id,
            product_id: self.product_id,
            storage_id: self.storage_id,
            operation: self.operation,
            direction: self.direction,
            generated_at: self.generated_at,
        }
    }
}

impl Entity for AnalysisNotice {
    type Id = NoticeId;

    fn id(&self) -> Self::Id {
        self.id
    }
}
