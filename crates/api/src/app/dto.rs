use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warehouse_core::{DomainError, DomainResult, OperationId, ProductId, StorageId};
use warehouse_infra::StockReceipt;
use warehouse_inventory::{AnalysisNotice, OperationKind};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct StockMovementRequest {
    pub product_id: ProductId,
    pub storage_id: StorageId,
    pub amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveStorageRequest {
    pub product_id: ProductId,
    pub region: String,
    pub amount: Option<i64>,
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct ProductsQuery {
    pub category: Option<String>,
}

/// Both bounds are optional: `to` defaults to now, `from` to `to` minus the analysis window.
#[derive(Debug, Deserialize)]
pub struct NoticeRangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// A missing amount is reported the same way as a non-positive one.
pub fn required_amount(amount: Option<i64>) -> DomainResult<i64> {
    amount.ok_or_else(|| DomainError::invalid_amount("amount is required"))
}

pub fn parse_operation_kind(s: &str) -> Result<OperationKind, axum::response::Response> {
    OperationKind::parse(&s.trim().to_ascii_uppercase()).ok_or_else(|| {
        errors::json_error(
            axum::http::StatusCode::BAD_REQUEST,
            "invalid_kind",
            "kind must be one of: LOADING, SHIPMENT",
        )
    })
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct StockMovementResponse {
    pub product_id: ProductId,
    pub storage_id: StorageId,
    pub kind: OperationKind,
    pub new_count: i64,
    pub operation_id: OperationId,
    pub message: String,
}

impl From<StockReceipt> for StockMovementResponse {
    fn from(receipt: StockReceipt) -> Self {
        Self {
            message: receipt.to_string(),
            product_id: receipt.product_id,
            storage_id: receipt.storage_id,
            kind: receipt.kind,
            new_count: receipt.new_count,
            operation_id: receipt.operation_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NoticeReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub notices: Vec<AnalysisNotice>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_kind_is_case_insensitive() {
        assert_eq!(parse_operation_kind("shipment").ok(), Some(OperationKind::Shipment));
        assert_eq!(parse_operation_kind(" LOADING ").ok(), Some(OperationKind::Loading));
        assert_eq!(
            parse_operation_kind("transfer").err().map(|r| r.status()),
            Some(axum::http::StatusCode::BAD_REQUEST)
        );
    }

    #[test]
    fn missing_amount_is_an_invalid_amount() {
        assert_eq!(required_amount(Some(5)), Ok(5));
        assert_eq!(required_amount(None).unwrap_err().kind(), "invalid_amount");
    }

    #[test]
    fn movement_response_carries_the_confirmation() {
        let receipt = StockReceipt {
            product_id: ProductId::new(1),
            storage_id: StorageId::new(2),
            kind: OperationKind::Loading,
            new_count: 25,
            operation_id: OperationId::new(7),
        };
        let res = StockMovementResponse::from(receipt);
        assert_eq!(
            res.message,
            "Total count of product with id='1' on storage with id='2': 25"
        );
        assert_eq!(res.new_count, 25);
    }
}
