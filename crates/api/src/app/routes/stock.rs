use std::sync::Arc;

use axum::{Extension, Json, Router, response::IntoResponse, routing::post};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/increase", post(increase))
        .route("/decrease", post(decrease))
}

pub async fn increase(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::StockMovementRequest>,
) -> axum::response::Response {
    let amount = match dto::required_amount(body.amount) {
        Ok(a) => a,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services
        .ledger
        .increase(body.product_id, body.storage_id, amount)
        .await
    {
        Ok(receipt) => Json(dto::StockMovementResponse::from(receipt)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn decrease(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::StockMovementRequest>,
) -> axum::response::Response {
    let amount = match dto::required_amount(body.amount) {
        Ok(a) => a,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services
        .ledger
        .decrease(body.product_id, body.storage_id, amount)
        .await
    {
        Ok(receipt) => Json(dto::StockMovementResponse::from(receipt)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
