use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query},
    response::IntoResponse,
    routing::{get, post},
};

use warehouse_core::StorageId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/resolve", post(resolve))
        .route("/:id/products", get(list_products))
}

/// Storages in a region where the requested operation is possible.
pub async fn resolve(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ResolveStorageRequest>,
) -> axum::response::Response {
    let kind = match dto::parse_operation_kind(&body.kind) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let amount = match dto::required_amount(body.amount) {
        Ok(a) => a,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services
        .locator
        .resolve(body.product_id, &body.region, amount, kind)
        .await
    {
        Ok(storages) => Json(storages).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<StorageId>,
    Query(query): Query<dto::ProductsQuery>,
) -> axum::response::Response {
    match services
        .locator
        .list_stock_by_storage(id, query.category.as_deref())
        .await
    {
        Ok(products) => Json(products).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
