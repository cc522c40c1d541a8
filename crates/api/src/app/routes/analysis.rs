use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::Query,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use warehouse_core::DomainError;
use warehouse_infra::RunOutcome;
use warehouse_infra::store::{NoticeStore, bounded};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/notices", get(list_notices))
        .route("/run", post(run_now))
}

pub async fn list_notices(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::NoticeRangeQuery>,
) -> axum::response::Response {
    let to = query.to.unwrap_or_else(Utc::now);
    let from = match query.from {
        Some(from) => from,
        None => match chrono::Duration::from_std(services.runner.config().window) {
            Ok(window) => to - window,
            Err(_) => to,
        },
    };
    if from > to {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_range",
            format!("from ({from}) is after to ({to})"),
        );
    }

    match bounded(services.store_timeout, services.store.notices_between(from, to)).await {
        Ok(notices) => Json(dto::NoticeReport { from, to, notices }).into_response(),
        Err(e) => errors::domain_error_to_response(DomainError::from(e)),
    }
}

/// Run one analysis pass now. A pass already in flight wins; this one reports `skipped`.
pub async fn run_now(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let outcome = services.runner.run_once(&*services.store, Utc::now()).await;
    let status = match &outcome {
        RunOutcome::Completed { .. } => StatusCode::OK,
        RunOutcome::Skipped => StatusCode::CONFLICT,
        RunOutcome::Failed { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(outcome)).into_response()
}
