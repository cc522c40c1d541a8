use axum::Router;

pub mod analysis;
pub mod stock;
pub mod storages;
pub mod system;

/// Router for all warehouse endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/stock", stock::router())
        .nest("/storages", storages::router())
        .nest("/analysis", analysis::router())
}
