use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use warehouse_infra::store::{InMemoryStore, PostgresStore, WarehouseStore};
use warehouse_infra::{AppConfig, ReplenishmentRunner, StockLedger, StockLocator};

pub type SharedStore = Arc<dyn WarehouseStore>;

/// Everything the handlers need, built once at startup.
///
/// The runner here is the same instance the scheduled task is spawned from, so a manual run
/// through the API and a scheduled run never overlap.
pub struct AppServices {
    pub store: SharedStore,
    pub ledger: StockLedger<dyn WarehouseStore>,
    pub locator: StockLocator<dyn WarehouseStore>,
    pub runner: ReplenishmentRunner,
    pub store_timeout: Duration,
}

impl AppServices {
    pub fn new(store: SharedStore, store_timeout: Duration, runner: ReplenishmentRunner) -> Self {
        Self {
            ledger: StockLedger::new(Arc::clone(&store)).with_timeout(store_timeout),
            locator: StockLocator::new(Arc::clone(&store)).with_timeout(store_timeout),
            store,
            runner,
            store_timeout,
        }
    }
}

/// Select and prepare the store from config, then wire the services on top of it.
///
/// With `DATABASE_URL` set this connects to PostgreSQL and applies the schema; otherwise the
/// in-memory store is used (optionally seeded with demo reference data).
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store: SharedStore = match &config.database {
        Some(db) => {
            let pg = PostgresStore::connect(&db.url, db.max_connections, config.store_timeout)
                .await
                .context("connecting to PostgreSQL")?;
            pg.migrate().await.context("applying the schema")?;
            tracing::info!(max_connections = db.max_connections, "using PostgreSQL store");
            Arc::new(pg)
        }
        None if config.seed_demo => {
            tracing::info!("using in-memory store with demo data");
            Arc::new(InMemoryStore::with_demo_data().context("seeding demo data")?)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using empty in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };

    Ok(AppServices::new(
        store,
        config.store_timeout,
        ReplenishmentRunner::new(config.analysis.clone()),
    ))
}
