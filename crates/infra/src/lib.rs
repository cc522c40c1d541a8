//! Infrastructure layer: entity store, stock ledger and locator, scheduled analysis, config.

pub mod analysis;
pub mod config;
pub mod ledger;
pub mod locator;
pub mod store;


pub use analysis::{ReplenishmentRunner, ReplenishmentRunnerConfig, ReplenishmentRunnerHandle, RunOutcome};
pub use config::{AppConfig, ConfigError, DatabaseConfig};
pub use ledger::{StockLedger, StockReceipt};
pub use locator::StockLocator;
