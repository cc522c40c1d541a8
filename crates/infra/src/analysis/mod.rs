//! Scheduled analysis tasks.

pub mod replenishment_runner;

pub use replenishment_runner::{
    ReplenishmentRunner, ReplenishmentRunnerConfig, ReplenishmentRunnerHandle, RunOutcome,
};
