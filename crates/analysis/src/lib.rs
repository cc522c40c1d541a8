//! `warehouse-analysis`
//!
//! **Responsibility:** replenishment analysis over the stock audit trail.
//!
//! This crate is pure: it never reads or writes the store. Callers (the scheduled runner in
//! `warehouse-infra`) hand it a window of operation records and persist what it returns.

pub mod job;
pub mod replenishment;
pub mod result;

pub use job::AnalysisJob;
pub use replenishment::{PairTotals, ReplenishmentJob, ReplenishmentPolicy};
pub use result::{AnalysisError, AnalysisReport};
