//! Domain error model.

use thiserror::Error;

use crate::id::{ProductId, StorageId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Caller-facing error taxonomy for stock operations.
///
/// `NotFound`, `InvalidAmount` and `InsufficientStock` are deterministic: retrying the same
/// call cannot change the outcome. `Transient` covers store timeouts and outages; the whole
/// operation may be retried by the caller. `Conflict` is raised for duplicate names in the
/// reference data and for stock writes that kept losing optimistic races.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced product, storage, region, category or stock record does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A quantity was zero, negative or missing.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A shipment asked for more than is on hand.
    #[error(
        "count of product with id='{product_id}' on storage with id='{storage_id}' is less than {requested}; actual count is {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        storage_id: StorageId,
        requested: i64,
        available: i64,
    },

    /// Uniqueness or concurrency conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The durable store timed out or was unavailable.
    #[error("transient failure: {0}")]
    Transient(String),
}

impl DomainError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::NotFound(_) => "not_found",
            DomainError::InvalidAmount(_) => "invalid_amount",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::Conflict(_) => "conflict",
            DomainError::Transient(_) => "transient",
        }
    }
}
