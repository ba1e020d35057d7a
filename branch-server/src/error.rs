//! Engine error types
//!
//! Engines never swallow errors: any failed leg of a multi-step mutation
//! aborts the whole transaction and the error propagates to the boundary
//! unmodified. Conflicts discovered inside the commit transaction surface
//! as the validation family - the caller re-fetches and retries
//! explicitly, the engine never retries internally.

use crate::storage::StorageError;
use shared::ErrorCode;
use shared::models::OrderStatus;
use thiserror::Error;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Stock not found: {0}")]
    StockNotFound(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Table operation failed: {0}")]
    TableOperation(String),

    #[error("Table validation failed: {0}")]
    TableValidation(String),

    #[error("Invalid order status transition: {from} -> {to}")]
    InvalidOrderStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Insufficient stock {stock_id}: available {available}, requested {requested}")]
    InsufficientStock {
        stock_id: String,
        available: i64,
        requested: i64,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Boundary-facing code (前端负责本地化)
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::TableNotFound(_) => ErrorCode::TableNotFound,
            EngineError::OrderNotFound(_) => ErrorCode::OrderNotFound,
            EngineError::StockNotFound(_) => ErrorCode::StockNotFound,
            EngineError::ProductNotFound(_) => ErrorCode::ProductNotFound,
            EngineError::ItemNotFound(_) => ErrorCode::ValidationError,
            EngineError::TableOperation(_) => ErrorCode::TableOperationError,
            EngineError::TableValidation(_) => ErrorCode::TableValidationError,
            EngineError::InvalidOrderStatusTransition { .. } => {
                ErrorCode::InvalidOrderStatusTransition
            }
            EngineError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            EngineError::Validation(_) => ErrorCode::ValidationError,
            EngineError::Storage(_) => ErrorCode::StorageError,
        }
    }
}
