//! Boundary-facing error classification
//!
//! The engines return rich `thiserror` enums internally; excluded boundary
//! adapters (HTTP controllers, socket relays) only need a stable code to
//! serialize. Every engine error maps to exactly one `ErrorCode`.

use serde::{Deserialize, Serialize};

/// Stable error codes exposed to boundary adapters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Not-found family
    TableNotFound,
    OrderNotFound,
    StockNotFound,
    ProductNotFound,

    // Validation / precondition family (includes lost-update conflicts)
    TableOperationError,
    TableValidationError,
    InvalidOrderStatusTransition,
    InsufficientStock,
    ValidationError,

    // Fatal
    StorageError,
    InternalError,
}

/// Coarse error category, used by callers to decide retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller error, never retried
    NotFound,
    /// Business-rule violation; caller may re-attempt with corrected input
    Validation,
    /// Persistence failure; the whole operation rolled back
    Fatal,
}

impl ErrorCode {
    /// Classify the code into the retry-relevant category.
    ///
    /// Conflicts (lost-update races) deliberately land in `Validation`:
    /// the caller is expected to re-fetch state and retry explicitly,
    /// never automatically.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::TableNotFound
            | ErrorCode::OrderNotFound
            | ErrorCode::StockNotFound
            | ErrorCode::ProductNotFound => ErrorCategory::NotFound,

            ErrorCode::TableOperationError
            | ErrorCode::TableValidationError
            | ErrorCode::InvalidOrderStatusTransition
            | ErrorCode::InsufficientStock
            | ErrorCode::ValidationError => ErrorCategory::Validation,

            ErrorCode::StorageError | ErrorCode::InternalError => ErrorCategory::Fatal,
        }
    }
}
