//! Shared domain types for the branch transaction engine
//!
//! This crate holds the types that cross the engine boundary:
//!
//! - **models**: tables, orders, stock records and ledger entries
//! - **event**: branch-scoped notification events emitted after commit
//! - **error**: boundary-facing error codes
//! - **util**: timestamp and id helpers

pub mod error;
pub mod event;
pub mod models;
pub mod util;

// Re-export 公共类型
pub use error::{ErrorCategory, ErrorCode};
pub use event::{BranchEvent, EventPayload, EventType};
pub use models::{
    CountedEntry, DiningTable, DiningTableCreate, DiningTableUpdate, Order, OrderCreate,
    OrderItem, OrderItemInput, OrderSource, OrderStatus, Product, Stock, StockCreate,
    StockMovement, StockMovementType, TablePosition, TableStatus,
};
