//! Stock record and ledger entry models
//!
//! `Stock.quantity` is derived state: it must equal the signed sum of the
//! record's `StockMovement` entries at all times. The engine keeps that
//! true by construction - every quantity write happens in the same
//! transaction as exactly one ledger append.

use serde::{Deserialize, Serialize};

/// Ledger movement type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockMovementType {
    In,
    Out,
    Transfer,
    Adjustment,
}

impl std::fmt::Display for StockMovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StockMovementType::In => write!(f, "IN"),
            StockMovementType::Out => write!(f, "OUT"),
            StockMovementType::Transfer => write!(f, "TRANSFER"),
            StockMovementType::Adjustment => write!(f, "ADJUSTMENT"),
        }
    }
}

/// One stock record per (product, branch) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stock {
    pub id: String,
    pub branch_id: String,
    pub product_id: String,
    /// Current on-hand quantity; never negative
    pub quantity: i64,
    pub low_stock_threshold: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ideal_level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create stock record payload
///
/// A non-zero `initial_quantity` is written to the ledger as an IN entry
/// so the derivation invariant holds from the record's first breath.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockCreate {
    pub branch_id: String,
    pub product_id: String,
    #[serde(default)]
    pub initial_quantity: i64,
    #[serde(default)]
    pub low_stock_threshold: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ideal_level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Immutable ledger entry - append-only, never updated or deleted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    /// Global, monotonic ledger sequence
    pub seq: u64,
    pub stock_id: String,
    pub movement_type: StockMovementType,
    /// Signed quantity change
    pub delta: i64,
    /// On-hand quantity after this entry was applied
    pub quantity_after: i64,
    /// Causing order, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub reason: String,
    pub created_at: i64,
}

/// One line of a physical count report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountedEntry {
    pub stock_id: String,
    pub counted: i64,
}
