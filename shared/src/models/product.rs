//! Product catalog entry
//!
//! Minimal catalog surface: the order engine needs a current price to
//! snapshot and a stockable flag. Full product management lives outside
//! the engine.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub branch_id: String,
    pub name: String,
    pub price: f64,
    /// Whether completing an order draws this product from stock
    #[serde(default)]
    pub is_stockable: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}
