//! Order and order item models
//!
//! The order status machine is one-directional except for the kitchen
//! send-back edges (PREPARING -> PENDING, READY -> PREPARING).

use serde::{Deserialize, Serialize};

/// Order lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Preparing,
    Ready,
    Delivered,
    Completed,
    Cancelled,
    ItemIssue,
    PartiallyPaid,
}

impl OrderStatus {
    /// Outgoing edges of the status machine. Terminal states return `&[]`.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Preparing, Cancelled],
            Preparing => &[Ready, Cancelled, Pending],
            Ready => &[Delivered, Cancelled, Preparing],
            Delivered => &[Completed],
            Completed => &[],
            Cancelled => &[],
            ItemIssue => &[Pending, Cancelled],
            PartiallyPaid => &[Completed],
        }
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Live = visible to the kitchen and blocking table release
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Preparing | OrderStatus::Ready
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::Preparing => write!(f, "PREPARING"),
            OrderStatus::Ready => write!(f, "READY"),
            OrderStatus::Delivered => write!(f, "DELIVERED"),
            OrderStatus::Completed => write!(f, "COMPLETED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::ItemIssue => write!(f, "ITEM_ISSUE"),
            OrderStatus::PartiallyPaid => write!(f, "PARTIALLY_PAID"),
        }
    }
}

/// Where the order came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSource {
    #[default]
    DineIn,
    Takeout,
    Delivery,
}

/// Order line item
///
/// `unit_price` and `name` are snapshots taken at creation; later catalog
/// edits must never alter an existing order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub item_id: String,
    pub product_id: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price: f64,
    /// Whether the product draws down a stock record on completion
    pub is_stockable: bool,
    #[serde(default)]
    pub is_void: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub void_reason: Option<String>,
    /// Coarse preparation mirror, managed by the kitchen flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Order aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub branch_id: String,
    pub restaurant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub status: OrderStatus,
    pub source: OrderSource,
    pub items: Vec<OrderItem>,
    /// Σ(quantity × unit_price) of non-void items minus discount
    pub total: f64,
    #[serde(default)]
    pub discount: f64,
    /// Set once the completion debit has been written to the stock ledger
    #[serde(default)]
    pub stock_debited: bool,
    pub ordered_at: i64,
    pub opened_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closing_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preparation_started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<i64>,
}

impl Order {
    /// Live order = PENDING/PREPARING/READY and not closed
    pub fn is_live(&self) -> bool {
        self.status.is_live() && self.closing_time.is_none()
    }
}

/// Line item input for order creation (price is looked up, never trusted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemInput {
    pub product_id: String,
    pub quantity: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Create order payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreate {
    pub branch_id: String,
    pub restaurant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub source: OrderSource,
    pub items: Vec<OrderItemInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<f64>,
}
