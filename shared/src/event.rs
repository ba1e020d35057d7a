//! Branch-scoped engine events
//!
//! Emitted strictly after the owning transaction commits. Delivery is
//! at-most-once and best-effort: all engine state stays independently
//! queryable, so a missed event never corrupts anything.

use crate::models::{OrderItem, OrderStatus, StockMovementType, TableStatus};
use crate::util::{new_id, now_millis};
use serde::{Deserialize, Serialize};

/// Event type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    TableStatusChanged,
    StockUpdated,
    StockAlert,
    OrderCreated,
    OrderUpdated,
    StockTransfer,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::TableStatusChanged => write!(f, "TABLE_STATUS_CHANGED"),
            EventType::StockUpdated => write!(f, "STOCK_UPDATED"),
            EventType::StockAlert => write!(f, "STOCK_ALERT"),
            EventType::OrderCreated => write!(f, "ORDER_CREATED"),
            EventType::OrderUpdated => write!(f, "ORDER_UPDATED"),
            EventType::StockTransfer => write!(f, "STOCK_TRANSFER"),
        }
    }
}

/// Event payload variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    TableStatusChanged {
        table_id: String,
        status: TableStatus,
        branch_id: String,
    },

    StockUpdated {
        stock_id: String,
        product_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        order_id: Option<String>,
        movement_type: StockMovementType,
        quantity: i64,
    },

    StockAlert {
        stock_id: String,
        product_id: String,
        current_quantity: i64,
        threshold: i64,
    },

    OrderCreated {
        order_id: String,
        status: OrderStatus,
        items: Vec<OrderItem>,
    },

    OrderUpdated {
        order_id: String,
        status: OrderStatus,
        items: Vec<OrderItem>,
    },

    StockTransfer {
        movement_type: StockMovementType,
        stock_id: String,
        product_id: String,
        quantity: i64,
        from_branch_id: String,
        to_branch_id: String,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::TableStatusChanged { .. } => EventType::TableStatusChanged,
            EventPayload::StockUpdated { .. } => EventType::StockUpdated,
            EventPayload::StockAlert { .. } => EventType::StockAlert,
            EventPayload::OrderCreated { .. } => EventType::OrderCreated,
            EventPayload::OrderUpdated { .. } => EventType::OrderUpdated,
            EventPayload::StockTransfer { .. } => EventType::StockTransfer,
        }
    }
}

/// Engine event, scoped to one branch channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchEvent {
    pub event_id: String,
    pub branch_id: String,
    /// Server timestamp (Unix milliseconds)
    pub timestamp: i64,
    pub payload: EventPayload,
}

impl BranchEvent {
    pub fn new(branch_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            event_id: new_id(),
            branch_id: branch_id.into(),
            timestamp: now_millis(),
            payload,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}
