//! Dining Table Model

use serde::{Deserialize, Serialize};

/// Table occupancy state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableStatus {
    #[default]
    Idle,
    Occupied,
    Reserved,
}

impl TableStatus {
    /// Statically allowed occupancy transitions.
    ///
    /// The IDLE target carries an additional operational guard (no live
    /// orders) that is evaluated by the table engine inside the write
    /// transaction; this table only encodes the declarative edges.
    pub fn can_transition_to(&self, target: TableStatus) -> bool {
        use TableStatus::*;
        matches!(
            (self, target),
            (Idle, Occupied) | (Idle, Reserved) | (Occupied, Idle) | (Reserved, Occupied) | (Reserved, Idle)
        )
    }
}

impl std::fmt::Display for TableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableStatus::Idle => write!(f, "IDLE"),
            TableStatus::Occupied => write!(f, "OCCUPIED"),
            TableStatus::Reserved => write!(f, "RESERVED"),
        }
    }
}

/// 2-D layout position on the floor plan
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TablePosition {
    pub x: f64,
    pub y: f64,
}

/// Dining table entity (桌台)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiningTable {
    pub id: String,
    /// Owning branch scope
    pub branch_id: String,
    /// Unique within the branch
    pub table_number: i32,
    pub capacity: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub status: TableStatus,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<TablePosition>,
    pub created_at: i64,
    pub updated_at: i64,
}

fn default_true() -> bool {
    true
}

/// Create dining table payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiningTableCreate {
    pub branch_id: String,
    pub table_number: i32,
    pub capacity: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<TablePosition>,
}

/// Update dining table payload (status changes go through the engine ops)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiningTableUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<TablePosition>,
}
