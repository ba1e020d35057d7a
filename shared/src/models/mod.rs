//! Domain models
//!
//! Plain serde structs persisted as JSON rows by the storage layer.
//! Status enums carry their own transition tables so the rules live next
//! to the type instead of being scattered across the engines.

pub mod dining_table;
pub mod order;
pub mod product;
pub mod stock;

pub use dining_table::{DiningTable, DiningTableCreate, DiningTableUpdate, TablePosition, TableStatus};
pub use order::{Order, OrderCreate, OrderItem, OrderItemInput, OrderSource, OrderStatus};
pub use product::Product;
pub use stock::{CountedEntry, Stock, StockCreate, StockMovement, StockMovementType};
