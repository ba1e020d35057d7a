//! redb-based storage layer for the branch engines
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `dining_tables` | `table_id` | `DiningTable` | Table rows |
//! | `orders` | `order_id` | `Order` | Order rows |
//! | `open_orders` | `(table_id, order_id)` | `()` | Open orders per table |
//! | `active_orders` | `order_id` | `()` | Open order index |
//! | `stocks` | `stock_id` | `Stock` | Stock rows |
//! | `stock_by_product` | `(branch_id, product_id)` | `stock_id` | Stock lookup |
//! | `stock_history` | `(stock_id, seq)` | `StockMovement` | Ledger (append-only) |
//! | `order_movements` | `(order_id, seq)` | `stock_id` | Ledger entries per order |
//! | `products` | `product_id` | `Product` | Catalog snapshot source |
//! | `counters` | key | `u64` | Global ledger sequence |
//!
//! # Transaction model
//!
//! redb allows a single write transaction at a time; every multi-step
//! engine mutation (stock delta + ledger append, order status + stock
//! reversal, table guard + status write, merge, transfer, count batch)
//! runs inside one `WriteTransaction`, so guards always read committed
//! state and no two writers interleave. Commits are durable as soon as
//! `commit()` returns (copy-on-write with atomic pointer swap).

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use shared::models::{DiningTable, Order, Product, Stock, StockMovement};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

const DINING_TABLES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("dining_tables");
const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

/// Open (not yet closed) orders per table: key = (table_id, order_id)
const OPEN_ORDERS_TABLE: TableDefinition<(&str, &str), ()> = TableDefinition::new("open_orders");

/// All open orders: key = order_id, value = empty (existence check)
const ACTIVE_ORDERS_TABLE: TableDefinition<&str, ()> = TableDefinition::new("active_orders");

const STOCKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("stocks");

/// Stock lookup: key = (branch_id, product_id), value = stock_id
const STOCK_BY_PRODUCT_TABLE: TableDefinition<(&str, &str), &str> =
    TableDefinition::new("stock_by_product");

/// Ledger: key = (stock_id, seq), value = JSON-serialized StockMovement.
/// Append-only - nothing in this module ever updates or removes a row.
const STOCK_HISTORY_TABLE: TableDefinition<(&str, u64), &[u8]> =
    TableDefinition::new("stock_history");

/// Reverse ledger index: key = (order_id, seq), value = stock_id
const ORDER_MOVEMENTS_TABLE: TableDefinition<(&str, u64), &str> =
    TableDefinition::new("order_movements");

const PRODUCTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("products");

/// Counter table: key = "ledger_seq", value = u64
const COUNTERS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("counters");

const LEDGER_SEQ_KEY: &str = "ledger_seq";

/// Upper bound sentinel for string range scans (ids are ASCII uuids)
const MAX_KEY: &str = "\u{10FFFF}";

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Missing row behind index: {0}")]
    MissingRow(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Engine storage backed by redb
#[derive(Clone)]
pub struct EngineStorage {
    db: Arc<Database>,
}

impl EngineStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests and embedding)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        // Create all tables up front so later transactions never race on
        // table creation
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(DINING_TABLES_TABLE)?;
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(OPEN_ORDERS_TABLE)?;
            let _ = write_txn.open_table(ACTIVE_ORDERS_TABLE)?;
            let _ = write_txn.open_table(STOCKS_TABLE)?;
            let _ = write_txn.open_table(STOCK_BY_PRODUCT_TABLE)?;
            let _ = write_txn.open_table(STOCK_HISTORY_TABLE)?;
            let _ = write_txn.open_table(ORDER_MOVEMENTS_TABLE)?;
            let _ = write_txn.open_table(PRODUCTS_TABLE)?;

            let mut counters = write_txn.open_table(COUNTERS_TABLE)?;
            if counters.get(LEDGER_SEQ_KEY)?.is_none() {
                counters.insert(LEDGER_SEQ_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Begin a write transaction (blocks while another writer is active)
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== Ledger Sequence ==========

    /// Increment and return the global ledger sequence (within transaction)
    pub fn next_ledger_seq(&self, txn: &WriteTransaction) -> StorageResult<u64> {
        let mut table = txn.open_table(COUNTERS_TABLE)?;
        let current = table
            .get(LEDGER_SEQ_KEY)?
            .map(|guard| guard.value())
            .unwrap_or(0);
        let next = current + 1;
        table.insert(LEDGER_SEQ_KEY, next)?;
        Ok(next)
    }

    /// Current ledger sequence (read-only)
    pub fn current_ledger_seq(&self) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(COUNTERS_TABLE)?;
        Ok(table
            .get(LEDGER_SEQ_KEY)?
            .map(|guard| guard.value())
            .unwrap_or(0))
    }

    // ========== Dining Tables ==========

    pub fn put_table(&self, txn: &WriteTransaction, table: &DiningTable) -> StorageResult<()> {
        let mut t = txn.open_table(DINING_TABLES_TABLE)?;
        let value = serde_json::to_vec(table)?;
        t.insert(table.id.as_str(), value.as_slice())?;
        Ok(())
    }

    pub fn get_table_txn(
        &self,
        txn: &WriteTransaction,
        id: &str,
    ) -> StorageResult<Option<DiningTable>> {
        let t = txn.open_table(DINING_TABLES_TABLE)?;
        match t.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_table(&self, id: &str) -> StorageResult<Option<DiningTable>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(DINING_TABLES_TABLE)?;
        match t.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn remove_table(&self, txn: &WriteTransaction, id: &str) -> StorageResult<()> {
        let mut t = txn.open_table(DINING_TABLES_TABLE)?;
        t.remove(id)?;
        Ok(())
    }

    /// All tables of a branch (within transaction), active and inactive
    pub fn tables_for_branch_txn(
        &self,
        txn: &WriteTransaction,
        branch_id: &str,
    ) -> StorageResult<Vec<DiningTable>> {
        let t = txn.open_table(DINING_TABLES_TABLE)?;
        let mut tables = Vec::new();
        for result in t.iter()? {
            let (_key, value) = result?;
            let table: DiningTable = serde_json::from_slice(value.value())?;
            if table.branch_id == branch_id {
                tables.push(table);
            }
        }
        Ok(tables)
    }

    pub fn tables_for_branch(&self, branch_id: &str) -> StorageResult<Vec<DiningTable>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(DINING_TABLES_TABLE)?;
        let mut tables = Vec::new();
        for result in t.iter()? {
            let (_key, value) = result?;
            let table: DiningTable = serde_json::from_slice(value.value())?;
            if table.branch_id == branch_id {
                tables.push(table);
            }
        }
        tables.sort_by_key(|t| t.table_number);
        Ok(tables)
    }

    // ========== Orders ==========

    /// Store an order, keeping the open-order indices in sync.
    ///
    /// Reads the previous version inside the same transaction and removes
    /// stale index entries first, so table reassignment (transfer) and
    /// closing both leave the indices exact.
    pub fn put_order(&self, txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        let prev = self.get_order_txn(txn, &order.id)?;

        {
            let mut open = txn.open_table(OPEN_ORDERS_TABLE)?;
            let mut active = txn.open_table(ACTIVE_ORDERS_TABLE)?;

            if let Some(prev) = &prev {
                if let Some(prev_table) = &prev.table_id {
                    open.remove((prev_table.as_str(), prev.id.as_str()))?;
                }
                active.remove(prev.id.as_str())?;
            }

            if order.closing_time.is_none() {
                active.insert(order.id.as_str(), ())?;
                if let Some(table_id) = &order.table_id {
                    open.insert((table_id.as_str(), order.id.as_str()), ())?;
                }
            }
        }

        let mut t = txn.open_table(ORDERS_TABLE)?;
        let value = serde_json::to_vec(order)?;
        t.insert(order.id.as_str(), value.as_slice())?;
        Ok(())
    }

    pub fn get_order_txn(&self, txn: &WriteTransaction, id: &str) -> StorageResult<Option<Order>> {
        let t = txn.open_table(ORDERS_TABLE)?;
        match t.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_order(&self, id: &str) -> StorageResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(ORDERS_TABLE)?;
        match t.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Live orders bound to a table (within transaction) - the idle guard
    pub fn live_orders_for_table_txn(
        &self,
        txn: &WriteTransaction,
        table_id: &str,
    ) -> StorageResult<Vec<Order>> {
        let open = txn.open_table(OPEN_ORDERS_TABLE)?;
        let orders_table = txn.open_table(ORDERS_TABLE)?;

        let mut orders = Vec::new();
        for result in open.range((table_id, "")..=(table_id, MAX_KEY))? {
            let (key, _value) = result?;
            let (_table_id, order_id) = key.value();
            let order: Order = match orders_table.get(order_id)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(StorageError::MissingRow(format!("order {}", order_id))),
            };
            if order.is_live() {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    pub fn live_orders_for_table(&self, table_id: &str) -> StorageResult<Vec<Order>> {
        let read_txn = self.db.begin_read()?;
        let open = read_txn.open_table(OPEN_ORDERS_TABLE)?;
        let orders_table = read_txn.open_table(ORDERS_TABLE)?;

        let mut orders = Vec::new();
        for result in open.range((table_id, "")..=(table_id, MAX_KEY))? {
            let (key, _value) = result?;
            let (_table_id, order_id) = key.value();
            let order: Order = match orders_table.get(order_id)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(StorageError::MissingRow(format!("order {}", order_id))),
            };
            if order.is_live() {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    /// Live orders across a branch
    pub fn live_orders_for_branch(&self, branch_id: &str) -> StorageResult<Vec<Order>> {
        let read_txn = self.db.begin_read()?;
        let active = read_txn.open_table(ACTIVE_ORDERS_TABLE)?;
        let orders_table = read_txn.open_table(ORDERS_TABLE)?;

        let mut orders = Vec::new();
        for result in active.iter()? {
            let (key, _value) = result?;
            let order: Order = match orders_table.get(key.value())? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(StorageError::MissingRow(format!("order {}", key.value()))),
            };
            if order.branch_id == branch_id && order.is_live() {
                orders.push(order);
            }
        }
        orders.sort_by_key(|o| o.opened_at);
        Ok(orders)
    }

    /// Whether any order - open or closed - ever referenced this table.
    /// Full scan; only used by the hard-delete path.
    pub fn table_has_order_history_txn(
        &self,
        txn: &WriteTransaction,
        table_id: &str,
    ) -> StorageResult<bool> {
        let t = txn.open_table(ORDERS_TABLE)?;
        for result in t.iter()? {
            let (_key, value) = result?;
            let order: Order = serde_json::from_slice(value.value())?;
            if order.table_id.as_deref() == Some(table_id) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ========== Stocks ==========

    pub fn put_stock(&self, txn: &WriteTransaction, stock: &Stock) -> StorageResult<()> {
        {
            let mut index = txn.open_table(STOCK_BY_PRODUCT_TABLE)?;
            index.insert(
                (stock.branch_id.as_str(), stock.product_id.as_str()),
                stock.id.as_str(),
            )?;
        }
        let mut t = txn.open_table(STOCKS_TABLE)?;
        let value = serde_json::to_vec(stock)?;
        t.insert(stock.id.as_str(), value.as_slice())?;
        Ok(())
    }

    pub fn get_stock_txn(&self, txn: &WriteTransaction, id: &str) -> StorageResult<Option<Stock>> {
        let t = txn.open_table(STOCKS_TABLE)?;
        match t.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_stock(&self, id: &str) -> StorageResult<Option<Stock>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(STOCKS_TABLE)?;
        match t.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Resolve the stock record for a (branch, product) pair (within txn)
    pub fn stock_id_for_product_txn(
        &self,
        txn: &WriteTransaction,
        branch_id: &str,
        product_id: &str,
    ) -> StorageResult<Option<String>> {
        let index = txn.open_table(STOCK_BY_PRODUCT_TABLE)?;
        Ok(index
            .get((branch_id, product_id))?
            .map(|guard| guard.value().to_string()))
    }

    pub fn stock_for_product(
        &self,
        branch_id: &str,
        product_id: &str,
    ) -> StorageResult<Option<Stock>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(STOCK_BY_PRODUCT_TABLE)?;
        let Some(stock_id) = index
            .get((branch_id, product_id))?
            .map(|guard| guard.value().to_string())
        else {
            return Ok(None);
        };
        let t = read_txn.open_table(STOCKS_TABLE)?;
        match t.get(stock_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Err(StorageError::MissingRow(format!("stock {}", stock_id))),
        }
    }

    pub fn stocks_for_branch(&self, branch_id: &str) -> StorageResult<Vec<Stock>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(STOCKS_TABLE)?;
        let mut stocks = Vec::new();
        for result in t.iter()? {
            let (_key, value) = result?;
            let stock: Stock = serde_json::from_slice(value.value())?;
            if stock.branch_id == branch_id {
                stocks.push(stock);
            }
        }
        Ok(stocks)
    }

    // ========== Stock Ledger ==========

    /// Append one ledger entry. The entry is immutable from here on -
    /// there is deliberately no update or remove counterpart.
    pub fn append_movement(
        &self,
        txn: &WriteTransaction,
        movement: &StockMovement,
    ) -> StorageResult<()> {
        {
            let mut history = txn.open_table(STOCK_HISTORY_TABLE)?;
            let value = serde_json::to_vec(movement)?;
            history.insert((movement.stock_id.as_str(), movement.seq), value.as_slice())?;
        }
        if let Some(order_id) = &movement.order_id {
            let mut by_order = txn.open_table(ORDER_MOVEMENTS_TABLE)?;
            by_order.insert((order_id.as_str(), movement.seq), movement.stock_id.as_str())?;
        }
        Ok(())
    }

    /// Full ledger for one stock record, in sequence order
    pub fn history_for_stock(&self, stock_id: &str) -> StorageResult<Vec<StockMovement>> {
        let read_txn = self.db.begin_read()?;
        let history = read_txn.open_table(STOCK_HISTORY_TABLE)?;

        let mut movements = Vec::new();
        for result in history.range((stock_id, 0u64)..=(stock_id, u64::MAX))? {
            let (_key, value) = result?;
            movements.push(serde_json::from_slice(value.value())?);
        }
        Ok(movements)
    }

    /// Signed sum of all ledger deltas for one stock record.
    ///
    /// By construction this equals `Stock.quantity`; exposed so the
    /// invariant can be checked from outside.
    pub fn ledger_sum(&self, stock_id: &str) -> StorageResult<i64> {
        Ok(self
            .history_for_stock(stock_id)?
            .iter()
            .map(|m| m.delta)
            .sum())
    }

    /// Net debited quantity per stock for one order (within transaction).
    ///
    /// Positive value = more OUT than IN has been written for that stock
    /// under this order; this is exactly what a cancellation credits back.
    pub fn net_debited_for_order_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<HashMap<String, i64>> {
        let by_order = txn.open_table(ORDER_MOVEMENTS_TABLE)?;
        let history = txn.open_table(STOCK_HISTORY_TABLE)?;

        let mut net: HashMap<String, i64> = HashMap::new();
        for result in by_order.range((order_id, 0u64)..=(order_id, u64::MAX))? {
            let (key, value) = result?;
            let (_order_id, seq) = key.value();
            let stock_id = value.value().to_string();
            let movement: StockMovement = match history.get((stock_id.as_str(), seq))? {
                Some(v) => serde_json::from_slice(v.value())?,
                None => {
                    return Err(StorageError::MissingRow(format!(
                        "movement ({}, {})",
                        stock_id, seq
                    )));
                }
            };
            *net.entry(stock_id).or_insert(0) -= movement.delta;
        }
        net.retain(|_, v| *v != 0);
        Ok(net)
    }

    // ========== Products ==========

    pub fn put_product(&self, txn: &WriteTransaction, product: &Product) -> StorageResult<()> {
        let mut t = txn.open_table(PRODUCTS_TABLE)?;
        let value = serde_json::to_vec(product)?;
        t.insert(product.id.as_str(), value.as_slice())?;
        Ok(())
    }

    pub fn get_product_txn(
        &self,
        txn: &WriteTransaction,
        id: &str,
    ) -> StorageResult<Option<Product>> {
        let t = txn.open_table(PRODUCTS_TABLE)?;
        match t.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_product(&self, id: &str) -> StorageResult<Option<Product>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(PRODUCTS_TABLE)?;
        match t.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{OrderSource, OrderStatus, StockMovementType};
    use shared::util::{new_id, now_millis};

    fn make_order(table_id: Option<&str>) -> Order {
        Order {
            id: new_id(),
            branch_id: "branch-1".into(),
            restaurant_id: "rest-1".into(),
            table_id: table_id.map(String::from),
            customer_id: None,
            status: OrderStatus::Pending,
            source: OrderSource::DineIn,
            items: vec![],
            total: 0.0,
            discount: 0.0,
            stock_debited: false,
            ordered_at: now_millis(),
            opened_at: now_millis(),
            closing_time: None,
            preparation_started_at: None,
            ready_at: None,
        }
    }

    #[test]
    fn test_open_order_index_tracks_table_binding() {
        let storage = EngineStorage::open_in_memory().unwrap();

        let mut order = make_order(Some("table-1"));
        let txn = storage.begin_write().unwrap();
        storage.put_order(&txn, &order).unwrap();
        txn.commit().unwrap();

        assert_eq!(storage.live_orders_for_table("table-1").unwrap().len(), 1);

        // Reassign to another table - the old index entry must go away
        order.table_id = Some("table-2".into());
        let txn = storage.begin_write().unwrap();
        storage.put_order(&txn, &order).unwrap();
        txn.commit().unwrap();

        assert!(storage.live_orders_for_table("table-1").unwrap().is_empty());
        assert_eq!(storage.live_orders_for_table("table-2").unwrap().len(), 1);
    }

    #[test]
    fn test_closed_order_leaves_indices() {
        let storage = EngineStorage::open_in_memory().unwrap();

        let mut order = make_order(Some("table-1"));
        let txn = storage.begin_write().unwrap();
        storage.put_order(&txn, &order).unwrap();
        txn.commit().unwrap();

        order.status = OrderStatus::Cancelled;
        order.closing_time = Some(now_millis());
        let txn = storage.begin_write().unwrap();
        storage.put_order(&txn, &order).unwrap();
        txn.commit().unwrap();

        assert!(storage.live_orders_for_table("table-1").unwrap().is_empty());
        assert!(storage.live_orders_for_branch("branch-1").unwrap().is_empty());
        // the row itself survives
        assert!(storage.get_order(&order.id).unwrap().is_some());
    }

    #[test]
    fn test_on_disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.redb");

        {
            let storage = EngineStorage::open(&path).unwrap();
            let order = make_order(Some("table-1"));
            let txn = storage.begin_write().unwrap();
            storage.put_order(&txn, &order).unwrap();
            txn.commit().unwrap();
        }

        let reopened = EngineStorage::open(&path).unwrap();
        assert_eq!(reopened.live_orders_for_table("table-1").unwrap().len(), 1);
    }

    #[test]
    fn test_ledger_sequence_is_monotonic() {
        let storage = EngineStorage::open_in_memory().unwrap();
        let txn = storage.begin_write().unwrap();
        let a = storage.next_ledger_seq(&txn).unwrap();
        let b = storage.next_ledger_seq(&txn).unwrap();
        txn.commit().unwrap();
        assert!(b > a);
        assert_eq!(storage.current_ledger_seq().unwrap(), b);
    }

    #[test]
    fn test_net_debited_tracks_order_linked_entries_only() {
        let storage = EngineStorage::open_in_memory().unwrap();
        let txn = storage.begin_write().unwrap();

        let seq1 = storage.next_ledger_seq(&txn).unwrap();
        storage
            .append_movement(
                &txn,
                &StockMovement {
                    seq: seq1,
                    stock_id: "stock-1".into(),
                    movement_type: StockMovementType::Out,
                    delta: -3,
                    quantity_after: 7,
                    order_id: Some("order-1".into()),
                    reason: "order completed".into(),
                    created_at: now_millis(),
                },
            )
            .unwrap();

        // unlinked entry must not count
        let seq2 = storage.next_ledger_seq(&txn).unwrap();
        storage
            .append_movement(
                &txn,
                &StockMovement {
                    seq: seq2,
                    stock_id: "stock-1".into(),
                    movement_type: StockMovementType::Out,
                    delta: -2,
                    quantity_after: 5,
                    order_id: None,
                    reason: "waste".into(),
                    created_at: now_millis(),
                },
            )
            .unwrap();

        let net = storage.net_debited_for_order_txn(&txn, "order-1").unwrap();
        assert_eq!(net.get("stock-1"), Some(&3));
        txn.commit().unwrap();

        assert_eq!(storage.ledger_sum("stock-1").unwrap(), -5);
        assert_eq!(storage.history_for_stock("stock-1").unwrap().len(), 2);
    }
}
