//! Table engine - 桌台引擎
//!
//! Owns the table occupancy state machine and the multi-table operations
//! (merge, transfer). The declarative edges live on `TableStatus`; the
//! operational guard - no transition to IDLE while live orders exist - is
//! re-evaluated inside the write transaction that flips the status, so a
//! concurrent order creation and an idle request can never both commit.

use crate::broadcast::{EventPublisher, publish_all};
use crate::error::{EngineError, EngineResult};
use crate::storage::EngineStorage;
use redb::WriteTransaction;
use shared::event::{BranchEvent, EventPayload};
use shared::models::{DiningTable, DiningTableCreate, DiningTableUpdate, TableStatus};
use shared::util::{new_id, now_millis};
use std::collections::HashSet;
use std::sync::Arc;

const DEFAULT_CAPACITY: i32 = 4;

/// Table engine
#[derive(Clone)]
pub struct TableEngine {
    storage: EngineStorage,
    publisher: Arc<dyn EventPublisher>,
}

impl TableEngine {
    pub fn new(storage: EngineStorage, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { storage, publisher }
    }

    /// Create a dining table; table numbers are unique within a branch
    pub fn create_table(&self, data: DiningTableCreate) -> EngineResult<DiningTable> {
        let capacity = data.capacity.unwrap_or(DEFAULT_CAPACITY);
        if capacity <= 0 {
            return Err(EngineError::TableValidation(
                "capacity must be positive".into(),
            ));
        }

        let txn = self.storage.begin_write()?;

        let duplicate = self
            .storage
            .tables_for_branch_txn(&txn, &data.branch_id)?
            .into_iter()
            .any(|t| t.table_number == data.table_number);
        if duplicate {
            return Err(EngineError::TableValidation(format!(
                "Table number {} already exists in branch {}",
                data.table_number, data.branch_id
            )));
        }

        let now = now_millis();
        let table = DiningTable {
            id: new_id(),
            branch_id: data.branch_id,
            table_number: data.table_number,
            capacity,
            location: data.location,
            status: TableStatus::Idle,
            is_active: true,
            notes: data.notes,
            position: data.position,
            created_at: now,
            updated_at: now,
        };
        self.storage.put_table(&txn, &table)?;
        txn.commit().map_err(crate::storage::StorageError::from)?;

        tracing::info!(table_id = %table.id, branch_id = %table.branch_id, table_number = table.table_number, "Dining table created");
        Ok(table)
    }

    /// Update capacity, location, notes or layout position
    pub fn update_table(&self, table_id: &str, data: DiningTableUpdate) -> EngineResult<DiningTable> {
        if let Some(capacity) = data.capacity
            && capacity <= 0
        {
            return Err(EngineError::TableValidation(
                "capacity must be positive".into(),
            ));
        }

        let txn = self.storage.begin_write()?;
        let mut table = self.load_table(&txn, table_id)?;

        if let Some(capacity) = data.capacity {
            table.capacity = capacity;
        }
        if let Some(location) = data.location {
            table.location = Some(location);
        }
        if let Some(notes) = data.notes {
            table.notes = Some(notes);
        }
        if let Some(position) = data.position {
            table.position = Some(position);
        }
        table.updated_at = now_millis();

        self.storage.put_table(&txn, &table)?;
        txn.commit().map_err(crate::storage::StorageError::from)?;
        Ok(table)
    }

    /// Drive the occupancy state machine.
    ///
    /// The IDLE target re-queries the table's live orders inside this
    /// transaction and rejects if any exist - this is the system's central
    /// race guard, not a convenience check.
    pub fn update_status(&self, table_id: &str, new_status: TableStatus) -> EngineResult<DiningTable> {
        let txn = self.storage.begin_write()?;
        let mut table = self.load_table(&txn, table_id)?;

        if !table.is_active {
            return Err(EngineError::TableOperation(format!(
                "Table {} is not active",
                table_id
            )));
        }
        if !table.status.can_transition_to(new_status) {
            return Err(EngineError::TableOperation(format!(
                "Invalid table status transition: {} -> {}",
                table.status, new_status
            )));
        }

        if new_status == TableStatus::Idle {
            let live = self.storage.live_orders_for_table_txn(&txn, table_id)?;
            if !live.is_empty() {
                return Err(EngineError::TableOperation(format!(
                    "Table {} has {} live orders",
                    table_id,
                    live.len()
                )));
            }
        }

        table.status = new_status;
        table.updated_at = now_millis();
        self.storage.put_table(&txn, &table)?;
        txn.commit().map_err(crate::storage::StorageError::from)?;

        publish_all(
            self.publisher.as_ref(),
            vec![status_event(&table)],
        );
        tracing::info!(table_id = %table.id, status = %table.status, "Table status changed");
        Ok(table)
    }

    /// Soft-deactivate a table. Guarded by the live-order check.
    pub fn deactivate_table(&self, table_id: &str) -> EngineResult<DiningTable> {
        let txn = self.storage.begin_write()?;
        let mut table = self.load_table(&txn, table_id)?;

        let live = self.storage.live_orders_for_table_txn(&txn, table_id)?;
        if !live.is_empty() {
            return Err(EngineError::TableOperation(format!(
                "Table {} has {} live orders",
                table_id,
                live.len()
            )));
        }

        table.is_active = false;
        table.updated_at = now_millis();
        self.storage.put_table(&txn, &table)?;
        txn.commit().map_err(crate::storage::StorageError::from)?;

        tracing::info!(table_id = %table.id, "Dining table deactivated");
        Ok(table)
    }

    /// Hard delete. Only permitted for tables that never carried an order;
    /// anything with history is deactivated instead.
    pub fn delete_table(&self, table_id: &str) -> EngineResult<()> {
        let txn = self.storage.begin_write()?;
        let _ = self.load_table(&txn, table_id)?;

        if self.storage.table_has_order_history_txn(&txn, table_id)? {
            return Err(EngineError::TableOperation(format!(
                "Table {} has order history and can only be deactivated",
                table_id
            )));
        }

        self.storage.remove_table(&txn, table_id)?;
        txn.commit().map_err(crate::storage::StorageError::from)?;

        tracing::info!(table_id, "Dining table deleted");
        Ok(())
    }

    /// Merge idle tables into a main table.
    ///
    /// All tables must share a branch, be IDLE, active, and carry zero
    /// live orders. On success the merged tables are deactivated and the
    /// main table's capacity grows by the sum of theirs. Any validation
    /// failure aborts the whole operation - no partial merge.
    pub fn merge(&self, main_table_id: &str, ids_to_merge: &[String]) -> EngineResult<DiningTable> {
        if ids_to_merge.is_empty() {
            return Err(EngineError::TableValidation(
                "no tables selected for merge".into(),
            ));
        }
        let unique: HashSet<&String> = ids_to_merge.iter().collect();
        if unique.len() != ids_to_merge.len() {
            return Err(EngineError::TableValidation(
                "duplicate table in merge selection".into(),
            ));
        }
        if ids_to_merge.iter().any(|id| id == main_table_id) {
            return Err(EngineError::TableValidation(
                "main table cannot be merged into itself".into(),
            ));
        }

        let txn = self.storage.begin_write()?;
        let mut main = self.load_table(&txn, main_table_id)?;
        self.require_idle_and_unoccupied(&txn, &main)?;

        let mut merged = Vec::with_capacity(ids_to_merge.len());
        for id in ids_to_merge {
            let table = self.load_table(&txn, id)?;
            if table.branch_id != main.branch_id {
                return Err(EngineError::TableValidation(format!(
                    "Table {} belongs to a different branch",
                    id
                )));
            }
            self.require_idle_and_unoccupied(&txn, &table)?;
            merged.push(table);
        }

        let now = now_millis();
        for table in &mut merged {
            main.capacity += table.capacity;
            table.is_active = false;
            table.updated_at = now;
            self.storage.put_table(&txn, table)?;
        }
        main.updated_at = now;
        self.storage.put_table(&txn, &main)?;
        txn.commit().map_err(crate::storage::StorageError::from)?;

        let mut events: Vec<BranchEvent> = merged.iter().map(status_event).collect();
        events.push(status_event(&main));
        publish_all(self.publisher.as_ref(), events);

        tracing::info!(
            main_table_id = %main.id,
            merged = merged.len(),
            capacity = main.capacity,
            "Tables merged"
        );
        Ok(main)
    }

    /// Move every live order from one table to another.
    ///
    /// The destination must be IDLE with zero live orders - both facts are
    /// re-validated here, inside the transaction that commits the move, so
    /// a destination that became busy since the caller looked fails closed
    /// instead of being silently overwritten.
    pub fn transfer(&self, from_table_id: &str, to_table_id: &str) -> EngineResult<DiningTable> {
        if from_table_id == to_table_id {
            return Err(EngineError::TableValidation(
                "cannot transfer a table onto itself".into(),
            ));
        }

        let txn = self.storage.begin_write()?;
        let mut from = self.load_table(&txn, from_table_id)?;
        let mut to = self.load_table(&txn, to_table_id)?;

        if from.branch_id != to.branch_id {
            return Err(EngineError::TableValidation(
                "tables belong to different branches".into(),
            ));
        }
        if !to.is_active {
            return Err(EngineError::TableOperation(format!(
                "Destination table {} is not active",
                to_table_id
            )));
        }
        if to.status != TableStatus::Idle {
            return Err(EngineError::TableOperation(format!(
                "Destination table {} is {}",
                to_table_id, to.status
            )));
        }
        let destination_live = self.storage.live_orders_for_table_txn(&txn, to_table_id)?;
        if !destination_live.is_empty() {
            return Err(EngineError::TableOperation(format!(
                "Destination table {} has {} live orders",
                to_table_id,
                destination_live.len()
            )));
        }

        let mut moving = self.storage.live_orders_for_table_txn(&txn, from_table_id)?;
        if moving.is_empty() {
            return Err(EngineError::TableOperation(format!(
                "Table {} has no live orders to transfer",
                from_table_id
            )));
        }

        let now = now_millis();
        let mut events = Vec::new();
        for order in &mut moving {
            order.table_id = Some(to.id.clone());
            self.storage.put_order(&txn, order)?;
            events.push(BranchEvent::new(
                order.branch_id.clone(),
                EventPayload::OrderUpdated {
                    order_id: order.id.clone(),
                    status: order.status,
                    items: order.items.clone(),
                },
            ));
        }

        from.status = TableStatus::Idle;
        from.updated_at = now;
        to.status = TableStatus::Occupied;
        to.updated_at = now;
        self.storage.put_table(&txn, &from)?;
        self.storage.put_table(&txn, &to)?;
        txn.commit().map_err(crate::storage::StorageError::from)?;

        events.push(status_event(&from));
        events.push(status_event(&to));
        publish_all(self.publisher.as_ref(), events);

        tracing::info!(
            from_table_id = %from.id,
            to_table_id = %to.id,
            orders = moving.len(),
            "Table transferred"
        );
        Ok(to)
    }

    // ========== Queries ==========

    pub fn get_table(&self, table_id: &str) -> EngineResult<DiningTable> {
        self.storage
            .get_table(table_id)?
            .ok_or_else(|| EngineError::TableNotFound(table_id.to_string()))
    }

    pub fn tables_for_branch(&self, branch_id: &str) -> EngineResult<Vec<DiningTable>> {
        Ok(self.storage.tables_for_branch(branch_id)?)
    }

    // ========== Internal ==========

    fn load_table(&self, txn: &WriteTransaction, table_id: &str) -> EngineResult<DiningTable> {
        self.storage
            .get_table_txn(txn, table_id)?
            .ok_or_else(|| EngineError::TableNotFound(table_id.to_string()))
    }

    fn require_idle_and_unoccupied(
        &self,
        txn: &WriteTransaction,
        table: &DiningTable,
    ) -> EngineResult<()> {
        if !table.is_active {
            return Err(EngineError::TableValidation(format!(
                "Table {} is not active",
                table.id
            )));
        }
        if table.status != TableStatus::Idle {
            return Err(EngineError::TableOperation(format!(
                "Table {} is {}",
                table.id, table.status
            )));
        }
        let live = self.storage.live_orders_for_table_txn(txn, &table.id)?;
        if !live.is_empty() {
            return Err(EngineError::TableOperation(format!(
                "Table {} has {} live orders",
                table.id,
                live.len()
            )));
        }
        Ok(())
    }
}

fn status_event(table: &DiningTable) -> BranchEvent {
    BranchEvent::new(
        table.branch_id.clone(),
        EventPayload::TableStatusChanged {
            table_id: table.id.clone(),
            status: table.status,
            branch_id: table.branch_id.clone(),
        },
    )
}
