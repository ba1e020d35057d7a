//! Order engine - 订单引擎
//!
//! Owns the order lifecycle state machine and line item mutation. Stock
//! side effects ride inside the order's own transaction: an order is
//! never COMPLETED while its stock debit silently failed, and a debit
//! never lands without the order settling into COMPLETED.
//!
//! # Stock reconciliation
//!
//! - Entering COMPLETED debits one OUT per stockable non-void item.
//! - Entering CANCELLED credits back the order's *net debited* quantity
//!   per stock, read from the ledger entries linked to the order. A
//!   never-debited order therefore cancels without touching stock, and a
//!   debited one is credited back exactly.
//! - Voiding an item runs the same reversal path for just that line.

pub mod money;

use crate::broadcast::{EventPublisher, publish_all};
use crate::error::{EngineError, EngineResult};
use crate::stock::apply_delta_txn;
use crate::storage::EngineStorage;
use redb::WriteTransaction;
use shared::event::{BranchEvent, EventPayload};
use shared::models::{
    Order, OrderCreate, OrderItem, OrderStatus, Product, StockMovementType, TableStatus,
};
use shared::util::{new_id, now_millis};
use std::sync::Arc;

/// Order engine
#[derive(Clone)]
pub struct OrderEngine {
    storage: EngineStorage,
    publisher: Arc<dyn EventPublisher>,
}

impl OrderEngine {
    pub fn new(storage: EngineStorage, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { storage, publisher }
    }

    /// Upsert a catalog product (the price source for order snapshots)
    pub fn upsert_product(&self, product: Product) -> EngineResult<Product> {
        money::validate_price(product.price)?;
        let txn = self.storage.begin_write()?;
        self.storage.put_product(&txn, &product)?;
        txn.commit().map_err(crate::storage::StorageError::from)?;
        Ok(product)
    }

    /// Create an order, snapshotting current unit prices.
    ///
    /// When bound to a table, the table moves to OCCUPIED in the same
    /// transaction - order creation and a concurrent idle request can
    /// never both commit.
    pub fn create_order(&self, data: OrderCreate) -> EngineResult<Order> {
        if data.items.is_empty() {
            return Err(EngineError::Validation(
                "order must contain at least one item".into(),
            ));
        }
        let discount = data.discount.unwrap_or(0.0);
        money::validate_discount(discount)?;

        let txn = self.storage.begin_write()?;
        let mut events = Vec::new();

        // Snapshot prices now; later catalog edits must not touch this order
        let mut items = Vec::with_capacity(data.items.len());
        for input in &data.items {
            money::validate_item_input(input)?;
            let product = self
                .storage
                .get_product_txn(&txn, &input.product_id)?
                .ok_or_else(|| EngineError::ProductNotFound(input.product_id.clone()))?;
            if !product.is_active {
                return Err(EngineError::Validation(format!(
                    "Product {} is not active",
                    product.id
                )));
            }
            if product.branch_id != data.branch_id {
                return Err(EngineError::Validation(format!(
                    "Product {} does not belong to branch {}",
                    product.id, data.branch_id
                )));
            }
            items.push(OrderItem {
                item_id: new_id(),
                product_id: product.id,
                name: product.name,
                quantity: input.quantity,
                unit_price: product.price,
                is_stockable: product.is_stockable,
                is_void: false,
                void_reason: None,
                status: None,
                note: input.note.clone(),
            });
        }

        let now = now_millis();
        let order = Order {
            id: new_id(),
            branch_id: data.branch_id.clone(),
            restaurant_id: data.restaurant_id,
            table_id: data.table_id.clone(),
            customer_id: data.customer_id,
            status: OrderStatus::Pending,
            source: data.source,
            total: money::order_total(&items, discount),
            discount,
            items,
            stock_debited: false,
            ordered_at: now,
            opened_at: now,
            closing_time: None,
            preparation_started_at: None,
            ready_at: None,
        };

        // Same-transaction table occupation
        if let Some(table_id) = &data.table_id {
            let mut table = self
                .storage
                .get_table_txn(&txn, table_id)?
                .ok_or_else(|| EngineError::TableNotFound(table_id.clone()))?;
            if table.branch_id != data.branch_id {
                return Err(EngineError::TableValidation(format!(
                    "Table {} does not belong to branch {}",
                    table_id, data.branch_id
                )));
            }
            if !table.is_active {
                return Err(EngineError::TableValidation(format!(
                    "Table {} is not active",
                    table_id
                )));
            }
            if table.status != TableStatus::Occupied {
                table.status = TableStatus::Occupied;
                table.updated_at = now;
                self.storage.put_table(&txn, &table)?;
                events.push(BranchEvent::new(
                    table.branch_id.clone(),
                    EventPayload::TableStatusChanged {
                        table_id: table.id.clone(),
                        status: table.status,
                        branch_id: table.branch_id.clone(),
                    },
                ));
            }
        }

        self.storage.put_order(&txn, &order)?;
        events.push(BranchEvent::new(
            order.branch_id.clone(),
            EventPayload::OrderCreated {
                order_id: order.id.clone(),
                status: order.status,
                items: order.items.clone(),
            },
        ));

        txn.commit().map_err(crate::storage::StorageError::from)?;
        publish_all(self.publisher.as_ref(), events);

        tracing::info!(
            order_id = %order.id,
            branch_id = %order.branch_id,
            table_id = ?order.table_id,
            total = order.total,
            "Order created"
        );
        Ok(order)
    }

    /// Drive the order status machine.
    ///
    /// Rejects any edge not in the transition table. Stock debits
    /// (COMPLETED) and credits (CANCELLED) run inside the same
    /// transaction as the status write.
    pub fn transition(&self, order_id: &str, new_status: OrderStatus) -> EngineResult<Order> {
        let txn = self.storage.begin_write()?;
        let mut events = Vec::new();

        let mut order = self
            .storage
            .get_order_txn(&txn, order_id)?
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;

        if !order.status.can_transition_to(new_status) {
            return Err(EngineError::InvalidOrderStatusTransition {
                from: order.status,
                to: new_status,
            });
        }

        let now = now_millis();
        match new_status {
            OrderStatus::Preparing => {
                if order.preparation_started_at.is_none() {
                    order.preparation_started_at = Some(now);
                }
            }
            OrderStatus::Ready => {
                if order.ready_at.is_none() {
                    order.ready_at = Some(now);
                }
            }
            OrderStatus::Completed => {
                order.closing_time = Some(now);
                if !order.stock_debited {
                    self.debit_stock_for_order(&txn, &order, &mut events)?;
                    order.stock_debited = true;
                }
            }
            OrderStatus::Cancelled => {
                order.closing_time = Some(now);
                self.credit_stock_for_order(&txn, &order, &mut events)?;
            }
            _ => {}
        }

        order.status = new_status;
        self.storage.put_order(&txn, &order)?;
        events.push(BranchEvent::new(
            order.branch_id.clone(),
            EventPayload::OrderUpdated {
                order_id: order.id.clone(),
                status: order.status,
                items: order.items.clone(),
            },
        ));

        txn.commit().map_err(crate::storage::StorageError::from)?;
        publish_all(self.publisher.as_ref(), events);

        tracing::info!(order_id = %order.id, status = %order.status, "Order transitioned");
        Ok(order)
    }

    /// Void one line item.
    ///
    /// A void is a stock-affecting event: it reverses the line's net
    /// debited quantity through the ledger (never by editing history) and
    /// recomputes the total.
    pub fn void_item(&self, order_id: &str, item_id: &str, reason: &str) -> EngineResult<Order> {
        let txn = self.storage.begin_write()?;
        let mut events = Vec::new();

        let mut order = self
            .storage
            .get_order_txn(&txn, order_id)?
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;

        if order.status.is_terminal() {
            return Err(EngineError::Validation(format!(
                "Cannot void an item on a closed order ({})",
                order.status
            )));
        }

        let item_index = order
            .items
            .iter()
            .position(|i| i.item_id == item_id)
            .ok_or_else(|| EngineError::ItemNotFound(item_id.to_string()))?;
        if order.items[item_index].is_void {
            return Err(EngineError::Validation(format!(
                "Item {} is already void",
                item_id
            )));
        }

        order.items[item_index].is_void = true;
        order.items[item_index].void_reason = Some(reason.to_string());

        // Reverse this line's share of any order-linked debit
        let item = order.items[item_index].clone();
        if item.is_stockable
            && let Some(stock_id) =
                self.storage
                    .stock_id_for_product_txn(&txn, &order.branch_id, &item.product_id)?
        {
            let net = self.storage.net_debited_for_order_txn(&txn, &order.id)?;
            let debited = net.get(&stock_id).copied().unwrap_or(0);
            let credit = debited.min(item.quantity as i64);
            if credit > 0 {
                apply_delta_txn(
                    &self.storage,
                    &txn,
                    &stock_id,
                    credit,
                    StockMovementType::In,
                    "item voided",
                    Some(&order.id),
                    &mut events,
                )?;
            }
        }

        order.total = money::order_total(&order.items, order.discount);
        self.storage.put_order(&txn, &order)?;
        events.push(BranchEvent::new(
            order.branch_id.clone(),
            EventPayload::OrderUpdated {
                order_id: order.id.clone(),
                status: order.status,
                items: order.items.clone(),
            },
        ));

        txn.commit().map_err(crate::storage::StorageError::from)?;
        publish_all(self.publisher.as_ref(), events);

        tracing::info!(order_id = %order.id, item_id, reason, "Order item voided");
        Ok(order)
    }

    // ========== Stock reconciliation ==========

    /// One OUT per stockable non-void item, linked to the order
    fn debit_stock_for_order(
        &self,
        txn: &WriteTransaction,
        order: &Order,
        events: &mut Vec<BranchEvent>,
    ) -> EngineResult<()> {
        for item in order.items.iter().filter(|i| i.is_stockable && !i.is_void) {
            let stock_id = self
                .storage
                .stock_id_for_product_txn(txn, &order.branch_id, &item.product_id)?
                .ok_or_else(|| {
                    EngineError::StockNotFound(format!(
                        "{}/{}",
                        order.branch_id, item.product_id
                    ))
                })?;
            apply_delta_txn(
                &self.storage,
                txn,
                &stock_id,
                -(item.quantity as i64),
                StockMovementType::Out,
                "order completed",
                Some(&order.id),
                events,
            )?;
        }
        Ok(())
    }

    /// Inverse IN deltas for whatever the ledger says this order debited
    fn credit_stock_for_order(
        &self,
        txn: &WriteTransaction,
        order: &Order,
        events: &mut Vec<BranchEvent>,
    ) -> EngineResult<()> {
        let net = self.storage.net_debited_for_order_txn(txn, &order.id)?;
        // 排序保证重放顺序稳定
        let mut entries: Vec<(String, i64)> = net.into_iter().collect();
        entries.sort();
        for (stock_id, debited) in entries {
            if debited > 0 {
                apply_delta_txn(
                    &self.storage,
                    txn,
                    &stock_id,
                    debited,
                    StockMovementType::In,
                    "order cancelled",
                    Some(&order.id),
                    events,
                )?;
            }
        }
        Ok(())
    }

    // ========== Queries ==========

    pub fn get_order(&self, order_id: &str) -> EngineResult<Order> {
        self.storage
            .get_order(order_id)?
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))
    }

    pub fn live_orders_for_table(&self, table_id: &str) -> EngineResult<Vec<Order>> {
        Ok(self.storage.live_orders_for_table(table_id)?)
    }

    pub fn live_orders_for_branch(&self, branch_id: &str) -> EngineResult<Vec<Order>> {
        Ok(self.storage.live_orders_for_branch(branch_id)?)
    }
}
