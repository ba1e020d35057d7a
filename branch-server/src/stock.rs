//! Stock engine - 库存引擎
//!
//! Owns the stock rows and the append-only movement ledger. Every
//! quantity change is written in the same transaction as exactly one
//! ledger entry, so `Stock.quantity` always equals the signed sum of its
//! history - the invariant holds by construction, not by reconciliation.
//!
//! The transaction-scoped core (`apply_delta_txn`) is shared with the
//! order engine, which debits and credits stock inside its own order
//! transactions.

use crate::broadcast::{EventPublisher, publish_all};
use crate::error::{EngineError, EngineResult};
use crate::storage::EngineStorage;
use redb::WriteTransaction;
use shared::event::{BranchEvent, EventPayload};
use shared::models::{CountedEntry, Stock, StockCreate, StockMovement, StockMovementType};
use shared::util::{new_id, now_millis};
use std::sync::Arc;

/// Stock engine
#[derive(Clone)]
pub struct StockEngine {
    storage: EngineStorage,
    publisher: Arc<dyn EventPublisher>,
}

/// Apply one signed delta to a stock row inside an existing transaction.
///
/// Rules:
/// - `delta` must be non-zero
/// - a delta that would drive the quantity negative fails with
///   `InsufficientStock` and writes nothing
/// - on success the stock row is updated and one ledger entry appended;
///   the matching `STOCK_UPDATED` (and possibly `STOCK_ALERT`) events are
///   pushed onto `events` for the caller to publish after commit
pub(crate) fn apply_delta_txn(
    storage: &EngineStorage,
    txn: &WriteTransaction,
    stock_id: &str,
    delta: i64,
    movement_type: StockMovementType,
    reason: &str,
    order_id: Option<&str>,
    events: &mut Vec<BranchEvent>,
) -> EngineResult<Stock> {
    if delta == 0 {
        return Err(EngineError::Validation("delta must be non-zero".into()));
    }

    let mut stock = storage
        .get_stock_txn(txn, stock_id)?
        .ok_or_else(|| EngineError::StockNotFound(stock_id.to_string()))?;

    let new_quantity = stock.quantity + delta;
    if new_quantity < 0 {
        return Err(EngineError::InsufficientStock {
            stock_id: stock_id.to_string(),
            available: stock.quantity,
            requested: -delta,
        });
    }

    let seq = storage.next_ledger_seq(txn)?;
    let movement = StockMovement {
        seq,
        stock_id: stock.id.clone(),
        movement_type,
        delta,
        quantity_after: new_quantity,
        order_id: order_id.map(String::from),
        reason: reason.to_string(),
        created_at: now_millis(),
    };
    storage.append_movement(txn, &movement)?;

    stock.quantity = new_quantity;
    stock.updated_at = movement.created_at;
    storage.put_stock(txn, &stock)?;

    events.push(BranchEvent::new(
        stock.branch_id.clone(),
        EventPayload::StockUpdated {
            stock_id: stock.id.clone(),
            product_id: stock.product_id.clone(),
            order_id: order_id.map(String::from),
            movement_type,
            quantity: new_quantity,
        },
    ));

    if new_quantity <= stock.low_stock_threshold {
        tracing::warn!(
            stock_id = %stock.id,
            product_id = %stock.product_id,
            quantity = new_quantity,
            threshold = stock.low_stock_threshold,
            "Stock at or below threshold"
        );
        events.push(BranchEvent::new(
            stock.branch_id.clone(),
            EventPayload::StockAlert {
                stock_id: stock.id.clone(),
                product_id: stock.product_id.clone(),
                current_quantity: new_quantity,
                threshold: stock.low_stock_threshold,
            },
        ));
    }

    Ok(stock)
}

impl StockEngine {
    pub fn new(storage: EngineStorage, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { storage, publisher }
    }

    /// Create a stock record for a (product, branch) pair.
    ///
    /// A non-zero initial quantity goes through the ledger as an IN entry,
    /// so the derivation invariant holds from the first row.
    pub fn create_stock(&self, data: StockCreate) -> EngineResult<Stock> {
        if data.initial_quantity < 0 {
            return Err(EngineError::Validation(
                "initial_quantity must not be negative".into(),
            ));
        }
        if data.low_stock_threshold < 0 {
            return Err(EngineError::Validation(
                "low_stock_threshold must not be negative".into(),
            ));
        }

        let txn = self.storage.begin_write()?;
        let mut events = Vec::new();

        if self
            .storage
            .stock_id_for_product_txn(&txn, &data.branch_id, &data.product_id)?
            .is_some()
        {
            return Err(EngineError::Validation(format!(
                "Stock for product {} already exists in branch {}",
                data.product_id, data.branch_id
            )));
        }

        let now = now_millis();
        let mut stock = Stock {
            id: new_id(),
            branch_id: data.branch_id,
            product_id: data.product_id,
            quantity: 0,
            low_stock_threshold: data.low_stock_threshold,
            ideal_level: data.ideal_level,
            expires_at: data.expires_at,
            created_at: now,
            updated_at: now,
        };
        self.storage.put_stock(&txn, &stock)?;

        if data.initial_quantity > 0 {
            let stock_id = stock.id.clone();
            stock = apply_delta_txn(
                &self.storage,
                &txn,
                &stock_id,
                data.initial_quantity,
                StockMovementType::In,
                "initial stock",
                None,
                &mut events,
            )?;
        }

        txn.commit().map_err(crate::storage::StorageError::from)?;
        publish_all(self.publisher.as_ref(), events);

        tracing::info!(stock_id = %stock.id, product_id = %stock.product_id, quantity = stock.quantity, "Stock record created");
        Ok(stock)
    }

    /// Apply a delta to one stock record.
    ///
    /// `quantity` is always positive; the sign comes from the movement
    /// type: IN and ADJUSTMENT add, OUT and TRANSFER subtract. An OUT that
    /// would go negative fails with `InsufficientStock` and nothing is
    /// written. Signed adjustments (shrinkage) enter through
    /// `reconcile_count`.
    pub fn apply_delta(
        &self,
        stock_id: &str,
        quantity: i64,
        movement_type: StockMovementType,
        reason: &str,
        order_id: Option<&str>,
    ) -> EngineResult<Stock> {
        if quantity <= 0 {
            return Err(EngineError::Validation(
                "quantity must be positive".into(),
            ));
        }
        let delta = match movement_type {
            StockMovementType::In | StockMovementType::Adjustment => quantity,
            StockMovementType::Out | StockMovementType::Transfer => -quantity,
        };

        let txn = self.storage.begin_write()?;
        let mut events = Vec::new();
        let stock = apply_delta_txn(
            &self.storage,
            &txn,
            stock_id,
            delta,
            movement_type,
            reason,
            order_id,
            &mut events,
        )?;
        txn.commit().map_err(crate::storage::StorageError::from)?;
        publish_all(self.publisher.as_ref(), events);

        tracing::debug!(
            stock_id = %stock.id,
            movement_type = %movement_type,
            delta,
            quantity = stock.quantity,
            "Stock delta applied"
        );
        Ok(stock)
    }

    /// Move quantity between two stock records (possibly across branches).
    ///
    /// Both legs run in one transaction: if either fails, nothing moves -
    /// there is no state where stock left the source but never arrived.
    pub fn transfer(
        &self,
        from_stock_id: &str,
        to_stock_id: &str,
        quantity: i64,
        reason: &str,
    ) -> EngineResult<(Stock, Stock)> {
        if quantity <= 0 {
            return Err(EngineError::Validation(
                "quantity must be positive".into(),
            ));
        }
        if from_stock_id == to_stock_id {
            return Err(EngineError::Validation(
                "cannot transfer a stock onto itself".into(),
            ));
        }

        let txn = self.storage.begin_write()?;
        let mut events = Vec::new();

        let from = apply_delta_txn(
            &self.storage,
            &txn,
            from_stock_id,
            -quantity,
            StockMovementType::Transfer,
            reason,
            None,
            &mut events,
        )?;
        let to = apply_delta_txn(
            &self.storage,
            &txn,
            to_stock_id,
            quantity,
            StockMovementType::Transfer,
            reason,
            None,
            &mut events,
        )?;

        // One branch-scoped transfer notification per side
        for stock in [&from, &to] {
            events.push(BranchEvent::new(
                stock.branch_id.clone(),
                EventPayload::StockTransfer {
                    movement_type: StockMovementType::Transfer,
                    stock_id: stock.id.clone(),
                    product_id: stock.product_id.clone(),
                    quantity,
                    from_branch_id: from.branch_id.clone(),
                    to_branch_id: to.branch_id.clone(),
                },
            ));
        }

        txn.commit().map_err(crate::storage::StorageError::from)?;
        publish_all(self.publisher.as_ref(), events);

        tracing::info!(
            from_stock_id = %from.id,
            to_stock_id = %to.id,
            quantity,
            "Stock transferred"
        );
        Ok((from, to))
    }

    /// Apply a physical count report as one batch.
    ///
    /// Per entry: `difference = counted − system`; zero differences are
    /// skipped, everything else becomes one ADJUSTMENT ledger entry and
    /// the quantity is set to the counted value. The whole batch commits
    /// or none of it does - a count report is only meaningful complete.
    pub fn reconcile_count(
        &self,
        branch_id: &str,
        entries: &[CountedEntry],
    ) -> EngineResult<Vec<Stock>> {
        let txn = self.storage.begin_write()?;
        let mut events = Vec::new();
        let mut updated = Vec::with_capacity(entries.len());

        for entry in entries {
            if entry.counted < 0 {
                return Err(EngineError::Validation(format!(
                    "counted quantity for stock {} must not be negative",
                    entry.stock_id
                )));
            }
            let stock = self
                .storage
                .get_stock_txn(&txn, &entry.stock_id)?
                .ok_or_else(|| EngineError::StockNotFound(entry.stock_id.clone()))?;
            if stock.branch_id != branch_id {
                return Err(EngineError::Validation(format!(
                    "stock {} does not belong to branch {}",
                    entry.stock_id, branch_id
                )));
            }

            let difference = entry.counted - stock.quantity;
            if difference == 0 {
                updated.push(stock);
                continue;
            }

            let stock = apply_delta_txn(
                &self.storage,
                &txn,
                &entry.stock_id,
                difference,
                StockMovementType::Adjustment,
                "stock count reconciliation",
                None,
                &mut events,
            )?;
            updated.push(stock);
        }

        txn.commit().map_err(crate::storage::StorageError::from)?;
        publish_all(self.publisher.as_ref(), events);

        tracing::info!(branch_id, entries = entries.len(), "Stock count reconciled");
        Ok(updated)
    }

    // ========== Queries ==========

    pub fn get_stock(&self, stock_id: &str) -> EngineResult<Stock> {
        self.storage
            .get_stock(stock_id)?
            .ok_or_else(|| EngineError::StockNotFound(stock_id.to_string()))
    }

    pub fn stock_for_product(&self, branch_id: &str, product_id: &str) -> EngineResult<Stock> {
        self.storage
            .stock_for_product(branch_id, product_id)?
            .ok_or_else(|| EngineError::StockNotFound(format!("{}/{}", branch_id, product_id)))
    }

    pub fn stocks_for_branch(&self, branch_id: &str) -> EngineResult<Vec<Stock>> {
        Ok(self.storage.stocks_for_branch(branch_id)?)
    }

    /// Full movement ledger for one stock record
    pub fn history(&self, stock_id: &str) -> EngineResult<Vec<StockMovement>> {
        Ok(self.storage.history_for_stock(stock_id)?)
    }

    /// Signed sum of the ledger - must always equal the stored quantity
    pub fn ledger_sum(&self, stock_id: &str) -> EngineResult<i64> {
        Ok(self.storage.ledger_sum(stock_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::NullPublisher;
    use shared::event::EventType;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturePublisher(Mutex<Vec<BranchEvent>>);

    impl EventPublisher for CapturePublisher {
        fn publish(&self, event: BranchEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    impl CapturePublisher {
        fn types(&self) -> Vec<EventType> {
            self.0.lock().unwrap().iter().map(|e| e.event_type()).collect()
        }
    }

    fn engine() -> StockEngine {
        StockEngine::new(
            EngineStorage::open_in_memory().unwrap(),
            Arc::new(NullPublisher),
        )
    }

    fn engine_with_capture() -> (StockEngine, Arc<CapturePublisher>) {
        let capture = Arc::new(CapturePublisher::default());
        let engine = StockEngine::new(
            EngineStorage::open_in_memory().unwrap(),
            capture.clone(),
        );
        (engine, capture)
    }

    fn seed(engine: &StockEngine, quantity: i64, threshold: i64) -> Stock {
        engine
            .create_stock(StockCreate {
                branch_id: "branch-1".into(),
                product_id: "prod-1".into(),
                initial_quantity: quantity,
                low_stock_threshold: threshold,
                ideal_level: None,
                expires_at: None,
            })
            .unwrap()
    }

    #[test]
    fn test_initial_quantity_goes_through_ledger() {
        let engine = engine();
        let stock = seed(&engine, 10, 2);

        assert_eq!(stock.quantity, 10);
        let history = engine.history(&stock.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].movement_type, StockMovementType::In);
        assert_eq!(history[0].delta, 10);
        assert_eq!(engine.ledger_sum(&stock.id).unwrap(), 10);
    }

    #[test]
    fn test_duplicate_stock_for_product_rejected() {
        let engine = engine();
        seed(&engine, 10, 2);
        let result = engine.create_stock(StockCreate {
            branch_id: "branch-1".into(),
            product_id: "prod-1".into(),
            initial_quantity: 0,
            low_stock_threshold: 0,
            ideal_level: None,
            expires_at: None,
        });
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_out_that_would_go_negative_fails_and_writes_nothing() {
        let engine = engine();
        let stock = seed(&engine, 5, 0);

        let result = engine.apply_delta(&stock.id, 10, StockMovementType::Out, "waste", None);
        assert!(matches!(
            result,
            Err(EngineError::InsufficientStock {
                available: 5,
                requested: 10,
                ..
            })
        ));

        // quantity unchanged, no partial debit in the ledger
        assert_eq!(engine.get_stock(&stock.id).unwrap().quantity, 5);
        assert_eq!(engine.history(&stock.id).unwrap().len(), 1);
    }

    #[test]
    fn test_zero_or_negative_quantity_rejected() {
        let engine = engine();
        let stock = seed(&engine, 5, 0);
        for quantity in [0, -3] {
            let result =
                engine.apply_delta(&stock.id, quantity, StockMovementType::In, "delivery", None);
            assert!(matches!(result, Err(EngineError::Validation(_))));
        }
    }

    #[test]
    fn test_low_stock_alert_emitted_at_threshold() {
        let (engine, capture) = engine_with_capture();
        let stock = seed(&engine, 10, 4);

        engine
            .apply_delta(&stock.id, 6, StockMovementType::Out, "service", None)
            .unwrap();

        let types = capture.types();
        assert!(types.contains(&EventType::StockAlert));
        // the alert carries the post-delta quantity
        let events = capture.0.lock().unwrap();
        let alert = events
            .iter()
            .find(|e| e.event_type() == EventType::StockAlert)
            .unwrap();
        match &alert.payload {
            EventPayload::StockAlert {
                current_quantity,
                threshold,
                ..
            } => {
                assert_eq!(*current_quantity, 4);
                assert_eq!(*threshold, 4);
            }
            _ => panic!("Expected StockAlert payload"),
        }
    }

    #[test]
    fn test_transfer_moves_quantity_atomically() {
        let engine = engine();
        let from = seed(&engine, 10, 0);
        let to = engine
            .create_stock(StockCreate {
                branch_id: "branch-2".into(),
                product_id: "prod-1".into(),
                initial_quantity: 1,
                low_stock_threshold: 0,
                ideal_level: None,
                expires_at: None,
            })
            .unwrap();

        let (from, to) = engine.transfer(&from.id, &to.id, 4, "restock branch 2").unwrap();
        assert_eq!(from.quantity, 6);
        assert_eq!(to.quantity, 5);
        assert_eq!(engine.ledger_sum(&from.id).unwrap(), 6);
        assert_eq!(engine.ledger_sum(&to.id).unwrap(), 5);
    }

    #[test]
    fn test_transfer_rolls_back_when_destination_missing() {
        let engine = engine();
        let from = seed(&engine, 10, 0);

        let result = engine.transfer(&from.id, "no-such-stock", 4, "restock");
        assert!(matches!(result, Err(EngineError::StockNotFound(_))));

        // source leg rolled back with the rest
        assert_eq!(engine.get_stock(&from.id).unwrap().quantity, 10);
        assert_eq!(engine.history(&from.id).unwrap().len(), 1);
    }

    #[test]
    fn test_transfer_insufficient_source_leaves_destination() {
        let engine = engine();
        let from = seed(&engine, 3, 0);
        let to = engine
            .create_stock(StockCreate {
                branch_id: "branch-2".into(),
                product_id: "prod-1".into(),
                initial_quantity: 0,
                low_stock_threshold: 0,
                ideal_level: None,
                expires_at: None,
            })
            .unwrap();

        let result = engine.transfer(&from.id, &to.id, 5, "restock");
        assert!(matches!(result, Err(EngineError::InsufficientStock { .. })));
        assert_eq!(engine.get_stock(&to.id).unwrap().quantity, 0);
        assert_eq!(engine.get_stock(&from.id).unwrap().quantity, 3);
    }

    #[test]
    fn test_transfer_emits_event_per_branch() {
        let (engine, capture) = engine_with_capture();
        let from = seed(&engine, 10, 0);
        let to = engine
            .create_stock(StockCreate {
                branch_id: "branch-2".into(),
                product_id: "prod-1".into(),
                initial_quantity: 0,
                low_stock_threshold: 0,
                ideal_level: None,
                expires_at: None,
            })
            .unwrap();

        engine.transfer(&from.id, &to.id, 2, "restock").unwrap();

        let events = capture.0.lock().unwrap();
        let transfers: Vec<_> = events
            .iter()
            .filter(|e| e.event_type() == EventType::StockTransfer)
            .collect();
        assert_eq!(transfers.len(), 2);
        let branches: Vec<_> = transfers.iter().map(|e| e.branch_id.as_str()).collect();
        assert!(branches.contains(&"branch-1"));
        assert!(branches.contains(&"branch-2"));
    }

    #[test]
    fn test_reconcile_adjusts_and_skips_exact_counts() {
        let engine = engine();
        let a = seed(&engine, 10, 0);
        let b = engine
            .create_stock(StockCreate {
                branch_id: "branch-1".into(),
                product_id: "prod-2".into(),
                initial_quantity: 7,
                low_stock_threshold: 0,
                ideal_level: None,
                expires_at: None,
            })
            .unwrap();

        let updated = engine
            .reconcile_count(
                "branch-1",
                &[
                    CountedEntry {
                        stock_id: a.id.clone(),
                        counted: 8,
                    },
                    CountedEntry {
                        stock_id: b.id.clone(),
                        counted: 7,
                    },
                ],
            )
            .unwrap();

        assert_eq!(updated[0].quantity, 8);
        assert_eq!(updated[1].quantity, 7);

        // one ADJUSTMENT row for the drifted record, none for the exact one
        let history_a = engine.history(&a.id).unwrap();
        assert_eq!(history_a.len(), 2);
        assert_eq!(history_a[1].movement_type, StockMovementType::Adjustment);
        assert_eq!(history_a[1].delta, -2);
        assert_eq!(engine.history(&b.id).unwrap().len(), 1);
    }

    #[test]
    fn test_reconcile_is_all_or_nothing() {
        let engine = engine();
        let a = seed(&engine, 10, 0);

        let result = engine.reconcile_count(
            "branch-1",
            &[
                CountedEntry {
                    stock_id: a.id.clone(),
                    counted: 4,
                },
                CountedEntry {
                    stock_id: "no-such-stock".into(),
                    counted: 1,
                },
            ],
        );
        assert!(matches!(result, Err(EngineError::StockNotFound(_))));

        // first line rolled back with the failed batch
        assert_eq!(engine.get_stock(&a.id).unwrap().quantity, 10);
        assert_eq!(engine.history(&a.id).unwrap().len(), 1);
    }

    #[test]
    fn test_quantity_always_equals_ledger_sum() {
        let engine = engine();
        let stock = seed(&engine, 20, 0);

        engine
            .apply_delta(&stock.id, 5, StockMovementType::Out, "service", None)
            .unwrap();
        engine
            .apply_delta(&stock.id, 3, StockMovementType::In, "delivery", None)
            .unwrap();
        let _ = engine.apply_delta(&stock.id, 100, StockMovementType::Out, "too much", None);
        engine
            .reconcile_count(
                "branch-1",
                &[CountedEntry {
                    stock_id: stock.id.clone(),
                    counted: 15,
                }],
            )
            .unwrap();

        let current = engine.get_stock(&stock.id).unwrap();
        assert_eq!(current.quantity, engine.ledger_sum(&stock.id).unwrap());
        assert_eq!(current.quantity, 15);
    }
}
