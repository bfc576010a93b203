use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec};
use sea_orm::{DatabaseTransaction, DbErr, Set, SqlErr, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    commands::Command,
    config::ProcurementSettings,
    db::DbPool,
    entities::{reception_lines, receptions, PurchaseOrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    models::ReceptionWithLines,
    repositories::{OrderRepository, ReceptionRepository},
    services::{
        reconciliation::{self, ReceptionLineRequest, ReconciliationPlan},
        stock::{AppliedStock, StockApplier},
    },
};

lazy_static! {
    static ref PO_RECEPTIONS: IntCounter = IntCounter::new(
        "purchase_order_receptions_total",
        "Total number of receptions recorded against purchase orders"
    )
    .expect("metric can be created");
    static ref PO_RECEPTION_REPLAYS: IntCounter = IntCounter::new(
        "purchase_order_reception_replays_total",
        "Receptions answered from an earlier call with the same request id"
    )
    .expect("metric can be created");
    static ref PO_RECEPTION_FAILURES: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "purchase_order_reception_failures_total",
            "Total number of failed receptions"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
    static ref UNITS_RECEIVED: IntCounter = IntCounter::new(
        "purchase_order_units_received_total",
        "Accepted units added to stock by receptions"
    )
    .expect("metric can be created");
}

pub(super) fn register_metrics(registry: &prometheus::Registry) -> prometheus::Result<()> {
    registry.register(Box::new(PO_RECEPTIONS.clone()))?;
    registry.register(Box::new(PO_RECEPTION_REPLAYS.clone()))?;
    registry.register(Box::new(PO_RECEPTION_FAILURES.clone()))?;
    registry.register(Box::new(UNITS_RECEIVED.clone()))?;
    Ok(())
}

/// Records goods received against a submitted purchase order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivePurchaseOrderCommand {
    pub order_id: Uuid,
    pub reception_date: Option<NaiveDate>,
    /// Dedupe key: a second call with the same key returns the first reception
    #[serde(default)]
    pub request_id: Option<String>,
    pub lines: Vec<ReceptionLineRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivePurchaseOrderResult {
    pub reception: ReceptionWithLines,
    pub order_status: PurchaseOrderStatus,
    pub order_version: i32,
    pub fully_reconciled: bool,
    /// True when an earlier reception with the same request id was returned
    pub replayed: bool,
    pub stock: Vec<AppliedStock>,
}

struct Recorded {
    reception: ReceptionWithLines,
    plan: ReconciliationPlan,
    stock: Vec<AppliedStock>,
    order_version: i32,
}

enum ReceptionOutcome {
    Recorded(Recorded),
    Replayed {
        reception: ReceptionWithLines,
        order_status: PurchaseOrderStatus,
        order_version: i32,
    },
}

#[async_trait]
impl Command for ReceivePurchaseOrderCommand {
    type Result = ReceivePurchaseOrderResult;

    #[instrument(skip(self, db_pool, event_sender, settings), fields(purchase_order_id = %self.order_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        settings: &ProcurementSettings,
    ) -> Result<Self::Result, ServiceError> {
        let result = self.run(db_pool, settings).await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                PO_RECEPTION_FAILURES.with_label_values(&[e.code()]).inc();
                warn!(purchase_order_id = %self.order_id, error = %e, "Reception rejected");
                return Err(e);
            }
        };

        match outcome {
            ReceptionOutcome::Replayed {
                reception,
                order_status,
                order_version,
            } => {
                PO_RECEPTION_REPLAYS.inc();
                info!(
                    purchase_order_id = %self.order_id,
                    reception_id = %reception.id(),
                    "Reception already recorded for this request id"
                );
                Ok(ReceivePurchaseOrderResult {
                    fully_reconciled: order_status == PurchaseOrderStatus::Delivered,
                    reception,
                    order_status,
                    order_version,
                    replayed: true,
                    stock: Vec::new(),
                })
            }
            ReceptionOutcome::Recorded(recorded) => {
                PO_RECEPTIONS.inc();
                UNITS_RECEIVED.inc_by(recorded.plan.total_received().max(0) as u64);
                info!(
                    purchase_order_id = %self.order_id,
                    reception_id = %recorded.reception.id(),
                    reception_status = %recorded.plan.reception_status,
                    order_status = %recorded.plan.next_order_status,
                    "Reception recorded"
                );

                self.publish(&event_sender, &recorded).await;

                Ok(ReceivePurchaseOrderResult {
                    order_status: recorded.plan.next_order_status,
                    order_version: recorded.order_version,
                    fully_reconciled: recorded.plan.fully_reconciled,
                    replayed: false,
                    reception: recorded.reception,
                    stock: recorded.stock,
                })
            }
        }
    }
}

impl ReceivePurchaseOrderCommand {
    /// Validates the request and applies it inside one transaction.
    async fn run(
        &self,
        db_pool: Arc<DbPool>,
        settings: &ProcurementSettings,
    ) -> Result<ReceptionOutcome, ServiceError> {
        let reception_date = reconciliation::validate_reception_date(self.reception_date)?;
        reconciliation::validate_request_id(self.request_id.as_deref())?;

        let txn = db_pool.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::db_error(e)
        })?;

        let outcome = match self.receive(&txn, reception_date, settings).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!("Failed to rollback transaction: {}", rollback_err);
                }
                return Err(e);
            }
        };

        txn.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            ServiceError::db_error(e)
        })?;

        Ok(outcome)
    }

    async fn receive(
        &self,
        txn: &DatabaseTransaction,
        reception_date: NaiveDate,
        settings: &ProcurementSettings,
    ) -> Result<ReceptionOutcome, ServiceError> {
        let order = OrderRepository::find_by_id(txn, self.order_id)
            .await?
            .ok_or(ServiceError::OrderNotFound(self.order_id))?;

        if let Some(request_id) = self.request_id.as_deref() {
            if let Some(existing) =
                ReceptionRepository::find_by_request_id(txn, self.order_id, request_id).await?
            {
                return Ok(ReceptionOutcome::Replayed {
                    reception: existing,
                    order_status: order.status(),
                    order_version: order.order.version,
                });
            }
        }

        let plan = reconciliation::plan_reception(&order, &self.lines, settings.over_receipt_policy)?;

        let now = Utc::now();
        let header = ReceptionRepository::create_header(
            txn,
            receptions::ActiveModel {
                id: Set(Uuid::new_v4()),
                purchase_order_id: Set(self.order_id),
                reception_date: Set(reception_date),
                status: Set(plan.reception_status),
                request_id: Set(self.request_id.clone()),
                created_at: Set(now),
            },
        )
        .await
        .map_err(|e| self.map_duplicate_request(e))?;

        for line in &plan.lines {
            ReceptionRepository::create_line(
                txn,
                reception_lines::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    reception_id: Set(header.id),
                    order_line_id: Set(line.order_line_id),
                    product_id: Set(line.product_id),
                    quantity_received: Set(line.quantity_received),
                    quantity_rejected: Set(line.quantity_rejected),
                    rejection_reason: Set(line.rejection_reason.clone()),
                    quality_status: Set(line.quality_status),
                    created_at: Set(now),
                },
            )
            .await?;
        }

        // Products were resolved when the order was created; one missing now is
        // a catalog failure, not a caller mistake.
        let stock = StockApplier::apply(txn, &plan.stock_deltas)
            .await
            .map_err(|e| match e {
                ServiceError::ProductNotFound(product_id) => ServiceError::InternalError(format!(
                    "stock update failed: product {} is missing from the catalog",
                    product_id
                )),
                other => other,
            })?;

        let updated = OrderRepository::save_status(txn, &order.order, plan.next_order_status).await?;

        let reception = ReceptionRepository::reload(txn, header.id).await?;

        Ok(ReceptionOutcome::Recorded(Recorded {
            reception,
            plan,
            stock,
            order_version: updated.version,
        }))
    }

    /// A unique-index hit on `(order, request_id)` means another writer
    /// recorded the same request first; retrying returns that reception.
    fn map_duplicate_request(&self, error: ServiceError) -> ServiceError {
        match &error {
            ServiceError::DatabaseError(db_err)
                if self.request_id.is_some() && is_unique_violation(db_err) =>
            {
                ServiceError::ConcurrentModification(self.order_id)
            }
            _ => error,
        }
    }

    async fn publish(&self, event_sender: &EventSender, recorded: &Recorded) {
        let reception = &recorded.reception.reception;

        event_sender
            .send_or_log(Event::GoodsReceived {
                purchase_order_id: self.order_id,
                reception_id: reception.id,
                reception_date: reception.reception_date,
                status: reception.status,
                quantity_received: recorded.plan.total_received(),
                quantity_rejected: recorded.plan.total_rejected(),
            })
            .await;

        for applied in &recorded.stock {
            event_sender
                .send_or_log(Event::StockIncreased {
                    product_id: applied.product_id,
                    quantity: applied.quantity,
                    new_stock: applied.new_stock,
                    reception_id: reception.id,
                })
                .await;
        }

        if recorded.plan.status_changed() {
            event_sender
                .send_or_log(Event::PurchaseOrderStatusChanged {
                    purchase_order_id: self.order_id,
                    old_status: recorded.plan.previous_order_status,
                    new_status: recorded.plan.next_order_status,
                })
                .await;
        }
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
