use crate::{
    commands::Command,
    config::ProcurementSettings,
    db::DbPool,
    entities::{purchase_orders, PurchaseOrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::OrderRepository,
};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

lazy_static! {
    static ref PO_SUBMISSIONS: IntCounter = IntCounter::new(
        "purchase_order_submissions_total",
        "Total number of purchase orders submitted"
    )
    .expect("metric can be created");
    static ref PO_SUBMISSION_FAILURES: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "purchase_order_submission_failures_total",
            "Total number of failed purchase order submissions"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
}

pub(super) fn register_metrics(registry: &prometheus::Registry) -> prometheus::Result<()> {
    registry.register(Box::new(PO_SUBMISSIONS.clone()))?;
    registry.register(Box::new(PO_SUBMISSION_FAILURES.clone()))?;
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitPurchaseOrderCommand {
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitPurchaseOrderResult {
    pub id: Uuid,
    pub status: PurchaseOrderStatus,
    pub version: i32,
    pub submitted_at: DateTime<Utc>,
}

#[async_trait::async_trait]
impl Command for SubmitPurchaseOrderCommand {
    type Result = SubmitPurchaseOrderResult;

    #[instrument(skip(self, db_pool, event_sender, _settings), fields(purchase_order_id = %self.id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        _settings: &ProcurementSettings,
    ) -> Result<Self::Result, ServiceError> {
        let db = db_pool.as_ref();

        let updated_po = self.submit_purchase_order(db).await.map_err(|e| {
            PO_SUBMISSION_FAILURES.with_label_values(&[e.code()]).inc();
            error!("Failed to submit purchase order {}: {}", self.id, e);
            e
        })?;

        info!(
            purchase_order_id = %self.id,
            version = updated_po.version,
            "Purchase order submitted successfully"
        );

        event_sender
            .send_or_log(Event::PurchaseOrderStatusChanged {
                purchase_order_id: self.id,
                old_status: PurchaseOrderStatus::Draft,
                new_status: updated_po.status,
            })
            .await;
        event_sender
            .send_or_log(Event::PurchaseOrderSubmitted(self.id))
            .await;

        PO_SUBMISSIONS.inc();

        Ok(SubmitPurchaseOrderResult {
            id: updated_po.id,
            status: updated_po.status,
            version: updated_po.version,
            submitted_at: updated_po.updated_at,
        })
    }
}

impl SubmitPurchaseOrderCommand {
    /// Only a `Draft` order can be submitted; the write is version-checked.
    async fn submit_purchase_order(
        &self,
        db: &DatabaseConnection,
    ) -> Result<purchase_orders::Model, ServiceError> {
        let po = OrderRepository::find_header(db, self.id)
            .await?
            .ok_or(ServiceError::OrderNotFound(self.id))?;

        let next = po
            .status
            .transition_to(PurchaseOrderStatus::Submitted)
            .map_err(|_| {
                ServiceError::InvalidState(format!(
                    "Cannot submit purchase order in {} status. Must be in Draft status.",
                    po.status
                ))
            })?;

        OrderRepository::save_status(db, &po, next).await
    }
}
