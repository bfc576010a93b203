use crate::{
    commands::Command,
    config::ProcurementSettings,
    db::DbPool,
    entities::PurchaseOrderStatus,
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::OrderRepository,
};
use lazy_static::lazy_static;
use prometheus::IntCounter;
use sea_orm::{DatabaseTransaction, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

lazy_static! {
    static ref PO_DELETIONS: IntCounter = IntCounter::new(
        "purchase_order_deletions_total",
        "Total number of draft purchase orders deleted"
    )
    .expect("metric can be created");
}

pub(super) fn register_metrics(registry: &prometheus::Registry) -> prometheus::Result<()> {
    registry.register(Box::new(PO_DELETIONS.clone()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletePurchaseOrderCommand {
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletePurchaseOrderResult {
    pub id: Uuid,
    pub deleted: bool,
}

#[async_trait::async_trait]
impl Command for DeletePurchaseOrderCommand {
    type Result = DeletePurchaseOrderResult;

    #[instrument(skip(self, db_pool, event_sender, _settings), fields(purchase_order_id = %self.id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        _settings: &ProcurementSettings,
    ) -> Result<Self::Result, ServiceError> {
        let txn = db_pool.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::db_error(e)
        })?;

        if let Err(e) = self.delete_draft(&txn).await {
            if let Err(rollback_err) = txn.rollback().await {
                error!("Failed to rollback transaction: {}", rollback_err);
            }
            return Err(e);
        }

        txn.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            ServiceError::db_error(e)
        })?;

        PO_DELETIONS.inc();
        info!(purchase_order_id = %self.id, "Draft purchase order deleted");

        event_sender
            .send_or_log(Event::PurchaseOrderDeleted(self.id))
            .await;

        Ok(DeletePurchaseOrderResult {
            id: self.id,
            deleted: true,
        })
    }
}

impl DeletePurchaseOrderCommand {
    async fn delete_draft(&self, txn: &DatabaseTransaction) -> Result<(), ServiceError> {
        let po = OrderRepository::find_header(txn, self.id)
            .await?
            .ok_or(ServiceError::OrderNotFound(self.id))?;

        if po.status != PurchaseOrderStatus::Draft {
            return Err(ServiceError::InvalidState(format!(
                "Only draft purchase orders can be deleted, order is {}",
                po.status
            )));
        }

        OrderRepository::delete(txn, self.id).await?;
        Ok(())
    }
}
