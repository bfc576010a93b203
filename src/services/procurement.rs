use crate::{
    commands::purchaseorders::{
        CreatePurchaseOrderCommand, DeletePurchaseOrderCommand, DeletePurchaseOrderResult,
        ReceivePurchaseOrderCommand, ReceivePurchaseOrderResult, SubmitPurchaseOrderCommand,
        SubmitPurchaseOrderResult,
    },
    commands::Command,
    config::ProcurementSettings,
    db::DbPool,
    entities::{purchase_orders, PurchaseOrderStatus},
    errors::ServiceError,
    events::EventSender,
    models::{CreatePurchaseOrderResult, PurchaseOrderAggregate, ReceiptSummary, ReceptionWithLines},
    repositories::{OrderRepository, ReceptionRepository},
    services::{order_locks::OrderLocks, reconciliation},
};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, instrument};
use uuid::Uuid;

/// Fulfillment engine: the caller-facing boundary for purchase orders.
///
/// Domain failures come back as typed errors. Anything unexpected, including
/// a panic inside an operation, is reported as an internal error carrying the
/// name of the operation that failed.
#[derive(Clone)]
pub struct ProcurementService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    settings: ProcurementSettings,
    order_locks: Arc<OrderLocks>,
}

impl ProcurementService {
    /// Creates a new procurement service instance
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        settings: ProcurementSettings,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            settings,
            order_locks: Arc::new(OrderLocks::new()),
        }
    }

    pub fn settings(&self) -> &ProcurementSettings {
        &self.settings
    }

    pub fn order_locks(&self) -> &OrderLocks {
        &self.order_locks
    }

    /// Creates a new purchase order in `Draft`
    #[instrument(skip(self, command), fields(supplier_id = %command.supplier_id))]
    pub async fn create_purchase_order(
        &self,
        command: CreatePurchaseOrderCommand,
    ) -> Result<CreatePurchaseOrderResult, ServiceError> {
        self.guarded(
            "create purchase order",
            command.execute(self.db_pool.clone(), self.event_sender.clone(), &self.settings),
        )
        .await
    }

    /// Moves a purchase order from `Draft` to `Submitted`
    #[instrument(skip(self))]
    pub async fn submit_purchase_order(
        &self,
        id: Uuid,
    ) -> Result<SubmitPurchaseOrderResult, ServiceError> {
        let command = SubmitPurchaseOrderCommand { id };
        self.with_order_lock(id, "submit purchase order", async {
            command
                .execute(self.db_pool.clone(), self.event_sender.clone(), &self.settings)
                .await
        })
        .await
    }

    /// Deletes a purchase order that is still in `Draft`
    #[instrument(skip(self))]
    pub async fn delete_purchase_order(
        &self,
        id: Uuid,
    ) -> Result<DeletePurchaseOrderResult, ServiceError> {
        let command = DeletePurchaseOrderCommand { id };
        self.with_order_lock(id, "delete purchase order", async {
            command
                .execute(self.db_pool.clone(), self.event_sender.clone(), &self.settings)
                .await
        })
        .await
    }

    /// Records a reception. Receptions against the same order run one at a time.
    #[instrument(skip(self, command), fields(purchase_order_id = %command.order_id))]
    pub async fn receive_purchase_order(
        &self,
        command: ReceivePurchaseOrderCommand,
    ) -> Result<ReceivePurchaseOrderResult, ServiceError> {
        self.with_order_lock(command.order_id, "receive purchase order", async {
            command
                .execute(self.db_pool.clone(), self.event_sender.clone(), &self.settings)
                .await
        })
        .await
    }

    /// Gets a purchase order with its lines and receptions
    #[instrument(skip(self))]
    pub async fn get_purchase_order(
        &self,
        id: Uuid,
    ) -> Result<PurchaseOrderAggregate, ServiceError> {
        self.guarded("get purchase order", async {
            OrderRepository::find_by_id(self.db_pool.as_ref(), id)
                .await?
                .ok_or(ServiceError::OrderNotFound(id))
        })
        .await
    }

    /// Lists purchase order headers in the given status, newest first
    #[instrument(skip(self))]
    pub async fn list_purchase_orders_by_status(
        &self,
        status: PurchaseOrderStatus,
    ) -> Result<Vec<purchase_orders::Model>, ServiceError> {
        self.guarded(
            "list purchase orders by status",
            OrderRepository::list_by_status(self.db_pool.as_ref(), status),
        )
        .await
    }

    /// Lists purchase order headers raised with a supplier, newest first
    #[instrument(skip(self))]
    pub async fn list_purchase_orders_by_supplier(
        &self,
        supplier_id: Uuid,
    ) -> Result<Vec<purchase_orders::Model>, ServiceError> {
        self.guarded(
            "list purchase orders by supplier",
            OrderRepository::list_by_supplier(self.db_pool.as_ref(), supplier_id),
        )
        .await
    }

    /// Gets every reception recorded against an order, oldest first
    #[instrument(skip(self))]
    pub async fn list_receptions(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<ReceptionWithLines>, ServiceError> {
        self.guarded("list receptions", async {
            let db = self.db_pool.as_ref();
            OrderRepository::find_header(db, order_id)
                .await?
                .ok_or(ServiceError::OrderNotFound(order_id))?;
            ReceptionRepository::list_for_order(db, order_id).await
        })
        .await
    }

    /// Ordered, received, rejected and outstanding quantities per line
    #[instrument(skip(self))]
    pub async fn receipt_summary(&self, order_id: Uuid) -> Result<ReceiptSummary, ServiceError> {
        self.guarded("receipt summary", async {
            let order = OrderRepository::find_by_id(self.db_pool.as_ref(), order_id)
                .await?
                .ok_or(ServiceError::OrderNotFound(order_id))?;
            Ok(reconciliation::summarize(&order))
        })
        .await
    }

    async fn with_order_lock<T, F>(
        &self,
        order_id: Uuid,
        operation: &'static str,
        fut: F,
    ) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        let result = self
            .guarded(operation, async {
                let _lock = self.order_locks.acquire(order_id).await;
                fut.await
            })
            .await;
        self.order_locks.release_idle(order_id);
        result
    }

    /// Runs `fut`, turning panics and non-domain failures into `InternalError`.
    pub(crate) async fn guarded<T, F>(
        &self,
        operation: &'static str,
        fut: F,
    ) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.is_internal() => {
                error!(operation, error = %e, "Operation failed unexpectedly");
                Err(ServiceError::InternalError(format!("{} failed: {}", operation, e)))
            }
            Ok(Err(e)) => Err(e),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(operation, panic = %message, "Operation panicked");
                Err(ServiceError::InternalError(format!(
                    "{} failed: {}",
                    operation, message
                )))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
