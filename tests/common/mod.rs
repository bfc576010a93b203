#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DatabaseBackend as DbBackend, EntityTrait, PaginatorTrait, Statement};
use erp_procurement::{
    commands::purchaseorders::{
        CreatePurchaseOrderCommand, PurchaseOrderItemRequest, ReceivePurchaseOrderCommand,
        ReceivePurchaseOrderResult,
    },
    config::{OverReceiptPolicy, ProcurementSettings},
    db::{self, DbConfig, DbPool},
    entities::{product, reception_lines, receptions},
    events::{Event, EventSender},
    models::{CreatePurchaseOrderResult, PurchaseOrderAggregate},
    repositories::{NewProduct, ProductRepository},
    services::reconciliation::ReceptionLineRequest,
    ProcurementService, ServiceError,
};
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Procurement service over a private in-memory SQLite database with the
/// schema migrated.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub service: ProcurementService,
    events: Mutex<mpsc::Receiver<Event>>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_settings(ProcurementSettings::default()).await
    }

    pub async fn with_policy(policy: OverReceiptPolicy) -> Self {
        Self::with_settings(ProcurementSettings {
            over_receipt_policy: policy,
            ..ProcurementSettings::default()
        })
        .await
    }

    pub async fn with_settings(settings: ProcurementSettings) -> Self {
        let pool = db::establish_connection_with_config(&DbConfig::sqlite_in_memory())
            .await
            .expect("failed to open in-memory database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let db = Arc::new(pool);
        let (sender, events) = EventSender::channel(1024);
        let service = ProcurementService::new(db.clone(), Arc::new(sender), settings);

        Self {
            db,
            service,
            events: Mutex::new(events),
        }
    }

    /// Events published so far, in order. Commands publish before returning,
    /// so everything from completed calls is already buffered.
    pub fn drain_events(&self) -> Vec<Event> {
        let mut events = self.events.lock().expect("event receiver lock");
        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub async fn add_product(&self, sku: &str, price: Decimal, stock: i32) -> product::Model {
        ProductRepository::create(
            self.db.as_ref(),
            NewProduct {
                sku: sku.to_string(),
                name: format!("Product {sku}"),
                unit_price: price,
                stock_quantity: stock,
            },
        )
        .await
        .expect("failed to seed product")
    }

    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        ProductRepository::find_by_id(self.db.as_ref(), product_id)
            .await
            .expect("product lookup")
            .expect("product exists")
            .stock_quantity
    }

    pub async fn create_order(
        &self,
        supplier_id: Uuid,
        items: Vec<PurchaseOrderItemRequest>,
    ) -> Result<CreatePurchaseOrderResult, ServiceError> {
        self.service
            .create_purchase_order(CreatePurchaseOrderCommand {
                supplier_id,
                origin_request_id: None,
                expected_delivery_date: expected_delivery_date(),
                items,
                notes: None,
            })
            .await
    }

    /// Seeds one product per quantity (stock 0, price 10) and returns a
    /// submitted order with those lines, in the same order.
    pub async fn submitted_order(&self, quantities: &[i32]) -> PurchaseOrderAggregate {
        let mut items = Vec::with_capacity(quantities.len());
        for (i, &quantity) in quantities.iter().enumerate() {
            let product = self
                .add_product(&format!("SKU-{}-{}", i, Uuid::new_v4().simple()), dec!(10), 0)
                .await;
            items.push(PurchaseOrderItemRequest::new(product.id, quantity));
        }

        let created = self
            .create_order(Uuid::new_v4(), items)
            .await
            .expect("order created");
        self.service
            .submit_purchase_order(created.order.id())
            .await
            .expect("order submitted");

        self.service
            .get_purchase_order(created.order.id())
            .await
            .expect("order reloads")
    }

    pub async fn receive(
        &self,
        order_id: Uuid,
        lines: Vec<ReceptionLineRequest>,
    ) -> Result<ReceivePurchaseOrderResult, ServiceError> {
        self.service
            .receive_purchase_order(ReceivePurchaseOrderCommand {
                order_id,
                reception_date: Some(reception_date()),
                request_id: None,
                lines,
            })
            .await
    }

    pub async fn receive_with_request_id(
        &self,
        order_id: Uuid,
        request_id: &str,
        lines: Vec<ReceptionLineRequest>,
    ) -> Result<ReceivePurchaseOrderResult, ServiceError> {
        self.service
            .receive_purchase_order(ReceivePurchaseOrderCommand {
                order_id,
                reception_date: Some(reception_date()),
                request_id: Some(request_id.to_string()),
                lines,
            })
            .await
    }

    pub async fn reception_count(&self) -> u64 {
        receptions::Entity::find()
            .count(self.db.as_ref())
            .await
            .expect("count receptions")
    }

    pub async fn reception_line_count(&self) -> u64 {
        reception_lines::Entity::find()
            .count(self.db.as_ref())
            .await
            .expect("count reception lines")
    }

    pub async fn remove_product(&self, product_id: Uuid) {
        product::Entity::delete_by_id(product_id)
            .exec(self.db.as_ref())
            .await
            .expect("product deleted");
    }

    pub async fn execute_sql(&self, sql: &str) {
        self.db
            .execute(Statement::from_string(DbBackend::Sqlite, sql.to_string()))
            .await
            .expect("raw statement");
    }
}

pub fn expected_delivery_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, 15).expect("valid date")
}

pub fn reception_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, 12).expect("valid date")
}

/// Decimals round-trip through SQLite as floating point, so compare with a tolerance.
pub fn assert_close(actual: Decimal, expected: Decimal) {
    assert!(
        (actual - expected).abs() < dec!(0.0001),
        "expected {expected}, got {actual}"
    );
}
