use crate::{
    commands::Command,
    config::ProcurementSettings,
    db::DbPool,
    entities::{purchase_order_lines, purchase_orders, PurchaseOrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{CreatePurchaseOrderResult, LineOutcome, PurchaseOrderAggregate},
    repositories::{OrderRepository, ProductRepository},
};
use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec};
use rust_decimal::Decimal;
use sea_orm::{DatabaseTransaction, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref PO_CREATIONS: IntCounter = IntCounter::new(
        "purchase_order_creations_total",
        "Total number of purchase orders created"
    )
    .expect("metric can be created");
    static ref PO_CREATION_FAILURES: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "purchase_order_creation_failures_total",
            "Total number of failed purchase order creations"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
    static ref PO_LINES_SKIPPED: IntCounter = IntCounter::new(
        "purchase_order_lines_skipped_total",
        "Requested order lines skipped because the product did not resolve"
    )
    .expect("metric can be created");
}

pub(super) fn register_metrics(registry: &prometheus::Registry) -> prometheus::Result<()> {
    registry.register(Box::new(PO_CREATIONS.clone()))?;
    registry.register(Box::new(PO_CREATION_FAILURES.clone()))?;
    registry.register(Box::new(PO_LINES_SKIPPED.clone()))?;
    Ok(())
}

pub const SKIPPED_PRODUCT_NOT_FOUND: &str = "product not found";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePurchaseOrderCommand {
    pub supplier_id: Uuid,
    pub origin_request_id: Option<Uuid>,
    pub expected_delivery_date: NaiveDate,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<PurchaseOrderItemRequest>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PurchaseOrderItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    /// Overrides the catalog price, excluding tax
    pub unit_price: Option<Decimal>,
}

impl PurchaseOrderItemRequest {
    pub fn new(product_id: Uuid, quantity: i32) -> Self {
        Self {
            product_id,
            quantity,
            unit_price: None,
        }
    }

    pub fn at_price(mut self, unit_price: Decimal) -> Self {
        self.unit_price = Some(unit_price);
        self
    }
}

/// Prices of one order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePricing {
    pub unit_price_ht: Decimal,
    pub unit_price_ttc: Decimal,
    pub line_total: Decimal,
}

/// Prices one line. Amounts that do not fit a `Decimal` are rejected.
pub fn price_line(
    quantity: i32,
    unit_price_ht: Decimal,
    tax_rate: Decimal,
) -> Result<LinePricing, ServiceError> {
    let unit_price_ttc = unit_price_ht
        .checked_mul(Decimal::ONE + tax_rate)
        .ok_or_else(|| amount_overflow("unit price including tax"))?;
    let line_total = unit_price_ht
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(|| amount_overflow("line total"))?;

    Ok(LinePricing {
        unit_price_ht,
        unit_price_ttc,
        line_total,
    })
}

/// Order totals (excluding tax, including tax) from its line totals.
pub fn order_totals<I>(line_totals: I, tax_rate: Decimal) -> Result<(Decimal, Decimal), ServiceError>
where
    I: IntoIterator<Item = Decimal>,
{
    let total_ht = line_totals
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, total| acc.checked_add(total))
        .ok_or_else(|| amount_overflow("order total"))?;
    let total_ttc = total_ht
        .checked_mul(Decimal::ONE + tax_rate)
        .ok_or_else(|| amount_overflow("order total including tax"))?;
    Ok((total_ht, total_ttc))
}

fn amount_overflow(what: &str) -> ServiceError {
    ServiceError::InvalidInput(format!("{} is too large to represent", what))
}

/// `PO-YYYYMMDD-XXXXXXXX`, the suffix taken from a random UUID.
pub fn generate_po_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("PO-{}-{}", now.format("%Y%m%d"), suffix)
}

#[async_trait::async_trait]
impl Command for CreatePurchaseOrderCommand {
    type Result = CreatePurchaseOrderResult;

    #[instrument(skip(self, db_pool, event_sender, settings), fields(supplier_id = %self.supplier_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        settings: &ProcurementSettings,
    ) -> Result<Self::Result, ServiceError> {
        self.validate_request().map_err(|e| {
            PO_CREATION_FAILURES
                .with_label_values(&["validation_error"])
                .inc();
            error!("Invalid purchase order request: {}", e);
            e
        })?;

        let txn = db_pool.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::db_error(e)
        })?;

        let (order, outcomes) = match self.create_purchase_order(&txn, settings).await {
            Ok(created) => created,
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!("Failed to rollback transaction: {}", rollback_err);
                }
                PO_CREATION_FAILURES.with_label_values(&[e.code()]).inc();
                error!(supplier_id = %self.supplier_id, "Purchase order creation failed: {}", e);
                return Err(e);
            }
        };

        txn.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            ServiceError::db_error(e)
        })?;

        let skipped = outcomes.iter().filter(|o| !o.is_created()).count();
        PO_CREATIONS.inc();
        PO_LINES_SKIPPED.inc_by(skipped as u64);

        info!(
            purchase_order_id = %order.id(),
            po_number = %order.order.po_number,
            lines = order.lines.len(),
            skipped,
            "Purchase order created"
        );

        event_sender
            .send_or_log(Event::PurchaseOrderCreated {
                purchase_order_id: order.id(),
                supplier_id: self.supplier_id,
                line_count: order.lines.len(),
                skipped_count: skipped,
            })
            .await;

        Ok(CreatePurchaseOrderResult { order, outcomes })
    }
}

impl CreatePurchaseOrderCommand {
    fn validate_request(&self) -> Result<(), ServiceError> {
        self.validate()?;
        for item in &self.items {
            item.validate()?;
            if item.unit_price.map_or(false, |p| p.is_sign_negative()) {
                return Err(ServiceError::InvalidInput(format!(
                    "Unit price for product {} cannot be negative",
                    item.product_id
                )));
            }
        }
        Ok(())
    }

    async fn create_purchase_order(
        &self,
        txn: &DatabaseTransaction,
        settings: &ProcurementSettings,
    ) -> Result<(PurchaseOrderAggregate, Vec<LineOutcome>), ServiceError> {
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let tax_rate = settings.default_tax_rate;

        let mut outcomes = Vec::with_capacity(self.items.len());
        let mut lines = Vec::with_capacity(self.items.len());
        let mut line_totals = Vec::with_capacity(self.items.len());

        for item in &self.items {
            let Some(product) = ProductRepository::find_by_id(txn, item.product_id).await? else {
                warn!(product_id = %item.product_id, "Skipping order line, product not found");
                outcomes.push(LineOutcome::Skipped {
                    product_id: item.product_id,
                    reason: SKIPPED_PRODUCT_NOT_FOUND.to_string(),
                });
                continue;
            };

            let pricing = price_line(
                item.quantity,
                item.unit_price.unwrap_or(product.unit_price),
                tax_rate,
            )?;
            let line_id = Uuid::new_v4();

            lines.push(purchase_order_lines::ActiveModel {
                id: Set(line_id),
                purchase_order_id: Set(order_id),
                line_number: Set(lines.len() as i32 + 1),
                product_id: Set(product.id),
                quantity: Set(item.quantity),
                unit_price_ht: Set(pricing.unit_price_ht),
                unit_price_ttc: Set(pricing.unit_price_ttc),
                tax_rate: Set(tax_rate),
                line_total: Set(pricing.line_total),
                created_at: Set(now),
            });
            line_totals.push(pricing.line_total);
            outcomes.push(LineOutcome::Created {
                line_id,
                product_id: product.id,
            });
        }

        if lines.is_empty() {
            let first = self.items.first().map(|i| i.product_id).unwrap_or_default();
            return Err(ServiceError::ProductNotFound(first));
        }

        let (total_ht, total_ttc) = order_totals(line_totals, tax_rate)?;

        let header = purchase_orders::ActiveModel {
            id: Set(order_id),
            po_number: Set(generate_po_number(now)),
            supplier_id: Set(self.supplier_id),
            origin_request_id: Set(self.origin_request_id),
            status: Set(PurchaseOrderStatus::Draft),
            expected_delivery_date: Set(self.expected_delivery_date),
            total_ht: Set(total_ht),
            total_ttc: Set(total_ttc),
            notes: Set(self.notes.clone()),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let order = OrderRepository::insert(txn, header, lines).await?;
        Ok((order, outcomes))
    }
}
