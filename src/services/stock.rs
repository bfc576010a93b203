use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::repositories::ProductRepository;
use crate::services::reconciliation::StockDelta;

/// Stock level of a product after an accepted quantity was added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedStock {
    pub product_id: Uuid,
    pub quantity: i32,
    pub new_stock: i32,
}

/// Turns accepted quantities into stock increases on the catalog.
///
/// Accepted units are added unconditionally. Whether a reception may exceed
/// the ordered quantity is decided before this point.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockApplier;

impl StockApplier {
    #[instrument(skip(conn, deltas), fields(products = deltas.len()))]
    pub async fn apply<C>(conn: &C, deltas: &[StockDelta]) -> Result<Vec<AppliedStock>, ServiceError>
    where
        C: ConnectionTrait,
    {
        let mut applied = Vec::with_capacity(deltas.len());

        for delta in deltas.iter().filter(|d| d.quantity > 0) {
            let product =
                ProductRepository::increase_stock(conn, delta.product_id, delta.quantity).await?;
            debug!(
                product_id = %delta.product_id,
                quantity = delta.quantity,
                new_stock = product.stock_quantity,
                "Applied stock delta"
            );
            applied.push(AppliedStock {
                product_id: delta.product_id,
                quantity: delta.quantity,
                new_stock: product.stock_quantity,
            });
        }

        Ok(applied)
    }
}
