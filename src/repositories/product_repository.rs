use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::entities::product::{self, Column, Entity as Product};
use crate::errors::ServiceError;

/// Input for registering a catalog product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub unit_price: Decimal,
    pub stock_quantity: i32,
}

/// Catalog lookup: resolves products and persists stock changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductRepository;

impl ProductRepository {
    pub async fn find_by_id<C>(conn: &C, id: Uuid) -> Result<Option<product::Model>, ServiceError>
    where
        C: ConnectionTrait,
    {
        Product::find_by_id(id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn find_by_sku<C>(conn: &C, sku: &str) -> Result<Option<product::Model>, ServiceError>
    where
        C: ConnectionTrait,
    {
        Product::find()
            .filter(Column::Sku.eq(sku))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Adds `quantity` to the product's stock in a single `UPDATE`, so two
    /// writers never overwrite each other's increment.
    pub async fn increase_stock<C>(
        conn: &C,
        id: Uuid,
        quantity: i32,
    ) -> Result<product::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        let result = Product::update_many()
            .col_expr(
                Column::StockQuantity,
                Expr::col(Column::StockQuantity).add(quantity),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            return Err(ServiceError::ProductNotFound(id));
        }

        debug!(product_id = %id, quantity, "Stock increased");

        Self::find_by_id(conn, id)
            .await?
            .ok_or(ServiceError::ProductNotFound(id))
    }

    pub async fn create<C>(conn: &C, new_product: NewProduct) -> Result<product::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        if new_product.stock_quantity < 0 {
            return Err(ServiceError::InvalidInput(
                "Initial stock cannot be negative".to_string(),
            ));
        }
        if new_product.sku.trim().is_empty() {
            return Err(ServiceError::InvalidInput("SKU is required".to_string()));
        }
        if Self::find_by_sku(conn, &new_product.sku).await?.is_some() {
            return Err(ServiceError::InvalidInput(format!(
                "A product with SKU {} already exists",
                new_product.sku
            )));
        }

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(new_product.sku),
            name: Set(new_product.name),
            unit_price: Set(new_product.unit_price),
            stock_quantity: Set(new_product.stock_quantity),
            created_at: Set(now),
            updated_at: Set(now),
        };

        model.insert(conn).await.map_err(ServiceError::db_error)
    }
}
