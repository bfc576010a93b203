use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::debug;
use uuid::Uuid;

use crate::entities::purchase_order_lines::{self, Entity as PurchaseOrderLine};
use crate::entities::purchase_orders::{
    self, Column, Entity as PurchaseOrder, Model as PurchaseOrderModel,
};
use crate::entities::PurchaseOrderStatus;
use crate::errors::ServiceError;
use crate::models::PurchaseOrderAggregate;

use super::ReceptionRepository;

/// Order store: loads purchase orders with their lines and reception history
/// and persists header changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderRepository;

impl OrderRepository {
    /// Loads the full aggregate, or `None` if no such order exists.
    pub async fn find_by_id<C>(
        conn: &C,
        id: Uuid,
    ) -> Result<Option<PurchaseOrderAggregate>, ServiceError>
    where
        C: ConnectionTrait,
    {
        let Some(order) = PurchaseOrder::find_by_id(id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
        else {
            return Ok(None);
        };

        let lines = PurchaseOrderLine::find()
            .filter(purchase_order_lines::Column::PurchaseOrderId.eq(id))
            .order_by_asc(purchase_order_lines::Column::LineNumber)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        let receptions = ReceptionRepository::list_for_order(conn, id).await?;

        Ok(Some(PurchaseOrderAggregate {
            order,
            lines,
            receptions,
        }))
    }

    /// Header only, without lines or receptions.
    pub async fn find_header<C>(
        conn: &C,
        id: Uuid,
    ) -> Result<Option<PurchaseOrderModel>, ServiceError>
    where
        C: ConnectionTrait,
    {
        PurchaseOrder::find_by_id(id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Writes a new order header followed by its lines.
    pub async fn insert<C>(
        conn: &C,
        header: purchase_orders::ActiveModel,
        lines: Vec<purchase_order_lines::ActiveModel>,
    ) -> Result<PurchaseOrderAggregate, ServiceError>
    where
        C: ConnectionTrait,
    {
        let order = header.insert(conn).await.map_err(ServiceError::db_error)?;

        let mut saved_lines = Vec::with_capacity(lines.len());
        for line in lines {
            saved_lines.push(line.insert(conn).await.map_err(ServiceError::db_error)?);
        }
        saved_lines.sort_by_key(|l| l.line_number);

        debug!(purchase_order_id = %order.id, lines = saved_lines.len(), "Purchase order inserted");

        Ok(PurchaseOrderAggregate {
            order,
            lines: saved_lines,
            receptions: Vec::new(),
        })
    }

    /// Persists a new status, guarded by the order's version.
    ///
    /// The write only applies if the row still carries `order.version`; if
    /// another writer got there first no row matches and
    /// `ConcurrentModification` is returned.
    pub async fn save_status<C>(
        conn: &C,
        order: &PurchaseOrderModel,
        new_status: PurchaseOrderStatus,
    ) -> Result<PurchaseOrderModel, ServiceError>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();
        let next_version = order.version + 1;

        let result = PurchaseOrder::update_many()
            .set(purchase_orders::ActiveModel {
                status: Set(new_status),
                version: Set(next_version),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(Column::Id.eq(order.id))
            .filter(Column::Version.eq(order.version))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(order.id));
        }

        Ok(PurchaseOrderModel {
            status: new_status,
            version: next_version,
            updated_at: now,
            ..order.clone()
        })
    }

    /// Removes the order and its lines. Returns the number of headers deleted.
    pub async fn delete<C>(conn: &C, id: Uuid) -> Result<u64, ServiceError>
    where
        C: ConnectionTrait,
    {
        PurchaseOrderLine::delete_many()
            .filter(purchase_order_lines::Column::PurchaseOrderId.eq(id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        let result = PurchaseOrder::delete_by_id(id)
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(result.rows_affected)
    }

    pub async fn list_by_status<C>(
        conn: &C,
        status: PurchaseOrderStatus,
    ) -> Result<Vec<PurchaseOrderModel>, ServiceError>
    where
        C: ConnectionTrait,
    {
        PurchaseOrder::find()
            .filter(Column::Status.eq(status))
            .order_by_desc(Column::CreatedAt)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn list_by_supplier<C>(
        conn: &C,
        supplier_id: Uuid,
    ) -> Result<Vec<PurchaseOrderModel>, ServiceError>
    where
        C: ConnectionTrait,
    {
        PurchaseOrder::find()
            .filter(Column::SupplierId.eq(supplier_id))
            .order_by_desc(Column::CreatedAt)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)
    }
}
