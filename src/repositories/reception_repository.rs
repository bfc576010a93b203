use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder,
};
use uuid::Uuid;

use crate::entities::{reception_lines, receptions};
use crate::errors::ServiceError;
use crate::models::ReceptionWithLines;

/// Reception recorder: append-only storage of reception headers and lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceptionRepository;

impl ReceptionRepository {
    /// Persists the header only. Lines are written afterwards with
    /// [`ReceptionRepository::create_line`] once the header id is known.
    pub async fn create_header<C>(
        conn: &C,
        header: receptions::ActiveModel,
    ) -> Result<receptions::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        header.insert(conn).await.map_err(ServiceError::db_error)
    }

    pub async fn create_line<C>(
        conn: &C,
        line: reception_lines::ActiveModel,
    ) -> Result<reception_lines::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        line.insert(conn).await.map_err(ServiceError::db_error)
    }

    /// Loads a reception with its lines populated.
    pub async fn reload<C>(conn: &C, id: Uuid) -> Result<ReceptionWithLines, ServiceError>
    where
        C: ConnectionTrait,
    {
        let reception = receptions::Entity::find_by_id(id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or(ServiceError::ReceptionNotFound(id))?;

        Self::with_lines(conn, reception).await
    }

    /// Finds the reception an earlier call recorded under `request_id`.
    pub async fn find_by_request_id<C>(
        conn: &C,
        order_id: Uuid,
        request_id: &str,
    ) -> Result<Option<ReceptionWithLines>, ServiceError>
    where
        C: ConnectionTrait,
    {
        let reception = receptions::Entity::find()
            .filter(receptions::Column::PurchaseOrderId.eq(order_id))
            .filter(receptions::Column::RequestId.eq(request_id))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;

        match reception {
            Some(reception) => Ok(Some(Self::with_lines(conn, reception).await?)),
            None => Ok(None),
        }
    }

    /// All receptions recorded against an order, oldest first.
    pub async fn list_for_order<C>(
        conn: &C,
        order_id: Uuid,
    ) -> Result<Vec<ReceptionWithLines>, ServiceError>
    where
        C: ConnectionTrait,
    {
        let rows = receptions::Entity::find()
            .filter(receptions::Column::PurchaseOrderId.eq(order_id))
            .order_by_asc(receptions::Column::CreatedAt)
            .find_with_related(reception_lines::Entity)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(rows
            .into_iter()
            .map(|(reception, lines)| ReceptionWithLines { reception, lines })
            .collect())
    }

    async fn with_lines<C>(
        conn: &C,
        reception: receptions::Model,
    ) -> Result<ReceptionWithLines, ServiceError>
    where
        C: ConnectionTrait,
    {
        let lines = reception
            .find_related(reception_lines::Entity)
            .order_by_asc(reception_lines::Column::CreatedAt)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(ReceptionWithLines { reception, lines })
    }
}
