use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a reception brought every order line up to its ordered quantity.
/// Derived at reception time, never supplied by the client.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum ReceptionStatus {
    #[sea_orm(string_value = "Partial")]
    Partial,
    #[sea_orm(string_value = "Complete")]
    Complete,
}

/// Append-only record of one goods-receipt event against a purchase order
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "receptions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub purchase_order_id: Uuid,
    pub reception_date: NaiveDate,
    pub status: ReceptionStatus,
    /// Client-supplied dedupe key
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::purchase_orders::Entity",
        from = "Column::PurchaseOrderId",
        to = "super::purchase_orders::Column::Id"
    )]
    PurchaseOrder,
    #[sea_orm(has_many = "super::reception_lines::Entity")]
    ReceptionLines,
}

impl Related<super::purchase_orders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrder.def()
    }
}

impl Related<super::reception_lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReceptionLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
