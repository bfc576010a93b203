use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
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
pub enum QualityStatus {
    #[default]
    #[sea_orm(string_value = "Conforming")]
    Conforming,
    #[sea_orm(string_value = "NonConforming")]
    NonConforming,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reception_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub reception_id: Uuid,
    /// Order line this record reconciles against
    pub order_line_id: Uuid,
    /// Copied from the order line at reception time
    pub product_id: Uuid,
    pub quantity_received: i32,
    pub quantity_rejected: i32,
    /// Empty when nothing was rejected
    pub rejection_reason: String,
    pub quality_status: QualityStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::receptions::Entity",
        from = "Column::ReceptionId",
        to = "super::receptions::Column::Id"
    )]
    Reception,
    #[sea_orm(
        belongs_to = "super::purchase_order_lines::Entity",
        from = "Column::OrderLineId",
        to = "super::purchase_order_lines::Column::Id"
    )]
    PurchaseOrderLine,
}

impl Related<super::receptions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reception.def()
    }
}

impl Related<super::purchase_order_lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrderLine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
