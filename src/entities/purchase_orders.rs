use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Lifecycle of a purchase order. Variants are declared in lifecycle order, so
/// the derived `Ord` is the forward direction of the order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[strum(ascii_case_insensitive)]
pub enum PurchaseOrderStatus {
    #[sea_orm(string_value = "Draft")]
    Draft,
    #[sea_orm(string_value = "Submitted")]
    Submitted,
    #[sea_orm(string_value = "Partial")]
    Partial,
    #[sea_orm(string_value = "Delivered")]
    Delivered,
}

impl PurchaseOrderStatus {
    /// Explicit transition table. Self-transitions on `Partial` and `Delivered`
    /// let a later reception leave the status unchanged.
    pub fn can_transition_to(self, next: PurchaseOrderStatus) -> bool {
        use PurchaseOrderStatus::*;
        matches!(
            (self, next),
            (Draft, Submitted)
                | (Submitted, Partial)
                | (Submitted, Delivered)
                | (Partial, Partial)
                | (Partial, Delivered)
                | (Delivered, Delivered)
        )
    }

    /// Returns `next` when the table allows it, `InvalidState` otherwise.
    pub fn transition_to(self, next: PurchaseOrderStatus) -> Result<Self, ServiceError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ServiceError::InvalidState(format!(
                "Cannot move purchase order from {} to {}",
                self, next
            )))
        }
    }

    /// Goods may only be received once the order has left `Draft`.
    pub fn accepts_receptions(self) -> bool {
        self != PurchaseOrderStatus::Draft
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub po_number: String,
    pub supplier_id: Uuid,
    /// Purchase request this order was raised from, if any
    pub origin_request_id: Option<Uuid>,
    pub status: PurchaseOrderStatus,
    pub expected_delivery_date: NaiveDate,
    /// Sum of line totals, excluding tax. Derived from the lines, never edited directly.
    pub total_ht: Decimal,
    /// `total_ht` with the flat tax rate applied
    pub total_ttc: Decimal,
    pub notes: Option<String>,
    /// Optimistic concurrency token, bumped on every status write
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::purchase_order_lines::Entity")]
    PurchaseOrderLines,
    #[sea_orm(has_many = "super::receptions::Entity")]
    Receptions,
}

impl Related<super::purchase_order_lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrderLines.def()
    }
}

impl Related<super::receptions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Receptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::PurchaseOrderStatus::{self, *};
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case(Draft, Submitted)]
    #[case(Submitted, Partial)]
    #[case(Submitted, Delivered)]
    #[case(Partial, Partial)]
    #[case(Partial, Delivered)]
    #[case(Delivered, Delivered)]
    fn allowed_transitions(#[case] from: PurchaseOrderStatus, #[case] to: PurchaseOrderStatus) {
        assert_eq!(from.transition_to(to).unwrap(), to);
    }

    #[rstest]
    #[case(Draft, Partial)]
    #[case(Draft, Delivered)]
    #[case(Submitted, Draft)]
    #[case(Submitted, Submitted)]
    #[case(Partial, Submitted)]
    #[case(Delivered, Partial)]
    #[case(Delivered, Submitted)]
    fn rejected_transitions(#[case] from: PurchaseOrderStatus, #[case] to: PurchaseOrderStatus) {
        assert!(from.transition_to(to).is_err());
    }

    #[test]
    fn allowed_transitions_never_move_backwards() {
        use sea_orm::Iterable;
        for from in PurchaseOrderStatus::iter() {
            for to in PurchaseOrderStatus::iter() {
                if from.can_transition_to(to) {
                    assert!(to >= from, "{from} -> {to} regresses");
                }
            }
        }
    }

    #[test]
    fn only_draft_refuses_receptions() {
        assert!(!Draft.accepts_receptions());
        assert!(Submitted.accepts_receptions());
        assert!(Partial.accepts_receptions());
        assert!(Delivered.accepts_receptions());
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(PurchaseOrderStatus::from_str("partial").unwrap(), Partial);
        assert_eq!(Delivered.to_string(), "Delivered");
    }
}
