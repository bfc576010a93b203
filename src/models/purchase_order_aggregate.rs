use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{
    purchase_order_lines, purchase_orders, reception_lines, receptions, PurchaseOrderStatus,
};

/// A reception header together with its line records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceptionWithLines {
    pub reception: receptions::Model,
    pub lines: Vec<reception_lines::Model>,
}

impl ReceptionWithLines {
    pub fn id(&self) -> Uuid {
        self.reception.id
    }

    pub fn total_received(&self) -> i64 {
        self.lines.iter().map(|l| i64::from(l.quantity_received)).sum()
    }

    pub fn total_rejected(&self) -> i64 {
        self.lines.iter().map(|l| i64::from(l.quantity_rejected)).sum()
    }
}

/// Received and rejected quantities accumulated against one order line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTally {
    pub received: i64,
    pub rejected: i64,
}

impl LineTally {
    pub fn add(&mut self, received: i64, rejected: i64) {
        self.received += received;
        self.rejected += rejected;
    }

    /// Units accounted for in any way, accepted or not.
    pub fn handled(&self) -> i64 {
        self.received + self.rejected
    }
}

/// A purchase order as loaded by the order store: header, lines ordered by
/// line number, and every reception recorded so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderAggregate {
    pub order: purchase_orders::Model,
    pub lines: Vec<purchase_order_lines::Model>,
    pub receptions: Vec<ReceptionWithLines>,
}

impl PurchaseOrderAggregate {
    pub fn id(&self) -> Uuid {
        self.order.id
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.order.status
    }

    pub fn line(&self, line_id: Uuid) -> Option<&purchase_order_lines::Model> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    /// Quantities recorded against each order line across all persisted
    /// receptions. Lines that never received anything map to a zero tally.
    pub fn received_to_date(&self) -> HashMap<Uuid, LineTally> {
        let mut tallies: HashMap<Uuid, LineTally> =
            self.lines.iter().map(|l| (l.id, LineTally::default())).collect();

        for reception in &self.receptions {
            for line in &reception.lines {
                tallies.entry(line.order_line_id).or_default().add(
                    i64::from(line.quantity_received),
                    i64::from(line.quantity_rejected),
                );
            }
        }

        tallies
    }
}

/// What happened to one requested item when an order was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LineOutcome {
    Created { line_id: Uuid, product_id: Uuid },
    Skipped { product_id: Uuid, reason: String },
}

impl LineOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, LineOutcome::Created { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePurchaseOrderResult {
    pub order: PurchaseOrderAggregate,
    pub outcomes: Vec<LineOutcome>,
}

impl CreatePurchaseOrderResult {
    pub fn skipped(&self) -> impl Iterator<Item = &LineOutcome> {
        self.outcomes.iter().filter(|o| !o.is_created())
    }
}
