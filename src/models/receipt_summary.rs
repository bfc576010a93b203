use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::PurchaseOrderStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineReceiptSummary {
    pub order_line_id: Uuid,
    pub line_number: i32,
    pub product_id: Uuid,
    pub ordered: i64,
    pub received: i64,
    pub rejected: i64,
    /// ordered - received, never below zero
    pub outstanding: i64,
}

/// Per-line and order-level view of how much of a purchase order has arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptSummary {
    pub purchase_order_id: Uuid,
    pub po_number: String,
    pub status: PurchaseOrderStatus,
    pub reception_count: usize,
    pub lines: Vec<LineReceiptSummary>,
    pub total_ordered: i64,
    pub total_received: i64,
    pub total_rejected: i64,
    pub total_outstanding: i64,
    pub fully_received: bool,
}
