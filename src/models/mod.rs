//! Aggregates assembled from the procurement entities and handed back to callers.

pub mod purchase_order_aggregate;
pub mod receipt_summary;

pub use purchase_order_aggregate::{
    CreatePurchaseOrderResult, LineOutcome, LineTally, PurchaseOrderAggregate, ReceptionWithLines,
};
pub use receipt_summary::{LineReceiptSummary, ReceiptSummary};
