//! Reception validation and completion computation.
//!
//! Everything here is pure: it looks at a loaded [`PurchaseOrderAggregate`]
//! and a reception request and decides what a reception would do, without
//! touching storage. The procurement service turns a [`ReconciliationPlan`]
//! into writes inside one transaction.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::OverReceiptPolicy;
use crate::entities::{PurchaseOrderStatus, QualityStatus, ReceptionStatus};
use crate::errors::ServiceError;
use crate::models::{LineReceiptSummary, LineTally, PurchaseOrderAggregate, ReceiptSummary};

pub const MAX_REQUEST_ID_LEN: usize = 128;

/// One line of a reception request as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceptionLineRequest {
    pub order_line_id: Uuid,
    pub quantity_received: i32,
    #[serde(default)]
    pub quantity_rejected: i32,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub quality_status: Option<QualityStatus>,
}

impl ReceptionLineRequest {
    pub fn received(order_line_id: Uuid, quantity_received: i32) -> Self {
        Self {
            order_line_id,
            quantity_received,
            quantity_rejected: 0,
            rejection_reason: None,
            quality_status: None,
        }
    }

    pub fn rejected(mut self, quantity: i32, reason: impl Into<String>) -> Self {
        self.quantity_rejected = quantity;
        self.rejection_reason = Some(reason.into());
        self
    }
}

/// A reception line ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLine {
    pub order_line_id: Uuid,
    pub product_id: Uuid,
    pub quantity_received: i32,
    pub quantity_rejected: i32,
    pub rejection_reason: String,
    pub quality_status: QualityStatus,
}

/// Accepted units to add to one product's stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDelta {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub lines: Vec<PlannedLine>,
    /// One entry per product with accepted units, ordered by product id
    pub stock_deltas: Vec<StockDelta>,
    pub fully_reconciled: bool,
    pub reception_status: ReceptionStatus,
    pub previous_order_status: PurchaseOrderStatus,
    pub next_order_status: PurchaseOrderStatus,
}

impl ReconciliationPlan {
    pub fn status_changed(&self) -> bool {
        self.previous_order_status != self.next_order_status
    }

    pub fn total_received(&self) -> i64 {
        self.lines.iter().map(|l| i64::from(l.quantity_received)).sum()
    }

    pub fn total_rejected(&self) -> i64 {
        self.lines.iter().map(|l| i64::from(l.quantity_rejected)).sum()
    }
}

/// A reception date must be present and not the zero value.
pub fn validate_reception_date(date: Option<NaiveDate>) -> Result<NaiveDate, ServiceError> {
    match date {
        Some(d) if d != NaiveDate::default() => Ok(d),
        _ => Err(ServiceError::InvalidInput(
            "Reception date is required".to_string(),
        )),
    }
}

pub fn validate_request_id(request_id: Option<&str>) -> Result<(), ServiceError> {
    match request_id {
        Some(id) if id.trim().is_empty() => Err(ServiceError::InvalidInput(
            "Request id cannot be blank".to_string(),
        )),
        Some(id) if id.len() > MAX_REQUEST_ID_LEN => Err(ServiceError::InvalidInput(format!(
            "Request id cannot exceed {} characters",
            MAX_REQUEST_ID_LEN
        ))),
        _ => Ok(()),
    }
}

/// Goods can only be received against an order that has been submitted.
pub fn ensure_receivable(order: &PurchaseOrderAggregate) -> Result<(), ServiceError> {
    if order.status().accepts_receptions() {
        Ok(())
    } else {
        Err(ServiceError::InvalidState(
            "order must be submitted before it can receive goods".to_string(),
        ))
    }
}

/// Validates a reception request against the order and computes its effects.
///
/// Completion compares, for every order line, the received quantity
/// accumulated over all prior receptions plus this request against the
/// ordered quantity. Rejected units never count towards completion and never
/// reach stock.
pub fn plan_reception(
    order: &PurchaseOrderAggregate,
    requested: &[ReceptionLineRequest],
    policy: OverReceiptPolicy,
) -> Result<ReconciliationPlan, ServiceError> {
    ensure_receivable(order)?;

    if requested.is_empty() {
        return Err(ServiceError::InvalidInput(
            "A reception needs at least one line".to_string(),
        ));
    }

    let mut tallies = order.received_to_date();
    let mut planned = Vec::with_capacity(requested.len());
    let mut stock: BTreeMap<Uuid, i64> = BTreeMap::new();

    for request in requested {
        if request.quantity_received < 0 || request.quantity_rejected < 0 {
            return Err(ServiceError::InvalidInput(format!(
                "Quantities for order line {} cannot be negative",
                request.order_line_id
            )));
        }

        let order_line =
            order
                .line(request.order_line_id)
                .ok_or(ServiceError::LineNotFound {
                    order_id: order.id(),
                    line_id: request.order_line_id,
                })?;

        tallies.entry(order_line.id).or_default().add(
            i64::from(request.quantity_received),
            i64::from(request.quantity_rejected),
        );

        if request.quantity_received > 0 {
            *stock.entry(order_line.product_id).or_default() +=
                i64::from(request.quantity_received);
        }

        planned.push(PlannedLine {
            order_line_id: order_line.id,
            product_id: order_line.product_id,
            quantity_received: request.quantity_received,
            quantity_rejected: request.quantity_rejected,
            rejection_reason: request.rejection_reason.clone().unwrap_or_default(),
            quality_status: request.quality_status.unwrap_or_default(),
        });
    }

    if policy == OverReceiptPolicy::Reject {
        check_over_receipt(order, &tallies, &planned)?;
    }

    let stock_deltas = stock
        .into_iter()
        .map(|(product_id, quantity)| {
            i32::try_from(quantity)
                .map(|quantity| StockDelta {
                    product_id,
                    quantity,
                })
                .map_err(|_| {
                    ServiceError::InvalidInput(format!(
                        "Accepted quantity for product {} is too large",
                        product_id
                    ))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let fully_reconciled = is_fully_reconciled(order, &tallies);
    let (reception_status, target) = if fully_reconciled {
        (ReceptionStatus::Complete, PurchaseOrderStatus::Delivered)
    } else {
        (ReceptionStatus::Partial, PurchaseOrderStatus::Partial)
    };
    let next_order_status = order.status().transition_to(target)?;

    Ok(ReconciliationPlan {
        lines: planned,
        stock_deltas,
        fully_reconciled,
        reception_status,
        previous_order_status: order.status(),
        next_order_status,
    })
}

/// True when every order line has received at least its ordered quantity.
pub fn is_fully_reconciled(order: &PurchaseOrderAggregate, tallies: &HashMap<Uuid, LineTally>) -> bool {
    order.lines.iter().all(|line| {
        tallies
            .get(&line.id)
            .map_or(false, |t| t.received >= i64::from(line.quantity))
    })
}

fn check_over_receipt(
    order: &PurchaseOrderAggregate,
    tallies: &HashMap<Uuid, LineTally>,
    planned: &[PlannedLine],
) -> Result<(), ServiceError> {
    for line in planned {
        let Some(order_line) = order.line(line.order_line_id) else {
            continue;
        };
        let cumulative = tallies.get(&line.order_line_id).map_or(0, LineTally::handled);
        let ordered = i64::from(order_line.quantity);
        if cumulative > ordered {
            return Err(ServiceError::OverReceipt {
                line_id: order_line.id,
                ordered,
                cumulative,
            });
        }
    }
    Ok(())
}

/// Per-line received/rejected/outstanding figures for an order.
pub fn summarize(order: &PurchaseOrderAggregate) -> ReceiptSummary {
    let tallies = order.received_to_date();

    let lines: Vec<LineReceiptSummary> = order
        .lines
        .iter()
        .map(|line| {
            let tally = tallies.get(&line.id).copied().unwrap_or_default();
            let ordered = i64::from(line.quantity);
            LineReceiptSummary {
                order_line_id: line.id,
                line_number: line.line_number,
                product_id: line.product_id,
                ordered,
                received: tally.received,
                rejected: tally.rejected,
                outstanding: (ordered - tally.received).max(0),
            }
        })
        .collect();

    let total_ordered = lines.iter().map(|l| l.ordered).sum();
    let total_received = lines.iter().map(|l| l.received).sum();
    let total_rejected = lines.iter().map(|l| l.rejected).sum();
    let total_outstanding: i64 = lines.iter().map(|l| l.outstanding).sum();

    ReceiptSummary {
        purchase_order_id: order.id(),
        po_number: order.order.po_number.clone(),
        status: order.status(),
        reception_count: order.receptions.len(),
        fully_received: total_outstanding == 0,
        lines,
        total_ordered,
        total_received,
        total_rejected,
        total_outstanding,
    }
}
