use chrono::{NaiveDate, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use erp_procurement::{
    config::OverReceiptPolicy,
    entities::{purchase_order_lines, purchase_orders, reception_lines, receptions, PurchaseOrderStatus, QualityStatus, ReceptionStatus},
    models::{PurchaseOrderAggregate, ReceptionWithLines},
    services::reconciliation::{plan_reception, summarize, ReceptionLineRequest},
};
use rust_decimal::Decimal;
use std::time::Duration;
use uuid::Uuid;

// An order with `lines` lines of 100 units each and `history` prior partial receptions
// that each received one unit per line.
fn build_order(lines: usize, history: usize) -> PurchaseOrderAggregate {
    let order_id = Uuid::new_v4();
    let now = Utc::now();
    let date = NaiveDate::from_ymd_opt(2024, 4, 12).unwrap_or_default();

    let order_lines: Vec<purchase_order_lines::Model> = (0..lines)
        .map(|i| purchase_order_lines::Model {
            id: Uuid::new_v4(),
            purchase_order_id: order_id,
            line_number: i as i32 + 1,
            product_id: Uuid::new_v4(),
            quantity: 100,
            unit_price_ht: Decimal::TEN,
            unit_price_ttc: Decimal::new(12, 0),
            tax_rate: Decimal::new(20, 2),
            line_total: Decimal::ONE_THOUSAND,
            created_at: now,
        })
        .collect();

    let receptions = (0..history)
        .map(|_| {
            let reception_id = Uuid::new_v4();
            ReceptionWithLines {
                reception: receptions::Model {
                    id: reception_id,
                    purchase_order_id: order_id,
                    reception_date: date,
                    status: ReceptionStatus::Partial,
                    request_id: None,
                    created_at: now,
                },
                lines: order_lines
                    .iter()
                    .map(|line| reception_lines::Model {
                        id: Uuid::new_v4(),
                        reception_id,
                        order_line_id: line.id,
                        product_id: line.product_id,
                        quantity_received: 1,
                        quantity_rejected: 0,
                        rejection_reason: String::new(),
                        quality_status: QualityStatus::Conforming,
                        created_at: now,
                    })
                    .collect(),
            }
        })
        .collect();

    PurchaseOrderAggregate {
        order: purchase_orders::Model {
            id: order_id,
            po_number: "PO-20240412-BENCH000".to_string(),
            supplier_id: Uuid::new_v4(),
            origin_request_id: None,
            status: if history == 0 {
                PurchaseOrderStatus::Submitted
            } else {
                PurchaseOrderStatus::Partial
            },
            expected_delivery_date: date,
            total_ht: Decimal::ZERO,
            total_ttc: Decimal::ZERO,
            notes: None,
            version: 2 + history as i32,
            created_at: now,
            updated_at: now,
        },
        lines: order_lines,
        receptions,
    }
}

fn plan_reception_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_reception");

    for lines in [1usize, 10, 50, 200].iter() {
        let order = build_order(*lines, 5);
        let requests: Vec<ReceptionLineRequest> = order
            .lines
            .iter()
            .map(|line| ReceptionLineRequest::received(line.id, 10).rejected(1, "damaged"))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(lines), lines, |b, _| {
            b.iter(|| {
                plan_reception(
                    black_box(&order),
                    black_box(&requests),
                    OverReceiptPolicy::Reject,
                )
            });
        });
    }

    group.finish();
}

fn summarize_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("receipt_summary");

    for history in [0usize, 10, 100].iter() {
        let order = build_order(20, *history);
        group.bench_with_input(BenchmarkId::from_parameter(history), history, |b, _| {
            b.iter(|| summarize(black_box(&order)));
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .sample_size(100);
    targets =
        plan_reception_benchmark,
        summarize_benchmark
}

criterion_main!(benches);
