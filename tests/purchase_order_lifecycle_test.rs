mod common;

use assert_matches::assert_matches;
use common::{assert_close, TestApp};
use erp_procurement::{
    commands::purchaseorders::PurchaseOrderItemRequest,
    entities::PurchaseOrderStatus,
    events::Event,
    models::LineOutcome,
    repositories::{NewProduct, ProductRepository},
    ErrorKind, ServiceError,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn create_purchase_order_prices_lines_and_starts_in_draft() {
    let app = TestApp::new().await;
    let bolts = app.add_product("BOLT-M8", dec!(2.50), 0).await;
    let nuts = app.add_product("NUT-M8", dec!(1.00), 0).await;
    let supplier = Uuid::new_v4();

    let created = app
        .create_order(
            supplier,
            vec![
                PurchaseOrderItemRequest::new(bolts.id, 100),
                PurchaseOrderItemRequest::new(nuts.id, 50).at_price(dec!(0.80)),
            ],
        )
        .await
        .expect("order created");

    let order = &created.order;
    assert_eq!(order.status(), PurchaseOrderStatus::Draft);
    assert_eq!(order.order.version, 1);
    assert_eq!(order.order.supplier_id, supplier);
    assert!(order.order.po_number.starts_with("PO-"));
    assert_eq!(order.lines.len(), 2);
    assert_eq!(order.lines[0].line_number, 1);
    assert_eq!(order.lines[1].line_number, 2);
    assert!(created.outcomes.iter().all(LineOutcome::is_created));

    // 100 x 2.50 + 50 x 0.80 = 290 excluding tax, 348 at 20%
    assert_close(order.lines[0].line_total, dec!(250));
    assert_close(order.lines[1].unit_price_ht, dec!(0.80));
    assert_close(order.lines[1].unit_price_ttc, dec!(0.96));
    assert_close(order.order.total_ht, dec!(290));
    assert_close(order.order.total_ttc, dec!(348));

    let reloaded = app
        .service
        .get_purchase_order(order.id())
        .await
        .expect("order reloads");
    assert_eq!(reloaded.lines.len(), 2);
    assert!(reloaded.receptions.is_empty());
    assert_close(reloaded.order.total_ht, dec!(290));
}

#[tokio::test]
async fn unknown_products_are_skipped_and_reported() {
    let app = TestApp::new().await;
    let known = app.add_product("GASKET", dec!(4), 0).await;
    let missing = Uuid::new_v4();

    let created = app
        .create_order(
            Uuid::new_v4(),
            vec![
                PurchaseOrderItemRequest::new(missing, 3),
                PurchaseOrderItemRequest::new(known.id, 7),
            ],
        )
        .await
        .expect("order created with the known product");

    assert_eq!(created.order.lines.len(), 1);
    assert_eq!(created.order.lines[0].product_id, known.id);
    assert_eq!(created.order.lines[0].line_number, 1);

    let skipped: Vec<_> = created.skipped().collect();
    assert_eq!(skipped.len(), 1);
    assert_matches!(
        skipped[0],
        LineOutcome::Skipped { product_id, .. } if *product_id == missing
    );
    assert_close(created.order.order.total_ht, dec!(28));
}

#[tokio::test]
async fn order_with_only_unknown_products_is_not_created() {
    let app = TestApp::new().await;
    let missing = Uuid::new_v4();
    let supplier = Uuid::new_v4();

    let err = app
        .create_order(supplier, vec![PurchaseOrderItemRequest::new(missing, 1)])
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::ProductNotFound(id) if id == missing);
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let orders = app
        .service
        .list_purchase_orders_by_supplier(supplier)
        .await
        .unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn create_rejects_malformed_requests() {
    let app = TestApp::new().await;
    let product = app.add_product("WASHER", dec!(0.10), 0).await;

    let empty = app.create_order(Uuid::new_v4(), vec![]).await.unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::InvalidInput);

    let zero = app
        .create_order(Uuid::new_v4(), vec![PurchaseOrderItemRequest::new(product.id, 0)])
        .await
        .unwrap_err();
    assert_eq!(zero.kind(), ErrorKind::InvalidInput);

    let negative_price = app
        .create_order(
            Uuid::new_v4(),
            vec![PurchaseOrderItemRequest::new(product.id, 1).at_price(dec!(-1))],
        )
        .await
        .unwrap_err();
    assert_matches!(negative_price, ServiceError::InvalidInput(_));
}

#[tokio::test]
async fn create_rejects_unrepresentable_amounts() {
    let app = TestApp::new().await;
    let product = app.add_product("GIRDER", dec!(100), 0).await;
    let supplier = Uuid::new_v4();

    let err = app
        .create_order(
            supplier,
            vec![PurchaseOrderItemRequest::new(product.id, 2).at_price(Decimal::MAX)],
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InvalidInput(_));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let orders = app
        .service
        .list_purchase_orders_by_supplier(supplier)
        .await
        .unwrap();
    assert!(orders.is_empty());
    assert!(app.drain_events().is_empty());
}

#[tokio::test]
async fn submit_moves_draft_to_submitted_once() {
    let app = TestApp::new().await;
    let product = app.add_product("PIPE-20", dec!(12), 0).await;
    let created = app
        .create_order(Uuid::new_v4(), vec![PurchaseOrderItemRequest::new(product.id, 4)])
        .await
        .unwrap();
    let id = created.order.id();

    let submitted = app.service.submit_purchase_order(id).await.unwrap();
    assert_eq!(submitted.id, id);
    assert_eq!(submitted.status, PurchaseOrderStatus::Submitted);
    assert_eq!(submitted.version, 2);

    let again = app.service.submit_purchase_order(id).await.unwrap_err();
    assert_eq!(again.kind(), ErrorKind::InvalidState);
    assert!(again.to_string().contains("Must be in Draft status"));

    let order = app.service.get_purchase_order(id).await.unwrap();
    assert_eq!(order.status(), PurchaseOrderStatus::Submitted);
    assert_eq!(order.order.version, 2);
}

#[tokio::test]
async fn submit_unknown_order_is_not_found() {
    let app = TestApp::new().await;
    let id = Uuid::new_v4();

    let err = app.service.submit_purchase_order(id).await.unwrap_err();

    assert_matches!(err, ServiceError::OrderNotFound(found) if found == id);
}

#[tokio::test]
async fn only_draft_orders_can_be_deleted() {
    let app = TestApp::new().await;
    let product = app.add_product("VALVE", dec!(30), 0).await;

    let draft = app
        .create_order(Uuid::new_v4(), vec![PurchaseOrderItemRequest::new(product.id, 1)])
        .await
        .unwrap();
    let deleted = app
        .service
        .delete_purchase_order(draft.order.id())
        .await
        .unwrap();
    assert!(deleted.deleted);
    assert_matches!(
        app.service.get_purchase_order(draft.order.id()).await,
        Err(ServiceError::OrderNotFound(_))
    );

    let submitted = app.submitted_order(&[2]).await;
    let err = app
        .service
        .delete_purchase_order(submitted.id())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(app.service.get_purchase_order(submitted.id()).await.is_ok());

    let missing = app
        .service
        .delete_purchase_order(Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn orders_are_listed_by_status_and_supplier() {
    let app = TestApp::new().await;
    let product = app.add_product("CABLE", dec!(3), 0).await;
    let supplier = Uuid::new_v4();

    let first = app
        .create_order(supplier, vec![PurchaseOrderItemRequest::new(product.id, 1)])
        .await
        .unwrap();
    let second = app
        .create_order(supplier, vec![PurchaseOrderItemRequest::new(product.id, 2)])
        .await
        .unwrap();
    app.create_order(Uuid::new_v4(), vec![PurchaseOrderItemRequest::new(product.id, 3)])
        .await
        .unwrap();
    app.service
        .submit_purchase_order(second.order.id())
        .await
        .unwrap();

    let by_supplier = app
        .service
        .list_purchase_orders_by_supplier(supplier)
        .await
        .unwrap();
    assert_eq!(by_supplier.len(), 2);

    let drafts = app
        .service
        .list_purchase_orders_by_status(PurchaseOrderStatus::Draft)
        .await
        .unwrap();
    assert_eq!(drafts.len(), 2);
    assert!(drafts.iter().any(|o| o.id == first.order.id()));

    let submitted = app
        .service
        .list_purchase_orders_by_status(PurchaseOrderStatus::Submitted)
        .await
        .unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].id, second.order.id());
}

#[tokio::test]
async fn lifecycle_publishes_events() {
    let app = TestApp::new().await;
    let product = app.add_product("FLANGE", dec!(8), 0).await;
    let missing = Uuid::new_v4();

    let created = app
        .create_order(
            Uuid::new_v4(),
            vec![
                PurchaseOrderItemRequest::new(product.id, 5),
                PurchaseOrderItemRequest::new(missing, 5),
            ],
        )
        .await
        .unwrap();
    let id = created.order.id();
    app.service.submit_purchase_order(id).await.unwrap();

    let events = app.drain_events();
    assert_matches!(
        &events[0],
        Event::PurchaseOrderCreated { purchase_order_id, line_count: 1, skipped_count: 1, .. }
            if *purchase_order_id == id
    );
    assert!(events.contains(&Event::PurchaseOrderStatusChanged {
        purchase_order_id: id,
        old_status: PurchaseOrderStatus::Draft,
        new_status: PurchaseOrderStatus::Submitted,
    }));
    assert!(events.contains(&Event::PurchaseOrderSubmitted(id)));
    assert!(events.iter().all(|e| e.purchase_order_id() == Some(id)));
}

#[tokio::test]
async fn failed_operations_publish_nothing() {
    let app = TestApp::new().await;

    let _ = app.service.submit_purchase_order(Uuid::new_v4()).await;
    let _ = app
        .create_order(Uuid::new_v4(), vec![PurchaseOrderItemRequest::new(Uuid::new_v4(), 1)])
        .await;

    assert!(app.drain_events().is_empty());
}

#[tokio::test]
async fn catalog_rejects_duplicate_and_blank_skus() {
    let app = TestApp::new().await;
    app.add_product("SPRING-12", dec!(1.20), 5).await;

    for sku in ["SPRING-12", "  "] {
        let err = ProductRepository::create(
            app.db.as_ref(),
            NewProduct {
                sku: sku.to_string(),
                name: "Spring".to_string(),
                unit_price: dec!(1.20),
                stock_quantity: 0,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    let found = ProductRepository::find_by_sku(app.db.as_ref(), "SPRING-12")
        .await
        .unwrap()
        .expect("seeded product");
    assert_eq!(found.stock_quantity, 5);
}
