use std::{str::FromStr, sync::Arc};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use erp_procurement::{
    commands::purchaseorders::{
        CreatePurchaseOrderCommand, PurchaseOrderItemRequest, ReceivePurchaseOrderCommand,
    },
    config,
    db,
    entities::PurchaseOrderStatus,
    events::{process_events, EventHandler, LoggingEventHandler},
    models::{LineOutcome, PurchaseOrderAggregate, ReceiptSummary},
    repositories::{NewProduct, ProductRepository},
    services::reconciliation::ReceptionLineRequest,
    AppState, OperationResponse, ServiceError,
};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(context.state.db.as_ref())
                .await
                .context("failed to run migrations")?;
            if cli.json {
                print_json(&OperationResponse::ok((), "Migrations applied"))?;
            } else {
                println!("Migrations applied");
            }
            Ok(())
        }
        Commands::Product(command) => handle_product_command(&context, command, cli.json).await,
        Commands::Order(command) => handle_order_command(&context, command, cli.json).await,
    }
}

#[derive(Parser)]
#[command(
    name = "procurement",
    about = "Purchase order fulfillment and reception reconciliation",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render the operation envelope as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    #[command(subcommand)]
    Product(ProductCommands),
    #[command(subcommand)]
    Order(OrderCommands),
}

#[derive(Subcommand)]
enum ProductCommands {
    Add(ProductAddArgs),
    Show(IdArgs),
}

#[derive(Subcommand)]
enum OrderCommands {
    Create(OrderCreateArgs),
    Submit(IdArgs),
    Delete(IdArgs),
    Show(IdArgs),
    List(OrderListArgs),
    Receive(OrderReceiveArgs),
    Summary(IdArgs),
}

#[derive(Args)]
struct IdArgs {
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Identifier (UUID)")]
    id: Uuid,
}

#[derive(Args)]
struct ProductAddArgs {
    #[arg(long, help = "Stock keeping unit")]
    sku: String,
    #[arg(long, help = "Display name")]
    name: String,
    #[arg(long, value_parser = parse_decimal, help = "Catalog price excluding tax")]
    price: Decimal,
    #[arg(long, default_value_t = 0, help = "Initial stock on hand")]
    stock: i32,
}

#[derive(Args)]
struct OrderCreateArgs {
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Supplier identifier (UUID)")]
    supplier: Uuid,
    #[arg(long, value_parser = parse_date, help = "Expected delivery date (YYYY-MM-DD)")]
    expected: NaiveDate,
    #[arg(
        long = "item",
        required = true,
        value_parser = parse_order_item,
        help = "product=<uuid>,quantity=<n>[,price=<decimal>]; repeat for each line"
    )]
    items: Vec<PurchaseOrderItemRequest>,
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Originating purchase request")]
    origin_request: Option<Uuid>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Args)]
struct OrderListArgs {
    #[arg(long, value_parser = parse_status, conflicts_with = "supplier")]
    status: Option<PurchaseOrderStatus>,
    #[arg(long, value_parser = clap::value_parser!(Uuid))]
    supplier: Option<Uuid>,
}

#[derive(Args)]
struct OrderReceiveArgs {
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Purchase order identifier")]
    id: Uuid,
    #[arg(long, value_parser = parse_date, help = "Reception date (YYYY-MM-DD)")]
    date: Option<NaiveDate>,
    #[arg(long, help = "Dedupe key; repeating it returns the first reception")]
    request_id: Option<String>,
    #[arg(
        long = "line",
        value_parser = parse_reception_line,
        help = "line=<uuid>,received=<n>[,rejected=<n>][,reason=<text>]; repeat for each line"
    )]
    lines: Vec<ReceptionLineRequest>,
}

struct CliContext {
    state: AppState,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let (state, event_rx) = AppState::build(config)
            .await
            .context("failed to initialise procurement service")?;

        let handlers = vec![Arc::new(LoggingEventHandler) as Arc<dyn EventHandler>];
        tokio::spawn(process_events(event_rx, handlers));

        Ok(Self { state })
    }
}

async fn handle_product_command(
    context: &CliContext,
    command: ProductCommands,
    json: bool,
) -> Result<()> {
    let db = context.state.db.as_ref();
    match command {
        ProductCommands::Add(args) => {
            let result = ProductRepository::create(
                db,
                NewProduct {
                    sku: args.sku,
                    name: args.name,
                    unit_price: args.price,
                    stock_quantity: args.stock,
                },
            )
            .await;
            emit(result, json, "Product created", |p| {
                println!(
                    "Product {} • sku {} • price {} • stock {}",
                    p.id, p.sku, p.unit_price, p.stock_quantity
                )
            })
        }
        ProductCommands::Show(args) => {
            let result = ProductRepository::find_by_id(db, args.id)
                .await
                .and_then(|p| p.ok_or(ServiceError::ProductNotFound(args.id)));
            emit(result, json, "Product found", |p| {
                println!(
                    "Product {} • {} ({}) • price {} • stock {}",
                    p.id, p.name, p.sku, p.unit_price, p.stock_quantity
                )
            })
        }
    }
}

async fn handle_order_command(
    context: &CliContext,
    command: OrderCommands,
    json: bool,
) -> Result<()> {
    let service = &context.state.procurement;
    match command {
        OrderCommands::Create(args) => {
            let result = service
                .create_purchase_order(CreatePurchaseOrderCommand {
                    supplier_id: args.supplier,
                    origin_request_id: args.origin_request,
                    expected_delivery_date: args.expected,
                    items: args.items,
                    notes: args.notes,
                })
                .await;
            emit(result, json, "Purchase order created", |created| {
                render_order(&created.order);
                for outcome in &created.outcomes {
                    if let LineOutcome::Skipped { product_id, reason } = outcome {
                        println!("  skipped product {}: {}", product_id, reason);
                    }
                }
            })
        }
        OrderCommands::Submit(args) => {
            let result = service.submit_purchase_order(args.id).await;
            emit(result, json, "Purchase order submitted", |r| {
                println!("Order {} is now {} (version {})", r.id, r.status, r.version)
            })
        }
        OrderCommands::Delete(args) => {
            let result = service.delete_purchase_order(args.id).await;
            emit(result, json, "Purchase order deleted", |r| {
                println!("Order {} deleted", r.id)
            })
        }
        OrderCommands::Show(args) => {
            let result = service.get_purchase_order(args.id).await;
            emit(result, json, "Purchase order found", render_order)
        }
        OrderCommands::List(args) => {
            let result = match (args.status, args.supplier) {
                (Some(status), _) => service.list_purchase_orders_by_status(status).await,
                (None, Some(supplier)) => service.list_purchase_orders_by_supplier(supplier).await,
                (None, None) => return Err(anyhow!("pass either --status or --supplier")),
            };
            emit(result, json, "Purchase orders listed", |orders| {
                if orders.is_empty() {
                    println!("No purchase orders found");
                }
                for order in orders {
                    println!(
                        "- {} • {} • supplier {} • {} • total {}",
                        order.id, order.po_number, order.supplier_id, order.status, order.total_ttc
                    );
                }
            })
        }
        OrderCommands::Receive(args) => {
            let result = service
                .receive_purchase_order(ReceivePurchaseOrderCommand {
                    order_id: args.id,
                    reception_date: args.date,
                    request_id: args.request_id,
                    lines: args.lines,
                })
                .await;
            emit(result, json, "Reception recorded", |r| {
                let note = if r.replayed { " (already recorded)" } else { "" };
                println!(
                    "Reception {} • {} • order now {}{}",
                    r.reception.id(),
                    r.reception.reception.status,
                    r.order_status,
                    note
                );
                for applied in &r.stock {
                    println!(
                        "  stock +{} for product {} (now {})",
                        applied.quantity, applied.product_id, applied.new_stock
                    );
                }
            })
        }
        OrderCommands::Summary(args) => {
            let result = service.receipt_summary(args.id).await;
            emit(result, json, "Receipt summary", render_summary)
        }
    }
}

/// Prints the envelope as JSON, or the human rendering on success. Failures
/// are returned so the process exits non-zero.
fn emit<T, F>(result: Result<T, ServiceError>, json: bool, message: &str, render: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&T),
{
    let failure = result.as_ref().err().map(|e| anyhow!("{} [{}]", e, e.kind()));

    if json {
        print_json(&OperationResponse::from_result(result, message))?;
    } else if let Ok(value) = &result {
        render(value);
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_order(order: &PurchaseOrderAggregate) {
    let header = &order.order;
    println!(
        "Order {} • {} • supplier {} • status {} • expected {} • total {} ({} excl. tax)",
        header.id,
        header.po_number,
        header.supplier_id,
        header.status,
        header.expected_delivery_date,
        header.total_ttc,
        header.total_ht
    );
    for line in &order.lines {
        println!(
            "  #{} line {} • product {} • qty {} @ {}",
            line.line_number, line.id, line.product_id, line.quantity, line.unit_price_ht
        );
    }
    println!("  {} reception(s)", order.receptions.len());
}

fn render_summary(summary: &ReceiptSummary) {
    println!(
        "Order {} ({}) • {} • received {}/{} • rejected {} • outstanding {}",
        summary.purchase_order_id,
        summary.po_number,
        summary.status,
        summary.total_received,
        summary.total_ordered,
        summary.total_rejected,
        summary.total_outstanding
    );
    for line in &summary.lines {
        println!(
            "  #{} {} • ordered {} • received {} • rejected {} • outstanding {}",
            line.line_number,
            line.order_line_id,
            line.ordered,
            line.received,
            line.rejected,
            line.outstanding
        );
    }
}

fn parse_order_item(raw: &str) -> Result<PurchaseOrderItemRequest, String> {
    let mut product_id = None;
    let mut quantity = None;
    let mut unit_price = None;

    for part in raw.split(',') {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| format!("invalid segment '{part}', expected key=value"))?;
        let value = value.trim();

        match key.trim() {
            "product" => {
                product_id =
                    Some(Uuid::parse_str(value).map_err(|_| format!("invalid product id '{value}'"))?)
            }
            "quantity" => {
                quantity = Some(
                    value
                        .parse::<i32>()
                        .map_err(|_| format!("invalid quantity '{value}'"))?,
                )
            }
            "price" => unit_price = Some(parse_decimal(value)?),
            other => return Err(format!("unknown item field '{other}'")),
        }
    }

    Ok(PurchaseOrderItemRequest {
        product_id: product_id.ok_or("item requires product=<uuid>")?,
        quantity: quantity.ok_or("item requires quantity=<n>")?,
        unit_price,
    })
}

fn parse_reception_line(raw: &str) -> Result<ReceptionLineRequest, String> {
    let mut order_line_id = None;
    let mut received = None;
    let mut rejected = 0;
    let mut reason = None;

    for part in raw.split(',') {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| format!("invalid segment '{part}', expected key=value"))?;
        let value = value.trim();

        match key.trim() {
            "line" => {
                order_line_id =
                    Some(Uuid::parse_str(value).map_err(|_| format!("invalid line id '{value}'"))?)
            }
            "received" => {
                received = Some(
                    value
                        .parse::<i32>()
                        .map_err(|_| format!("invalid received quantity '{value}'"))?,
                )
            }
            "rejected" => {
                rejected = value
                    .parse::<i32>()
                    .map_err(|_| format!("invalid rejected quantity '{value}'"))?
            }
            "reason" => reason = Some(value.to_string()),
            other => return Err(format!("unknown line field '{other}'")),
        }
    }

    Ok(ReceptionLineRequest {
        order_line_id: order_line_id.ok_or("line requires line=<uuid>")?,
        quantity_received: received.unwrap_or(0),
        quantity_rejected: rejected,
        rejection_reason: reason,
        quality_status: None,
    })
}

fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw).map_err(|_| format!("invalid decimal '{raw}'"))
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{raw}', expected YYYY-MM-DD"))
}

fn parse_status(raw: &str) -> Result<PurchaseOrderStatus, String> {
    PurchaseOrderStatus::from_str(raw).map_err(|_| format!("unknown status '{raw}'"))
}
