//! Purchase-order fulfillment and reception reconciliation.
//!
//! Purchase orders are created in `Draft`, submitted, and then reconciled
//! against one or more receptions. Each reception is applied atomically:
//! reception records, product stock and the order status change together or
//! not at all.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod commands;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod models;
pub mod repositories;
pub mod services;

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tokio::sync::mpsc;
use tracing::info;

pub use errors::{ErrorKind, OperationResponse, ServiceError};
pub use services::procurement::ProcurementService;

/// Everything a front end needs to drive the procurement service.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub procurement: ProcurementService,
}

impl AppState {
    /// Connects to the database, runs migrations when `auto_migrate` is set,
    /// and wires the procurement service to a fresh event channel. The
    /// receiver is returned for the caller to drain.
    pub async fn build(
        config: config::AppConfig,
    ) -> Result<(Self, mpsc::Receiver<events::Event>), ServiceError> {
        let pool = db::establish_connection_from_app_config(&config).await?;
        if config.auto_migrate {
            db::run_migrations(&pool).await?;
        }

        let db = Arc::new(pool);
        let (sender, rx) = events::EventSender::channel(config.event_channel_capacity);
        let event_sender = Arc::new(sender);
        let procurement = ProcurementService::new(
            db.clone(),
            event_sender.clone(),
            config.procurement_settings(),
        );

        info!(
            environment = %config.environment,
            over_receipt_policy = %config.over_receipt_policy,
            "Procurement service ready"
        );

        Ok((
            Self {
                db,
                config,
                event_sender,
                procurement,
            },
            rx,
        ))
    }
}
