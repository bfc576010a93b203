use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::{PurchaseOrderStatus, ReceptionStatus};
use crate::errors::ServiceError;

/// Publishes domain events onto the in-process event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Builds a sender together with the receiving end of a bounded channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), ServiceError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| ServiceError::EventError(format!("Failed to send event: {}", e)))
    }

    /// Sends an event, logging instead of failing when nobody is listening.
    /// Used after a commit, where the write has already succeeded.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "Dropping event");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    PurchaseOrderCreated {
        purchase_order_id: Uuid,
        supplier_id: Uuid,
        line_count: usize,
        skipped_count: usize,
    },
    PurchaseOrderSubmitted(Uuid),
    PurchaseOrderDeleted(Uuid),
    PurchaseOrderStatusChanged {
        purchase_order_id: Uuid,
        old_status: PurchaseOrderStatus,
        new_status: PurchaseOrderStatus,
    },
    GoodsReceived {
        purchase_order_id: Uuid,
        reception_id: Uuid,
        reception_date: NaiveDate,
        status: ReceptionStatus,
        quantity_received: i64,
        quantity_rejected: i64,
    },
    StockIncreased {
        product_id: Uuid,
        quantity: i32,
        new_stock: i32,
        reception_id: Uuid,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::PurchaseOrderCreated { .. } => "purchase_order_created",
            Event::PurchaseOrderSubmitted(_) => "purchase_order_submitted",
            Event::PurchaseOrderDeleted(_) => "purchase_order_deleted",
            Event::PurchaseOrderStatusChanged { .. } => "purchase_order_status_changed",
            Event::GoodsReceived { .. } => "goods_received",
            Event::StockIncreased { .. } => "stock_increased",
        }
    }

    /// The purchase order this event concerns, if any.
    pub fn purchase_order_id(&self) -> Option<Uuid> {
        match self {
            Event::PurchaseOrderCreated {
                purchase_order_id, ..
            }
            | Event::PurchaseOrderStatusChanged {
                purchase_order_id, ..
            }
            | Event::GoodsReceived {
                purchase_order_id, ..
            } => Some(*purchase_order_id),
            Event::PurchaseOrderSubmitted(id) | Event::PurchaseOrderDeleted(id) => Some(*id),
            Event::StockIncreased { .. } => None,
        }
    }
}

// Handlers implementing this trait receive every event from the processing loop.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Writes every event to the log.
#[derive(Debug, Default)]
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: Event) -> Result<(), String> {
        match &event {
            Event::GoodsReceived {
                purchase_order_id,
                reception_id,
                status,
                ..
            } => info!(
                purchase_order_id = %purchase_order_id,
                reception_id = %reception_id,
                status = %status,
                "Goods received"
            ),
            Event::PurchaseOrderStatusChanged {
                purchase_order_id,
                old_status,
                new_status,
            } => info!(
                purchase_order_id = %purchase_order_id,
                old_status = %old_status,
                new_status = %new_status,
                "Purchase order status changed"
            ),
            other => info!(event = other.name(), "Event: {:?}", other),
        }
        Ok(())
    }
}

// Drains the channel and fans each event out to the registered handlers.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Arc<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        let name = event.name();
        let results = join_all(
            handlers
                .iter()
                .map(|handler| handler.handle_event(event.clone())),
        )
        .await;

        for e in results.into_iter().filter_map(Result::err) {
            error!(event = name, error = %e, "Event handler failed");
        }
    }

    info!("Event channel closed, stopping event processing loop");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHandler {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle_event(&self, _event: Event) -> Result<(), String> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle_event(&self, _event: Event) -> Result<(), String> {
            Err("handler unavailable".to_string())
        }
    }

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (sender, mut rx) = EventSender::channel(4);
        let id = Uuid::new_v4();

        sender.send(Event::PurchaseOrderSubmitted(id)).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event, Event::PurchaseOrderSubmitted(id));
        assert_eq!(event.purchase_order_id(), Some(id));
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_gone() {
        let (sender, rx) = EventSender::channel(1);
        drop(rx);

        assert!(sender
            .send(Event::PurchaseOrderDeleted(Uuid::new_v4()))
            .await
            .is_err());
        // Must not panic or surface an error.
        sender
            .send_or_log(Event::PurchaseOrderDeleted(Uuid::new_v4()))
            .await;
    }

    #[tokio::test]
    async fn process_events_reaches_every_handler() {
        let (sender, rx) = EventSender::channel(8);
        let counter = Arc::new(CountingHandler::default());
        let handlers = vec![
            counter.clone() as Arc<dyn EventHandler>,
            Arc::new(FailingHandler) as Arc<dyn EventHandler>,
            Arc::new(LoggingEventHandler) as Arc<dyn EventHandler>,
        ];

        let task = tokio::spawn(process_events(rx, handlers));

        sender
            .send(Event::PurchaseOrderSubmitted(Uuid::new_v4()))
            .await
            .unwrap();
        sender
            .send(Event::StockIncreased {
                product_id: Uuid::new_v4(),
                quantity: 3,
                new_stock: 10,
                reception_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
        drop(sender);

        task.await.unwrap();
        assert_eq!(counter.seen.load(Ordering::SeqCst), 2);
    }
}
