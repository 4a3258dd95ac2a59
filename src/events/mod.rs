use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the consumer is gone.
    /// Domain writes never roll back because the event channel is full.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Failed to publish event");
        }
    }
}

// The events emitted by the sync-and-approval engine. Payloads carry ids
// only; consumers re-read the store for current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Sync events
    ProductSynced {
        business_id: i32,
        product_id: Uuid,
        created: bool,
    },

    // Catalog events (direct API, not device sync)
    ProductCreated {
        business_id: i32,
        product_id: Uuid,
    },
    ProductUpdated {
        business_id: i32,
        product_id: Uuid,
    },
    ProductDeactivated {
        business_id: i32,
        product_id: Uuid,
    },
    SaleSynced {
        business_id: i32,
        sale_id: Uuid,
        pending: bool,
    },

    // Approval events
    SaleApproved {
        business_id: i32,
        sale_id: Uuid,
    },
    SaleRejected {
        business_id: i32,
        sale_id: Uuid,
    },
    SaleReactivated {
        business_id: i32,
        sale_id: Uuid,
    },
    SaleDeactivated {
        business_id: i32,
        sale_id: Uuid,
    },

    // Stock events
    StockAdjusted {
        business_id: i32,
        product_id: Uuid,
        delta: i32,
    },
}

// Function to process incoming events. Today this is a log sink; webhook or
// push-notification fan-out would hang off this loop.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::SaleApproved {
                business_id,
                sale_id,
            } => {
                info!(business_id, sale_id = %sale_id, "sale approved");
            }
            Event::SaleRejected {
                business_id,
                sale_id,
            } => {
                info!(business_id, sale_id = %sale_id, "sale rejected");
            }
            Event::StockAdjusted {
                business_id,
                product_id,
                delta,
            } => {
                info!(business_id, product_id = %product_id, delta, "stock adjusted");
            }
            other => {
                debug!(event = ?other, "event processed");
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);

        sender
            .send(Event::SaleApproved {
                business_id: 1,
                sale_id: Uuid::new_v4(),
            })
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await,
            Some(Event::SaleApproved { business_id: 1, .. })
        ));
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        // Must not panic or error out
        sender
            .send_or_log(Event::ProductSynced {
                business_id: 1,
                product_id: Uuid::new_v4(),
                created: true,
            })
            .await;
    }
}
