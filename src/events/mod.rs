use crate::entities::{MovementType, OrderStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
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
    /// Domain writes are already committed by the time events are emitted.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Things that happened in the storefront, consumed by `process_events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    UserRegistered {
        user_id: Uuid,
        username: String,
    },
    CartItemAdded {
        cart_id: Uuid,
        medicine_id: Uuid,
        quantity: i32,
    },
    CartItemRemoved {
        cart_id: Uuid,
        item_id: Uuid,
    },
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        user_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    StockMoved {
        medicine_id: Uuid,
        movement_type: MovementType,
        quantity: i32,
        new_stock: i32,
    },
    LowStockDetected {
        medicine_id: Uuid,
        name: String,
        stock_quantity: i32,
        minimum_stock: i32,
    },
}

/// Consumes events until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::UserRegistered { user_id, username } => {
                info!(%user_id, %username, "user registered");
            }
            Event::CartItemAdded {
                cart_id,
                medicine_id,
                quantity,
            } => {
                info!(%cart_id, %medicine_id, quantity, "cart item added");
            }
            Event::CartItemRemoved { cart_id, item_id } => {
                info!(%cart_id, %item_id, "cart item removed");
            }
            Event::OrderCreated {
                order_id,
                order_number,
                user_id,
            } => {
                info!(%order_id, %order_number, %user_id, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::StockMoved {
                medicine_id,
                movement_type,
                quantity,
                new_stock,
            } => {
                info!(%medicine_id, %movement_type, quantity, new_stock, "stock moved");
            }
            Event::LowStockDetected {
                medicine_id,
                name,
                stock_quantity,
                minimum_stock,
            } => {
                warn!(
                    %medicine_id,
                    %name,
                    stock_quantity,
                    minimum_stock,
                    "medicine is at or below its minimum stock"
                );
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let id = Uuid::new_v4();

        sender
            .send(Event::UserRegistered {
                user_id: id,
                username: "alice".into(),
            })
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await,
            Some(Event::UserRegistered {
                user_id: id,
                username: "alice".into()
            })
        );
    }

    #[tokio::test]
    async fn send_or_log_survives_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        assert!(sender
            .send(Event::CartItemRemoved {
                cart_id: Uuid::new_v4(),
                item_id: Uuid::new_v4(),
            })
            .await
            .is_err());

        sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: Uuid::new_v4(),
                item_id: Uuid::new_v4(),
            })
            .await;
    }

    #[tokio::test]
    async fn process_events_stops_when_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(process_events(rx));
        tx.send(Event::LowStockDetected {
            medicine_id: Uuid::new_v4(),
            name: "Ibuprofen".into(),
            stock_quantity: 2,
            minimum_stock: 10,
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}
