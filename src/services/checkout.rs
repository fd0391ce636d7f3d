use crate::{
    db::DbPool,
    entities::{
        cart::{self, Entity as Cart},
        cart_item::{self, Entity as CartItem},
        order::{self, generate_order_number, Entity as Order, OrderStatus},
        order_item,
        stock_movement::MovementType,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        inventory::{announce_movement, find_medicine_for_update, record_movement},
        orders::{load_detail, OrderDetail},
    },
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

const ORDER_NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

/// Picks an order number not used by any existing order
async fn unique_order_number<C: ConnectionTrait>(conn: &C) -> Result<String, ServiceError> {
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let candidate = generate_order_number();
        let taken = Order::find()
            .filter(order::Column::OrderNumber.eq(candidate.as_str()))
            .count(conn)
            .await?;
        if taken == 0 {
            return Ok(candidate);
        }
        warn!(order_number = %candidate, "Order number collision, retrying");
    }
    Err(ServiceError::InternalError(
        "could not allocate a unique order number".to_string(),
    ))
}

/// Converts a cart into an order
#[derive(Clone)]
pub struct CheckoutService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CheckoutService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Places an order from the caller's cart.
    ///
    /// Every line is checked against the medicine's availability and its
    /// stock as read inside the transaction. Any failure rolls back the
    /// whole checkout; on success the stock is decremented with one `out`
    /// movement per line and the cart is deleted.
    #[instrument(skip(self, request))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<OrderDetail, ServiceError> {
        request.validate()?;

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start checkout transaction");
            ServiceError::DatabaseError(e)
        })?;

        let mut cart_query = Cart::find().filter(cart::Column::UserId.eq(user_id));
        if txn.get_database_backend() == DbBackend::Postgres {
            cart_query = cart_query.lock_exclusive();
        }
        let cart = cart_query.one(&txn).await?.ok_or(ServiceError::EmptyCart)?;
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::Id)
            .all(&txn)
            .await?;
        if items.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let mut lines = Vec::with_capacity(items.len());
        for item in &items {
            let medicine = find_medicine_for_update(&txn, item.medicine_id).await?;
            if !medicine.is_available {
                return Err(ServiceError::InvalidOperation(format!(
                    "{} is no longer available",
                    medicine.name
                )));
            }
            if medicine.stock_quantity < item.quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "{}: {} requested, {} in stock",
                    medicine.name, item.quantity, medicine.stock_quantity
                )));
            }
            lines.push((medicine, item.quantity));
        }

        let total_amount = lines
            .iter()
            .map(|(medicine, quantity)| medicine.price * Decimal::from(*quantity))
            .sum::<Decimal>()
            .round_dp(2);

        let now = Utc::now();
        let order_number = unique_order_number(&txn).await?;
        let notes = request
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(order_number.clone()),
            user_id: Set(user_id),
            status: Set(OrderStatus::Pending),
            total_amount: Set(total_amount),
            notes: Set(notes),
            pickup_date: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut movements = Vec::with_capacity(lines.len());
        for (medicine, quantity) in lines {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                medicine_id: Set(medicine.id),
                quantity: Set(quantity),
                price: Set(medicine.price),
            }
            .insert(&txn)
            .await?;

            movements.push(
                record_movement(
                    &txn,
                    medicine,
                    MovementType::Out,
                    quantity,
                    format!("Order {}", order_number),
                    Some(user_id),
                )
                .await?,
            );
        }

        let cleared = CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        let removed = cart.delete(&txn).await?;
        if cleared.rows_affected != items.len() as u64 || removed.rows_affected != 1 {
            return Err(ServiceError::Conflict(
                "The cart changed during checkout, please try again".to_string(),
            ));
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, %order_number, "Failed to commit checkout");
            ServiceError::DatabaseError(e)
        })?;

        counter!("pharmacy.checkouts", 1);
        info!(order_id = %order.id, %order_number, %total_amount, "Order placed");

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: order.id,
                order_number,
                user_id,
            })
            .await;
        for recorded in &movements {
            announce_movement(&self.event_sender, recorded).await;
        }

        load_detail(&*self.db_pool, order).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notes_are_bounded() {
        let request = CheckoutRequest {
            notes: Some("x".repeat(1001)),
        };
        assert!(request.validate().is_err());
        assert!(CheckoutRequest::default().validate().is_ok());
    }
}
