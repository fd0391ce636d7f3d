use crate::{
    db::DbPool,
    entities::{
        medicine::{self, Entity as Medicine},
        order::{self, Entity as Order, OrderStatus},
        order_item::{self, Entity as OrderItem},
        stock_movement::MovementType,
        user,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        inventory::{announce_movement, find_medicine_for_update, record_movement},
        page_params, Page,
    },
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderLine {
    pub item_id: Uuid,
    pub medicine_id: Uuid,
    pub medicine_name: String,
    pub requires_prescription: bool,
    pub quantity: i32,
    /// Unit price captured at checkout
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: order::Model,
    pub status_label: String,
    pub items: Vec<OrderLine>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderSummary {
    #[serde(flatten)]
    pub order: order::Model,
    pub status_label: String,
    pub customer: String,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    /// Only accepted together with `ready`
    pub pickup_date: Option<DateTime<Utc>>,
}

/// Checks a requested status change against the order lifecycle
pub fn check_transition(
    current: OrderStatus,
    request: &UpdateStatusRequest,
) -> Result<(), ServiceError> {
    if current.is_final() {
        return Err(ServiceError::InvalidStatus(format!(
            "order is already {} and can no longer change",
            current
        )));
    }
    if !current.can_transition_to(request.status) {
        return Err(ServiceError::InvalidStatus(format!(
            "cannot move an order from '{}' to '{}'",
            current, request.status
        )));
    }
    if request.pickup_date.is_some() && request.status != OrderStatus::Ready {
        return Err(ServiceError::InvalidInput(
            "pickup_date can only be set when marking an order ready".to_string(),
        ));
    }
    Ok(())
}

/// Loads an order for a status change, locking the row where the backend supports it
async fn find_order_for_update<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<order::Model, ServiceError> {
    let mut query = Order::find_by_id(order_id);
    if conn.get_database_backend() == DbBackend::Postgres {
        query = query.lock_exclusive();
    }
    query
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
}

/// Builds the detailed view of an order with its lines
pub(crate) async fn load_detail<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> Result<OrderDetail, ServiceError> {
    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .all(conn)
        .await?;
    let medicines: HashMap<Uuid, medicine::Model> = Medicine::find()
        .filter(medicine::Column::Id.is_in(items.iter().map(|i| i.medicine_id)))
        .all(conn)
        .await?
        .into_iter()
        .map(|m| (m.id, m))
        .collect();

    let mut lines: Vec<OrderLine> = items
        .into_iter()
        .map(|item| {
            let medicine = medicines.get(&item.medicine_id);
            OrderLine {
                item_id: item.id,
                medicine_id: item.medicine_id,
                medicine_name: medicine.map(|m| m.name.clone()).unwrap_or_default(),
                requires_prescription: medicine.map(|m| m.requires_prescription).unwrap_or(false),
                quantity: item.quantity,
                unit_price: item.price,
                total_price: item.total_price().round_dp(2),
            }
        })
        .collect();
    lines.sort_by(|a, b| a.medicine_name.cmp(&b.medicine_name));

    Ok(OrderDetail {
        status_label: order.status.label().to_string(),
        order,
        items: lines,
    })
}

/// Order history for customers and the order back office for staff
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    page_size: u64,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, page_size: u64) -> Self {
        Self {
            db_pool,
            event_sender,
            page_size,
        }
    }

    /// The caller's orders, newest first
    #[instrument(skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        page: Option<u64>,
        per_page: Option<u64>,
    ) -> Result<Page<OrderSummary>, ServiceError> {
        let query = OrderListQuery {
            status: None,
            page,
            per_page,
        };
        self.list(query, Some(user_id)).await
    }

    /// All orders, newest first, optionally filtered by status
    #[instrument(skip(self))]
    pub async fn list_all(&self, query: OrderListQuery) -> Result<Page<OrderSummary>, ServiceError> {
        self.list(query, None).await
    }

    /// `owner` restricts the lookup to that user's orders; others read as missing
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        owner: Option<Uuid>,
    ) -> Result<OrderDetail, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db_pool)
            .await?
            .filter(|o| owner.map_or(true, |user_id| o.user_id == user_id))
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        load_detail(&*self.db_pool, order).await
    }

    /// Moves an order along its lifecycle.
    ///
    /// Cancelling returns every line to stock with an `in` movement in the
    /// same transaction as the status change.
    #[instrument(skip(self, request), fields(status = %request.status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        request: UpdateStatusRequest,
        actor_id: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order status update");
            ServiceError::DatabaseError(e)
        })?;

        let order = find_order_for_update(&txn, order_id).await?;
        let old_status = order.status;
        check_transition(old_status, &request)?;

        let mut restocked = Vec::new();
        if request.status == OrderStatus::Cancelled {
            let items = OrderItem::find()
                .filter(order_item::Column::OrderId.eq(order_id))
                .all(&txn)
                .await?;
            for item in items {
                let medicine = find_medicine_for_update(&txn, item.medicine_id).await?;
                restocked.push(
                    record_movement(
                        &txn,
                        medicine,
                        MovementType::In,
                        item.quantity,
                        format!("Order {} cancelled", order.order_number),
                        Some(actor_id),
                    )
                    .await?,
                );
            }
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(request.status);
        if request.pickup_date.is_some() {
            active.pickup_date = Set(request.pickup_date);
        }
        active.updated_at = Set(Utc::now());
        let order = active.update(&txn).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %order_id, "Failed to commit order status update");
            ServiceError::DatabaseError(e)
        })?;

        counter!("pharmacy.order_status_changes", 1, "status" => request.status.to_string());
        info!(%order_id, %old_status, new_status = %request.status, "Order status updated");

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status: request.status,
            })
            .await;
        for recorded in &restocked {
            announce_movement(&self.event_sender, recorded).await;
        }

        load_detail(&*self.db_pool, order).await
    }

    async fn list(
        &self,
        query: OrderListQuery,
        owner: Option<Uuid>,
    ) -> Result<Page<OrderSummary>, ServiceError> {
        let db = &*self.db_pool;
        let (page, per_page) = page_params(query.page, query.per_page, self.page_size);

        let mut select = Order::find();
        if let Some(user_id) = owner {
            select = select.filter(order::Column::UserId.eq(user_id));
        }
        if let Some(status) = query.status {
            select = select.filter(order::Column::Status.eq(status));
        }

        let paginator = select
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        let customers: HashMap<Uuid, String> = user::Entity::find()
            .filter(user::Column::Id.is_in(orders.iter().map(|o| o.user_id)))
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect();

        Ok(Page {
            items: orders
                .into_iter()
                .map(|order| OrderSummary {
                    status_label: order.status.label().to_string(),
                    customer: customers.get(&order.user_id).cloned().unwrap_or_default(),
                    order,
                })
                .collect(),
            total,
            page,
            per_page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(status: OrderStatus) -> UpdateStatusRequest {
        UpdateStatusRequest {
            status,
            pickup_date: None,
        }
    }

    #[test]
    fn lifecycle_transitions_are_enforced() {
        assert!(check_transition(OrderStatus::Pending, &request(OrderStatus::Confirmed)).is_ok());
        assert!(check_transition(OrderStatus::Ready, &request(OrderStatus::Cancelled)).is_ok());

        assert!(matches!(
            check_transition(OrderStatus::Pending, &request(OrderStatus::Completed)),
            Err(ServiceError::InvalidStatus(_))
        ));
        assert!(matches!(
            check_transition(OrderStatus::Cancelled, &request(OrderStatus::Pending)),
            Err(ServiceError::InvalidStatus(_))
        ));
    }

    #[test]
    fn final_orders_reject_every_change() {
        for status in [OrderStatus::Cancelled, OrderStatus::Completed] {
            let err = check_transition(status, &request(OrderStatus::Cancelled)).unwrap_err();
            assert!(err.to_string().contains("can no longer change"), "{err}");
        }
    }

    #[test]
    fn pickup_date_only_with_ready() {
        let mut ready = request(OrderStatus::Ready);
        ready.pickup_date = Some(Utc::now());
        assert!(check_transition(OrderStatus::Confirmed, &ready).is_ok());

        let mut confirmed = request(OrderStatus::Confirmed);
        confirmed.pickup_date = Some(Utc::now());
        assert!(matches!(
            check_transition(OrderStatus::Pending, &confirmed),
            Err(ServiceError::InvalidInput(_))
        ));
    }
}
