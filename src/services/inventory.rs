use crate::{
    db::DbPool,
    entities::{
        category,
        medicine::{self, Entity as Medicine},
        stock_movement::{self, Entity as StockMovement, MovementType},
        user,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::Page,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait,
    FromQueryResult, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Result of applying one movement to a stock level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChange {
    pub new_stock: i32,
    /// Quantity written to the audit row
    pub recorded_quantity: i32,
}

/// Stock arithmetic shared by every stock mutation.
///
/// `out` floors at zero without failing; `adjustment` sets the level and
/// records the signed delta. An `in` that would overflow the stock level is
/// rejected rather than clamped.
pub fn apply_movement(
    current: i32,
    movement_type: MovementType,
    quantity: i32,
) -> Result<StockChange, ServiceError> {
    let change = match movement_type {
        MovementType::In => StockChange {
            new_stock: current.checked_add(quantity).ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "adding {} units to a stock of {} exceeds the maximum stock level",
                    quantity, current
                ))
            })?,
            recorded_quantity: quantity,
        },
        MovementType::Out => StockChange {
            new_stock: current.saturating_sub(quantity).max(0),
            recorded_quantity: quantity,
        },
        MovementType::Adjustment => StockChange {
            new_stock: quantity,
            recorded_quantity: quantity.saturating_sub(current),
        },
    };
    Ok(change)
}

/// `in` and `out` move at least one unit; an adjustment may set the level to zero
pub fn validate_movement_quantity(
    movement_type: MovementType,
    quantity: i32,
) -> Result<(), ServiceError> {
    let minimum = match movement_type {
        MovementType::In | MovementType::Out => 1,
        MovementType::Adjustment => 0,
    };
    if quantity < minimum {
        return Err(ServiceError::ValidationError(format!(
            "quantity must be at least {} for a '{}' movement",
            minimum, movement_type
        )));
    }
    Ok(())
}

/// Medicine row after a movement plus the audit entry written with it
#[derive(Debug, Clone)]
pub struct RecordedMovement {
    pub medicine: medicine::Model,
    pub movement: stock_movement::Model,
}

/// Loads a medicine for a stock mutation, locking the row where the backend supports it
pub(crate) async fn find_medicine_for_update<C: ConnectionTrait>(
    conn: &C,
    medicine_id: Uuid,
) -> Result<medicine::Model, ServiceError> {
    let mut query = Medicine::find_by_id(medicine_id);
    if conn.get_database_backend() == DbBackend::Postgres {
        query = query.lock_exclusive();
    }
    query
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Medicine {} not found", medicine_id)))
}

/// Updates the stock level and appends its audit row on the same connection.
///
/// Callers pass a transaction so the pair commits or rolls back together.
pub(crate) async fn record_movement<C: ConnectionTrait>(
    conn: &C,
    medicine: medicine::Model,
    movement_type: MovementType,
    quantity: i32,
    reason: String,
    user_id: Option<Uuid>,
) -> Result<RecordedMovement, ServiceError> {
    validate_movement_quantity(movement_type, quantity)?;

    let now = Utc::now();
    let change = apply_movement(medicine.stock_quantity, movement_type, quantity)?;
    let medicine_id = medicine.id;

    let mut active: medicine::ActiveModel = medicine.into();
    active.stock_quantity = Set(change.new_stock);
    active.updated_at = Set(now);
    let medicine = active.update(conn).await?;

    let movement = stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        medicine_id: Set(medicine_id),
        movement_type: Set(movement_type),
        quantity: Set(change.recorded_quantity),
        reason: Set(reason),
        user_id: Set(user_id),
        created_at: Set(now),
    }
    .insert(conn)
    .await?;

    counter!("pharmacy.stock_movements", 1, "type" => movement_type.to_string());

    Ok(RecordedMovement { medicine, movement })
}

/// Emits the events that follow a committed stock movement
pub(crate) async fn announce_movement(event_sender: &EventSender, recorded: &RecordedMovement) {
    let medicine = &recorded.medicine;
    event_sender
        .send_or_log(Event::StockMoved {
            medicine_id: medicine.id,
            movement_type: recorded.movement.movement_type,
            quantity: recorded.movement.quantity,
            new_stock: medicine.stock_quantity,
        })
        .await;

    if medicine.is_low_stock() {
        event_sender
            .send_or_log(Event::LowStockDetected {
                medicine_id: medicine.id,
                name: medicine.name.clone(),
                stock_quantity: medicine.stock_quantity,
                minimum_stock: medicine.minimum_stock,
            })
            .await;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct StockUpdateRequest {
    pub movement_type: MovementType,
    pub quantity: i32,
    #[validate(length(max = 200, message = "Reason must be at most 200 characters"))]
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockUpdateResponse {
    pub medicine: medicine::Model,
    pub movement: stock_movement::Model,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MovementFilter {
    pub medicine_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    /// Inclusive, by calendar day (UTC)
    pub date_from: Option<NaiveDate>,
    /// Inclusive, by calendar day (UTC)
    pub date_to: Option<NaiveDate>,
    pub page: Option<u64>,
}

/// Audit row joined with the names shown in the history
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MovementEntry {
    #[serde(flatten)]
    pub movement: stock_movement::Model,
    pub medicine_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PopularMedicine {
    pub medicine_id: Uuid,
    pub name: String,
    pub sold_quantity: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InventoryDashboard {
    pub total_medicines: u64,
    pub total_categories: u64,
    pub low_stock_count: u64,
    pub out_of_stock_count: u64,
    /// Sum of stock quantity times unit price over all medicines
    pub total_stock_value: Decimal,
    pub popular_medicines: Vec<PopularMedicine>,
    pub recent_movements: Vec<MovementEntry>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LowStockReport {
    pub low_stock: Vec<medicine::Model>,
    pub out_of_stock: Vec<medicine::Model>,
}

#[derive(Debug, FromQueryResult)]
struct SoldQuantityRow {
    medicine_id: Uuid,
    sold_quantity: Option<i64>,
}

fn start_of_day(date: NaiveDate) -> Result<DateTime<Utc>, ServiceError> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| ServiceError::InvalidInput(format!("Invalid date {}", date)))
}

/// Staff-side stock management and reporting
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    movements_page_size: u64,
}

impl InventoryService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, movements_page_size: u64) -> Self {
        Self {
            db_pool,
            event_sender,
            movements_page_size,
        }
    }

    /// Applies a staff stock movement and records it, atomically
    #[instrument(skip(self, request), fields(movement_type = %request.movement_type, quantity = request.quantity))]
    pub async fn update_stock(
        &self,
        medicine_id: Uuid,
        request: StockUpdateRequest,
        actor_id: Uuid,
    ) -> Result<StockUpdateResponse, ServiceError> {
        request.validate()?;
        validate_movement_quantity(request.movement_type, request.quantity)?;

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for stock update");
            ServiceError::DatabaseError(e)
        })?;

        let medicine = find_medicine_for_update(&txn, medicine_id).await?;
        let previous = medicine.stock_quantity;
        let recorded = record_movement(
            &txn,
            medicine,
            request.movement_type,
            request.quantity,
            request.reason.trim().to_string(),
            Some(actor_id),
        )
        .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %medicine_id, "Failed to commit stock update");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            %medicine_id,
            previous,
            new_stock = recorded.medicine.stock_quantity,
            "Stock updated"
        );
        announce_movement(&self.event_sender, &recorded).await;

        Ok(StockUpdateResponse {
            medicine: recorded.medicine,
            movement: recorded.movement,
        })
    }

    /// Movement history, newest first
    #[instrument(skip(self))]
    pub async fn list_movements(
        &self,
        filter: MovementFilter,
    ) -> Result<Page<MovementEntry>, ServiceError> {
        let db = &*self.db_pool;
        let page = filter.page.filter(|p| *p > 0).unwrap_or(1);
        let per_page = self.movements_page_size;

        let mut query = StockMovement::find();
        if let Some(medicine_id) = filter.medicine_id {
            query = query.filter(stock_movement::Column::MedicineId.eq(medicine_id));
        }
        if let Some(movement_type) = filter.movement_type {
            query = query.filter(stock_movement::Column::MovementType.eq(movement_type));
        }
        if let Some(date_from) = filter.date_from {
            query = query.filter(stock_movement::Column::CreatedAt.gte(start_of_day(date_from)?));
        }
        if let Some(date_to) = filter.date_to {
            if let Some(next_day) = date_to.succ_opt() {
                query = query.filter(stock_movement::Column::CreatedAt.lt(start_of_day(next_day)?));
            }
        }

        let paginator = query
            .order_by_desc(stock_movement::Column::CreatedAt)
            .paginate(db, per_page);
        let total = paginator.num_items().await?;
        let movements = paginator.fetch_page(page - 1).await?;

        Ok(Page {
            items: self.describe_movements(movements).await?,
            total,
            page,
            per_page,
        })
    }

    /// Headline numbers for the back office
    #[instrument(skip(self))]
    pub async fn dashboard(&self) -> Result<InventoryDashboard, ServiceError> {
        let db = &*self.db_pool;

        let total_medicines = Medicine::find().count(db).await?;
        let total_categories = category::Entity::find().count(db).await?;
        let low_stock_count = Medicine::find()
            .filter(
                Expr::col(medicine::Column::StockQuantity)
                    .lte(Expr::col(medicine::Column::MinimumStock)),
            )
            .count(db)
            .await?;
        let out_of_stock_count = Medicine::find()
            .filter(medicine::Column::StockQuantity.eq(0))
            .count(db)
            .await?;

        let stock_rows: Vec<(i32, Decimal)> = Medicine::find()
            .select_only()
            .column(medicine::Column::StockQuantity)
            .column(medicine::Column::Price)
            .into_tuple()
            .all(db)
            .await?;
        let total_stock_value = stock_rows
            .into_iter()
            .map(|(stock, price)| price * Decimal::from(stock))
            .sum::<Decimal>()
            .round_dp(2);

        let sold: Vec<SoldQuantityRow> = StockMovement::find()
            .select_only()
            .column(stock_movement::Column::MedicineId)
            .column_as(
                Expr::col(stock_movement::Column::Quantity).sum(),
                "sold_quantity",
            )
            .filter(stock_movement::Column::MovementType.eq(MovementType::Out))
            .group_by(stock_movement::Column::MedicineId)
            .order_by(Expr::cust("sold_quantity"), Order::Desc)
            .limit(5)
            .into_model::<SoldQuantityRow>()
            .all(db)
            .await?;

        let names: HashMap<Uuid, String> = Medicine::find()
            .filter(medicine::Column::Id.is_in(sold.iter().map(|row| row.medicine_id)))
            .all(db)
            .await?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect();
        let popular_medicines = sold
            .into_iter()
            .map(|row| PopularMedicine {
                name: names.get(&row.medicine_id).cloned().unwrap_or_default(),
                medicine_id: row.medicine_id,
                sold_quantity: row.sold_quantity.unwrap_or(0),
            })
            .collect();

        let recent = StockMovement::find()
            .order_by_desc(stock_movement::Column::CreatedAt)
            .limit(10)
            .all(db)
            .await?;

        Ok(InventoryDashboard {
            total_medicines,
            total_categories,
            low_stock_count,
            out_of_stock_count,
            total_stock_value,
            popular_medicines,
            recent_movements: self.describe_movements(recent).await?,
        })
    }

    /// Medicines at or below their threshold, and those with no stock at all
    #[instrument(skip(self))]
    pub async fn low_stock_report(&self) -> Result<LowStockReport, ServiceError> {
        let db = &*self.db_pool;

        let low_stock = Medicine::find()
            .filter(
                Expr::col(medicine::Column::StockQuantity)
                    .lte(Expr::col(medicine::Column::MinimumStock)),
            )
            .order_by_asc(medicine::Column::StockQuantity)
            .order_by_asc(medicine::Column::Name)
            .all(db)
            .await?;
        let out_of_stock = Medicine::find()
            .filter(medicine::Column::StockQuantity.eq(0))
            .order_by_asc(medicine::Column::Name)
            .all(db)
            .await?;

        Ok(LowStockReport {
            low_stock,
            out_of_stock,
        })
    }

    async fn describe_movements(
        &self,
        movements: Vec<stock_movement::Model>,
    ) -> Result<Vec<MovementEntry>, ServiceError> {
        let db = &*self.db_pool;

        let medicine_names: HashMap<Uuid, String> = Medicine::find()
            .filter(medicine::Column::Id.is_in(movements.iter().map(|m| m.medicine_id)))
            .all(db)
            .await?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect();
        let usernames: HashMap<Uuid, String> = user::Entity::find()
            .filter(user::Column::Id.is_in(movements.iter().filter_map(|m| m.user_id)))
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect();

        Ok(movements
            .into_iter()
            .map(|movement| MovementEntry {
                medicine_name: medicine_names
                    .get(&movement.medicine_id)
                    .cloned()
                    .unwrap_or_default(),
                username: movement.user_id.and_then(|id| usernames.get(&id).cloned()),
                movement,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn adjustment_records_signed_delta() {
        assert_eq!(
            apply_movement(10, MovementType::Adjustment, 4).unwrap(),
            StockChange {
                new_stock: 4,
                recorded_quantity: -6
            }
        );
    }

    #[test]
    fn out_floors_at_zero_and_records_request() {
        assert_eq!(
            apply_movement(3, MovementType::Out, 5).unwrap(),
            StockChange {
                new_stock: 0,
                recorded_quantity: 5
            }
        );
    }

    #[test]
    fn in_movement_overflow_is_rejected() {
        assert!(matches!(
            apply_movement(5, MovementType::In, i32::MAX),
            Err(ServiceError::ValidationError(_))
        ));
        assert_eq!(
            apply_movement(i32::MAX - 1, MovementType::In, 1).unwrap(),
            StockChange {
                new_stock: i32::MAX,
                recorded_quantity: 1
            }
        );
    }

    #[test]
    fn quantity_minimum_depends_on_type() {
        assert!(validate_movement_quantity(MovementType::In, 0).is_err());
        assert!(validate_movement_quantity(MovementType::Out, -1).is_err());
        assert!(validate_movement_quantity(MovementType::Adjustment, 0).is_ok());
        assert!(validate_movement_quantity(MovementType::Adjustment, -1).is_err());
    }

    #[test]
    fn start_of_day_is_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            start_of_day(date).unwrap().to_rfc3339(),
            "2024-03-09T00:00:00+00:00"
        );
    }

    proptest! {
        #[test]
        fn in_adds_exactly(stock in 0i32..1_000_000, q in 1i32..1_000_000) {
            let change = apply_movement(stock, MovementType::In, q).unwrap();
            prop_assert_eq!(change.new_stock, stock + q);
            prop_assert_eq!(change.recorded_quantity, q);
        }

        #[test]
        fn out_never_goes_negative(stock in 0i32..1_000_000, q in 1i32..1_000_000) {
            let change = apply_movement(stock, MovementType::Out, q).unwrap();
            prop_assert!(change.new_stock >= 0);
            prop_assert_eq!(change.new_stock, (stock - q).max(0));
            prop_assert_eq!(change.recorded_quantity, q);
        }

        #[test]
        fn adjustment_delta_reconstructs_level(stock in 0i32..1_000_000, v in 0i32..1_000_000) {
            let change = apply_movement(stock, MovementType::Adjustment, v).unwrap();
            prop_assert_eq!(change.new_stock, v);
            prop_assert_eq!(stock + change.recorded_quantity, v);
        }
    }
}
