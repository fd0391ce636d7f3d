use crate::{
    db::DbPool,
    entities::{
        category::{self, Entity as Category},
        medicine::{self, Entity as Medicine},
        order_item,
        stock_movement::{self, MovementType},
    },
    errors::ServiceError,
    events::EventSender,
    services::{
        inventory::{announce_movement, record_movement},
        page_params, Page,
    },
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

const FEATURED_MEDICINES: u64 = 8;
const HOME_CATEGORIES: u64 = 6;

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() || price.is_zero() {
        return Err(ValidationError::new("price_must_be_positive"));
    }
    if price.scale() > 2 {
        return Err(ValidationError::new("price_has_too_many_decimals"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 100, message = "Category name must be 1-100 characters"))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateMedicineRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category_id: Uuid,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[serde(default)]
    pub requires_prescription: bool,
    #[validate(length(max = 200))]
    #[serde(default)]
    pub active_ingredient: String,
    #[validate(length(max = 100))]
    #[serde(default)]
    pub dosage: String,
    #[validate(length(max = 100))]
    #[serde(default)]
    pub manufacturer: String,
    pub expiry_date: NaiveDate,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    #[serde(default)]
    pub stock_quantity: i32,
    #[validate(range(min = 0, message = "Minimum stock cannot be negative"))]
    #[serde(default = "default_minimum_stock")]
    pub minimum_stock: i32,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

fn default_minimum_stock() -> i32 {
    10
}

fn default_true() -> bool {
    true
}

/// Partial update; stock is only changed through inventory movements
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateMedicineRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    pub requires_prescription: Option<bool>,
    #[validate(length(max = 200))]
    pub active_ingredient: Option<String>,
    #[validate(length(max = 100))]
    pub dosage: Option<String>,
    #[validate(length(max = 100))]
    pub manufacturer: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    #[validate(range(min = 0))]
    pub minimum_stock: Option<i32>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MedicineQuery {
    pub category_id: Option<Uuid>,
    /// Case-insensitive match on name, active ingredient or description
    pub search: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MedicineResponse {
    #[serde(flatten)]
    pub medicine: medicine::Model,
    pub category_name: String,
    pub is_low_stock: bool,
    pub is_in_stock: bool,
}

impl MedicineResponse {
    fn new(medicine: medicine::Model, category_name: String) -> Self {
        Self {
            is_low_stock: medicine.is_low_stock(),
            is_in_stock: medicine.is_in_stock(),
            medicine,
            category_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HomePage {
    pub featured_medicines: Vec<MedicineResponse>,
    pub categories: Vec<category::Model>,
}

/// Categories and medicines, for both the storefront and staff
#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    page_size: u64,
}

impl CatalogService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, page_size: u64) -> Self {
        Self {
            db_pool,
            event_sender,
            page_size,
        }
    }

    /// Newest purchasable medicines and the first categories by name
    #[instrument(skip(self))]
    pub async fn home(&self) -> Result<HomePage, ServiceError> {
        let db = &*self.db_pool;

        let featured = Medicine::find()
            .filter(medicine::Column::IsAvailable.eq(true))
            .filter(medicine::Column::StockQuantity.gt(0))
            .order_by_desc(medicine::Column::CreatedAt)
            .limit(FEATURED_MEDICINES)
            .all(db)
            .await?;
        let categories = Category::find()
            .order_by_asc(category::Column::Name)
            .limit(HOME_CATEGORIES)
            .all(db)
            .await?;

        Ok(HomePage {
            featured_medicines: self.with_category_names(featured).await?,
            categories,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<category::Model>, ServiceError> {
        Ok(Category::find()
            .order_by_asc(category::Column::Name)
            .all(&*self.db_pool)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get_category(&self, category_id: Uuid) -> Result<category::Model, ServiceError> {
        Category::find_by_id(category_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", category_id)))
    }

    #[instrument(skip(self))]
    pub async fn create_category(
        &self,
        request: CategoryRequest,
    ) -> Result<category::Model, ServiceError> {
        request.validate()?;
        let name = request.name.trim().to_string();
        self.ensure_unique_category_name(&name, None).await?;

        let category = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            description: Set(request.description),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db_pool)
        .await?;

        info!(category_id = %category.id, name = %category.name, "Category created");
        Ok(category)
    }

    #[instrument(skip(self))]
    pub async fn update_category(
        &self,
        category_id: Uuid,
        request: CategoryRequest,
    ) -> Result<category::Model, ServiceError> {
        request.validate()?;
        let existing = self.get_category(category_id).await?;
        let name = request.name.trim().to_string();
        self.ensure_unique_category_name(&name, Some(category_id))
            .await?;

        let mut active: category::ActiveModel = existing.into();
        active.name = Set(name);
        active.description = Set(request.description);
        let category = active.update(&*self.db_pool).await?;

        info!(%category_id, "Category updated");
        Ok(category)
    }

    /// Refuses while medicines still belong to the category
    #[instrument(skip(self))]
    pub async fn delete_category(&self, category_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let category = self.get_category(category_id).await?;

        let medicines = Medicine::find()
            .filter(medicine::Column::CategoryId.eq(category_id))
            .count(db)
            .await?;
        if medicines > 0 {
            return Err(ServiceError::Conflict(format!(
                "Category '{}' still has {} medicine(s)",
                category.name, medicines
            )));
        }

        Category::delete_by_id(category_id).exec(db).await?;
        info!(%category_id, "Category deleted");
        Ok(())
    }

    /// Public listing: available and in-stock medicines, ordered by name
    #[instrument(skip(self))]
    pub async fn list_medicines(
        &self,
        query: MedicineQuery,
    ) -> Result<Page<MedicineResponse>, ServiceError> {
        self.query_medicines(query, true).await
    }

    /// Staff listing, including withdrawn and out-of-stock medicines
    #[instrument(skip(self))]
    pub async fn list_all_medicines(
        &self,
        query: MedicineQuery,
    ) -> Result<Page<MedicineResponse>, ServiceError> {
        self.query_medicines(query, false).await
    }

    /// `public` hides medicines that are not available for sale
    #[instrument(skip(self))]
    pub async fn get_medicine(
        &self,
        medicine_id: Uuid,
        public: bool,
    ) -> Result<MedicineResponse, ServiceError> {
        let db = &*self.db_pool;
        let medicine = Medicine::find_by_id(medicine_id)
            .one(db)
            .await?
            .filter(|m| !public || m.is_available)
            .ok_or_else(|| ServiceError::NotFound(format!("Medicine {} not found", medicine_id)))?;

        let category_name = Category::find_by_id(medicine.category_id)
            .one(db)
            .await?
            .map(|c| c.name)
            .unwrap_or_default();
        Ok(MedicineResponse::new(medicine, category_name))
    }

    /// Creates a medicine; a non-zero opening stock is recorded as an `in` movement
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_medicine(
        &self,
        request: CreateMedicineRequest,
        actor_id: Uuid,
    ) -> Result<MedicineResponse, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for medicine creation");
            ServiceError::DatabaseError(e)
        })?;

        let category = Category::find_by_id(request.category_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidInput(format!("Category {} does not exist", request.category_id))
            })?;

        let now = Utc::now();
        let mut medicine = medicine::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            description: Set(request.description),
            category_id: Set(category.id),
            price: Set(request.price),
            requires_prescription: Set(request.requires_prescription),
            active_ingredient: Set(request.active_ingredient),
            dosage: Set(request.dosage),
            manufacturer: Set(request.manufacturer),
            expiry_date: Set(request.expiry_date),
            stock_quantity: Set(0),
            minimum_stock: Set(request.minimum_stock),
            is_available: Set(request.is_available),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut opening = None;
        if request.stock_quantity > 0 {
            let recorded = record_movement(
                &txn,
                medicine,
                MovementType::In,
                request.stock_quantity,
                "Initial stock".to_string(),
                Some(actor_id),
            )
            .await?;
            medicine = recorded.medicine.clone();
            opening = Some(recorded);
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit medicine creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(medicine_id = %medicine.id, stock = medicine.stock_quantity, "Medicine created");
        if let Some(recorded) = &opening {
            announce_movement(&self.event_sender, recorded).await;
        }

        Ok(MedicineResponse::new(medicine, category.name))
    }

    #[instrument(skip(self, request))]
    pub async fn update_medicine(
        &self,
        medicine_id: Uuid,
        request: UpdateMedicineRequest,
    ) -> Result<MedicineResponse, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        let existing = Medicine::find_by_id(medicine_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Medicine {} not found", medicine_id)))?;

        let category_id = request.category_id.unwrap_or(existing.category_id);
        let category = Category::find_by_id(category_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidInput(format!("Category {} does not exist", category_id))
            })?;

        let mut active: medicine::ActiveModel = existing.into();
        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = request.description {
            active.description = Set(description);
        }
        active.category_id = Set(category.id);
        if let Some(price) = request.price {
            active.price = Set(price);
        }
        if let Some(requires_prescription) = request.requires_prescription {
            active.requires_prescription = Set(requires_prescription);
        }
        if let Some(active_ingredient) = request.active_ingredient {
            active.active_ingredient = Set(active_ingredient);
        }
        if let Some(dosage) = request.dosage {
            active.dosage = Set(dosage);
        }
        if let Some(manufacturer) = request.manufacturer {
            active.manufacturer = Set(manufacturer);
        }
        if let Some(expiry_date) = request.expiry_date {
            active.expiry_date = Set(expiry_date);
        }
        if let Some(minimum_stock) = request.minimum_stock {
            active.minimum_stock = Set(minimum_stock);
        }
        if let Some(is_available) = request.is_available {
            active.is_available = Set(is_available);
        }
        active.updated_at = Set(Utc::now());

        let medicine = active.update(db).await?;
        info!(%medicine_id, "Medicine updated");
        Ok(MedicineResponse::new(medicine, category.name))
    }

    /// Medicines with sales or stock history cannot be deleted; withdraw them instead
    #[instrument(skip(self))]
    pub async fn delete_medicine(&self, medicine_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let medicine = Medicine::find_by_id(medicine_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Medicine {} not found", medicine_id)))?;

        let ordered = order_item::Entity::find()
            .filter(order_item::Column::MedicineId.eq(medicine_id))
            .count(db)
            .await?;
        let movements = stock_movement::Entity::find()
            .filter(stock_movement::Column::MedicineId.eq(medicine_id))
            .count(db)
            .await?;
        if ordered > 0 || movements > 0 {
            return Err(ServiceError::Conflict(format!(
                "Medicine '{}' has order or stock history; mark it unavailable instead",
                medicine.name
            )));
        }

        Medicine::delete_by_id(medicine_id).exec(db).await?;
        info!(%medicine_id, "Medicine deleted");
        Ok(())
    }

    async fn query_medicines(
        &self,
        query: MedicineQuery,
        public: bool,
    ) -> Result<Page<MedicineResponse>, ServiceError> {
        let db = &*self.db_pool;
        let (page, per_page) = page_params(query.page, query.per_page, self.page_size);

        let mut select = Medicine::find();
        if public {
            select = select
                .filter(medicine::Column::IsAvailable.eq(true))
                .filter(medicine::Column::StockQuantity.gt(0));
        }
        if let Some(category_id) = query.category_id {
            select = select.filter(medicine::Column::CategoryId.eq(category_id));
        }
        if let Some(search) = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let pattern = format!("%{}%", search.to_lowercase());
            select = select.filter(
                Condition::any()
                    .add(Expr::expr(Func::lower(Expr::col(medicine::Column::Name))).like(pattern.clone()))
                    .add(
                        Expr::expr(Func::lower(Expr::col(medicine::Column::ActiveIngredient)))
                            .like(pattern.clone()),
                    )
                    .add(Expr::expr(Func::lower(Expr::col(medicine::Column::Description))).like(pattern)),
            );
        }

        let paginator = select
            .order_by_asc(medicine::Column::Name)
            .paginate(db, per_page);
        let total = paginator.num_items().await?;
        let medicines = paginator.fetch_page(page - 1).await?;

        Ok(Page {
            items: self.with_category_names(medicines).await?,
            total,
            page,
            per_page,
        })
    }

    async fn with_category_names(
        &self,
        medicines: Vec<medicine::Model>,
    ) -> Result<Vec<MedicineResponse>, ServiceError> {
        let names: HashMap<Uuid, String> = Category::find()
            .filter(category::Column::Id.is_in(medicines.iter().map(|m| m.category_id)))
            .all(&*self.db_pool)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        Ok(medicines
            .into_iter()
            .map(|m| {
                let name = names.get(&m.category_id).cloned().unwrap_or_default();
                MedicineResponse::new(m, name)
            })
            .collect())
    }

    async fn ensure_unique_category_name(
        &self,
        name: &str,
        except: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = Category::find().filter(category::Column::Name.eq(name));
        if let Some(id) = except {
            query = query.filter(category::Column::Id.ne(id));
        }
        if query.count(&*self.db_pool).await? > 0 {
            return Err(ServiceError::Conflict(format!(
                "A category named '{}' already exists",
                name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn price_must_be_positive_with_two_decimals() {
        assert!(validate_price(&dec!(3.50)).is_ok());
        assert!(validate_price(&dec!(0)).is_err());
        assert!(validate_price(&dec!(-1.00)).is_err());
        assert!(validate_price(&dec!(1.005)).is_err());
    }

    #[test]
    fn create_request_defaults() {
        let request: CreateMedicineRequest = serde_json::from_value(serde_json::json!({
            "name": "Ibuprofen 400mg",
            "category_id": Uuid::new_v4(),
            "price": "4.25",
            "expiry_date": "2030-06-30"
        }))
        .unwrap();

        assert_eq!(request.minimum_stock, 10);
        assert_eq!(request.stock_quantity, 0);
        assert!(request.is_available);
        assert!(!request.requires_prescription);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn blank_category_name_is_rejected() {
        let request = CategoryRequest {
            name: String::new(),
            description: None,
        };
        assert!(request.validate().is_err());
    }
}
