use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A sellable pharmaceutical product with its price and stock level
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "medicines")]
#[schema(as = Medicine)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub category_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub price: Decimal,
    pub requires_prescription: bool,
    pub active_ingredient: String,
    pub dosage: String,
    pub manufacturer: String,
    pub expiry_date: NaiveDate,
    pub stock_quantity: i32,
    /// Alert threshold: the medicine is low on stock at or below this level
    pub minimum_stock: i32,
    /// Can be false while stock remains, e.g. a temporary withdrawal
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.minimum_stock
    }

    pub fn is_in_stock(&self) -> bool {
        self.stock_quantity > 0
    }

    /// Listed in the public catalog and orderable right now
    pub fn is_purchasable(&self) -> bool {
        self.is_available && self.is_in_stock()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id",
        on_delete = "Restrict"
    )]
    Category,
    #[sea_orm(has_many = "super::stock_movement::Entity")]
    StockMovements,
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::stock_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockMovements.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn medicine(stock: i32, minimum: i32) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            name: "Paracetamol 500mg".into(),
            description: "Analgesic".into(),
            category_id: Uuid::new_v4(),
            price: dec!(3.50),
            requires_prescription: false,
            active_ingredient: "Paracetamol".into(),
            dosage: "1 tablet up to 3 times a day".into(),
            manufacturer: "Generic Labs".into(),
            expiry_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            stock_quantity: stock,
            minimum_stock: minimum,
            is_available: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(medicine(10, 10).is_low_stock());
        assert!(!medicine(11, 10).is_low_stock());
        assert!(medicine(0, 0).is_low_stock());
    }

    #[test]
    fn out_of_stock_is_not_purchasable() {
        assert!(!medicine(0, 10).is_in_stock());
        assert!(!medicine(0, 10).is_purchasable());

        let mut withdrawn = medicine(50, 10);
        withdrawn.is_available = false;
        assert!(withdrawn.is_in_stock());
        assert!(!withdrawn.is_purchasable());
    }

    proptest! {
        #[test]
        fn low_stock_matches_threshold(stock in 0i32..10_000, minimum in 0i32..10_000) {
            let m = medicine(stock, minimum);
            prop_assert_eq!(m.is_low_stock(), stock <= minimum);
            prop_assert_eq!(m.is_in_stock(), stock > 0);
        }
    }
}
