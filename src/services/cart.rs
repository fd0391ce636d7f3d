use crate::{
    db::DbPool,
    entities::{
        cart::{self, Entity as Cart},
        cart_item::{self, Entity as CartItem},
        medicine::{self, Entity as Medicine},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub medicine_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CartAction {
    Increase,
    /// Removes the line when the quantity is already 1
    Decrease,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    pub action: CartAction,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartLine {
    pub item_id: Uuid,
    pub medicine_id: Uuid,
    pub medicine_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub total_price: Decimal,
    pub stock_quantity: i32,
    pub requires_prescription: bool,
}

/// The caller's cart priced at current medicine prices
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartView {
    /// `None` until the first item is added
    pub cart_id: Option<Uuid>,
    pub items: Vec<CartLine>,
    pub total_amount: Decimal,
    /// Sum of quantities over all lines
    pub item_count: i32,
}

impl CartView {
    fn empty() -> Self {
        Self {
            cart_id: None,
            items: Vec::new(),
            total_amount: Decimal::ZERO,
            item_count: 0,
        }
    }
}

/// Per-user shopping cart
#[derive(Clone)]
pub struct CartService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let db = &*self.db_pool;
        match Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(db)
            .await?
        {
            Some(cart) => build_view(db, &cart).await,
            None => Ok(CartView::empty()),
        }
    }

    /// Adds one unit, creating the cart on first use.
    ///
    /// A medicine already in the cart is incremented only while its quantity
    /// is below the current stock.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        medicine_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db_pool.begin().await?;

        let medicine = Medicine::find_by_id(medicine_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Medicine {} not found", medicine_id)))?;
        if !medicine.is_available {
            return Err(ServiceError::InvalidOperation(format!(
                "{} is not available for sale",
                medicine.name
            )));
        }
        if !medicine.is_in_stock() {
            return Err(ServiceError::InvalidOperation(format!(
                "{} is out of stock",
                medicine.name
            )));
        }

        let cart = match Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
        {
            Some(cart) => cart,
            None => {
                let now = Utc::now();
                cart::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?
            }
        };

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::MedicineId.eq(medicine_id))
            .one(&txn)
            .await?;

        let quantity = match existing {
            Some(item) => {
                if item.quantity >= medicine.stock_quantity {
                    return Err(ServiceError::InsufficientStock(format!(
                        "Only {} unit(s) of {} in stock",
                        medicine.stock_quantity, medicine.name
                    )));
                }
                let quantity = item.quantity + 1;
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(quantity);
                active.update(&txn).await?;
                quantity
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    medicine_id: Set(medicine_id),
                    quantity: Set(1),
                }
                .insert(&txn)
                .await?;
                1
            }
        };

        let cart = touch(&txn, cart).await?;
        txn.commit().await?;

        info!(cart_id = %cart.id, %medicine_id, quantity, "Added medicine to cart");
        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                medicine_id,
                quantity,
            })
            .await;

        build_view(&*self.db_pool, &cart).await
    }

    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        action: CartAction,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let (cart, item) = find_own_item(&txn, user_id, item_id).await?;

        let removed = match action {
            CartAction::Increase => {
                let medicine = Medicine::find_by_id(item.medicine_id)
                    .one(&txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Medicine {} not found", item.medicine_id))
                    })?;
                if item.quantity >= medicine.stock_quantity {
                    return Err(ServiceError::InsufficientStock(format!(
                        "Only {} unit(s) of {} in stock",
                        medicine.stock_quantity, medicine.name
                    )));
                }
                let quantity = item.quantity + 1;
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(quantity);
                active.update(&txn).await?;
                false
            }
            CartAction::Decrease if item.quantity > 1 => {
                let quantity = item.quantity - 1;
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(quantity);
                active.update(&txn).await?;
                false
            }
            CartAction::Decrease | CartAction::Remove => {
                item.delete(&txn).await?;
                true
            }
        };

        let cart = touch(&txn, cart).await?;
        txn.commit().await?;

        if removed {
            info!(cart_id = %cart.id, %item_id, "Removed cart item");
            self.event_sender
                .send_or_log(Event::CartItemRemoved {
                    cart_id: cart.id,
                    item_id,
                })
                .await;
        }

        build_view(&*self.db_pool, &cart).await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<CartView, ServiceError> {
        self.update_item(user_id, item_id, CartAction::Remove).await
    }
}

/// Resolves a cart item, treating items of other users' carts as missing
async fn find_own_item<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    item_id: Uuid,
) -> Result<(cart::Model, cart_item::Model), ServiceError> {
    let not_found = || ServiceError::NotFound(format!("Cart item {} not found", item_id));

    let cart = Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or_else(not_found)?;
    let item = CartItem::find_by_id(item_id)
        .filter(cart_item::Column::CartId.eq(cart.id))
        .one(conn)
        .await?
        .ok_or_else(not_found)?;
    Ok((cart, item))
}

async fn touch<C: ConnectionTrait>(conn: &C, cart: cart::Model) -> Result<cart::Model, ServiceError> {
    let mut active: cart::ActiveModel = cart.into();
    active.updated_at = Set(Utc::now());
    Ok(active.update(conn).await?)
}

async fn build_view<C: ConnectionTrait>(
    conn: &C,
    cart: &cart::Model,
) -> Result<CartView, ServiceError> {
    let items = CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .all(conn)
        .await?;
    let medicines: HashMap<Uuid, medicine::Model> = Medicine::find()
        .filter(medicine::Column::Id.is_in(items.iter().map(|i| i.medicine_id)))
        .all(conn)
        .await?
        .into_iter()
        .map(|m| (m.id, m))
        .collect();

    let mut lines: Vec<CartLine> = items
        .into_iter()
        .filter_map(|item| {
            let medicine = medicines.get(&item.medicine_id)?;
            Some(CartLine {
                item_id: item.id,
                medicine_id: medicine.id,
                medicine_name: medicine.name.clone(),
                unit_price: medicine.price,
                quantity: item.quantity,
                total_price: (medicine.price * Decimal::from(item.quantity)).round_dp(2),
                stock_quantity: medicine.stock_quantity,
                requires_prescription: medicine.requires_prescription,
            })
        })
        .collect();
    lines.sort_by(|a, b| a.medicine_name.cmp(&b.medicine_name));

    let total_amount = lines.iter().map(|l| l.total_price).sum::<Decimal>();
    let item_count = lines.iter().map(|l| l.quantity).sum();

    Ok(CartView {
        cart_id: Some(cart.id),
        items: lines,
        total_amount,
        item_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_deserialize_lowercase() {
        let request: UpdateCartItemRequest =
            serde_json::from_str(r#"{"action":"decrease"}"#).unwrap();
        assert_eq!(request.action, CartAction::Decrease);
        assert!(serde_json::from_str::<UpdateCartItemRequest>(r#"{"action":"double"}"#).is_err());
    }

    #[test]
    fn empty_view_has_no_cart() {
        let view = CartView::empty();
        assert!(view.cart_id.is_none());
        assert_eq!(view.item_count, 0);
        assert_eq!(view.total_amount, Decimal::ZERO);
    }
}
