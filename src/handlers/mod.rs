pub mod accounts;
pub mod cart;
pub mod catalog;
pub mod common;
pub mod inventory;
pub mod orders;

use crate::{
    auth::AuthService,
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        accounts::AccountService, cart::CartService, catalog::CatalogService,
        checkout::CheckoutService, inventory::InventoryService, invoice::InvoiceService,
        orders::OrderService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<AuthService>,
    pub accounts: Arc<AccountService>,
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub inventory: Arc<InventoryService>,
    pub invoices: Arc<InvoiceService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        auth_service: Arc<AuthService>,
        config: &AppConfig,
    ) -> Self {
        Self {
            accounts: Arc::new(AccountService::new(
                db_pool.clone(),
                event_sender.clone(),
                auth_service.clone(),
            )),
            catalog: Arc::new(CatalogService::new(
                db_pool.clone(),
                event_sender.clone(),
                config.catalog_page_size,
            )),
            cart: Arc::new(CartService::new(db_pool.clone(), event_sender.clone())),
            checkout: Arc::new(CheckoutService::new(db_pool.clone(), event_sender.clone())),
            orders: Arc::new(OrderService::new(
                db_pool.clone(),
                event_sender.clone(),
                config.orders_page_size,
            )),
            inventory: Arc::new(InventoryService::new(
                db_pool.clone(),
                event_sender,
                config.movements_page_size,
            )),
            invoices: Arc::new(InvoiceService::new(
                db_pool,
                config.pharmacy_name.clone(),
                config.currency_symbol.clone(),
            )),
            auth: auth_service,
        }
    }
}
