//! Online pharmacy storefront API
//!
//! Catalog browsing, carts and checkout for customers; catalog, stock and
//! order management for pharmacy staff.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::{AuthRouterExt, AuthService, ROLE_STAFF};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes served under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    use handlers::{accounts, cart, catalog, inventory, orders};

    let public = Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .route("/auth/register", post(accounts::register))
        .route("/auth/login", post(accounts::login))
        .route("/home", get(catalog::home))
        .route("/categories", get(catalog::list_categories))
        .route("/categories/:id", get(catalog::get_category))
        .route("/medicines", get(catalog::list_medicines))
        .route("/medicines/:id", get(catalog::get_medicine));

    let customer = Router::new()
        .route("/auth/logout", post(accounts::logout))
        .route(
            "/profile",
            get(accounts::get_profile).put(accounts::update_profile),
        )
        .route("/cart", get(cart::get_cart))
        .route("/cart/items", post(cart::add_cart_item))
        .route(
            "/cart/items/:item_id",
            put(cart::update_cart_item).delete(cart::remove_cart_item),
        )
        .route("/checkout", post(cart::checkout))
        .route("/orders", get(orders::list_my_orders))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/invoice", get(orders::download_invoice))
        .with_auth();

    let catalog_admin = Router::new()
        .route("/categories", post(catalog::create_category))
        .route(
            "/categories/:id",
            put(catalog::update_category).delete(catalog::delete_category),
        )
        .route("/medicines", post(catalog::create_medicine))
        .route(
            "/medicines/:id",
            put(catalog::update_medicine).delete(catalog::delete_medicine),
        )
        .route("/admin/medicines", get(catalog::list_all_medicines))
        .route("/admin/medicines/:id", get(catalog::get_any_medicine))
        .with_role(ROLE_STAFF);

    let inventory_admin = Router::new()
        .route("/inventory/dashboard", get(inventory::dashboard))
        .route("/inventory/movements", get(inventory::list_movements))
        .route("/inventory/low-stock", get(inventory::low_stock))
        .route(
            "/inventory/medicines/:id/stock",
            post(inventory::update_stock),
        )
        .with_role(ROLE_STAFF);

    let orders_admin = Router::new()
        .route("/admin/orders", get(orders::list_all_orders))
        .route(
            "/admin/orders/:id/status",
            put(orders::update_order_status),
        )
        .with_role(ROLE_STAFF);

    Router::new()
        .merge(public)
        .merge(customer)
        .merge(catalog_admin)
        .merge(inventory_admin)
        .merge(orders_admin)
}

/// Full application router: versioned API, Swagger UI, request ids and
/// HTTP tracing. CORS and compression are layered on by the binary.
pub fn app_router(state: AppState, auth_service: Arc<AuthService>) -> Router {
    Router::<AppState>::new()
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(crate::tracing::configure_http_tracing())
        // Auth middleware looks the service up in request extensions
        .layer(axum::middleware::from_fn_with_state(
            auth_service,
            |State(auth): State<Arc<AuthService>>,
             mut req: axum::extract::Request,
             next: axum::middleware::Next| async move {
                req.extensions_mut().insert(auth);
                next.run(req).await
            },
        ))
        .layer(axum::middleware::from_fn(
            crate::tracing::request_id_middleware,
        ))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "pharmacy-online",
        "pharmacy": state.config.pharmacy_name,
        "environment": state.config.environment,
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let db_status = match db::check_connection(&state.db).await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
