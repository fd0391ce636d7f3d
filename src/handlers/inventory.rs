use crate::{
    auth::AuthUser,
    handlers::common::PaginatedResponse,
    services::inventory::{
        InventoryDashboard, LowStockReport, MovementEntry, MovementFilter, StockUpdateRequest,
        StockUpdateResponse,
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/v1/inventory/dashboard",
    responses(
        (status = 200, description = "Stock counts, value and recent activity", body = ApiResponse<InventoryDashboard>),
        (status = 403, description = "Staff only", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn dashboard(State(state): State<AppState>) -> ApiResult<InventoryDashboard> {
    let dashboard = state.services.inventory.dashboard().await?;
    Ok(Json(ApiResponse::success(dashboard)))
}

/// Stock movement history, newest first
#[utoipa::path(
    get,
    path = "/api/v1/inventory/movements",
    params(MovementFilter),
    responses(
        (status = 200, description = "Page of movements", body = ApiResponse<PaginatedResponse<MovementEntry>>),
        (status = 403, description = "Staff only", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn list_movements(
    State(state): State<AppState>,
    Query(filter): Query<MovementFilter>,
) -> ApiResult<PaginatedResponse<MovementEntry>> {
    let page = state.services.inventory.list_movements(filter).await?;
    Ok(Json(ApiResponse::success(page.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/low-stock",
    responses(
        (status = 200, description = "Medicines at or below their minimum, and out of stock", body = ApiResponse<LowStockReport>),
        (status = 403, description = "Staff only", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn low_stock(State(state): State<AppState>) -> ApiResult<LowStockReport> {
    let report = state.services.inventory.low_stock_report().await?;
    Ok(Json(ApiResponse::success(report)))
}

/// Record a stock movement for a medicine
#[utoipa::path(
    post,
    path = "/api/v1/inventory/medicines/{id}/stock",
    params(("id" = Uuid, Path, description = "Medicine id")),
    request_body = StockUpdateRequest,
    responses(
        (status = 200, description = "New stock level and the recorded movement", body = ApiResponse<StockUpdateResponse>),
        (status = 400, description = "Invalid quantity or reason", body = crate::errors::ErrorResponse),
        (status = 404, description = "Medicine not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn update_stock(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<StockUpdateRequest>,
) -> ApiResult<StockUpdateResponse> {
    let response = state
        .services
        .inventory
        .update_stock(id, request, auth_user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}
