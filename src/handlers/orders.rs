use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::{PaginatedResponse, PaginationParams},
    services::orders::{OrderDetail, OrderListQuery, OrderSummary, UpdateStatusRequest},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

/// Staff may open any order; customers only their own
fn visible_to(auth_user: &AuthUser) -> Option<Uuid> {
    if auth_user.is_staff() {
        None
    } else {
        Some(auth_user.user_id)
    }
}

/// The caller's order history
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "Orders, newest first", body = ApiResponse<PaginatedResponse<OrderSummary>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<OrderSummary>> {
    let page = state
        .services
        .orders
        .list_for_user(auth_user.user_id, params.page, params.per_page)
        .await?;
    Ok(Json(ApiResponse::success(page.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with its lines", body = ApiResponse<OrderDetail>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderDetail> {
    let order = state
        .services
        .orders
        .get_order(id, visible_to(&auth_user))
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Download the PDF invoice of an order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/invoice",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "PDF invoice", content_type = "application/pdf", body = Vec<u8>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn download_invoice(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let invoice = state
        .services
        .invoices
        .generate(id, visible_to(&auth_user))
        .await?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        invoice.filename
    ))
    .map_err(|e| ServiceError::InternalError(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        invoice.bytes,
    )
        .into_response())
}

/// Every order, newest first
#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders, newest first", body = ApiResponse<PaginatedResponse<OrderSummary>>),
        (status = 403, description = "Staff only", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders-admin"
)]
pub async fn list_all_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> ApiResult<PaginatedResponse<OrderSummary>> {
    let page = state.services.orders.list_all(query).await?;
    Ok(Json(ApiResponse::success(page.into())))
}

/// Move an order along its lifecycle; cancelling restocks its lines
#[utoipa::path(
    put,
    path = "/api/v1/admin/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Order updated", body = ApiResponse<OrderDetail>),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders-admin"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> ApiResult<OrderDetail> {
    let order = state
        .services
        .orders
        .update_status(id, request, auth_user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}
