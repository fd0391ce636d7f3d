use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::created,
    services::{
        cart::{AddToCartRequest, CartView, UpdateCartItemRequest},
        checkout::CheckoutRequest,
        orders::OrderDetail,
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "The caller's cart at current prices", body = ApiResponse<CartView>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn get_cart(State(state): State<AppState>, auth_user: AuthUser) -> ApiResult<CartView> {
    let cart = state.services.cart.get_cart(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Add one unit of a medicine to the cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartView>),
        (status = 400, description = "Medicine unavailable or out of stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Medicine not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Cart already holds all available stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn add_cart_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<AddToCartRequest>,
) -> ApiResult<CartView> {
    let cart = state
        .services
        .cart
        .add_item(auth_user.user_id, request.medicine_id)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[utoipa::path(
    put,
    path = "/api/v1/cart/items/{item_id}",
    params(("item_id" = Uuid, Path, description = "Cart item id")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartView>),
        (status = 404, description = "Item not in the caller's cart", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough stock to increase", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(item_id): Path<Uuid>,
    Json(request): Json<UpdateCartItemRequest>,
) -> ApiResult<CartView> {
    let cart = state
        .services
        .cart
        .update_item(auth_user.user_id, item_id, request.action)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{item_id}",
    params(("item_id" = Uuid, Path, description = "Cart item id")),
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartView>),
        (status = 404, description = "Item not in the caller's cart", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(item_id): Path<Uuid>,
) -> ApiResult<CartView> {
    let cart = state
        .services
        .cart
        .remove_item(auth_user.user_id, item_id)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Turn the cart into an order
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderDetail>),
        (status = 400, description = "Cart empty or a medicine was withdrawn", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock for a line", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "checkout"
)]
pub async fn checkout(
    State(state): State<AppState>,
    auth_user: AuthUser,
    request: Option<Json<CheckoutRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<OrderDetail>>), ServiceError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let order = state
        .services
        .checkout
        .checkout(auth_user.user_id, request)
        .await?;
    Ok(created(order))
}
