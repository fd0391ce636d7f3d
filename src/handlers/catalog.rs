use crate::{
    auth::AuthUser,
    entities::category,
    errors::ServiceError,
    handlers::common::{created, PaginatedResponse},
    services::catalog::{
        CategoryRequest, CreateMedicineRequest, HomePage, MedicineQuery, MedicineResponse,
        UpdateMedicineRequest,
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

/// Featured medicines and categories for the landing page
#[utoipa::path(
    get,
    path = "/api/v1/home",
    responses((status = 200, description = "Landing page content", body = ApiResponse<HomePage>)),
    tag = "catalog"
)]
pub async fn home(State(state): State<AppState>) -> ApiResult<HomePage> {
    let page = state.services.catalog.home().await?;
    Ok(Json(ApiResponse::success(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/categories",
    responses((status = 200, description = "All categories by name", body = ApiResponse<Vec<category::Model>>)),
    tag = "catalog"
)]
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<category::Model>> {
    let categories = state.services.catalog.list_categories().await?;
    Ok(Json(ApiResponse::success(categories)))
}

#[utoipa::path(
    get,
    path = "/api/v1/categories/{id}",
    params(("id" = Uuid, Path, description = "Category id")),
    responses(
        (status = 200, description = "Category", body = ApiResponse<category::Model>),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse),
    ),
    tag = "catalog"
)]
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<category::Model> {
    let category = state.services.catalog.get_category(id).await?;
    Ok(Json(ApiResponse::success(category)))
}

#[utoipa::path(
    post,
    path = "/api/v1/categories",
    request_body = CategoryRequest,
    responses(
        (status = 201, description = "Category created", body = ApiResponse<category::Model>),
        (status = 400, description = "Invalid category", body = crate::errors::ErrorResponse),
        (status = 403, description = "Staff only", body = crate::errors::ErrorResponse),
        (status = 409, description = "Name already used", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "catalog-admin"
)]
pub async fn create_category(
    State(state): State<AppState>,
    Json(request): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<category::Model>>), ServiceError> {
    let category = state.services.catalog.create_category(request).await?;
    Ok(created(category))
}

#[utoipa::path(
    put,
    path = "/api/v1/categories/{id}",
    params(("id" = Uuid, Path, description = "Category id")),
    request_body = CategoryRequest,
    responses(
        (status = 200, description = "Category updated", body = ApiResponse<category::Model>),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Name already used", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "catalog-admin"
)]
pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CategoryRequest>,
) -> ApiResult<category::Model> {
    let category = state.services.catalog.update_category(id, request).await?;
    Ok(Json(ApiResponse::success(category)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/categories/{id}",
    params(("id" = Uuid, Path, description = "Category id")),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Category still has medicines", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "catalog-admin"
)]
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.catalog.delete_category(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Medicines that can be bought right now
#[utoipa::path(
    get,
    path = "/api/v1/medicines",
    params(MedicineQuery),
    responses((status = 200, description = "Page of medicines ordered by name", body = ApiResponse<PaginatedResponse<MedicineResponse>>)),
    tag = "catalog"
)]
pub async fn list_medicines(
    State(state): State<AppState>,
    Query(query): Query<MedicineQuery>,
) -> ApiResult<PaginatedResponse<MedicineResponse>> {
    let page = state.services.catalog.list_medicines(query).await?;
    Ok(Json(ApiResponse::success(page.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/medicines/{id}",
    params(("id" = Uuid, Path, description = "Medicine id")),
    responses(
        (status = 200, description = "Medicine", body = ApiResponse<MedicineResponse>),
        (status = 404, description = "Medicine not found or withdrawn", body = crate::errors::ErrorResponse),
    ),
    tag = "catalog"
)]
pub async fn get_medicine(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<MedicineResponse> {
    let medicine = state.services.catalog.get_medicine(id, true).await?;
    Ok(Json(ApiResponse::success(medicine)))
}

/// Every medicine, including withdrawn and out-of-stock ones
#[utoipa::path(
    get,
    path = "/api/v1/admin/medicines",
    params(MedicineQuery),
    responses(
        (status = 200, description = "Page of medicines ordered by name", body = ApiResponse<PaginatedResponse<MedicineResponse>>),
        (status = 403, description = "Staff only", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "catalog-admin"
)]
pub async fn list_all_medicines(
    State(state): State<AppState>,
    Query(query): Query<MedicineQuery>,
) -> ApiResult<PaginatedResponse<MedicineResponse>> {
    let page = state.services.catalog.list_all_medicines(query).await?;
    Ok(Json(ApiResponse::success(page.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/medicines/{id}",
    params(("id" = Uuid, Path, description = "Medicine id")),
    responses(
        (status = 200, description = "Medicine", body = ApiResponse<MedicineResponse>),
        (status = 404, description = "Medicine not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "catalog-admin"
)]
pub async fn get_any_medicine(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<MedicineResponse> {
    let medicine = state.services.catalog.get_medicine(id, false).await?;
    Ok(Json(ApiResponse::success(medicine)))
}

#[utoipa::path(
    post,
    path = "/api/v1/medicines",
    request_body = CreateMedicineRequest,
    responses(
        (status = 201, description = "Medicine created", body = ApiResponse<MedicineResponse>),
        (status = 400, description = "Invalid medicine", body = crate::errors::ErrorResponse),
        (status = 403, description = "Staff only", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "catalog-admin"
)]
pub async fn create_medicine(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateMedicineRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MedicineResponse>>), ServiceError> {
    let medicine = state
        .services
        .catalog
        .create_medicine(request, auth_user.user_id)
        .await?;
    Ok(created(medicine))
}

#[utoipa::path(
    put,
    path = "/api/v1/medicines/{id}",
    params(("id" = Uuid, Path, description = "Medicine id")),
    request_body = UpdateMedicineRequest,
    responses(
        (status = 200, description = "Medicine updated", body = ApiResponse<MedicineResponse>),
        (status = 400, description = "Invalid medicine", body = crate::errors::ErrorResponse),
        (status = 404, description = "Medicine not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "catalog-admin"
)]
pub async fn update_medicine(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateMedicineRequest>,
) -> ApiResult<MedicineResponse> {
    let medicine = state.services.catalog.update_medicine(id, request).await?;
    Ok(Json(ApiResponse::success(medicine)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/medicines/{id}",
    params(("id" = Uuid, Path, description = "Medicine id")),
    responses(
        (status = 204, description = "Medicine deleted"),
        (status = 404, description = "Medicine not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Medicine has order or stock history", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "catalog-admin"
)]
pub async fn delete_medicine(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.catalog.delete_medicine(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
