use crate::{
    auth::{bearer_token, AuthUser},
    errors::ServiceError,
    handlers::common::created,
    services::accounts::{
        AuthResponse, LoginRequest, ProfileResponse, RegisterRequest, UpdateProfileRequest,
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use tracing::info;

/// Register a customer account
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created and signed in", body = ApiResponse<AuthResponse>),
        (status = 400, description = "Invalid registration data", body = crate::errors::ErrorResponse),
        (status = 409, description = "Username or email already registered", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), ServiceError> {
    let response = state.services.accounts.register(request).await?;
    Ok(created(response))
}

/// Sign in with a username or email address
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = ApiResponse<AuthResponse>),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<AuthResponse> {
    let response = state.services.accounts.login(request).await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Revoke the presented access token
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 204, description = "Token revoked"),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    auth_user: AuthUser,
    headers: HeaderMap,
) -> Result<StatusCode, ServiceError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ServiceError::Unauthorized("Missing bearer token".to_string()))?;
    state.services.auth.revoke_token(token).await?;
    info!(user_id = %auth_user.user_id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/profile",
    responses(
        (status = 200, description = "Account and profile of the caller", body = ApiResponse<ProfileResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "profile"
)]
pub async fn get_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<ProfileResponse> {
    let profile = state.services.accounts.get_profile(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(profile)))
}

#[utoipa::path(
    put,
    path = "/api/v1/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = ApiResponse<ProfileResponse>),
        (status = 400, description = "Invalid profile data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "profile"
)]
pub async fn update_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<ProfileResponse> {
    let profile = state
        .services
        .accounts
        .update_profile(auth_user.user_id, request)
        .await?;
    Ok(Json(ApiResponse::success(profile)))
}
