use crate::config::jwt::JwtConfig;
use crate::error::{AppError, AppResult};
use crate::handlers::UserResponse;
use crate::middleware::AuthUser;
use crate::response::ApiResponse;
use crate::services::auth::{AuthService, AuthSession};
use crate::store::Store;
use crate::utils::cookie::{
    build_auth_cookie, build_clear_cookie, extract_cookie, CookieConfig, REFRESH_TOKEN_COOKIE,
};
use crate::utils::validation::{validate_password_strength, validate_username};
use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    /// 3-30 letters, digits, `_` or `-`. `name` is accepted as an alias.
    #[serde(default, alias = "name")]
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[serde(default)]
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: String,
    /// At least 6 characters with a lowercase letter, an uppercase letter and a digit
    #[serde(default)]
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserResponse,
    /// Short-lived bearer token; the refresh token travels in a cookie only.
    pub access_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
}

fn session_response(
    status: StatusCode,
    message: &str,
    session: AuthSession,
    cookies: &CookieConfig,
    refresh_ttl: u64,
) -> Response {
    let cookie = build_auth_cookie(
        cookies,
        REFRESH_TOKEN_COOKIE,
        &session.refresh_token,
        refresh_ttl,
    );
    let body = ApiResponse::ok(
        message,
        AuthResponse {
            user: UserResponse::from(session.user),
            access_token: session.access_token,
        },
    );
    (status, [(header::SET_COOKIE, cookie)], body).into_response()
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User account created", body = AuthResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 409, description = "Username or email already exists", body = AppError),
    ),
    tag = "auth"
)]
pub async fn signup(
    Extension(store): Extension<Store>,
    Extension(jwt): Extension<JwtConfig>,
    Extension(cookies): Extension<CookieConfig>,
    Json(mut payload): Json<SignupRequest>,
) -> AppResult<Response> {
    payload.username = payload.username.trim().to_string();
    payload.email = payload.email.trim().to_string();
    payload.validate()?;

    let refresh_ttl = jwt.refresh_token_expiry;
    let session = AuthService::new(store, jwt)
        .signup(&payload.username, &payload.email, &payload.password)
        .await?;

    Ok(session_response(
        StatusCode::CREATED,
        "User account created successfully",
        session,
        &cookies,
        refresh_ttl,
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 401, description = "Invalid email or password", body = AppError),
    ),
    tag = "auth"
)]
pub async fn login(
    Extension(store): Extension<Store>,
    Extension(jwt): Extension<JwtConfig>,
    Extension(cookies): Extension<CookieConfig>,
    Json(mut payload): Json<LoginRequest>,
) -> AppResult<Response> {
    payload.email = payload.email.trim().to_string();
    payload.validate()?;

    let refresh_ttl = jwt.refresh_token_expiry;
    let session = AuthService::new(store, jwt)
        .login(&payload.email, &payload.password)
        .await?;

    Ok(session_response(
        StatusCode::OK,
        "Login successful",
        session,
        &cookies,
        refresh_ttl,
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    responses(
        (status = 200, description = "New access token issued", body = TokenResponse),
        (status = 401, description = "Missing, invalid or expired refresh token", body = AppError),
    ),
    tag = "auth"
)]
pub async fn refresh(
    Extension(store): Extension<Store>,
    Extension(jwt): Extension<JwtConfig>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let token = extract_cookie(&headers, REFRESH_TOKEN_COOKIE);
    let access_token = AuthService::new(store, jwt).refresh(token.as_deref()).await?;

    Ok(ApiResponse::ok(
        "Token refreshed successfully",
        TokenResponse { access_token },
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 204, description = "Refresh cookie cleared"),
    ),
    tag = "auth"
)]
pub async fn logout(Extension(cookies): Extension<CookieConfig>) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(
            header::SET_COOKIE,
            build_clear_cookie(&cookies, REFRESH_TOKEN_COOKIE),
        )],
    )
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/profile",
    security(("jwt_token" = [])),
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Unauthorized", body = AppError),
    ),
    tag = "auth"
)]
pub async fn profile(
    Extension(store): Extension<Store>,
    Extension(jwt): Extension<JwtConfig>,
    auth_user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let user = AuthService::new(store, jwt)
        .profile(auth_user.user_id)
        .await
        .map_err(|e| match e {
            // Token outlived its account.
            AppError::NotFound(_) => AppError::Unauthorized("User no longer exists".to_string()),
            other => other,
        })?;

    Ok(ApiResponse::ok(
        "Profile retrieved successfully",
        UserResponse::from(user),
    ))
}
