//! Authentication handlers.

use axum::{
    extract::{Extension, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::{OpenApi, ToSchema};

use crate::api::dto::{CredentialsRequest, TokenResponse, UserResponse};
use crate::api::middleware::auth::AuthExtension;
use crate::api::openapi::ErrorResponse;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::services::auth_service::TokenPair;
use crate::services::token_service::TokenService;

/// Create public auth routes (no auth required)
pub fn public_router() -> Router<SharedState> {
    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh_token))
}

/// Create protected auth routes (auth required)
pub fn protected_router() -> Router<SharedState> {
    Router::new().route("/me", get(get_current_user))
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

redacted_debug!(RefreshTokenRequest {
    redact refresh_token,
});

/// Login with credentials
#[utoipa::path(
    post,
    path = "/login",
    context_path = "/api/auth",
    tag = "auth",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Access and refresh tokens", body = TokenPair),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
    )
)]
pub async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<TokenPair>> {
    let (user, tokens) = state
        .auth_service()
        .authenticate(&payload.username, &payload.password)
        .await?;
    tracing::info!(username = %user.username, "User logged in");
    Ok(Json(tokens))
}

/// Refresh access token
#[utoipa::path(
    post,
    path = "/refresh",
    context_path = "/api/auth",
    tag = "auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Invalid or expired refresh token", body = ErrorResponse),
    )
)]
pub async fn refresh_token(
    State(state): State<SharedState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<Json<TokenPair>> {
    let (_, tokens) = state
        .auth_service()
        .refresh_tokens(&payload.refresh_token)
        .await?;
    Ok(Json(tokens))
}

/// Get current user info
#[utoipa::path(
    get,
    path = "/me",
    context_path = "/api/auth",
    tag = "auth",
    responses(
        (status = 200, description = "The authenticated user", body = UserResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn get_current_user(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
) -> Result<Json<UserResponse>> {
    let user = state
        .store
        .get_user(auth.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(UserResponse::from(user)))
}

/// Exchange a username and password for the user's API token.
///
/// The same token is returned on every call until it is regenerated.
#[utoipa::path(
    post,
    path = "/token",
    context_path = "/api/v1",
    tag = "auth",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "The user's API token", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
    )
)]
pub async fn obtain_token(
    State(state): State<SharedState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<TokenResponse>> {
    let user = state
        .auth_service()
        .verify_credentials(&payload.username, &payload.password)
        .await?;
    let issued = TokenService::new(state.store.clone())
        .get_or_create(user.id)
        .await?;
    Ok(Json(TokenResponse {
        token: issued.token.key,
    }))
}

#[derive(OpenApi)]
#[openapi(
    paths(login, refresh_token, get_current_user, obtain_token),
    components(schemas(
        CredentialsRequest,
        RefreshTokenRequest,
        TokenPair,
        TokenResponse,
        UserResponse,
    ))
)]
pub struct AuthApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_request_debug_hides_token() {
        let req = RefreshTokenRequest {
            refresh_token: "eyJhbGciOiJIUzI1NiJ9.secret".into(),
        };
        assert!(!format!("{:?}", req).contains("secret"));
    }

    #[test]
    fn test_credentials_request_parses() {
        let req: CredentialsRequest =
            serde_json::from_str(r#"{"username": "owner", "password": "pw"}"#).unwrap();
        assert_eq!(req.username, "owner");
    }
}
