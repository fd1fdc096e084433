//! Authentication middleware.
//!
//! Supported authentication methods:
//! - `Authorization: Token <api_token>` - per-user API tokens
//! - `Authorization: Bearer <jwt_token>` - JWT access tokens from `/api/auth/login`
//! - `Authorization: Bearer <api_token>` - API tokens via Bearer scheme
//!
//! A presented but invalid credential is always rejected with 401, even on
//! routes that allow anonymous access.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::User;
use crate::services::auth_service::AuthService;
use crate::services::rbac::{Principal, UserPrincipal};

/// Extension that holds authenticated user information
#[derive(Debug, Clone)]
pub struct AuthExtension {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    /// Indicates if authentication was via API token (vs JWT)
    pub is_api_token: bool,
}

impl AuthExtension {
    pub fn principal(&self) -> Principal {
        Principal::User(UserPrincipal {
            id: self.user_id,
            username: self.username.clone(),
            is_staff: self.is_staff,
            is_superuser: self.is_superuser,
        })
    }

    /// Caller built from the stored account, never from token claims.
    fn for_user(user: User, is_api_token: bool) -> Self {
        Self {
            user_id: user.id,
            username: user.username,
            email: user.email,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            is_api_token,
        }
    }
}

/// Principal for an optionally authenticated request.
pub fn principal_of(auth: &Option<AuthExtension>) -> Principal {
    auth.as_ref()
        .map(AuthExtension::principal)
        .unwrap_or(Principal::Anonymous)
}

/// Token extraction result
#[derive(Debug, PartialEq, Eq)]
enum ExtractedToken<'a> {
    /// JWT or API token from Bearer scheme
    Bearer(&'a str),
    /// API token from Token scheme
    Token(&'a str),
    /// No credentials presented
    None,
    /// Unsupported scheme or malformed header
    Invalid,
}

fn extract_token_from_auth_header(auth_header: &str) -> ExtractedToken<'_> {
    let (scheme, value) = match auth_header.split_once(' ') {
        Some((scheme, value)) => (scheme, value.trim()),
        None => return ExtractedToken::Invalid,
    };
    if value.is_empty() || value.contains(' ') {
        return ExtractedToken::Invalid;
    }
    if scheme.eq_ignore_ascii_case("token") {
        ExtractedToken::Token(value)
    } else if scheme.eq_ignore_ascii_case("bearer") {
        ExtractedToken::Bearer(value)
    } else {
        ExtractedToken::Invalid
    }
}

fn extract_token(headers: &HeaderMap) -> ExtractedToken<'_> {
    match headers.get(AUTHORIZATION) {
        None => ExtractedToken::None,
        Some(value) => match value.to_str() {
            Ok(header) => extract_token_from_auth_header(header),
            Err(_) => ExtractedToken::Invalid,
        },
    }
}

/// Resolve presented credentials. `Ok(None)` means no credentials were sent.
async fn authenticate(
    auth_service: &AuthService,
    headers: &HeaderMap,
) -> Result<Option<AuthExtension>, AppError> {
    match extract_token(headers) {
        ExtractedToken::None => Ok(None),
        ExtractedToken::Invalid => Err(AppError::Authentication(
            "Invalid authorization header format".into(),
        )),
        ExtractedToken::Token(key) => {
            let user = auth_service.validate_api_token(key).await?;
            Ok(Some(AuthExtension::for_user(user, true)))
        }
        ExtractedToken::Bearer(token) => match auth_service.authenticate_access_token(token).await {
            Ok(user) => Ok(Some(AuthExtension::for_user(user, false))),
            Err(_) => {
                // Fall back to API token
                let user = auth_service
                    .validate_api_token(token)
                    .await
                    .map_err(|_| AppError::Authentication("Invalid or expired token".into()))?;
                Ok(Some(AuthExtension::for_user(user, true)))
            }
        },
    }
}

/// Make the caller available both as `AuthExtension` and as
/// `Option<AuthExtension>`, so handlers shared with anonymous routes work
/// behind either middleware.
fn insert_caller(request: &mut Request, auth_ext: AuthExtension) {
    request.extensions_mut().insert(Some(auth_ext.clone()));
    request.extensions_mut().insert(auth_ext);
}

/// Authentication middleware function - requires valid credentials
pub async fn auth_middleware(
    State(auth_service): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&auth_service, request.headers()).await {
        Ok(Some(auth_ext)) => {
            insert_caller(&mut request, auth_ext);
            next.run(request).await
        }
        Ok(None) => AppError::Authentication("Authentication credentials were not provided.".into())
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Optional authentication middleware - allows unauthenticated requests
///
/// Inserts `Option<AuthExtension>` so handlers can serve anonymous callers.
pub async fn optional_auth_middleware(
    State(auth_service): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&auth_service, request.headers()).await {
        Ok(auth_ext) => {
            request.extensions_mut().insert(auth_ext);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Admin-only middleware - requires an authenticated superuser
pub async fn admin_middleware(
    State(auth_service): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_ext = match authenticate(&auth_service, request.headers()).await {
        Ok(Some(auth_ext)) => auth_ext,
        Ok(None) => {
            return AppError::Authentication("Authentication credentials were not provided.".into())
                .into_response()
        }
        Err(e) => return e.into_response(),
    };

    if !auth_ext.is_superuser {
        return AppError::Authorization("Admin access required".into()).into_response();
    }

    insert_caller(&mut request, auth_ext);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_scheme() {
        assert_eq!(
            extract_token_from_auth_header("Token abc123"),
            ExtractedToken::Token("abc123")
        );
        assert_eq!(
            extract_token_from_auth_header("token abc123"),
            ExtractedToken::Token("abc123")
        );
    }

    #[test]
    fn test_bearer_scheme() {
        assert_eq!(
            extract_token_from_auth_header("Bearer eyJhbGciOi"),
            ExtractedToken::Bearer("eyJhbGciOi")
        );
    }

    #[test]
    fn test_malformed_headers() {
        assert_eq!(extract_token_from_auth_header("Token"), ExtractedToken::Invalid);
        assert_eq!(extract_token_from_auth_header("Token "), ExtractedToken::Invalid);
        assert_eq!(extract_token_from_auth_header("Token a b"), ExtractedToken::Invalid);
        assert_eq!(
            extract_token_from_auth_header("Basic dXNlcjpwYXNz"),
            ExtractedToken::Invalid
        );
    }

    #[test]
    fn test_extract_token_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), ExtractedToken::None);

        headers.insert(AUTHORIZATION, "Token abc123".parse().unwrap());
        assert_eq!(extract_token(&headers), ExtractedToken::Token("abc123"));

        headers.insert(AUTHORIZATION, axum::http::HeaderValue::from_bytes(b"Token \xff").unwrap());
        assert_eq!(extract_token(&headers), ExtractedToken::Invalid);
    }

    #[tokio::test]
    async fn test_middleware_rejects_unknown_bearer() {
        use axum::{body::Body, middleware, routing::get, Router};
        use tower::ServiceExt;

        use crate::config::Config;
        use crate::storage::{CatalogueStore, MemoryStore};

        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        let auth_service = Arc::new(AuthService::new(
            store,
            Arc::new(Config::for_memory_store("middleware-secret")),
        ));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(auth_service, auth_middleware));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_principal_of_anonymous() {
        assert_eq!(principal_of(&None), Principal::Anonymous);
        let ext = AuthExtension {
            user_id: Uuid::nil(),
            username: "owner".into(),
            email: "owner@example.org".into(),
            is_staff: false,
            is_superuser: true,
            is_api_token: true,
        };
        assert!(principal_of(&Some(ext)).is_superuser());
    }
}
