//! Authentication service.
//!
//! Password login, JWT access/refresh tokens and API token lookup.

use std::sync::Arc;

use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::api_token::TOKEN_KEY_LEN;
use crate::models::user::User;
use crate::services::rbac::{Principal, UserPrincipal};
use crate::storage::CatalogueStore;

const INVALID_CREDENTIALS: &str = "Unable to log in with provided credentials.";

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    pub username: String,
    pub email: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token type: "access" or "refresh"
    pub token_type: String,
}

impl Claims {
    pub fn principal(&self) -> Principal {
        Principal::User(UserPrincipal {
            id: self.sub,
            username: self.username.clone(),
            is_staff: self.is_staff,
            is_superuser: self.is_superuser,
        })
    }
}

/// Token pair response
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub token_type: String,
}

/// Authentication service
pub struct AuthService {
    store: Arc<dyn CatalogueStore>,
    config: Arc<Config>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    pub fn new(store: Arc<dyn CatalogueStore>, config: Arc<Config>) -> Self {
        let secret = config.jwt_secret.clone();
        Self {
            store,
            config,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Check a username/password pair and record the login.
    pub async fn verify_credentials(&self, username: &str, password: &str) -> Result<User> {
        let user = self
            .store
            .find_user_by_username(username)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| AppError::Authentication(INVALID_CREDENTIALS.to_string()))?;

        if !Self::verify_password(password, &user.password_hash)? {
            return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
        }

        self.store.touch_last_login(user.id).await?;
        Ok(user)
    }

    /// Authenticate user with username and password
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<(User, TokenPair)> {
        let user = self.verify_credentials(username, password).await?;
        let tokens = self.generate_tokens(&user)?;
        Ok((user, tokens))
    }

    fn claims(&self, user: &User, token_type: &str, exp: i64, iat: i64) -> Claims {
        Claims {
            sub: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            iat,
            exp,
            token_type: token_type.to_string(),
        }
    }

    /// Generate access and refresh tokens for a user
    pub fn generate_tokens(&self, user: &User) -> Result<TokenPair> {
        let now = Utc::now();
        let access_exp = now + Duration::minutes(self.config.jwt_access_token_expiry_minutes);
        let refresh_exp = now + Duration::days(self.config.jwt_refresh_token_expiry_days);

        let access_claims = self.claims(user, "access", access_exp.timestamp(), now.timestamp());
        let refresh_claims = self.claims(user, "refresh", refresh_exp.timestamp(), now.timestamp());

        let access_token = encode(&Header::default(), &access_claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))?;
        let refresh_token = encode(&Header::default(), &refresh_claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: (self.config.jwt_access_token_expiry_minutes * 60) as u64,
            token_type: "Bearer".to_string(),
        })
    }

    /// Validate and decode an access token
    pub fn validate_access_token(&self, token: &str) -> Result<Claims> {
        let token_data = self.decode_token(token)?;
        if token_data.claims.token_type != "access" {
            return Err(AppError::Authentication("Invalid token type".to_string()));
        }
        Ok(token_data.claims)
    }

    /// Resolve an access token to its user. The account is reloaded so that
    /// deactivation and flag changes apply to tokens already issued.
    pub async fn authenticate_access_token(&self, token: &str) -> Result<User> {
        let claims = self.validate_access_token(token)?;
        self.active_user(claims.sub).await
    }

    async fn active_user(&self, id: Uuid) -> Result<User> {
        self.store
            .get_user(id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| AppError::Authentication("User not found".to_string()))
    }

    /// Refresh tokens using a refresh token
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<(User, TokenPair)> {
        let token_data = self.decode_token(refresh_token)?;
        if token_data.claims.token_type != "refresh" {
            return Err(AppError::Authentication("Invalid token type".to_string()));
        }

        // Reload so deactivation and flag changes apply on refresh
        let user = self.active_user(token_data.claims.sub).await?;

        let tokens = self.generate_tokens(&user)?;
        Ok((user, tokens))
    }

    fn decode_token(&self, token: &str) -> Result<TokenData<Claims>> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| AppError::Authentication(format!("Invalid token: {}", e)))
    }

    /// Hash a password
    pub fn hash_password(password: &str) -> Result<String> {
        hash(password, DEFAULT_COST)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a hash
    pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
        match verify(password, hash) {
            Ok(valid) => Ok(valid),
            // Unusable hashes (e.g. accounts created without a password) never match
            Err(bcrypt::BcryptError::InvalidHash(_))
            | Err(bcrypt::BcryptError::InvalidPrefix(_)) => Ok(false),
            Err(e) => Err(AppError::Internal(format!(
                "Password verification failed: {}",
                e
            ))),
        }
    }

    /// Resolve an API token key to its active owner.
    pub async fn validate_api_token(&self, key: &str) -> Result<User> {
        if key.len() != TOKEN_KEY_LEN {
            return Err(AppError::Authentication("Invalid token.".to_string()));
        }
        self.store
            .find_user_by_token(key)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| AppError::Authentication("Invalid token.".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{NewUser, UserChanges};
    use crate::storage::MemoryStore;

    async fn service_with_user(password: &str) -> (AuthService, User) {
        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        let user = store
            .create_user(NewUser {
                username: "curator".into(),
                email: "curator@example.org".into(),
                first_name: String::new(),
                last_name: String::new(),
                password_hash: hash(password, 4).unwrap(),
                is_staff: true,
                is_superuser: false,
            })
            .await
            .unwrap();
        let config = Arc::new(Config::for_memory_store("test-secret"));
        (AuthService::new(store, config), user)
    }

    #[test]
    fn test_password_hashing() {
        let password = "test_password_123";
        let hash = AuthService::hash_password(password).unwrap();
        assert!(AuthService::verify_password(password, &hash).unwrap());
        assert!(!AuthService::verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_unusable_hash_never_matches() {
        assert!(!AuthService::verify_password("anything", "!").unwrap());
    }

    #[tokio::test]
    async fn test_authenticate_and_validate() {
        let (service, user) = service_with_user("s3cret").await;
        let (logged_in, tokens) = service.authenticate("curator", "s3cret").await.unwrap();
        assert_eq!(logged_in.id, user.id);
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_in, 1800);

        let claims = service.validate_access_token(&tokens.access_token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert!(claims.is_staff);
        assert!(matches!(claims.principal(), Principal::User(ref u) if u.username == "curator"));

        // Refresh tokens are not accepted as access tokens
        assert!(service.validate_access_token(&tokens.refresh_token).is_err());
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let (service, _) = service_with_user("s3cret").await;
        let err = service.authenticate("curator", "nope").await.unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
        let err = service.authenticate("nobody", "s3cret").await.unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_refresh_issues_new_pair() {
        let (service, user) = service_with_user("s3cret").await;
        let tokens = service.generate_tokens(&user).unwrap();
        let (refreshed_user, _) = service.refresh_tokens(&tokens.refresh_token).await.unwrap();
        assert_eq!(refreshed_user.id, user.id);
        assert!(service.refresh_tokens(&tokens.access_token).await.is_err());
    }

    #[tokio::test]
    async fn test_access_token_reloads_account() {
        let (service, user) = service_with_user("s3cret").await;
        let tokens = service.generate_tokens(&user).unwrap();

        service
            .store
            .update_user(
                user.id,
                UserChanges {
                    is_staff: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let current = service
            .authenticate_access_token(&tokens.access_token)
            .await
            .unwrap();
        assert!(!current.is_staff);

        service
            .store
            .update_user(
                user.id,
                UserChanges {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let err = service
            .authenticate_access_token(&tokens.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_api_token_lookup() {
        let (service, user) = service_with_user("s3cret").await;
        let key = crate::models::api_token::ApiToken::generate_key();
        service.store.insert_token(user.id, &key).await.unwrap();

        assert_eq!(service.validate_api_token(&key).await.unwrap().id, user.id);
        assert!(service.validate_api_token("short").await.is_err());
        assert!(service
            .validate_api_token(&"0".repeat(TOKEN_KEY_LEN))
            .await
            .is_err());
    }
}
