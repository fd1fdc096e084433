//! API token issuance.
//!
//! Every user holds at most one token. Issuing is idempotent: an existing
//! token is returned unchanged unless a regeneration is requested.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::api_token::{mask_key, ApiToken, TokenListing};
use crate::storage::CatalogueStore;

/// Token listing entry; `key` is masked unless explicitly revealed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenInfo {
    pub user_id: Uuid,
    pub username: String,
    pub key: String,
    pub created_at: DateTime<Utc>,
}

impl TokenInfo {
    fn from_listing(listing: TokenListing, reveal: bool) -> Self {
        Self {
            key: if reveal {
                listing.key
            } else {
                mask_key(&listing.key)
            },
            user_id: listing.user_id,
            username: listing.username,
            created_at: listing.created_at,
        }
    }
}

/// Outcome of a token request.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: ApiToken,
    /// False when an existing token was returned
    pub created: bool,
}

pub struct TokenService {
    store: Arc<dyn CatalogueStore>,
}

impl TokenService {
    pub fn new(store: Arc<dyn CatalogueStore>) -> Self {
        Self { store }
    }

    /// Return the user's token, creating one when none exists.
    pub async fn get_or_create(&self, user_id: Uuid) -> Result<IssuedToken> {
        if let Some(token) = self.store.get_token_for_user(user_id).await? {
            return Ok(IssuedToken {
                token,
                created: false,
            });
        }
        match self.store.insert_token(user_id, &ApiToken::generate_key()).await {
            Ok(token) => Ok(IssuedToken {
                token,
                created: true,
            }),
            // Lost a race with a concurrent request for the same user
            Err(AppError::Conflict(_)) => {
                let token = self
                    .store
                    .get_token_for_user(user_id)
                    .await?
                    .ok_or_else(|| AppError::Internal("API token vanished after conflict".into()))?;
                Ok(IssuedToken {
                    token,
                    created: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the user's token with a fresh key.
    pub async fn regenerate(&self, user_id: Uuid) -> Result<IssuedToken> {
        let replaced = self.store.delete_token_for_user(user_id).await?;
        let token = self
            .store
            .insert_token(user_id, &ApiToken::generate_key())
            .await?;
        tracing::info!(user_id = %user_id, replaced, "API token regenerated");
        Ok(IssuedToken {
            token,
            created: true,
        })
    }

    /// Issue (or regenerate) the token of the named user.
    pub async fn issue_for_username(
        &self,
        username: &str,
        regenerate: bool,
    ) -> Result<IssuedToken> {
        let user = self
            .store
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User \"{}\" does not exist", username)))?;
        if regenerate {
            self.regenerate(user.id).await
        } else {
            self.get_or_create(user.id).await
        }
    }

    /// All tokens ordered by username.
    pub async fn list(&self, reveal_keys: bool) -> Result<Vec<TokenInfo>> {
        let tokens = self.store.list_tokens().await?;
        Ok(tokens
            .into_iter()
            .map(|t| TokenInfo::from_listing(t, reveal_keys))
            .collect())
    }
}
