//! API token model.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Length of a token key in hex characters.
pub const TOKEN_KEY_LEN: usize = 40;

/// Single per-user API token, presented as `Authorization: Token <key>`.
#[derive(Clone, FromRow, Serialize)]
pub struct ApiToken {
    pub key: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

redacted_debug!(ApiToken {
    redact key,
    show user_id,
    show created_at,
});

impl ApiToken {
    /// Generate a fresh random 40-character lowercase hex key.
    pub fn generate_key() -> String {
        let mut rng = rand::rng();
        let bytes: [u8; TOKEN_KEY_LEN / 2] = rng.random();
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// First eight characters followed by an ellipsis.
    pub fn masked_key(&self) -> String {
        mask_key(&self.key)
    }
}

pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(8).collect();
    format!("{}...", prefix)
}

/// Token joined with its owner's username, for listings.
#[derive(Clone, FromRow)]
pub struct TokenListing {
    pub key: String,
    pub user_id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

redacted_debug!(TokenListing {
    redact key,
    show user_id,
    show username,
    show created_at,
});
