//! User model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// User entity
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    /// Staff members are treated as internal users where they hold no explicit role.
    pub is_staff: bool,
    pub is_superuser: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// "First Last", or an empty string when neither is set.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// "Full Name (email)", falling back to the username.
    pub fn display_name(&self) -> String {
        display_name(&self.username, &self.first_name, &self.last_name, &self.email)
    }
}

/// Fields for inserting a new user.
#[derive(Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

redacted_debug!(NewUser {
    show username,
    show email,
    show first_name,
    show last_name,
    redact password_hash,
    show is_staff,
    show is_superuser,
});

/// Partial update of a user; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
}

pub fn display_name(username: &str, first_name: &str, last_name: &str, email: &str) -> String {
    let full = format!("{} {}", first_name, last_name);
    let full = full.trim();
    let name = if full.is_empty() { username } else { full };
    format!("{} ({})", name, email)
}
