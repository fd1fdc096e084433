//! Shared Data Transfer Objects (DTOs) for API handlers.
//!
//! List endpoints respond with `{"results": [...], "pagination": {...}}`.
//! Query structs carry `page`/`per_page` directly rather than flattening
//! [`PaginationQuery`], since `serde(flatten)` loses numeric parsing on query
//! strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::models::user::User;

/// Largest accepted `per_page`.
pub const MAX_PER_PAGE: u32 = 100;

/// Pagination metadata for list responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
    /// Total number of items across all pages
    pub total: i64,
    /// Total number of pages
    pub total_pages: u32,
}

impl Pagination {
    /// Create pagination from query parameters and total count.
    pub fn from_query_and_total(query: &PaginationQuery, total: i64) -> Self {
        let page = query.page();
        let per_page = query.per_page();
        let total_pages = if total <= 0 {
            0
        } else {
            ((total as u64).div_ceil(per_page as u64)) as u32
        };

        Self {
            page,
            per_page,
            total,
            total_pages,
        }
    }
}

/// Query parameters for paginated list requests.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct PaginationQuery {
    /// Requested page number (default: 1)
    pub page: Option<u32>,
    /// Requested items per page (default: 20, max: 100)
    pub per_page: Option<u32>,
}

impl PaginationQuery {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self { page, per_page }
    }

    /// Page number, at least 1.
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Page size between 1 and [`MAX_PER_PAGE`].
    pub fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(20).clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> usize {
        ((self.page() - 1) as usize) * self.per_page() as usize
    }

    /// Cut one page out of an already filtered listing.
    pub fn paginate<T>(&self, items: Vec<T>) -> (Vec<T>, Pagination) {
        let pagination = Pagination::from_query_and_total(self, items.len() as i64);
        let page = items
            .into_iter()
            .skip(self.offset())
            .take(self.per_page() as usize)
            .collect();
        (page, pagination)
    }
}

/// `{"token": "<key>"}`
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

/// `{"username": ..., "password": ...}`
#[derive(Deserialize, ToSchema)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

redacted_debug!(CredentialsRequest {
    show username,
    redact password,
});

/// User account as returned by `/api/auth/me` and the admin API.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// "Full Name (email)", or the username when no name is set
    pub display_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            display_name: user.display_name(),
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_active: user.is_active,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}
