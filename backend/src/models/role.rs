//! Per-resource role assignments and the permissions they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

/// Catalogue resource types that carry role assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "resource_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Investigation,
    Study,
    Assay,
    Sample,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Investigation,
        ResourceKind::Study,
        ResourceKind::Assay,
        ResourceKind::Sample,
    ];

    /// Accession code prefix for this resource type.
    pub fn prefix(&self) -> &'static str {
        match self {
            ResourceKind::Investigation => "CXRP",
            ResourceKind::Study => "CXRS",
            ResourceKind::Assay => "CXRA",
            ResourceKind::Sample => "CXRX",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Investigation => "investigation",
            ResourceKind::Study => "study",
            ResourceKind::Assay => "assay",
            ResourceKind::Sample => "sample",
        }
    }

    /// Build the accession code for a row id.
    pub fn accession_code(&self, id: i64) -> String {
        format!("{}{}", self.prefix(), id)
    }

    /// Split an accession code into its resource type and row id.
    pub fn parse_accession(code: &str) -> Option<(ResourceKind, i64)> {
        Self::ALL.into_iter().find_map(|kind| {
            let digits = code.strip_prefix(kind.prefix())?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            digits.parse().ok().map(|id| (kind, id))
        })
    }
}

/// Object-level permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    View,
    Change,
    Delete,
    ManagePermissions,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::View => "view",
            Permission::Change => "change",
            Permission::Delete => "delete",
            Permission::ManagePermissions => "manage_permissions",
        }
    }
}

/// Role that can be explicitly granted on a resource.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    sqlx::Type,
    ToSchema,
)]
#[sqlx(type_name = "assigned_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AssignedRole {
    /// Read access. Also accepted as `viewer`.
    #[serde(alias = "viewer")]
    Authorized,
    Contributor,
    Owner,
}

impl AssignedRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignedRole::Authorized => "authorized",
            AssignedRole::Contributor => "contributor",
            AssignedRole::Owner => "owner",
        }
    }

    /// Permissions granted by this role.
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            AssignedRole::Authorized => &[Permission::View],
            AssignedRole::Contributor => &[Permission::View, Permission::Change],
            AssignedRole::Owner => &[
                Permission::View,
                Permission::Change,
                Permission::Delete,
                Permission::ManagePermissions,
            ],
        }
    }

    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

impl std::str::FromStr for AssignedRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorized" | "viewer" => Ok(AssignedRole::Authorized),
            "contributor" => Ok(AssignedRole::Contributor),
            "owner" => Ok(AssignedRole::Owner),
            other => Err(AppError::Validation(format!("Invalid role: {}", other))),
        }
    }
}

/// Rejection for a change that would leave a resource without an owner.
pub const LAST_OWNER: &str = "Cannot remove the last owner. Assign another owner first.";

/// Whether `user_id` is the only entry in `owners`.
pub fn is_sole_owner(owners: &[Uuid], user_id: Uuid) -> bool {
    owners == [user_id]
}

/// Stored role assignment
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RoleAssignment {
    pub user_id: Uuid,
    pub resource_kind: ResourceKind,
    pub resource_id: i64,
    pub role: AssignedRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role assignment joined with the user it belongs to.
#[derive(Debug, Clone, FromRow)]
pub struct RoleMember {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: AssignedRole,
}

impl RoleMember {
    pub fn display_name(&self) -> String {
        super::user::display_name(&self.username, &self.first_name, &self.last_name, &self.email)
    }
}
