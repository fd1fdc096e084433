//! Role-based access control for catalogue resources.
//!
//! Access to an investigation, study, assay or sample is decided from two inputs:
//! the caller's explicit role on the resource (if any) and the resource's
//! [`SecurityLevel`]. Explicit roles grant object permissions directly; where
//! no explicit permission applies, the security matrix decides read access
//! from the caller's effective role.
//!
//! | level        | guest | internal | authorized+ |
//! |--------------|-------|----------|-------------|
//! | public       | read  | read     | read        |
//! | internal     |       | read     | read        |
//! | restricted   |       |          | read        |
//! | confidential |       |          | read        |
//!
//! Writes always need an explicit contributor or owner role (or superuser).
//!
//! Everything here is pure; callers load the relevant role assignments first.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::role::{AssignedRole, Permission};
use crate::models::security_level::SecurityLevel;
use crate::models::user::User;

/// Authenticated caller details needed for access decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPrincipal {
    pub id: Uuid,
    pub username: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// The caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User(UserPrincipal),
}

impl Principal {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Principal::Anonymous => None,
            Principal::User(u) => Some(u.id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Principal::User(_))
    }

    pub fn is_superuser(&self) -> bool {
        matches!(self, Principal::User(u) if u.is_superuser)
    }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Principal::User(UserPrincipal {
            id: user.id,
            username: user.username.clone(),
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
        })
    }
}

/// Role a caller effectively holds on one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveRole {
    Guest,
    Internal,
    Authorized,
    Contributor,
    Owner,
    Admin,
}

impl EffectiveRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectiveRole::Guest => "guest",
            EffectiveRole::Internal => "internal",
            EffectiveRole::Authorized => "authorized",
            EffectiveRole::Contributor => "contributor",
            EffectiveRole::Owner => "owner",
            EffectiveRole::Admin => "admin",
        }
    }
}

impl From<AssignedRole> for EffectiveRole {
    fn from(role: AssignedRole) -> Self {
        match role {
            AssignedRole::Authorized => EffectiveRole::Authorized,
            AssignedRole::Contributor => EffectiveRole::Contributor,
            AssignedRole::Owner => EffectiveRole::Owner,
        }
    }
}

/// Resolve the caller's role from an optional explicit assignment.
pub fn effective_role(principal: &Principal, assigned: Option<AssignedRole>) -> EffectiveRole {
    match principal {
        Principal::Anonymous => EffectiveRole::Guest,
        Principal::User(u) if u.is_superuser => EffectiveRole::Admin,
        Principal::User(u) => match assigned {
            Some(role) => role.into(),
            None if u.is_staff => EffectiveRole::Internal,
            None => EffectiveRole::Guest,
        },
    }
}

/// Whether an explicit assignment (or superuser status) grants `permission`.
pub fn has_permission(
    principal: &Principal,
    assigned: Option<AssignedRole>,
    permission: Permission,
) -> bool {
    match principal {
        Principal::Anonymous => false,
        Principal::User(u) if u.is_superuser => true,
        Principal::User(_) => assigned.is_some_and(|role| role.grants(permission)),
    }
}

/// Security matrix: may `role` read a resource at `level`?
pub fn security_allows(level: SecurityLevel, role: EffectiveRole) -> bool {
    match level {
        SecurityLevel::Public => true,
        SecurityLevel::Internal => role >= EffectiveRole::Internal,
        SecurityLevel::Restricted | SecurityLevel::Confidential => {
            role >= EffectiveRole::Authorized
        }
    }
}

/// Matrix applied to a study using the caller's role on the parent
/// investigation. Confidential studies are only opened to investigation
/// owners.
pub fn inherited_security_allows(level: SecurityLevel, parent_role: EffectiveRole) -> bool {
    match level {
        SecurityLevel::Public => true,
        SecurityLevel::Internal => parent_role >= EffectiveRole::Internal,
        SecurityLevel::Restricted => parent_role >= EffectiveRole::Authorized,
        SecurityLevel::Confidential => parent_role >= EffectiveRole::Owner,
    }
}

pub fn can_read(
    principal: &Principal,
    level: SecurityLevel,
    assigned: Option<AssignedRole>,
) -> bool {
    has_permission(principal, assigned, Permission::View)
        || security_allows(level, effective_role(principal, assigned))
}

pub fn can_write(principal: &Principal, assigned: Option<AssignedRole>) -> bool {
    has_permission(principal, assigned, Permission::Change)
}

pub fn can_delete(principal: &Principal, assigned: Option<AssignedRole>) -> bool {
    has_permission(principal, assigned, Permission::Delete)
}

pub fn can_manage_permissions(principal: &Principal, assigned: Option<AssignedRole>) -> bool {
    has_permission(principal, assigned, Permission::ManagePermissions)
}

/// Study read check with fallback to the caller's investigation role.
pub fn can_read_study(
    principal: &Principal,
    study_level: SecurityLevel,
    study_role: Option<AssignedRole>,
    investigation_role: Option<AssignedRole>,
) -> bool {
    can_read(principal, study_level, study_role)
        || inherited_security_allows(study_level, effective_role(principal, investigation_role))
}

/// Roles the caller holds along an assay's ancestry.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineageRoles {
    pub investigation: Option<AssignedRole>,
    pub study: Option<AssignedRole>,
    pub assay: Option<AssignedRole>,
}

/// Assays carry no security level; reading one follows its study.
pub fn can_read_assay(
    principal: &Principal,
    study_level: SecurityLevel,
    roles: LineageRoles,
) -> bool {
    has_permission(principal, roles.assay, Permission::View)
        || can_read_study(principal, study_level, roles.study, roles.investigation)
}

pub fn can_write_assay(principal: &Principal, roles: LineageRoles) -> bool {
    can_write(principal, roles.assay) || can_write(principal, roles.study)
}

/// Summary of the caller's access to one resource, returned by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct ResourceAccess {
    pub role: EffectiveRole,
    pub read: bool,
    pub write: bool,
    pub delete: bool,
    pub manage_permissions: bool,
}

impl ResourceAccess {
    /// Access to an investigation.
    pub fn investigation(
        principal: &Principal,
        level: SecurityLevel,
        assigned: Option<AssignedRole>,
    ) -> Self {
        Self {
            role: effective_role(principal, assigned),
            read: can_read(principal, level, assigned),
            write: can_write(principal, assigned),
            delete: can_delete(principal, assigned),
            manage_permissions: can_manage_permissions(principal, assigned),
        }
    }

    /// Access to a sample, decided like a top-level investigation.
    pub fn sample(
        principal: &Principal,
        level: SecurityLevel,
        assigned: Option<AssignedRole>,
    ) -> Self {
        Self::investigation(principal, level, assigned)
    }

    /// Access to a study, including the investigation fallback for reads.
    pub fn study(
        principal: &Principal,
        level: SecurityLevel,
        study_role: Option<AssignedRole>,
        investigation_role: Option<AssignedRole>,
    ) -> Self {
        Self {
            role: effective_role(principal, study_role),
            read: can_read_study(principal, level, study_role, investigation_role),
            write: can_write(principal, study_role),
            delete: can_delete(principal, study_role),
            manage_permissions: can_manage_permissions(principal, study_role),
        }
    }

    /// Access to an assay.
    pub fn assay(principal: &Principal, study_level: SecurityLevel, roles: LineageRoles) -> Self {
        Self {
            role: effective_role(principal, roles.assay),
            read: can_read_assay(principal, study_level, roles),
            write: can_write_assay(principal, roles),
            delete: can_delete(principal, roles.assay) || can_delete(principal, roles.study),
            manage_permissions: can_manage_permissions(principal, roles.assay),
        }
    }
}

/// Template-side check used by the catalogue page: `"read"` or `"write"`.
/// Unknown permission names and a missing investigation yield `false`.
pub fn has_investigation_permission(access: Option<&ResourceAccess>, permission: &str) -> bool {
    match (access, permission) {
        (Some(access), "read") => access.read,
        (Some(access), "write") => access.write,
        _ => false,
    }
}
