//! Business logic services.

pub mod assay_service;
pub mod auth_service;
pub mod export_service;
pub mod institution_service;
pub mod investigation_service;
pub mod rbac;
pub mod role_service;
pub mod sample_service;
pub mod seed_service;
pub mod study_service;
pub mod token_service;
pub mod user_service;

use std::collections::HashMap;

use crate::error::{AppError, Result};
use crate::models::role::{AssignedRole, ResourceKind};
use crate::services::rbac::Principal;
use crate::storage::CatalogueStore;

pub(crate) const PERMISSION_DENIED: &str = "You do not have permission to perform this action.";

pub(crate) fn forbidden() -> AppError {
    AppError::Authorization(PERMISSION_DENIED.to_string())
}

pub(crate) fn not_found(kind: ResourceKind, code: &str) -> AppError {
    let label = match kind {
        ResourceKind::Investigation => "Investigation",
        ResourceKind::Study => "Study",
        ResourceKind::Assay => "Assay",
        ResourceKind::Sample => "Sample",
    };
    AppError::NotFound(format!("{} {} not found", label, code))
}

/// The caller's explicit role on one resource.
pub(crate) async fn assigned_role(
    store: &dyn CatalogueStore,
    principal: &Principal,
    kind: ResourceKind,
    resource_id: i64,
) -> Result<Option<AssignedRole>> {
    match principal.user_id() {
        Some(user_id) => store.get_role(user_id, kind, resource_id).await,
        None => Ok(None),
    }
}

/// Every explicit role the caller holds on resources of `kind`.
pub(crate) async fn roles_by_kind(
    store: &dyn CatalogueStore,
    principal: &Principal,
    kind: ResourceKind,
) -> Result<HashMap<i64, AssignedRole>> {
    match principal.user_id() {
        Some(user_id) => store.roles_for_user(user_id, kind).await,
        None => Ok(HashMap::new()),
    }
}

pub(crate) fn require_user(principal: &Principal) -> Result<uuid::Uuid> {
    principal
        .user_id()
        .ok_or_else(|| {
            AppError::Authentication("Authentication credentials were not provided.".into())
        })
}
