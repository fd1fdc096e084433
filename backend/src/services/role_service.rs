//! Role assignment management for catalogue records.

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::role::{AssignedRole, ResourceKind, RoleMember};
use crate::services::assay_service::AssayService;
use crate::services::forbidden;
use crate::services::investigation_service::InvestigationService;
use crate::services::rbac::{Principal, ResourceAccess};
use crate::services::sample_service::SampleService;
use crate::services::study_service::StudyService;
use crate::storage::CatalogueStore;

/// One user's role on a resource.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoleEntry {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub role: AssignedRole,
    /// Permission names carried by the role
    pub permissions: Vec<String>,
}

impl From<RoleMember> for RoleEntry {
    fn from(member: RoleMember) -> Self {
        Self {
            display_name: member.display_name(),
            permissions: member
                .role
                .permissions()
                .iter()
                .map(|p| p.as_str().to_string())
                .collect(),
            user_id: member.user_id,
            username: member.username,
            email: member.email,
            role: member.role,
        }
    }
}

pub struct RoleService {
    store: Arc<dyn CatalogueStore>,
}

impl RoleService {
    pub fn new(store: Arc<dyn CatalogueStore>) -> Self {
        Self { store }
    }

    /// Resolve a readable resource to its row id and the caller's access.
    async fn resolve(
        &self,
        principal: &Principal,
        kind: ResourceKind,
        accession_code: &str,
    ) -> Result<(i64, ResourceAccess)> {
        let store = self.store.clone();
        match kind {
            ResourceKind::Investigation => {
                let view = InvestigationService::new(store).get(principal, accession_code).await?;
                Ok((view.investigation.id, view.access))
            }
            ResourceKind::Study => {
                let view = StudyService::new(store).get(principal, accession_code).await?;
                Ok((view.study.id, view.access))
            }
            ResourceKind::Assay => {
                let view = AssayService::new(store).get(principal, accession_code).await?;
                Ok((view.assay.id, view.access))
            }
            ResourceKind::Sample => {
                let view = SampleService::new(store).get(principal, accession_code).await?;
                Ok((view.sample.id, view.access))
            }
        }
    }

    async fn resolve_managed(
        &self,
        principal: &Principal,
        kind: ResourceKind,
        accession_code: &str,
    ) -> Result<i64> {
        let (id, access) = self.resolve(principal, kind, accession_code).await?;
        if !access.manage_permissions {
            return Err(forbidden());
        }
        Ok(id)
    }

    /// Users holding a role on the resource. Needs read access.
    pub async fn list(
        &self,
        principal: &Principal,
        kind: ResourceKind,
        accession_code: &str,
    ) -> Result<Vec<RoleEntry>> {
        let (id, _) = self.resolve(principal, kind, accession_code).await?;
        let members = self.store.list_role_members(kind, id).await?;
        Ok(members.into_iter().map(RoleEntry::from).collect())
    }

    /// Give `user_id` the role, replacing any role they already hold.
    pub async fn assign(
        &self,
        principal: &Principal,
        kind: ResourceKind,
        accession_code: &str,
        user_id: Uuid,
        role: AssignedRole,
    ) -> Result<RoleEntry> {
        let id = self.resolve_managed(principal, kind, accession_code).await?;
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        // The store refuses to demote the only owner
        self.store.set_role(user_id, kind, id, role).await?;
        tracing::info!(
            resource = %accession_code,
            user = %user.username,
            role = role.as_str(),
            "Role assigned"
        );

        Ok(RoleEntry::from(RoleMember {
            user_id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role,
        }))
    }

    /// Remove every role `user_id` holds on the resource.
    pub async fn remove(
        &self,
        principal: &Principal,
        kind: ResourceKind,
        accession_code: &str,
        user_id: Uuid,
    ) -> Result<()> {
        let id = self.resolve_managed(principal, kind, accession_code).await?;
        if !self.store.clear_role(user_id, kind, id).await? {
            return Err(AppError::NotFound("User has no role on this resource".into()));
        }
        tracing::info!(resource = %accession_code, user = %user_id, "Role removed");
        Ok(())
    }
}
