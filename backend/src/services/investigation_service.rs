//! Investigation service.
//!
//! Every operation takes the calling [`Principal`] and applies the access
//! rules from [`crate::services::rbac`]. Missing records are reported as
//! not found before permissions are considered.

use std::sync::Arc;

use crate::error::Result;
use crate::models::investigation::{Investigation, InvestigationFilter, InvestigationInput};
use crate::models::role::ResourceKind;
use crate::services::rbac::{Principal, ResourceAccess};
use crate::services::{assigned_role, forbidden, not_found, require_user, roles_by_kind};
use crate::storage::CatalogueStore;

/// Investigation together with the caller's access to it.
#[derive(Debug, Clone)]
pub struct InvestigationView {
    pub investigation: Investigation,
    pub access: ResourceAccess,
}

pub struct InvestigationService {
    store: Arc<dyn CatalogueStore>,
}

impl InvestigationService {
    pub fn new(store: Arc<dyn CatalogueStore>) -> Self {
        Self { store }
    }

    /// Investigations the caller can read, ordered by id.
    pub async fn list(
        &self,
        principal: &Principal,
        filter: &InvestigationFilter,
    ) -> Result<Vec<InvestigationView>> {
        let investigations = self.store.list_investigations(filter).await?;
        let roles =
            roles_by_kind(self.store.as_ref(), principal, ResourceKind::Investigation).await?;

        Ok(investigations
            .into_iter()
            .filter_map(|investigation| {
                let assigned = roles.get(&investigation.id).copied();
                let level = investigation.security_level;
                let access = ResourceAccess::investigation(principal, level, assigned);
                access.read.then_some(InvestigationView {
                    investigation,
                    access,
                })
            })
            .collect())
    }

    /// Look up by accession code without an access check.
    pub async fn lookup(&self, accession_code: &str) -> Result<Investigation> {
        self.store
            .find_investigation(accession_code)
            .await?
            .ok_or_else(|| not_found(ResourceKind::Investigation, accession_code))
    }

    /// Access summary for an investigation the caller may or may not read.
    pub async fn access(
        &self,
        principal: &Principal,
        investigation: &Investigation,
    ) -> Result<ResourceAccess> {
        let assigned = assigned_role(
            self.store.as_ref(),
            principal,
            ResourceKind::Investigation,
            investigation.id,
        )
        .await?;
        Ok(ResourceAccess::investigation(
            principal,
            investigation.security_level,
            assigned,
        ))
    }

    /// Fetch a readable investigation.
    pub async fn get(
        &self,
        principal: &Principal,
        accession_code: &str,
    ) -> Result<InvestigationView> {
        let investigation = self.lookup(accession_code).await?;
        let access = self.access(principal, &investigation).await?;
        if !access.read {
            return Err(forbidden());
        }
        Ok(InvestigationView {
            investigation,
            access,
        })
    }

    /// Create an investigation owned by the caller.
    pub async fn create(
        &self,
        principal: &Principal,
        input: InvestigationInput,
    ) -> Result<InvestigationView> {
        let owner = require_user(principal)?;
        input.validate()?;

        let investigation = self.store.create_investigation(&input, owner).await?;
        tracing::info!(
            accession_code = %investigation.accession_code,
            owner = %owner,
            "Investigation created"
        );

        let access = self.access(principal, &investigation).await?;
        Ok(InvestigationView {
            investigation,
            access,
        })
    }

    /// Replace the writable fields with the input built from the current record.
    pub async fn update<F>(
        &self,
        principal: &Principal,
        accession_code: &str,
        build: F,
    ) -> Result<InvestigationView>
    where
        F: FnOnce(&Investigation) -> Result<InvestigationInput> + Send,
    {
        let current = self.get(principal, accession_code).await?;
        if !current.access.write {
            return Err(forbidden());
        }

        let input = build(&current.investigation)?;
        input.validate()?;
        let investigation = self
            .store
            .update_investigation(current.investigation.id, &input)
            .await?;
        let access = self.access(principal, &investigation).await?;
        Ok(InvestigationView {
            investigation,
            access,
        })
    }

    /// Delete an investigation with its studies and assays.
    pub async fn delete(&self, principal: &Principal, accession_code: &str) -> Result<()> {
        let current = self.get(principal, accession_code).await?;
        if !current.access.delete {
            return Err(forbidden());
        }
        self.store
            .delete_investigation(current.investigation.id)
            .await?;
        tracing::info!(accession_code = %accession_code, "Investigation deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::role::AssignedRole;
    use crate::models::security_level::SecurityLevel;
    use crate::models::user::NewUser;
    use crate::storage::MemoryStore;

    async fn principal(
        store: &Arc<dyn CatalogueStore>,
        username: &str,
        is_staff: bool,
    ) -> Principal {
        let user = store
            .create_user(NewUser {
                username: username.into(),
                email: format!("{}@example.org", username),
                first_name: String::new(),
                last_name: String::new(),
                password_hash: "x".into(),
                is_staff,
                is_superuser: false,
            })
            .await
            .unwrap();
        Principal::from(&user)
    }

    fn input(title: &str, level: SecurityLevel) -> InvestigationInput {
        InvestigationInput {
            title: title.into(),
            security_level: level,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_requires_authentication() {
        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        let service = InvestigationService::new(store);
        let err = service
            .create(&Principal::Anonymous, input("Soil", SecurityLevel::Public))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_creator_becomes_owner() {
        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        let owner = principal(&store, "owner", false).await;
        let service = InvestigationService::new(store.clone());

        let view = service
            .create(&owner, input("Soil", SecurityLevel::Confidential))
            .await
            .unwrap();
        assert_eq!(view.investigation.accession_code, "CXRP1");
        assert!(view.access.manage_permissions);

        let role = store
            .get_role(owner.user_id().unwrap(), ResourceKind::Investigation, 1)
            .await
            .unwrap();
        assert_eq!(role, Some(AssignedRole::Owner));
    }

    #[tokio::test]
    async fn test_list_filters_unreadable() {
        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        let owner = principal(&store, "owner", false).await;
        let staff = principal(&store, "staff", true).await;
        let service = InvestigationService::new(store);

        for level in SecurityLevel::ALL {
            service
                .create(&owner, input(level.label(), level))
                .await
                .unwrap();
        }

        let anonymous = service
            .list(&Principal::Anonymous, &InvestigationFilter::default())
            .await
            .unwrap();
        assert_eq!(anonymous.len(), 1);

        let internal = service
            .list(&staff, &InvestigationFilter::default())
            .await
            .unwrap();
        let levels: Vec<_> = internal
            .iter()
            .map(|v| v.investigation.security_level)
            .collect();
        assert_eq!(levels, vec![SecurityLevel::Public, SecurityLevel::Internal]);

        let all = service
            .list(&owner, &InvestigationFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_forbidden_versus_not_found() {
        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        let owner = principal(&store, "owner", false).await;
        let service = InvestigationService::new(store);
        service
            .create(&owner, input("Secret", SecurityLevel::Restricted))
            .await
            .unwrap();

        let err = service.get(&Principal::Anonymous, "CXRP1").await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
        let err = service.get(&Principal::Anonymous, "CXRP99").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_and_delete_permissions() {
        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        let owner = principal(&store, "owner", false).await;
        let contributor = principal(&store, "contributor", false).await;
        let service = InvestigationService::new(store.clone());
        service
            .create(&owner, input("Soil", SecurityLevel::Public))
            .await
            .unwrap();
        store
            .set_role(
                contributor.user_id().unwrap(),
                ResourceKind::Investigation,
                1,
                AssignedRole::Contributor,
            )
            .await
            .unwrap();

        let updated = service
            .update(&contributor, "CXRP1", |current| {
                let mut next = InvestigationInput::from(current);
                next.title = "Soil microbiome".into();
                Ok(next)
            })
            .await
            .unwrap();
        assert_eq!(updated.investigation.title, "Soil microbiome");

        let err = service.delete(&contributor, "CXRP1").await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
        service.delete(&owner, "CXRP1").await.unwrap();
        assert!(service.lookup("CXRP1").await.is_err());
    }
}
