//! Sample service. Samples are standalone records with their own security
//! level, so access follows the same matrix as investigations.

use std::sync::Arc;

use crate::error::Result;
use crate::models::role::ResourceKind;
use crate::models::sample::{Sample, SampleFilter, SampleInput};
use crate::services::rbac::{Principal, ResourceAccess};
use crate::services::{assigned_role, forbidden, not_found, require_user, roles_by_kind};
use crate::storage::CatalogueStore;

#[derive(Debug, Clone)]
pub struct SampleView {
    pub sample: Sample,
    pub access: ResourceAccess,
}

pub struct SampleService {
    store: Arc<dyn CatalogueStore>,
}

impl SampleService {
    pub fn new(store: Arc<dyn CatalogueStore>) -> Self {
        Self { store }
    }

    /// Samples the caller can read, ordered by id.
    pub async fn list(
        &self,
        principal: &Principal,
        filter: &SampleFilter,
    ) -> Result<Vec<SampleView>> {
        let samples = self.store.list_samples(filter).await?;
        let roles = roles_by_kind(self.store.as_ref(), principal, ResourceKind::Sample).await?;

        Ok(samples
            .into_iter()
            .filter_map(|sample| {
                let assigned = roles.get(&sample.id).copied();
                let access = ResourceAccess::sample(principal, sample.security_level, assigned);
                access.read.then_some(SampleView { sample, access })
            })
            .collect())
    }

    pub async fn lookup(&self, accession_code: &str) -> Result<Sample> {
        self.store
            .find_sample(accession_code)
            .await?
            .ok_or_else(|| not_found(ResourceKind::Sample, accession_code))
    }

    async fn view(&self, principal: &Principal, sample: Sample) -> Result<SampleView> {
        let assigned =
            assigned_role(self.store.as_ref(), principal, ResourceKind::Sample, sample.id).await?;
        let access = ResourceAccess::sample(principal, sample.security_level, assigned);
        Ok(SampleView { sample, access })
    }

    pub async fn get(&self, principal: &Principal, accession_code: &str) -> Result<SampleView> {
        let sample = self.lookup(accession_code).await?;
        let view = self.view(principal, sample).await?;
        if !view.access.read {
            return Err(forbidden());
        }
        Ok(view)
    }

    /// Register a sample owned by the caller.
    pub async fn create(&self, principal: &Principal, input: SampleInput) -> Result<SampleView> {
        let owner = require_user(principal)?;
        input.validate()?;

        let sample = self.store.create_sample(&input, owner).await?;
        tracing::info!(
            accession_code = %sample.accession_code,
            sample_type = %sample.sample_type,
            "Sample registered"
        );
        self.view(principal, sample).await
    }

    pub async fn update<F>(
        &self,
        principal: &Principal,
        accession_code: &str,
        build: F,
    ) -> Result<SampleView>
    where
        F: FnOnce(&Sample) -> Result<SampleInput> + Send,
    {
        let current = self.get(principal, accession_code).await?;
        if !current.access.write {
            return Err(forbidden());
        }

        let input = build(&current.sample)?;
        input.validate()?;
        let sample = self.store.update_sample(current.sample.id, &input).await?;
        self.view(principal, sample).await
    }

    pub async fn delete(&self, principal: &Principal, accession_code: &str) -> Result<()> {
        let current = self.get(principal, accession_code).await?;
        if !current.access.delete {
            return Err(forbidden());
        }
        self.store.delete_sample(current.sample.id).await?;
        tracing::info!(accession_code = %accession_code, "Sample deleted");
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

    fn input(sample_type: &str) -> SampleInput {
        SampleInput {
            sample_type: sample_type.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_new_samples_are_confidential() {
        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        let owner = principal(&store, "owner", false).await;
        let staff = principal(&store, "staff", true).await;
        let service = SampleService::new(store);

        let view = service.create(&owner, input("leaf")).await.unwrap();
        assert_eq!(view.sample.accession_code, "CXRX1");
        assert_eq!(view.sample.security_level, SecurityLevel::Confidential);
        assert!(view.access.manage_permissions);

        let err = service.get(&staff, "CXRX1").await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
        let err = service.get(&staff, "CXRX2").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_uses_sample_roles() {
        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        let owner = principal(&store, "owner", false).await;
        let reader = principal(&store, "reader", false).await;
        let service = SampleService::new(store.clone());

        service.create(&owner, input("leaf")).await.unwrap();
        let mut public = input("root");
        public.security_level = SecurityLevel::Public;
        service.create(&owner, public).await.unwrap();

        let visible = service.list(&reader, &SampleFilter::default()).await.unwrap();
        assert_eq!(visible.len(), 1);

        store
            .set_role(reader.user_id().unwrap(), ResourceKind::Sample, 1, AssignedRole::Authorized)
            .await
            .unwrap();
        let visible = service.list(&reader, &SampleFilter::default()).await.unwrap();
        assert_eq!(visible.len(), 2);
        assert!(!visible[0].access.write);
    }

    #[tokio::test]
    async fn test_contributor_updates_owner_deletes() {
        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        let owner = principal(&store, "owner", false).await;
        let contributor = principal(&store, "contributor", false).await;
        let service = SampleService::new(store.clone());
        service.create(&owner, input("leaf")).await.unwrap();
        store
            .set_role(
                contributor.user_id().unwrap(),
                ResourceKind::Sample,
                1,
                AssignedRole::Contributor,
            )
            .await
            .unwrap();

        let updated = service
            .update(&contributor, "CXRX1", |current| {
                let mut next = SampleInput::from(current);
                next.name = Some("Leaf disc".into());
                Ok(next)
            })
            .await
            .unwrap();
        assert_eq!(updated.sample.label(), "Leaf disc");

        let err = service.delete(&contributor, "CXRX1").await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
        service.delete(&owner, "CXRX1").await.unwrap();
    }
}
