//! Assay service. Assays carry no security level; access follows the study.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::models::assay::{Assay, AssayFilter, AssayInput};
use crate::models::role::ResourceKind;
use crate::models::study::Study;
use crate::services::rbac::{self, LineageRoles, Principal, ResourceAccess};
use crate::services::{assigned_role, forbidden, not_found, require_user, roles_by_kind};
use crate::storage::CatalogueStore;

/// Assay with its study and the caller's access.
#[derive(Debug, Clone)]
pub struct AssayView {
    pub assay: Assay,
    pub study: Study,
    pub access: ResourceAccess,
}

pub struct AssayService {
    store: Arc<dyn CatalogueStore>,
}

impl AssayService {
    pub fn new(store: Arc<dyn CatalogueStore>) -> Self {
        Self { store }
    }

    async fn study_by_id(&self, id: i64) -> Result<Study> {
        self.store
            .get_study(id)
            .await?
            .ok_or_else(|| not_found(ResourceKind::Study, &ResourceKind::Study.accession_code(id)))
    }

    pub async fn lookup(&self, accession_code: &str) -> Result<Assay> {
        self.store
            .find_assay(accession_code)
            .await?
            .ok_or_else(|| not_found(ResourceKind::Assay, accession_code))
    }

    async fn lineage(
        &self,
        principal: &Principal,
        study: &Study,
        assay_id: Option<i64>,
    ) -> Result<LineageRoles> {
        let store = self.store.as_ref();
        let assay = match assay_id {
            Some(id) => assigned_role(store, principal, ResourceKind::Assay, id).await?,
            None => None,
        };
        Ok(LineageRoles {
            investigation: assigned_role(
                store,
                principal,
                ResourceKind::Investigation,
                study.investigation_id,
            )
            .await?,
            study: assigned_role(store, principal, ResourceKind::Study, study.id).await?,
            assay,
        })
    }

    async fn view(&self, principal: &Principal, assay: Assay) -> Result<AssayView> {
        let study = self.study_by_id(assay.study_id).await?;
        let roles = self.lineage(principal, &study, Some(assay.id)).await?;
        let access = ResourceAccess::assay(principal, study.security_level, roles);
        Ok(AssayView {
            assay,
            study,
            access,
        })
    }

    /// Assays the caller can read, ordered by id.
    pub async fn list(
        &self,
        principal: &Principal,
        filter: &AssayFilter,
    ) -> Result<Vec<AssayView>> {
        let store = self.store.as_ref();
        let assays = store.list_assays(filter).await?;
        let assay_roles = roles_by_kind(store, principal, ResourceKind::Assay).await?;
        let study_roles = roles_by_kind(store, principal, ResourceKind::Study).await?;
        let investigation_roles =
            roles_by_kind(store, principal, ResourceKind::Investigation).await?;

        let mut studies: HashMap<i64, Study> = HashMap::new();
        let mut views = Vec::new();
        for assay in assays {
            let study = match studies.get(&assay.study_id) {
                Some(study) => study.clone(),
                None => {
                    let study = self.study_by_id(assay.study_id).await?;
                    studies.insert(study.id, study.clone());
                    study
                }
            };
            let roles = LineageRoles {
                investigation: investigation_roles.get(&study.investigation_id).copied(),
                study: study_roles.get(&study.id).copied(),
                assay: assay_roles.get(&assay.id).copied(),
            };
            let access = ResourceAccess::assay(principal, study.security_level, roles);
            if access.read {
                views.push(AssayView {
                    assay,
                    study,
                    access,
                });
            }
        }
        Ok(views)
    }

    /// Readable assays of a readable study.
    pub async fn list_in_study(
        &self,
        principal: &Principal,
        study: &Study,
    ) -> Result<Vec<AssayView>> {
        self.list(principal, &AssayFilter::for_study(study.id)).await
    }

    pub async fn get(&self, principal: &Principal, accession_code: &str) -> Result<AssayView> {
        let assay = self.lookup(accession_code).await?;
        let view = self.view(principal, assay).await?;
        if !view.access.read {
            return Err(forbidden());
        }
        Ok(view)
    }

    /// Fetch a readable assay that must belong to the given study.
    pub async fn get_in_study(
        &self,
        principal: &Principal,
        study: &Study,
        accession_code: &str,
    ) -> Result<AssayView> {
        let assay = self.lookup(accession_code).await?;
        if assay.study_id != study.id {
            return Err(not_found(ResourceKind::Assay, accession_code));
        }
        self.get(principal, accession_code).await
    }

    async fn require_study_write(&self, principal: &Principal, study: &Study) -> Result<()> {
        let role =
            assigned_role(self.store.as_ref(), principal, ResourceKind::Study, study.id).await?;
        if !rbac::can_write(principal, role) {
            return Err(forbidden());
        }
        Ok(())
    }

    /// Create an assay; the caller needs write access to the study.
    pub async fn create(&self, principal: &Principal, input: AssayInput) -> Result<AssayView> {
        let owner = require_user(principal)?;
        let study = self.study_by_id(input.study_id).await?;
        self.require_study_write(principal, &study).await?;
        input.validate()?;

        let assay = self.store.create_assay(&input, owner).await?;
        tracing::info!(
            accession_code = %assay.accession_code,
            study = %study.accession_code,
            "Assay created"
        );
        self.view(principal, assay).await
    }

    pub async fn update<F>(
        &self,
        principal: &Principal,
        accession_code: &str,
        build: F,
    ) -> Result<AssayView>
    where
        F: FnOnce(&AssayView) -> Result<AssayInput> + Send,
    {
        let current = self.get(principal, accession_code).await?;
        if !current.access.write {
            return Err(forbidden());
        }

        let input = build(&current)?;
        input.validate()?;
        if input.study_id != current.assay.study_id {
            let target = self.study_by_id(input.study_id).await?;
            self.require_study_write(principal, &target).await?;
        }

        let assay = self.store.update_assay(current.assay.id, &input).await?;
        self.view(principal, assay).await
    }

    pub async fn delete(&self, principal: &Principal, accession_code: &str) -> Result<()> {
        let current = self.get(principal, accession_code).await?;
        if !current.access.delete {
            return Err(forbidden());
        }
        self.store.delete_assay(current.assay.id).await?;
        tracing::info!(accession_code = %accession_code, "Assay deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::choices::{MeasurementType, TechnologyPlatform};
    use crate::models::investigation::InvestigationInput;
    use crate::models::role::AssignedRole;
    use crate::models::security_level::SecurityLevel;
    use crate::models::study::StudyInput;
    use crate::models::user::NewUser;
    use crate::storage::MemoryStore;

    async fn user(store: &Arc<dyn CatalogueStore>, username: &str) -> Principal {
        let user = store
            .create_user(NewUser {
                username: username.into(),
                email: format!("{}@example.org", username),
                first_name: String::new(),
                last_name: String::new(),
                password_hash: "x".into(),
                is_staff: false,
                is_superuser: false,
            })
            .await
            .unwrap();
        Principal::from(&user)
    }

    fn assay_input(study_id: i64, title: &str) -> AssayInput {
        AssayInput {
            study_id,
            title: title.into(),
            description: String::new(),
            measurement_type: MeasurementType::Metabolomics,
            technology_platform: TechnologyPlatform::Ms,
        }
    }

    async fn setup(level: SecurityLevel) -> (Arc<dyn CatalogueStore>, Principal, Principal) {
        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        let owner = user(&store, "owner").await;
        let other = user(&store, "other").await;
        let owner_id = owner.user_id().unwrap();
        store
            .create_investigation(
                &InvestigationInput {
                    title: "Parent".into(),
                    security_level: level,
                    ..Default::default()
                },
                owner_id,
            )
            .await
            .unwrap();
        store
            .create_study(
                &StudyInput {
                    investigation_id: 1,
                    title: "Study".into(),
                    security_level: level,
                    ..Default::default()
                },
                owner_id,
            )
            .await
            .unwrap();
        (store, owner, other)
    }

    #[tokio::test]
    async fn test_study_contributor_can_create_and_edit() {
        let (store, owner, other) = setup(SecurityLevel::Confidential).await;
        let service = AssayService::new(store.clone());

        let err = service
            .create(&other, assay_input(1, "LC-MS run"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        store
            .set_role(other.user_id().unwrap(), ResourceKind::Study, 1, AssignedRole::Contributor)
            .await
            .unwrap();
        let created = service.create(&other, assay_input(1, "LC-MS run")).await.unwrap();
        assert_eq!(created.assay.accession_code, "CXRA1");

        let view = service.get(&owner, "CXRA1").await.unwrap();
        assert!(view.access.write);
        assert!(view.access.delete);
    }

    #[tokio::test]
    async fn test_list_hides_assays_of_unreadable_studies() {
        let (store, owner, other) = setup(SecurityLevel::Restricted).await;
        let service = AssayService::new(store);
        service.create(&owner, assay_input(1, "NMR profile")).await.unwrap();

        assert_eq!(service.list(&owner, &AssayFilter::default()).await.unwrap().len(), 1);
        assert!(service.list(&other, &AssayFilter::default()).await.unwrap().is_empty());
        let err = service.get(&other, "CXRA1").await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
    }

    #[tokio::test]
    async fn test_public_assay_is_read_only_for_anonymous() {
        let (store, owner, _) = setup(SecurityLevel::Public).await;
        let service = AssayService::new(store);
        service.create(&owner, assay_input(1, "Leaf scan")).await.unwrap();

        let view = service.get(&Principal::Anonymous, "CXRA1").await.unwrap();
        assert!(view.access.read);
        assert!(!view.access.write);
        let err = service.delete(&Principal::Anonymous, "CXRA1").await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
    }
}
