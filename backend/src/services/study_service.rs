//! Study service.
//!
//! Reading a study first applies the study's own role and security level,
//! then falls back to the caller's role on the parent investigation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::models::investigation::Investigation;
use crate::models::role::ResourceKind;
use crate::models::study::{Study, StudyFilter, StudyInput};
use crate::services::rbac::{self, Principal, ResourceAccess};
use crate::services::{assigned_role, forbidden, not_found, require_user, roles_by_kind};
use crate::storage::CatalogueStore;

/// Study with its parent investigation and the caller's access.
#[derive(Debug, Clone)]
pub struct StudyView {
    pub study: Study,
    pub investigation: Investigation,
    pub access: ResourceAccess,
}

pub struct StudyService {
    store: Arc<dyn CatalogueStore>,
}

impl StudyService {
    pub fn new(store: Arc<dyn CatalogueStore>) -> Self {
        Self { store }
    }

    async fn investigation_by_id(&self, id: i64) -> Result<Investigation> {
        self.store
            .get_investigation(id)
            .await?
            .ok_or_else(|| {
                let code = ResourceKind::Investigation.accession_code(id);
                not_found(ResourceKind::Investigation, &code)
            })
    }

    async fn investigation_by_code(&self, code: &str) -> Result<Investigation> {
        self.store
            .find_investigation(code)
            .await?
            .ok_or_else(|| not_found(ResourceKind::Investigation, code))
    }

    /// Study by accession code without an access check.
    pub async fn lookup(&self, accession_code: &str) -> Result<Study> {
        self.store
            .find_study(accession_code)
            .await?
            .ok_or_else(|| not_found(ResourceKind::Study, accession_code))
    }

    pub async fn access(&self, principal: &Principal, study: &Study) -> Result<ResourceAccess> {
        let store = self.store.as_ref();
        let study_role = assigned_role(store, principal, ResourceKind::Study, study.id).await?;
        let investigation_role = assigned_role(
            store,
            principal,
            ResourceKind::Investigation,
            study.investigation_id,
        )
        .await?;
        Ok(ResourceAccess::study(
            principal,
            study.security_level,
            study_role,
            investigation_role,
        ))
    }

    async fn view(&self, principal: &Principal, study: Study) -> Result<StudyView> {
        let investigation = self.investigation_by_id(study.investigation_id).await?;
        let access = self.access(principal, &study).await?;
        Ok(StudyView {
            study,
            investigation,
            access,
        })
    }

    /// Studies the caller can read, ordered by id.
    pub async fn list(
        &self,
        principal: &Principal,
        filter: &StudyFilter,
    ) -> Result<Vec<StudyView>> {
        let store = self.store.as_ref();
        let studies = store.list_studies(filter).await?;
        let study_roles = roles_by_kind(store, principal, ResourceKind::Study).await?;
        let investigation_roles =
            roles_by_kind(store, principal, ResourceKind::Investigation).await?;

        let mut investigations: HashMap<i64, Investigation> = HashMap::new();
        let mut views = Vec::new();
        for study in studies {
            let access = ResourceAccess::study(
                principal,
                study.security_level,
                study_roles.get(&study.id).copied(),
                investigation_roles.get(&study.investigation_id).copied(),
            );
            if !access.read {
                continue;
            }
            let investigation = match investigations.get(&study.investigation_id) {
                Some(inv) => inv.clone(),
                None => {
                    let inv = self.investigation_by_id(study.investigation_id).await?;
                    investigations.insert(inv.id, inv.clone());
                    inv
                }
            };
            views.push(StudyView {
                study,
                investigation,
                access,
            });
        }
        Ok(views)
    }

    /// Readable studies of a readable investigation.
    pub async fn list_in_investigation(
        &self,
        principal: &Principal,
        investigation_code: &str,
        filter: StudyFilter,
    ) -> Result<Vec<StudyView>> {
        let investigation = self.investigation_by_code(investigation_code).await?;
        let role = assigned_role(
            self.store.as_ref(),
            principal,
            ResourceKind::Investigation,
            investigation.id,
        )
        .await?;
        if !rbac::can_read(principal, investigation.security_level, role) {
            return Err(forbidden());
        }
        let filter = StudyFilter {
            investigation_id: Some(investigation.id),
            ..filter
        };
        self.list(principal, &filter).await
    }

    /// Fetch a readable study.
    pub async fn get(&self, principal: &Principal, accession_code: &str) -> Result<StudyView> {
        let study = self.lookup(accession_code).await?;
        let view = self.view(principal, study).await?;
        if !view.access.read {
            return Err(forbidden());
        }
        Ok(view)
    }

    /// Fetch a readable study that must belong to the given investigation.
    pub async fn get_in_investigation(
        &self,
        principal: &Principal,
        investigation_code: &str,
        accession_code: &str,
    ) -> Result<StudyView> {
        let investigation = self.investigation_by_code(investigation_code).await?;
        let study = self.lookup(accession_code).await?;
        if study.investigation_id != investigation.id {
            return Err(not_found(ResourceKind::Study, accession_code));
        }
        self.get(principal, accession_code).await
    }

    /// Create a study; the caller needs write access to the investigation.
    pub async fn create(&self, principal: &Principal, input: StudyInput) -> Result<StudyView> {
        let owner = require_user(principal)?;
        let investigation = self.investigation_by_id(input.investigation_id).await?;
        self.require_investigation_write(principal, &investigation).await?;
        input.validate()?;

        let study = self.store.create_study(&input, owner).await?;
        tracing::info!(
            accession_code = %study.accession_code,
            investigation = %investigation.accession_code,
            "Study created"
        );
        self.view(principal, study).await
    }

    /// Create a study under the investigation with this accession code.
    pub async fn create_in_investigation(
        &self,
        principal: &Principal,
        investigation_code: &str,
        mut input: StudyInput,
    ) -> Result<StudyView> {
        require_user(principal)?;
        let investigation = self.investigation_by_code(investigation_code).await?;
        input.investigation_id = investigation.id;
        self.create(principal, input).await
    }

    async fn require_investigation_write(
        &self,
        principal: &Principal,
        investigation: &Investigation,
    ) -> Result<()> {
        let role = assigned_role(
            self.store.as_ref(),
            principal,
            ResourceKind::Investigation,
            investigation.id,
        )
        .await?;
        if !rbac::can_write(principal, role) {
            return Err(forbidden());
        }
        Ok(())
    }

    /// Replace the writable fields with the input built from the current record.
    ///
    /// Moving a study to another investigation also needs write access there.
    pub async fn update<F>(
        &self,
        principal: &Principal,
        accession_code: &str,
        build: F,
    ) -> Result<StudyView>
    where
        F: FnOnce(&StudyView) -> Result<StudyInput> + Send,
    {
        let current = self.get(principal, accession_code).await?;
        if !current.access.write {
            return Err(forbidden());
        }

        let input = build(&current)?;
        input.validate()?;
        if input.investigation_id != current.study.investigation_id {
            let target = self.investigation_by_id(input.investigation_id).await?;
            self.require_investigation_write(principal, &target).await?;
        }

        let study = self.store.update_study(current.study.id, &input).await?;
        self.view(principal, study).await
    }

    /// Delete a study with its assays.
    pub async fn delete(&self, principal: &Principal, accession_code: &str) -> Result<()> {
        let current = self.get(principal, accession_code).await?;
        if !current.access.delete {
            return Err(forbidden());
        }
        self.store.delete_study(current.study.id).await?;
        tracing::info!(accession_code = %accession_code, "Study deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::investigation::InvestigationInput;
    use crate::models::role::AssignedRole;
    use crate::models::security_level::SecurityLevel;
    use crate::models::user::NewUser;
    use crate::storage::MemoryStore;

    struct Fixture {
        store: Arc<dyn CatalogueStore>,
        owner: Principal,
        other: Principal,
    }

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

    /// One investigation (CXRP1) owned by `owner` holding a study at `level`.
    async fn fixture(investigation_level: SecurityLevel, study_level: SecurityLevel) -> Fixture {
        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        let owner = user(&store, "owner").await;
        let other = user(&store, "other").await;
        store
            .create_investigation(
                &InvestigationInput {
                    title: "Parent".into(),
                    security_level: investigation_level,
                    ..Default::default()
                },
                owner.user_id().unwrap(),
            )
            .await
            .unwrap();
        store
            .create_study(
                &StudyInput {
                    investigation_id: 1,
                    title: "Child".into(),
                    security_level: study_level,
                    ..Default::default()
                },
                owner.user_id().unwrap(),
            )
            .await
            .unwrap();
        Fixture { store, owner, other }
    }

    #[tokio::test]
    async fn test_read_falls_back_to_investigation_role() {
        let f = fixture(SecurityLevel::Restricted, SecurityLevel::Restricted).await;
        let service = StudyService::new(f.store.clone());

        let err = service.get(&f.other, "CXRS1").await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        f.store
            .set_role(
                f.other.user_id().unwrap(),
                ResourceKind::Investigation,
                1,
                AssignedRole::Authorized,
            )
            .await
            .unwrap();
        let view = service.get(&f.other, "CXRS1").await.unwrap();
        assert!(view.access.read);
        assert!(!view.access.write);
    }

    #[tokio::test]
    async fn test_confidential_study_needs_investigation_owner() {
        let f = fixture(SecurityLevel::Public, SecurityLevel::Confidential).await;
        let service = StudyService::new(f.store.clone());
        f.store
            .set_role(
                f.other.user_id().unwrap(),
                ResourceKind::Investigation,
                1,
                AssignedRole::Contributor,
            )
            .await
            .unwrap();
        assert!(service.get(&f.other, "CXRS1").await.is_err());

        f.store
            .set_role(
                f.other.user_id().unwrap(),
                ResourceKind::Investigation,
                1,
                AssignedRole::Owner,
            )
            .await
            .unwrap();
        assert!(service.get(&f.other, "CXRS1").await.is_ok());
    }

    #[tokio::test]
    async fn test_nested_lookup_checks_parent() {
        let f = fixture(SecurityLevel::Public, SecurityLevel::Public).await;
        f.store
            .create_investigation(
                &InvestigationInput {
                    title: "Unrelated".into(),
                    security_level: SecurityLevel::Public,
                    ..Default::default()
                },
                f.owner.user_id().unwrap(),
            )
            .await
            .unwrap();
        let service = StudyService::new(f.store.clone());

        assert!(service
            .get_in_investigation(&Principal::Anonymous, "CXRP1", "CXRS1")
            .await
            .is_ok());
        let err = service
            .get_in_investigation(&Principal::Anonymous, "CXRP2", "CXRS1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_in_unreadable_investigation_is_forbidden() {
        let f = fixture(SecurityLevel::Confidential, SecurityLevel::Public).await;
        let service = StudyService::new(f.store.clone());
        let err = service
            .list_in_investigation(&f.other, "CXRP1", StudyFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        let studies = service
            .list_in_investigation(&f.owner, "CXRP1", StudyFilter::default())
            .await
            .unwrap();
        assert_eq!(studies.len(), 1);
    }

    #[tokio::test]
    async fn test_create_requires_investigation_write() {
        let f = fixture(SecurityLevel::Public, SecurityLevel::Public).await;
        let service = StudyService::new(f.store.clone());
        let input = StudyInput {
            title: "Another".into(),
            ..Default::default()
        };

        let err = service
            .create_in_investigation(&f.other, "CXRP1", input.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        let view = service
            .create_in_investigation(&f.owner, "CXRP1", input)
            .await
            .unwrap();
        assert_eq!(view.study.accession_code, "CXRS2");
        assert_eq!(view.investigation.accession_code, "CXRP1");
        assert!(view.access.manage_permissions);
    }
}
