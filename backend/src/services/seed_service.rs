//! Demo and test data.
//!
//! Creates one account per catalogue role and one investigation with a study
//! and an assay for every security level. Re-running reuses existing accounts
//! but always adds a fresh set of records.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::error::Result;
use crate::models::assay::AssayInput;
use crate::models::choices::{MeasurementType, TechnologyPlatform};
use crate::models::investigation::InvestigationInput;
use crate::models::role::{AssignedRole, ResourceKind};
use crate::models::security_level::SecurityLevel;
use crate::models::study::StudyInput;
use crate::models::user::{NewUser, User};
use crate::services::auth_service::AuthService;
use crate::storage::CatalogueStore;

/// `(username, is_staff, is_superuser)` for each seeded account.
pub const SEED_USERS: [(&str, bool, bool); 6] = [
    ("guest", false, false),
    ("internal", true, false),
    ("authorized", false, false),
    ("contributor", false, false),
    ("owner", false, false),
    ("superuser", true, true),
];

pub const DEFAULT_SEED_PASSWORD: &str = "userpass123";

#[derive(Debug, Default)]
pub struct SeedSummary {
    pub users_created: Vec<String>,
    pub users_existing: Vec<String>,
    /// Accession codes of created investigations, studies and assays
    pub records: Vec<String>,
}

pub struct SeedService {
    store: Arc<dyn CatalogueStore>,
}

impl SeedService {
    pub fn new(store: Arc<dyn CatalogueStore>) -> Self {
        Self { store }
    }

    async fn ensure_user(
        &self,
        username: &str,
        is_staff: bool,
        is_superuser: bool,
        password_hash: &str,
        summary: &mut SeedSummary,
    ) -> Result<User> {
        if let Some(user) = self.store.find_user_by_username(username).await? {
            summary.users_existing.push(username.to_string());
            return Ok(user);
        }
        let user = self
            .store
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                first_name: String::new(),
                last_name: String::new(),
                password_hash: password_hash.to_string(),
                is_staff,
                is_superuser,
            })
            .await?;
        summary.users_created.push(username.to_string());
        Ok(user)
    }

    pub async fn seed(&self, password: &str) -> Result<SeedSummary> {
        let mut summary = SeedSummary::default();
        let password_hash = AuthService::hash_password(password)?;

        let mut users = Vec::with_capacity(SEED_USERS.len());
        for (username, is_staff, is_superuser) in SEED_USERS {
            let user = self
                .ensure_user(username, is_staff, is_superuser, &password_hash, &mut summary)
                .await?;
            users.push(user);
        }
        let find = |name: &str| users.iter().find(|u| u.username == name).map(|u| u.id);
        let (Some(owner), Some(contributor), Some(authorized)) =
            (find("owner"), find("contributor"), find("authorized"))
        else {
            return Ok(summary);
        };

        let today = Utc::now().date_naive();
        for level in SecurityLevel::ALL {
            let investigation = self
                .store
                .create_investigation(
                    &InvestigationInput {
                        title: format!("{} Security Investigation", level.label()),
                        description: Some(format!(
                            "An investigation with {} security level",
                            level.label()
                        )),
                        submission_date: Some(today),
                        public_release_date: Some(today + Duration::days(30)),
                        security_level: level,
                        ..Default::default()
                    },
                    owner,
                )
                .await?;
            self.grant(ResourceKind::Investigation, investigation.id, contributor, authorized)
                .await?;

            let study = self
                .store
                .create_study(
                    &StudyInput {
                        investigation_id: investigation.id,
                        title: format!("{} Security Study", level.label()),
                        slug: Some(format!("{}-study", level.as_str())),
                        security_level: level,
                        ..Default::default()
                    },
                    owner,
                )
                .await?;
            self.grant(ResourceKind::Study, study.id, contributor, authorized)
                .await?;

            let assay = self
                .store
                .create_assay(
                    &AssayInput {
                        study_id: study.id,
                        title: format!("{} RNA-seq", level.label()),
                        description: String::new(),
                        measurement_type: MeasurementType::Transcriptomics,
                        technology_platform: TechnologyPlatform::Seq,
                    },
                    owner,
                )
                .await?;

            tracing::debug!(
                investigation = %investigation.accession_code,
                study = %study.accession_code,
                assay = %assay.accession_code,
                "Seeded {} records",
                level
            );
            summary.records.extend([
                investigation.accession_code,
                study.accession_code,
                assay.accession_code,
            ]);
        }

        Ok(summary)
    }

    async fn grant(
        &self,
        kind: ResourceKind,
        resource_id: i64,
        contributor: uuid::Uuid,
        authorized: uuid::Uuid,
    ) -> Result<()> {
        self.store
            .set_role(contributor, kind, resource_id, AssignedRole::Contributor)
            .await?;
        self.store
            .set_role(authorized, kind, resource_id, AssignedRole::Authorized)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_seed_creates_users_and_records() {
        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        let service = SeedService::new(store.clone());
        let summary = service.seed("pw").await.unwrap();

        assert_eq!(summary.users_created.len(), 6);
        assert_eq!(summary.records.len(), 12);
        assert_eq!(summary.records[0], "CXRP1");

        let internal = store.find_user_by_username("internal").await.unwrap().unwrap();
        assert!(internal.is_staff && !internal.is_superuser);

        let contributor = store
            .find_user_by_username("contributor")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            store
                .get_role(contributor.id, ResourceKind::Study, 1)
                .await
                .unwrap(),
            Some(AssignedRole::Contributor)
        );
    }

    #[tokio::test]
    async fn test_seed_reuses_accounts() {
        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        let service = SeedService::new(store);
        service.seed("pw").await.unwrap();
        let again = service.seed("pw").await.unwrap();
        assert!(again.users_created.is_empty());
        assert_eq!(again.users_existing.len(), 6);
        assert_eq!(again.records[0], "CXRP5");
    }
}
