//! Catalogue persistence backends.
//!
//! [`CatalogueStore`] is the only seam between services and storage. The
//! PostgreSQL backend is used in production; the in-memory backend serves the
//! demo mode (`STORE_BACKEND=memory`) and handler tests.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::{Config, StoreBackend};
use crate::error::{AppError, Result};
use crate::models::api_token::{ApiToken, TokenListing};
use crate::models::assay::{Assay, AssayFilter, AssayInput};
use crate::models::institution::{
    Institution, InstitutionInput, InstitutionLink, InvestigationInstitution,
};
use crate::models::investigation::{Investigation, InvestigationFilter, InvestigationInput};
use crate::models::role::{AssignedRole, ResourceKind, RoleMember};
use crate::models::sample::{Sample, SampleFilter, SampleInput};
use crate::models::study::{Study, StudyFilter, StudyInput};
use crate::models::user::{NewUser, User, UserChanges};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Page of users returned by [`CatalogueStore::list_users`].
#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: i64,
}

/// Storage operations for users, tokens, catalogue records and role assignments.
///
/// Listings are returned ordered by id. Accession codes are assigned by the
/// store on insert. Deleting a record removes its descendants and every role
/// assignment attached to them.
#[async_trait]
pub trait CatalogueStore: Send + Sync {
    /// Cheap connectivity check used by health endpoints.
    async fn ping(&self) -> Result<()>;

    // users

    async fn create_user(&self, new_user: NewUser) -> Result<User>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Users whose username or email contains `search`, ordered by username.
    async fn list_users(&self, search: Option<&str>, offset: i64, limit: i64) -> Result<UserPage>;

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<User>;

    async fn delete_user(&self, id: Uuid) -> Result<()>;

    async fn touch_last_login(&self, id: Uuid) -> Result<()>;

    // api tokens

    async fn get_token_for_user(&self, user_id: Uuid) -> Result<Option<ApiToken>>;

    /// Fails with [`AppError::Conflict`] when the user already has a token.
    async fn insert_token(&self, user_id: Uuid, key: &str) -> Result<ApiToken>;

    async fn delete_token_for_user(&self, user_id: Uuid) -> Result<bool>;

    /// Owner of the token with this key.
    async fn find_user_by_token(&self, key: &str) -> Result<Option<User>>;

    async fn list_tokens(&self) -> Result<Vec<TokenListing>>;

    // investigations

    /// Insert an investigation and make `owner` its owner.
    async fn create_investigation(
        &self,
        input: &InvestigationInput,
        owner: Uuid,
    ) -> Result<Investigation>;

    async fn get_investigation(&self, id: i64) -> Result<Option<Investigation>>;

    async fn find_investigation(&self, accession_code: &str) -> Result<Option<Investigation>>;

    async fn list_investigations(&self, filter: &InvestigationFilter) -> Result<Vec<Investigation>>;

    async fn update_investigation(&self, id: i64, input: &InvestigationInput)
        -> Result<Investigation>;

    async fn delete_investigation(&self, id: i64) -> Result<()>;

    // studies

    /// Insert a study and make `owner` its owner.
    async fn create_study(&self, input: &StudyInput, owner: Uuid) -> Result<Study>;

    async fn get_study(&self, id: i64) -> Result<Option<Study>>;

    async fn find_study(&self, accession_code: &str) -> Result<Option<Study>>;

    async fn list_studies(&self, filter: &StudyFilter) -> Result<Vec<Study>>;

    async fn update_study(&self, id: i64, input: &StudyInput) -> Result<Study>;

    async fn delete_study(&self, id: i64) -> Result<()>;

    // assays

    /// Insert an assay and make `owner` its owner.
    async fn create_assay(&self, input: &AssayInput, owner: Uuid) -> Result<Assay>;

    async fn get_assay(&self, id: i64) -> Result<Option<Assay>>;

    async fn find_assay(&self, accession_code: &str) -> Result<Option<Assay>>;

    async fn list_assays(&self, filter: &AssayFilter) -> Result<Vec<Assay>>;

    async fn update_assay(&self, id: i64, input: &AssayInput) -> Result<Assay>;

    async fn delete_assay(&self, id: i64) -> Result<()>;

    // samples

    /// Insert a sample and make `owner` its owner.
    async fn create_sample(&self, input: &SampleInput, owner: Uuid) -> Result<Sample>;

    async fn get_sample(&self, id: i64) -> Result<Option<Sample>>;

    async fn find_sample(&self, accession_code: &str) -> Result<Option<Sample>>;

    async fn list_samples(&self, filter: &SampleFilter) -> Result<Vec<Sample>>;

    async fn update_sample(&self, id: i64, input: &SampleInput) -> Result<Sample>;

    async fn delete_sample(&self, id: i64) -> Result<()>;

    // institutions

    async fn create_institution(&self, input: &InstitutionInput) -> Result<Institution>;

    async fn get_institution(&self, id: i64) -> Result<Option<Institution>>;

    /// Institutions whose name contains `search`, ordered by name.
    async fn list_institutions(&self, search: Option<&str>) -> Result<Vec<Institution>>;

    async fn update_institution(&self, id: i64, input: &InstitutionInput) -> Result<Institution>;

    /// Deleting an institution also ends its participations.
    async fn delete_institution(&self, id: i64) -> Result<()>;

    /// Fails with [`AppError::Conflict`] when the institution already takes
    /// part in the investigation.
    async fn link_institution(
        &self,
        investigation_id: i64,
        link: &InstitutionLink,
    ) -> Result<InvestigationInstitution>;

    async fn unlink_institution(&self, investigation_id: i64, institution_id: i64)
        -> Result<bool>;

    /// Participating institutions ordered by join date, then name.
    async fn list_investigation_institutions(
        &self,
        investigation_id: i64,
    ) -> Result<Vec<InvestigationInstitution>>;

    // role assignments

    async fn get_role(
        &self,
        user_id: Uuid,
        kind: ResourceKind,
        resource_id: i64,
    ) -> Result<Option<AssignedRole>>;

    /// Insert or replace the user's role on the resource.
    async fn set_role(
        &self,
        user_id: Uuid,
        kind: ResourceKind,
        resource_id: i64,
        role: AssignedRole,
    ) -> Result<()>;

    async fn clear_role(&self, user_id: Uuid, kind: ResourceKind, resource_id: i64)
        -> Result<bool>;

    /// Users holding a role on the resource, ordered by username.
    async fn list_role_members(&self, kind: ResourceKind, resource_id: i64)
        -> Result<Vec<RoleMember>>;

    /// Every role the user holds on resources of `kind`, keyed by resource id.
    async fn roles_for_user(
        &self,
        user_id: Uuid,
        kind: ResourceKind,
    ) -> Result<HashMap<i64, AssignedRole>>;
}

/// Build the configured store, connecting and migrating for PostgreSQL.
pub async fn connect(config: &Config) -> Result<Arc<dyn CatalogueStore>> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory catalogue store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| AppError::Config("DATABASE_URL not set".into()))?;
            let pool = crate::db::create_pool(url).await?;
            tracing::info!("Connected to database");
            crate::db::run_migrations(&pool).await?;
            Ok(Arc::new(PostgresStore::new(pool)))
        }
    }
}
