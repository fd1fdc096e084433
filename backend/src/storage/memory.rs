//! In-memory catalogue store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CatalogueStore, UserPage};
use crate::error::{AppError, Result};
use crate::models::api_token::{ApiToken, TokenListing};
use crate::models::assay::{Assay, AssayFilter, AssayInput};
use crate::models::institution::{
    Institution, InstitutionInput, InstitutionLink, InvestigationInstitution,
};
use crate::models::investigation::{Investigation, InvestigationFilter, InvestigationInput};
use crate::models::role::{
    is_sole_owner, AssignedRole, ResourceKind, RoleAssignment, RoleMember, LAST_OWNER,
};
use crate::models::sample::{Sample, SampleFilter, SampleInput};
use crate::models::study::{Study, StudyFilter, StudyInput};
use crate::models::user::{NewUser, User, UserChanges};

type RoleKey = (Uuid, ResourceKind, i64);

/// (investigation id, institution id)
type ParticipationKey = (i64, i64);

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    tokens: HashMap<Uuid, ApiToken>,
    investigations: BTreeMap<i64, Investigation>,
    studies: BTreeMap<i64, Study>,
    assays: BTreeMap<i64, Assay>,
    samples: BTreeMap<i64, Sample>,
    institutions: BTreeMap<i64, Institution>,
    participations: BTreeMap<ParticipationKey, InstitutionLink>,
    roles: HashMap<RoleKey, RoleAssignment>,
    next_investigation_id: i64,
    next_study_id: i64,
    next_assay_id: i64,
    next_sample_id: i64,
    next_institution_id: i64,
}

impl Tables {
    fn grant_owner(&mut self, user_id: Uuid, kind: ResourceKind, resource_id: i64) {
        let now = Utc::now();
        self.roles.insert(
            (user_id, kind, resource_id),
            RoleAssignment {
                user_id,
                resource_kind: kind,
                resource_id,
                role: AssignedRole::Owner,
                created_at: now,
                updated_at: now,
            },
        );
    }

    fn owners(&self, kind: ResourceKind, resource_id: i64) -> Vec<Uuid> {
        self.roles
            .values()
            .filter(|r| {
                r.resource_kind == kind
                    && r.resource_id == resource_id
                    && r.role == AssignedRole::Owner
            })
            .map(|r| r.user_id)
            .collect()
    }

    fn drop_roles_for(&mut self, kind: ResourceKind, resource_id: i64) {
        self.roles
            .retain(|(_, k, id), _| !(*k == kind && *id == resource_id));
    }

    fn remove_assay(&mut self, id: i64) {
        self.assays.remove(&id);
        self.drop_roles_for(ResourceKind::Assay, id);
    }

    fn remove_study(&mut self, id: i64) {
        let assay_ids: Vec<i64> = self
            .assays
            .values()
            .filter(|a| a.study_id == id)
            .map(|a| a.id)
            .collect();
        for assay_id in assay_ids {
            self.remove_assay(assay_id);
        }
        self.studies.remove(&id);
        self.drop_roles_for(ResourceKind::Study, id);
    }

    fn participation(
        &self,
        investigation_id: i64,
        link: &InstitutionLink,
    ) -> InvestigationInstitution {
        InvestigationInstitution {
            investigation_id,
            institution_id: link.institution_id,
            institution_name: self
                .institutions
                .get(&link.institution_id)
                .map(|i| i.name.clone())
                .unwrap_or_default(),
            contribution_amount: link.contribution_amount.clone(),
            join_date: link.join_date,
        }
    }

    fn require_user(&self, id: Uuid) -> Result<()> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(AppError::NotFound("User not found".into()))
        }
    }
}

/// Catalogue store kept entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogueStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    // ---- users ----

    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.username == new_user.username) {
            return Err(AppError::Conflict(format!(
                "Username '{}' already exists",
                new_user.username
            )));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            password_hash: new_user.password_hash,
            is_active: true,
            is_staff: new_user.is_staff,
            is_superuser: new_user.is_superuser,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self, search: Option<&str>, offset: i64, limit: i64) -> Result<UserPage> {
        let t = self.tables.read().await;
        let needle = search.map(str::to_lowercase);
        let mut users: Vec<User> = t
            .users
            .values()
            .filter(|u| match &needle {
                Some(n) => {
                    u.username.to_lowercase().contains(n) || u.email.to_lowercase().contains(n)
                }
                None => true,
            })
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        let total = users.len() as i64;
        let users = users
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok(UserPage { users, total })
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<User> {
        let mut t = self.tables.write().await;
        let user = t
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        if let Some(v) = changes.email {
            user.email = v;
        }
        if let Some(v) = changes.first_name {
            user.first_name = v;
        }
        if let Some(v) = changes.last_name {
            user.last_name = v;
        }
        if let Some(v) = changes.password_hash {
            user.password_hash = v;
        }
        if let Some(v) = changes.is_active {
            user.is_active = v;
        }
        if let Some(v) = changes.is_staff {
            user.is_staff = v;
        }
        if let Some(v) = changes.is_superuser {
            user.is_superuser = v;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.users.remove(&id).is_none() {
            return Err(AppError::NotFound("User not found".into()));
        }
        t.tokens.remove(&id);
        t.roles.retain(|(user_id, _, _), _| *user_id != id);
        Ok(())
    }

    async fn touch_last_login(&self, id: Uuid) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(user) = t.users.get_mut(&id) {
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    // ---- tokens ----

    async fn get_token_for_user(&self, user_id: Uuid) -> Result<Option<ApiToken>> {
        Ok(self.tables.read().await.tokens.get(&user_id).cloned())
    }

    async fn insert_token(&self, user_id: Uuid, key: &str) -> Result<ApiToken> {
        let mut t = self.tables.write().await;
        t.require_user(user_id)?;
        if t.tokens.contains_key(&user_id) {
            return Err(AppError::Conflict("User already has an API token".into()));
        }
        let token = ApiToken {
            key: key.to_string(),
            user_id,
            created_at: Utc::now(),
        };
        t.tokens.insert(user_id, token.clone());
        Ok(token)
    }

    async fn delete_token_for_user(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.tables.write().await.tokens.remove(&user_id).is_some())
    }

    async fn find_user_by_token(&self, key: &str) -> Result<Option<User>> {
        let t = self.tables.read().await;
        Ok(t
            .tokens
            .values()
            .find(|tok| tok.key == key)
            .and_then(|tok| t.users.get(&tok.user_id))
            .cloned())
    }

    async fn list_tokens(&self) -> Result<Vec<TokenListing>> {
        let t = self.tables.read().await;
        let mut listings: Vec<TokenListing> = t
            .tokens
            .values()
            .filter_map(|tok| {
                t.users.get(&tok.user_id).map(|u| TokenListing {
                    key: tok.key.clone(),
                    user_id: u.id,
                    username: u.username.clone(),
                    created_at: tok.created_at,
                })
            })
            .collect();
        listings.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(listings)
    }

    // ---- investigations ----

    async fn create_investigation(
        &self,
        input: &InvestigationInput,
        owner: Uuid,
    ) -> Result<Investigation> {
        let mut t = self.tables.write().await;
        t.require_user(owner)?;
        t.next_investigation_id += 1;
        let id = t.next_investigation_id;
        let now = Utc::now();
        let inv = Investigation {
            id,
            accession_code: ResourceKind::Investigation.accession_code(id),
            title: input.title.clone(),
            description: input.description.clone(),
            work_package: input.work_package,
            notes: input.notes.clone(),
            start_date: input.start_date,
            end_date: input.end_date,
            submission_date: input.submission_date,
            public_release_date: input.public_release_date,
            principal_investigator_name: input.principal_investigator_name.clone(),
            principal_investigator_email: input.principal_investigator_email.clone(),
            security_level: input.security_level,
            created_at: now,
            updated_at: now,
        };
        t.investigations.insert(id, inv.clone());
        t.grant_owner(owner, ResourceKind::Investigation, id);
        Ok(inv)
    }

    async fn get_investigation(&self, id: i64) -> Result<Option<Investigation>> {
        Ok(self.tables.read().await.investigations.get(&id).cloned())
    }

    async fn find_investigation(&self, accession_code: &str) -> Result<Option<Investigation>> {
        let t = self.tables.read().await;
        Ok(t
            .investigations
            .values()
            .find(|i| i.accession_code == accession_code)
            .cloned())
    }

    async fn list_investigations(
        &self,
        filter: &InvestigationFilter,
    ) -> Result<Vec<Investigation>> {
        let t = self.tables.read().await;
        Ok(t
            .investigations
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect())
    }

    async fn update_investigation(
        &self,
        id: i64,
        input: &InvestigationInput,
    ) -> Result<Investigation> {
        let mut t = self.tables.write().await;
        let inv = t
            .investigations
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Investigation not found".into()))?;
        inv.title = input.title.clone();
        inv.description = input.description.clone();
        inv.work_package = input.work_package;
        inv.notes = input.notes.clone();
        inv.start_date = input.start_date;
        inv.end_date = input.end_date;
        inv.submission_date = input.submission_date;
        inv.public_release_date = input.public_release_date;
        inv.principal_investigator_name = input.principal_investigator_name.clone();
        inv.principal_investigator_email = input.principal_investigator_email.clone();
        inv.security_level = input.security_level;
        inv.updated_at = Utc::now();
        Ok(inv.clone())
    }

    async fn delete_investigation(&self, id: i64) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.investigations.remove(&id).is_none() {
            return Err(AppError::NotFound("Investigation not found".into()));
        }
        let study_ids: Vec<i64> = t
            .studies
            .values()
            .filter(|s| s.investigation_id == id)
            .map(|s| s.id)
            .collect();
        for study_id in study_ids {
            t.remove_study(study_id);
        }
        t.participations.retain(|(inv_id, _), _| *inv_id != id);
        t.drop_roles_for(ResourceKind::Investigation, id);
        Ok(())
    }

    // ---- studies ----

    async fn create_study(&self, input: &StudyInput, owner: Uuid) -> Result<Study> {
        let mut t = self.tables.write().await;
        t.require_user(owner)?;
        if !t.investigations.contains_key(&input.investigation_id) {
            return Err(AppError::NotFound("Investigation not found".into()));
        }
        t.next_study_id += 1;
        let id = t.next_study_id;
        let now = Utc::now();
        let study = Study {
            id,
            accession_code: ResourceKind::Study.accession_code(id),
            investigation_id: input.investigation_id,
            title: input.title.clone(),
            slug: input.slug.clone(),
            description: input.description.clone(),
            notes: input.notes.clone(),
            study_design: input.study_design.clone(),
            start_date: input.start_date,
            end_date: input.end_date,
            submission_date: input.submission_date,
            public_release_date: input.public_release_date,
            principal_investigator_name: input.principal_investigator_name.clone(),
            principal_investigator_email: input.principal_investigator_email.clone(),
            security_level: input.security_level,
            created_at: now,
            updated_at: now,
        };
        t.studies.insert(id, study.clone());
        t.grant_owner(owner, ResourceKind::Study, id);
        Ok(study)
    }

    async fn get_study(&self, id: i64) -> Result<Option<Study>> {
        Ok(self.tables.read().await.studies.get(&id).cloned())
    }

    async fn find_study(&self, accession_code: &str) -> Result<Option<Study>> {
        let t = self.tables.read().await;
        Ok(t
            .studies
            .values()
            .find(|s| s.accession_code == accession_code)
            .cloned())
    }

    async fn list_studies(&self, filter: &StudyFilter) -> Result<Vec<Study>> {
        let t = self.tables.read().await;
        Ok(t.studies.values().filter(|s| filter.matches(s)).cloned().collect())
    }

    async fn update_study(&self, id: i64, input: &StudyInput) -> Result<Study> {
        let mut t = self.tables.write().await;
        if !t.investigations.contains_key(&input.investigation_id) {
            return Err(AppError::NotFound("Investigation not found".into()));
        }
        let study = t
            .studies
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Study not found".into()))?;
        study.investigation_id = input.investigation_id;
        study.title = input.title.clone();
        study.slug = input.slug.clone();
        study.description = input.description.clone();
        study.notes = input.notes.clone();
        study.study_design = input.study_design.clone();
        study.start_date = input.start_date;
        study.end_date = input.end_date;
        study.submission_date = input.submission_date;
        study.public_release_date = input.public_release_date;
        study.principal_investigator_name = input.principal_investigator_name.clone();
        study.principal_investigator_email = input.principal_investigator_email.clone();
        study.security_level = input.security_level;
        study.updated_at = Utc::now();
        Ok(study.clone())
    }

    async fn delete_study(&self, id: i64) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.studies.contains_key(&id) {
            return Err(AppError::NotFound("Study not found".into()));
        }
        t.remove_study(id);
        Ok(())
    }

    // ---- assays ----

    async fn create_assay(&self, input: &AssayInput, owner: Uuid) -> Result<Assay> {
        let mut t = self.tables.write().await;
        t.require_user(owner)?;
        if !t.studies.contains_key(&input.study_id) {
            return Err(AppError::NotFound("Study not found".into()));
        }
        t.next_assay_id += 1;
        let id = t.next_assay_id;
        let now = Utc::now();
        let assay = Assay {
            id,
            accession_code: ResourceKind::Assay.accession_code(id),
            study_id: input.study_id,
            title: input.title.clone(),
            description: input.description.clone(),
            measurement_type: input.measurement_type,
            technology_platform: input.technology_platform,
            created_at: now,
            updated_at: now,
        };
        t.assays.insert(id, assay.clone());
        t.grant_owner(owner, ResourceKind::Assay, id);
        Ok(assay)
    }

    async fn get_assay(&self, id: i64) -> Result<Option<Assay>> {
        Ok(self.tables.read().await.assays.get(&id).cloned())
    }

    async fn find_assay(&self, accession_code: &str) -> Result<Option<Assay>> {
        let t = self.tables.read().await;
        Ok(t
            .assays
            .values()
            .find(|a| a.accession_code == accession_code)
            .cloned())
    }

    async fn list_assays(&self, filter: &AssayFilter) -> Result<Vec<Assay>> {
        let t = self.tables.read().await;
        Ok(t
            .assays
            .values()
            .filter(|a| {
                let investigation_id = t
                    .studies
                    .get(&a.study_id)
                    .map(|s| s.investigation_id)
                    .unwrap_or_default();
                filter.matches(a, investigation_id)
            })
            .cloned()
            .collect())
    }

    async fn update_assay(&self, id: i64, input: &AssayInput) -> Result<Assay> {
        let mut t = self.tables.write().await;
        if !t.studies.contains_key(&input.study_id) {
            return Err(AppError::NotFound("Study not found".into()));
        }
        let assay = t
            .assays
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Assay not found".into()))?;
        assay.study_id = input.study_id;
        assay.title = input.title.clone();
        assay.description = input.description.clone();
        assay.measurement_type = input.measurement_type;
        assay.technology_platform = input.technology_platform;
        assay.updated_at = Utc::now();
        Ok(assay.clone())
    }

    async fn delete_assay(&self, id: i64) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.assays.contains_key(&id) {
            return Err(AppError::NotFound("Assay not found".into()));
        }
        t.remove_assay(id);
        Ok(())
    }

    // ---- samples ----

    async fn create_sample(&self, input: &SampleInput, owner: Uuid) -> Result<Sample> {
        let mut t = self.tables.write().await;
        t.require_user(owner)?;
        t.next_sample_id += 1;
        let id = t.next_sample_id;
        let now = Utc::now();
        let sample = Sample {
            id,
            accession_code: ResourceKind::Sample.accession_code(id),
            name: input.name.clone(),
            description: input.description.clone(),
            sample_type: input.sample_type.clone(),
            security_level: input.security_level,
            created_at: now,
            updated_at: now,
        };
        t.samples.insert(id, sample.clone());
        t.grant_owner(owner, ResourceKind::Sample, id);
        Ok(sample)
    }

    async fn get_sample(&self, id: i64) -> Result<Option<Sample>> {
        Ok(self.tables.read().await.samples.get(&id).cloned())
    }

    async fn find_sample(&self, accession_code: &str) -> Result<Option<Sample>> {
        let t = self.tables.read().await;
        Ok(t
            .samples
            .values()
            .find(|s| s.accession_code == accession_code)
            .cloned())
    }

    async fn list_samples(&self, filter: &SampleFilter) -> Result<Vec<Sample>> {
        let t = self.tables.read().await;
        Ok(t
            .samples
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    async fn update_sample(&self, id: i64, input: &SampleInput) -> Result<Sample> {
        let mut t = self.tables.write().await;
        let sample = t
            .samples
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Sample not found".into()))?;
        sample.name = input.name.clone();
        sample.description = input.description.clone();
        sample.sample_type = input.sample_type.clone();
        sample.security_level = input.security_level;
        sample.updated_at = Utc::now();
        Ok(sample.clone())
    }

    async fn delete_sample(&self, id: i64) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.samples.remove(&id).is_none() {
            return Err(AppError::NotFound("Sample not found".into()));
        }
        t.drop_roles_for(ResourceKind::Sample, id);
        Ok(())
    }

    // ---- institutions ----

    async fn create_institution(&self, input: &InstitutionInput) -> Result<Institution> {
        let mut t = self.tables.write().await;
        t.next_institution_id += 1;
        let id = t.next_institution_id;
        let now = Utc::now();
        let institution = Institution {
            id,
            name: input.name.clone(),
            website: input.website.clone(),
            address_street: input.address_street.clone(),
            address_house_number: input.address_house_number.clone(),
            address_addition: input.address_addition.clone(),
            address_postcode: input.address_postcode.clone(),
            address_city: input.address_city.clone(),
            address_country: input.address_country.clone(),
            created_at: now,
            updated_at: now,
        };
        t.institutions.insert(id, institution.clone());
        Ok(institution)
    }

    async fn get_institution(&self, id: i64) -> Result<Option<Institution>> {
        Ok(self.tables.read().await.institutions.get(&id).cloned())
    }

    async fn list_institutions(&self, search: Option<&str>) -> Result<Vec<Institution>> {
        let t = self.tables.read().await;
        let needle = search.map(str::to_lowercase);
        let mut institutions: Vec<Institution> = t
            .institutions
            .values()
            .filter(|i| match &needle {
                Some(n) => i.name.to_lowercase().contains(n.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        institutions.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(institutions)
    }

    async fn update_institution(&self, id: i64, input: &InstitutionInput) -> Result<Institution> {
        let mut t = self.tables.write().await;
        let institution = t
            .institutions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Institution not found".into()))?;
        institution.name = input.name.clone();
        institution.website = input.website.clone();
        institution.address_street = input.address_street.clone();
        institution.address_house_number = input.address_house_number.clone();
        institution.address_addition = input.address_addition.clone();
        institution.address_postcode = input.address_postcode.clone();
        institution.address_city = input.address_city.clone();
        institution.address_country = input.address_country.clone();
        institution.updated_at = Utc::now();
        Ok(institution.clone())
    }

    async fn delete_institution(&self, id: i64) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.institutions.remove(&id).is_none() {
            return Err(AppError::NotFound("Institution not found".into()));
        }
        t.participations.retain(|(_, inst_id), _| *inst_id != id);
        Ok(())
    }

    async fn link_institution(
        &self,
        investigation_id: i64,
        link: &InstitutionLink,
    ) -> Result<InvestigationInstitution> {
        let mut t = self.tables.write().await;
        if !t.investigations.contains_key(&investigation_id) {
            return Err(AppError::NotFound("Investigation not found".into()));
        }
        if !t.institutions.contains_key(&link.institution_id) {
            return Err(AppError::NotFound("Institution not found".into()));
        }
        let key = (investigation_id, link.institution_id);
        if t.participations.contains_key(&key) {
            return Err(AppError::Conflict(
                "Institution already takes part in this investigation".into(),
            ));
        }
        t.participations.insert(key, link.clone());
        Ok(t.participation(investigation_id, link))
    }

    async fn unlink_institution(
        &self,
        investigation_id: i64,
        institution_id: i64,
    ) -> Result<bool> {
        let mut t = self.tables.write().await;
        Ok(t
            .participations
            .remove(&(investigation_id, institution_id))
            .is_some())
    }

    async fn list_investigation_institutions(
        &self,
        investigation_id: i64,
    ) -> Result<Vec<InvestigationInstitution>> {
        let t = self.tables.read().await;
        let mut links: Vec<InvestigationInstitution> = t
            .participations
            .iter()
            .filter(|((inv_id, _), _)| *inv_id == investigation_id)
            .map(|(_, link)| t.participation(investigation_id, link))
            .collect();
        links.sort_by(|a, b| {
            a.join_date
                .cmp(&b.join_date)
                .then_with(|| a.institution_name.cmp(&b.institution_name))
        });
        Ok(links)
    }

    // ---- roles ----

    async fn get_role(
        &self,
        user_id: Uuid,
        kind: ResourceKind,
        resource_id: i64,
    ) -> Result<Option<AssignedRole>> {
        let t = self.tables.read().await;
        Ok(t.roles.get(&(user_id, kind, resource_id)).map(|r| r.role))
    }

    async fn set_role(
        &self,
        user_id: Uuid,
        kind: ResourceKind,
        resource_id: i64,
        role: AssignedRole,
    ) -> Result<()> {
        let mut t = self.tables.write().await;
        t.require_user(user_id)?;
        if role != AssignedRole::Owner && is_sole_owner(&t.owners(kind, resource_id), user_id) {
            return Err(AppError::Validation(LAST_OWNER.into()));
        }
        let now = Utc::now();
        t.roles
            .entry((user_id, kind, resource_id))
            .and_modify(|r| {
                r.role = role;
                r.updated_at = now;
            })
            .or_insert(RoleAssignment {
                user_id,
                resource_kind: kind,
                resource_id,
                role,
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn clear_role(
        &self,
        user_id: Uuid,
        kind: ResourceKind,
        resource_id: i64,
    ) -> Result<bool> {
        let mut t = self.tables.write().await;
        if is_sole_owner(&t.owners(kind, resource_id), user_id) {
            return Err(AppError::Validation(LAST_OWNER.into()));
        }
        Ok(t.roles.remove(&(user_id, kind, resource_id)).is_some())
    }

    async fn list_role_members(
        &self,
        kind: ResourceKind,
        resource_id: i64,
    ) -> Result<Vec<RoleMember>> {
        let t = self.tables.read().await;
        let mut members: Vec<RoleMember> = t
            .roles
            .values()
            .filter(|r| r.resource_kind == kind && r.resource_id == resource_id)
            .filter_map(|r| {
                t.users.get(&r.user_id).map(|u| RoleMember {
                    user_id: u.id,
                    username: u.username.clone(),
                    email: u.email.clone(),
                    first_name: u.first_name.clone(),
                    last_name: u.last_name.clone(),
                    role: r.role,
                })
            })
            .collect();
        members.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(members)
    }

    async fn roles_for_user(
        &self,
        user_id: Uuid,
        kind: ResourceKind,
    ) -> Result<HashMap<i64, AssignedRole>> {
        let t = self.tables.read().await;
        Ok(t
            .roles
            .values()
            .filter(|r| r.user_id == user_id && r.resource_kind == kind)
            .map(|r| (r.resource_id, r.role))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::choices::{MeasurementType, TechnologyPlatform};

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.into(),
            email: format!("{}@example.org", name),
            first_name: String::new(),
            last_name: String::new(),
            password_hash: "hash".into(),
            is_staff: false,
            is_superuser: false,
        }
    }

    fn investigation(title: &str) -> InvestigationInput {
        InvestigationInput {
            title: title.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let store = MemoryStore::new();
        store.create_user(new_user("ada")).await.unwrap();
        let err = store.create_user(new_user("ada")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_accession_codes_follow_ids() {
        let store = MemoryStore::new();
        let owner = store.create_user(new_user("ada")).await.unwrap();
        let first = store.create_investigation(&investigation("A"), owner.id).await.unwrap();
        let second = store.create_investigation(&investigation("B"), owner.id).await.unwrap();
        assert_eq!(first.accession_code, "CXRP1");
        assert_eq!(second.accession_code, "CXRP2");

        let study = store
            .create_study(
                &StudyInput {
                    investigation_id: second.id,
                    title: "S".into(),
                    ..Default::default()
                },
                owner.id,
            )
            .await
            .unwrap();
        assert_eq!(study.accession_code, "CXRS1");
        assert_eq!(
            store.find_study("CXRS1").await.unwrap().map(|s| s.id),
            Some(study.id)
        );
    }

    #[tokio::test]
    async fn test_creator_becomes_owner() {
        let store = MemoryStore::new();
        let owner = store.create_user(new_user("ada")).await.unwrap();
        let inv = store.create_investigation(&investigation("A"), owner.id).await.unwrap();
        assert_eq!(
            store
                .get_role(owner.id, ResourceKind::Investigation, inv.id)
                .await
                .unwrap(),
            Some(AssignedRole::Owner)
        );
    }

    #[tokio::test]
    async fn test_delete_investigation_cascades() {
        let store = MemoryStore::new();
        let owner = store.create_user(new_user("ada")).await.unwrap();
        let inv = store.create_investigation(&investigation("A"), owner.id).await.unwrap();
        let study = store
            .create_study(
                &StudyInput {
                    investigation_id: inv.id,
                    title: "S".into(),
                    ..Default::default()
                },
                owner.id,
            )
            .await
            .unwrap();
        let assay = store
            .create_assay(
                &AssayInput {
                    study_id: study.id,
                    title: "A".into(),
                    description: String::new(),
                    measurement_type: MeasurementType::Genomics,
                    technology_platform: TechnologyPlatform::Seq,
                },
                owner.id,
            )
            .await
            .unwrap();

        store.delete_investigation(inv.id).await.unwrap();

        assert!(store.get_study(study.id).await.unwrap().is_none());
        assert!(store.get_assay(assay.id).await.unwrap().is_none());
        assert!(store
            .roles_for_user(owner.id, ResourceKind::Study)
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .roles_for_user(owner.id, ResourceKind::Assay)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_samples_have_own_sequence() {
        let store = MemoryStore::new();
        let owner = store.create_user(new_user("ada")).await.unwrap();
        store.create_investigation(&investigation("A"), owner.id).await.unwrap();
        let input = SampleInput {
            sample_type: "soil".into(),
            ..Default::default()
        };
        let sample = store.create_sample(&input, owner.id).await.unwrap();
        assert_eq!(sample.accession_code, "CXRX1");
        assert_eq!(
            store.get_role(owner.id, ResourceKind::Sample, sample.id).await.unwrap(),
            Some(AssignedRole::Owner)
        );

        store.delete_sample(sample.id).await.unwrap();
        assert!(store.find_sample("CXRX1").await.unwrap().is_none());
        assert!(store
            .roles_for_user(owner.id, ResourceKind::Sample)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_participation_is_unique_and_cascades() {
        let store = MemoryStore::new();
        let owner = store.create_user(new_user("ada")).await.unwrap();
        let inv = store.create_investigation(&investigation("A"), owner.id).await.unwrap();
        let institution = store
            .create_institution(&InstitutionInput {
                name: "Plant Institute".into(),
                address_country: "DE".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let link = InstitutionLink {
            institution_id: institution.id,
            contribution_amount: Some("100.00".into()),
            join_date: chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };

        let joined = store.link_institution(inv.id, &link).await.unwrap();
        assert_eq!(joined.institution_name, "Plant Institute");
        assert!(matches!(
            store.link_institution(inv.id, &link).await,
            Err(AppError::Conflict(_))
        ));

        store.delete_institution(institution.id).await.unwrap();
        assert!(store
            .list_investigation_institutions(inv.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_single_token_per_user() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("ada")).await.unwrap();
        store.insert_token(user.id, "k1").await.unwrap();
        assert!(matches!(
            store.insert_token(user.id, "k2").await,
            Err(AppError::Conflict(_))
        ));
        let found = store.find_user_by_token("k1").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(store.delete_token_for_user(user.id).await.unwrap());
        assert!(store.find_user_by_token("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_owner_removals_keep_one_owner() {
        let store = Arc::new(MemoryStore::new());
        let ada = store.create_user(new_user("ada")).await.unwrap();
        let bob = store.create_user(new_user("bob")).await.unwrap();
        let inv = store.create_investigation(&investigation("A"), ada.id).await.unwrap();
        store
            .set_role(bob.id, ResourceKind::Investigation, inv.id, AssignedRole::Owner)
            .await
            .unwrap();

        let inv_id = inv.id;
        let remove = |user_id: Uuid| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .clear_role(user_id, ResourceKind::Investigation, inv_id)
                    .await
            })
        };
        let (first, second) = tokio::join!(remove(ada.id), remove(bob.id));
        let results = [first.unwrap(), second.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AppError::Validation(msg)) if msg == LAST_OWNER)));
        let owners = store.tables.read().await.owners(ResourceKind::Investigation, inv.id);
        assert_eq!(owners.len(), 1);
    }

    #[tokio::test]
    async fn test_sole_owner_cannot_be_demoted() {
        let store = MemoryStore::new();
        let ada = store.create_user(new_user("ada")).await.unwrap();
        let inv = store.create_investigation(&investigation("A"), ada.id).await.unwrap();

        let err = store
            .set_role(ada.id, ResourceKind::Investigation, inv.id, AssignedRole::Contributor)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(
            store
                .get_role(ada.id, ResourceKind::Investigation, inv.id)
                .await
                .unwrap(),
            Some(AssignedRole::Owner)
        );
    }

    #[tokio::test]
    async fn test_set_role_replaces_existing() {
        let store = MemoryStore::new();
        let owner = store.create_user(new_user("ada")).await.unwrap();
        let other = store.create_user(new_user("bob")).await.unwrap();
        let inv = store.create_investigation(&investigation("A"), owner.id).await.unwrap();

        store
            .set_role(other.id, ResourceKind::Investigation, inv.id, AssignedRole::Authorized)
            .await
            .unwrap();
        store
            .set_role(other.id, ResourceKind::Investigation, inv.id, AssignedRole::Contributor)
            .await
            .unwrap();

        let members = store
            .list_role_members(ResourceKind::Investigation, inv.id)
            .await
            .unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].username, "ada");
        assert_eq!(members[1].role, AssignedRole::Contributor);
    }

    #[tokio::test]
    async fn test_list_users_search_and_paging() {
        let store = MemoryStore::new();
        for name in ["carol", "alice", "bob"] {
            store.create_user(new_user(name)).await.unwrap();
        }
        let page = store.list_users(None, 1, 1).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.users[0].username, "bob");

        let page = store.list_users(Some("ALI"), 0, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.users[0].username, "alice");
    }
}
