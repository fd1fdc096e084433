//! PostgreSQL catalogue store.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{CatalogueStore, UserPage};
use crate::error::{AppError, Result};
use crate::models::api_token::{ApiToken, TokenListing};
use crate::models::assay::{Assay, AssayFilter, AssayInput};
use crate::models::institution::{
    Institution, InstitutionInput, InstitutionLink, InvestigationInstitution,
};
use crate::models::investigation::{Investigation, InvestigationFilter, InvestigationInput};
use crate::models::role::{is_sole_owner, AssignedRole, ResourceKind, RoleMember, LAST_OWNER};
use crate::models::sample::{Sample, SampleFilter, SampleInput};
use crate::models::study::{Study, StudyFilter, StudyInput};
use crate::models::user::{NewUser, User, UserChanges};

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, password_hash, \
    is_active, is_staff, is_superuser, last_login_at, created_at, updated_at";

const INVESTIGATION_COLUMNS: &str = "id, accession_code, title, description, work_package, \
    notes, start_date, end_date, submission_date, public_release_date, \
    principal_investigator_name, principal_investigator_email, security_level, \
    created_at, updated_at";

const STUDY_COLUMNS: &str = "id, accession_code, investigation_id, title, slug, description, \
    notes, study_design, start_date, end_date, submission_date, public_release_date, \
    principal_investigator_name, principal_investigator_email, security_level, \
    created_at, updated_at";

const ASSAY_COLUMNS: &str = "id, accession_code, study_id, title, description, \
    measurement_type, technology_platform, created_at, updated_at";

const SAMPLE_COLUMNS: &str = "id, accession_code, name, description, sample_type, \
    security_level, created_at, updated_at";

const INSTITUTION_COLUMNS: &str = "id, name, website, address_street, address_house_number, \
    address_addition, address_postcode, address_city, address_country, created_at, updated_at";

const PARTICIPATION_SELECT: &str = "SELECT p.investigation_id, p.institution_id, \
        i.name AS institution_name, p.contribution_amount::text AS contribution_amount, \
        p.join_date \
     FROM investigation_institutions p JOIN institutions i ON i.id = p.institution_id";

/// Catalogue store backed by a PostgreSQL pool.
pub struct PostgresStore {
    db: PgPool,
}

impl PostgresStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }
}

async fn grant_owner(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    user_id: Uuid,
    kind: ResourceKind,
    resource_id: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO role_assignments (user_id, resource_kind, resource_id, role) \
         VALUES ($1, $2, $3, 'owner')",
    )
    .bind(user_id)
    .bind(kind)
    .bind(resource_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Lock the resource's owner rows for the rest of the transaction.
async fn lock_owners(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    kind: ResourceKind,
    resource_id: i64,
) -> Result<Vec<Uuid>> {
    let owners: Vec<Uuid> = sqlx::query_scalar(
        "SELECT user_id FROM role_assignments \
         WHERE resource_kind = $1 AND resource_id = $2 AND role = 'owner' \
         FOR UPDATE",
    )
    .bind(kind)
    .bind(resource_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(owners)
}

async fn next_id(tx: &mut sqlx::Transaction<'_, Postgres>, sequence: &str) -> Result<i64> {
    let id: i64 = sqlx::query_scalar("SELECT nextval($1::regclass)")
        .bind(sequence)
        .fetch_one(&mut **tx)
        .await?;
    Ok(id)
}

fn contains_pattern(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl CatalogueStore for PostgresStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    // ---- users ----

    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, first_name, last_name, password_hash, \
                is_staff, is_superuser) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.password_hash)
        .bind(new_user.is_staff)
        .bind(new_user.is_superuser)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("Username '{}' already exists", new_user.username))
            }
            other => other,
        })?;
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn list_users(&self, search: Option<&str>, offset: i64, limit: i64) -> Result<UserPage> {
        let pattern = search.map(contains_pattern);

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users \
             WHERE ($1::text IS NULL OR username ILIKE $1 OR email ILIKE $1) \
             ORDER BY username OFFSET $2 LIMIT $3",
            USER_COLUMNS
        ))
        .bind(&pattern)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users \
             WHERE ($1::text IS NULL OR username ILIKE $1 OR email ILIKE $1)",
        )
        .bind(&pattern)
        .fetch_one(&self.db)
        .await?;

        Ok(UserPage { users, total })
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<User> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET \
                email = COALESCE($2, email), \
                first_name = COALESCE($3, first_name), \
                last_name = COALESCE($4, last_name), \
                password_hash = COALESCE($5, password_hash), \
                is_active = COALESCE($6, is_active), \
                is_staff = COALESCE($7, is_staff), \
                is_superuser = COALESCE($8, is_superuser), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(changes.email)
        .bind(changes.first_name)
        .bind(changes.last_name)
        .bind(changes.password_hash)
        .bind(changes.is_active)
        .bind(changes.is_staff)
        .bind(changes.is_superuser)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    async fn delete_user(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".into()));
        }
        Ok(())
    }

    async fn touch_last_login(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    // ---- tokens ----

    async fn get_token_for_user(&self, user_id: Uuid) -> Result<Option<ApiToken>> {
        let token = sqlx::query_as::<_, ApiToken>(
            "SELECT key, user_id, created_at FROM api_tokens WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(token)
    }

    async fn insert_token(&self, user_id: Uuid, key: &str) -> Result<ApiToken> {
        let token = sqlx::query_as::<_, ApiToken>(
            "INSERT INTO api_tokens (key, user_id) VALUES ($1, $2) \
             RETURNING key, user_id, created_at",
        )
        .bind(key)
        .bind(user_id)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict("User already has an API token".into()),
            other => other,
        })?;
        Ok(token)
    }

    async fn delete_token_for_user(&self, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_user_by_token(&self, key: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT u.id, u.username, u.email, u.first_name, u.last_name, u.password_hash, \
                    u.is_active, u.is_staff, u.is_superuser, u.last_login_at, \
                    u.created_at, u.updated_at \
             FROM api_tokens t JOIN users u ON u.id = t.user_id \
             WHERE t.key = $1",
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn list_tokens(&self) -> Result<Vec<TokenListing>> {
        let tokens = sqlx::query_as::<_, TokenListing>(
            "SELECT t.key, t.user_id, u.username, t.created_at \
             FROM api_tokens t JOIN users u ON u.id = t.user_id \
             ORDER BY u.username",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(tokens)
    }

    // ---- investigations ----

    async fn create_investigation(
        &self,
        input: &InvestigationInput,
        owner: Uuid,
    ) -> Result<Investigation> {
        let mut tx = self.db.begin().await?;
        let id = next_id(&mut tx, "investigations_id_seq").await?;

        let inv = sqlx::query_as::<_, Investigation>(&format!(
            "INSERT INTO investigations (id, accession_code, title, description, \
                work_package, notes, start_date, end_date, submission_date, public_release_date, \
                principal_investigator_name, principal_investigator_email, security_level) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {}",
            INVESTIGATION_COLUMNS
        ))
        .bind(id)
        .bind(ResourceKind::Investigation.accession_code(id))
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.work_package)
        .bind(&input.notes)
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(input.submission_date)
        .bind(input.public_release_date)
        .bind(&input.principal_investigator_name)
        .bind(&input.principal_investigator_email)
        .bind(input.security_level)
        .fetch_one(&mut *tx)
        .await?;

        grant_owner(&mut tx, owner, ResourceKind::Investigation, id).await?;
        tx.commit().await?;
        Ok(inv)
    }

    async fn get_investigation(&self, id: i64) -> Result<Option<Investigation>> {
        let inv = sqlx::query_as::<_, Investigation>(&format!(
            "SELECT {} FROM investigations WHERE id = $1",
            INVESTIGATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(inv)
    }

    async fn find_investigation(&self, accession_code: &str) -> Result<Option<Investigation>> {
        let inv = sqlx::query_as::<_, Investigation>(&format!(
            "SELECT {} FROM investigations WHERE accession_code = $1",
            INVESTIGATION_COLUMNS
        ))
        .bind(accession_code)
        .fetch_optional(&self.db)
        .await?;
        Ok(inv)
    }

    async fn list_investigations(
        &self,
        filter: &InvestigationFilter,
    ) -> Result<Vec<Investigation>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM investigations WHERE TRUE",
            INVESTIGATION_COLUMNS
        ));
        if let Some(title) = &filter.title {
            qb.push(" AND title ILIKE ").push_bind(contains_pattern(title));
        }
        if let Some(level) = filter.security_level {
            qb.push(" AND security_level = ").push_bind(level);
        }
        if let Some(wp) = filter.work_package {
            qb.push(" AND work_package = ").push_bind(wp);
        }
        qb.push(" ORDER BY id");

        let rows = qb
            .build_query_as::<Investigation>()
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn update_investigation(
        &self,
        id: i64,
        input: &InvestigationInput,
    ) -> Result<Investigation> {
        sqlx::query_as::<_, Investigation>(&format!(
            "UPDATE investigations SET title = $2, description = $3, work_package = $4, \
                notes = $5, start_date = $6, end_date = $7, submission_date = $8, \
                public_release_date = $9, \
                principal_investigator_name = $10, principal_investigator_email = $11, \
                security_level = $12, updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            INVESTIGATION_COLUMNS
        ))
        .bind(id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.work_package)
        .bind(&input.notes)
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(input.submission_date)
        .bind(input.public_release_date)
        .bind(&input.principal_investigator_name)
        .bind(&input.principal_investigator_email)
        .bind(input.security_level)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Investigation not found".into()))
    }

    async fn delete_investigation(&self, id: i64) -> Result<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "DELETE FROM role_assignments WHERE resource_kind = 'assay' AND resource_id IN \
                (SELECT a.id FROM assays a JOIN studies s ON s.id = a.study_id \
                 WHERE s.investigation_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM role_assignments WHERE resource_kind = 'study' AND resource_id IN \
                (SELECT id FROM studies WHERE investigation_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM role_assignments \
             WHERE resource_kind = 'investigation' AND resource_id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM investigations WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Investigation not found".into()));
        }

        tx.commit().await?;
        Ok(())
    }

    // ---- studies ----

    async fn create_study(&self, input: &StudyInput, owner: Uuid) -> Result<Study> {
        let mut tx = self.db.begin().await?;
        let id = next_id(&mut tx, "studies_id_seq").await?;

        let study = sqlx::query_as::<_, Study>(&format!(
            "INSERT INTO studies (id, accession_code, investigation_id, title, slug, \
                description, notes, study_design, start_date, end_date, submission_date, \
                public_release_date, \
                principal_investigator_name, principal_investigator_email, security_level) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             RETURNING {}",
            STUDY_COLUMNS
        ))
        .bind(id)
        .bind(ResourceKind::Study.accession_code(id))
        .bind(input.investigation_id)
        .bind(&input.title)
        .bind(&input.slug)
        .bind(&input.description)
        .bind(&input.notes)
        .bind(&input.study_design)
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(input.submission_date)
        .bind(input.public_release_date)
        .bind(&input.principal_investigator_name)
        .bind(&input.principal_investigator_email)
        .bind(input.security_level)
        .fetch_one(&mut *tx)
        .await?;

        grant_owner(&mut tx, owner, ResourceKind::Study, id).await?;
        tx.commit().await?;
        Ok(study)
    }

    async fn get_study(&self, id: i64) -> Result<Option<Study>> {
        let study = sqlx::query_as::<_, Study>(&format!(
            "SELECT {} FROM studies WHERE id = $1",
            STUDY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(study)
    }

    async fn find_study(&self, accession_code: &str) -> Result<Option<Study>> {
        let study = sqlx::query_as::<_, Study>(&format!(
            "SELECT {} FROM studies WHERE accession_code = $1",
            STUDY_COLUMNS
        ))
        .bind(accession_code)
        .fetch_optional(&self.db)
        .await?;
        Ok(study)
    }

    async fn list_studies(&self, filter: &StudyFilter) -> Result<Vec<Study>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM studies WHERE TRUE", STUDY_COLUMNS));
        if let Some(investigation_id) = filter.investigation_id {
            qb.push(" AND investigation_id = ").push_bind(investigation_id);
        }
        if let Some(title) = &filter.title {
            qb.push(" AND title ILIKE ").push_bind(contains_pattern(title));
        }
        if let Some(description) = &filter.description {
            qb.push(" AND description ILIKE ")
                .push_bind(contains_pattern(description));
        }
        if let Some(level) = filter.security_level {
            qb.push(" AND security_level = ").push_bind(level);
        }
        qb.push(" ORDER BY id");

        let rows = qb.build_query_as::<Study>().fetch_all(&self.db).await?;
        Ok(rows)
    }

    async fn update_study(&self, id: i64, input: &StudyInput) -> Result<Study> {
        sqlx::query_as::<_, Study>(&format!(
            "UPDATE studies SET investigation_id = $2, title = $3, slug = $4, description = $5, \
                notes = $6, study_design = $7, start_date = $8, end_date = $9, \
                submission_date = $10, public_release_date = $11, \
                principal_investigator_name = $12, principal_investigator_email = $13, \
                security_level = $14, updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            STUDY_COLUMNS
        ))
        .bind(id)
        .bind(input.investigation_id)
        .bind(&input.title)
        .bind(&input.slug)
        .bind(&input.description)
        .bind(&input.notes)
        .bind(&input.study_design)
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(input.submission_date)
        .bind(input.public_release_date)
        .bind(&input.principal_investigator_name)
        .bind(&input.principal_investigator_email)
        .bind(input.security_level)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Study not found".into()))
    }

    async fn delete_study(&self, id: i64) -> Result<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "DELETE FROM role_assignments WHERE resource_kind = 'assay' AND resource_id IN \
                (SELECT id FROM assays WHERE study_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM role_assignments WHERE resource_kind = 'study' AND resource_id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM studies WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Study not found".into()));
        }

        tx.commit().await?;
        Ok(())
    }

    // ---- assays ----

    async fn create_assay(&self, input: &AssayInput, owner: Uuid) -> Result<Assay> {
        let mut tx = self.db.begin().await?;
        let id = next_id(&mut tx, "assays_id_seq").await?;

        let assay = sqlx::query_as::<_, Assay>(&format!(
            "INSERT INTO assays (id, accession_code, study_id, title, description, \
                measurement_type, technology_platform) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            ASSAY_COLUMNS
        ))
        .bind(id)
        .bind(ResourceKind::Assay.accession_code(id))
        .bind(input.study_id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.measurement_type)
        .bind(input.technology_platform)
        .fetch_one(&mut *tx)
        .await?;

        grant_owner(&mut tx, owner, ResourceKind::Assay, id).await?;
        tx.commit().await?;
        Ok(assay)
    }

    async fn get_assay(&self, id: i64) -> Result<Option<Assay>> {
        let assay = sqlx::query_as::<_, Assay>(&format!(
            "SELECT {} FROM assays WHERE id = $1",
            ASSAY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(assay)
    }

    async fn find_assay(&self, accession_code: &str) -> Result<Option<Assay>> {
        let assay = sqlx::query_as::<_, Assay>(&format!(
            "SELECT {} FROM assays WHERE accession_code = $1",
            ASSAY_COLUMNS
        ))
        .bind(accession_code)
        .fetch_optional(&self.db)
        .await?;
        Ok(assay)
    }

    async fn list_assays(&self, filter: &AssayFilter) -> Result<Vec<Assay>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT a.id, a.accession_code, a.study_id, a.title, a.description, \
                    a.measurement_type, a.technology_platform, a.created_at, a.updated_at \
             FROM assays a JOIN studies s ON s.id = a.study_id WHERE TRUE",
        );
        if let Some(study_id) = filter.study_id {
            qb.push(" AND a.study_id = ").push_bind(study_id);
        }
        if let Some(investigation_id) = filter.investigation_id {
            qb.push(" AND s.investigation_id = ").push_bind(investigation_id);
        }
        if let Some(title) = &filter.title {
            qb.push(" AND a.title ILIKE ").push_bind(contains_pattern(title));
        }
        if let Some(mt) = filter.measurement_type {
            qb.push(" AND a.measurement_type = ").push_bind(mt);
        }
        if let Some(tp) = filter.technology_platform {
            qb.push(" AND a.technology_platform = ").push_bind(tp);
        }
        qb.push(" ORDER BY a.id");

        let rows = qb.build_query_as::<Assay>().fetch_all(&self.db).await?;
        Ok(rows)
    }

    async fn update_assay(&self, id: i64, input: &AssayInput) -> Result<Assay> {
        sqlx::query_as::<_, Assay>(&format!(
            "UPDATE assays SET study_id = $2, title = $3, description = $4, \
                measurement_type = $5, technology_platform = $6, updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            ASSAY_COLUMNS
        ))
        .bind(id)
        .bind(input.study_id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.measurement_type)
        .bind(input.technology_platform)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Assay not found".into()))
    }

    async fn delete_assay(&self, id: i64) -> Result<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query(
            "DELETE FROM role_assignments WHERE resource_kind = 'assay' AND resource_id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        let result = sqlx::query("DELETE FROM assays WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Assay not found".into()));
        }
        tx.commit().await?;
        Ok(())
    }

    // ---- samples ----

    async fn create_sample(&self, input: &SampleInput, owner: Uuid) -> Result<Sample> {
        let mut tx = self.db.begin().await?;
        let id = next_id(&mut tx, "samples_id_seq").await?;

        let sample = sqlx::query_as::<_, Sample>(&format!(
            "INSERT INTO samples (id, accession_code, name, description, sample_type, \
                security_level) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            SAMPLE_COLUMNS
        ))
        .bind(id)
        .bind(ResourceKind::Sample.accession_code(id))
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.sample_type)
        .bind(input.security_level)
        .fetch_one(&mut *tx)
        .await?;

        grant_owner(&mut tx, owner, ResourceKind::Sample, id).await?;
        tx.commit().await?;
        Ok(sample)
    }

    async fn get_sample(&self, id: i64) -> Result<Option<Sample>> {
        let sample = sqlx::query_as::<_, Sample>(&format!(
            "SELECT {} FROM samples WHERE id = $1",
            SAMPLE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(sample)
    }

    async fn find_sample(&self, accession_code: &str) -> Result<Option<Sample>> {
        let sample = sqlx::query_as::<_, Sample>(&format!(
            "SELECT {} FROM samples WHERE accession_code = $1",
            SAMPLE_COLUMNS
        ))
        .bind(accession_code)
        .fetch_optional(&self.db)
        .await?;
        Ok(sample)
    }

    async fn list_samples(&self, filter: &SampleFilter) -> Result<Vec<Sample>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM samples WHERE TRUE", SAMPLE_COLUMNS));
        if let Some(name) = &filter.name {
            qb.push(" AND name ILIKE ").push_bind(contains_pattern(name));
        }
        if let Some(sample_type) = &filter.sample_type {
            qb.push(" AND sample_type = ").push_bind(sample_type.clone());
        }
        if let Some(level) = filter.security_level {
            qb.push(" AND security_level = ").push_bind(level);
        }
        qb.push(" ORDER BY id");

        let rows = qb.build_query_as::<Sample>().fetch_all(&self.db).await?;
        Ok(rows)
    }

    async fn update_sample(&self, id: i64, input: &SampleInput) -> Result<Sample> {
        sqlx::query_as::<_, Sample>(&format!(
            "UPDATE samples SET name = $2, description = $3, sample_type = $4, \
                security_level = $5, updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            SAMPLE_COLUMNS
        ))
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.sample_type)
        .bind(input.security_level)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Sample not found".into()))
    }

    async fn delete_sample(&self, id: i64) -> Result<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query(
            "DELETE FROM role_assignments WHERE resource_kind = 'sample' AND resource_id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        let result = sqlx::query("DELETE FROM samples WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Sample not found".into()));
        }
        tx.commit().await?;
        Ok(())
    }

    // ---- institutions ----

    async fn create_institution(&self, input: &InstitutionInput) -> Result<Institution> {
        let institution = sqlx::query_as::<_, Institution>(&format!(
            "INSERT INTO institutions (name, website, address_street, address_house_number, \
                address_addition, address_postcode, address_city, address_country) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            INSTITUTION_COLUMNS
        ))
        .bind(&input.name)
        .bind(&input.website)
        .bind(&input.address_street)
        .bind(&input.address_house_number)
        .bind(&input.address_addition)
        .bind(&input.address_postcode)
        .bind(&input.address_city)
        .bind(&input.address_country)
        .fetch_one(&self.db)
        .await?;
        Ok(institution)
    }

    async fn get_institution(&self, id: i64) -> Result<Option<Institution>> {
        let institution = sqlx::query_as::<_, Institution>(&format!(
            "SELECT {} FROM institutions WHERE id = $1",
            INSTITUTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(institution)
    }

    async fn list_institutions(&self, search: Option<&str>) -> Result<Vec<Institution>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM institutions WHERE TRUE",
            INSTITUTION_COLUMNS
        ));
        if let Some(search) = search {
            qb.push(" AND name ILIKE ").push_bind(contains_pattern(search));
        }
        qb.push(" ORDER BY name, id");

        let rows = qb.build_query_as::<Institution>().fetch_all(&self.db).await?;
        Ok(rows)
    }

    async fn update_institution(&self, id: i64, input: &InstitutionInput) -> Result<Institution> {
        sqlx::query_as::<_, Institution>(&format!(
            "UPDATE institutions SET name = $2, website = $3, address_street = $4, \
                address_house_number = $5, address_addition = $6, address_postcode = $7, \
                address_city = $8, address_country = $9, updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            INSTITUTION_COLUMNS
        ))
        .bind(id)
        .bind(&input.name)
        .bind(&input.website)
        .bind(&input.address_street)
        .bind(&input.address_house_number)
        .bind(&input.address_addition)
        .bind(&input.address_postcode)
        .bind(&input.address_city)
        .bind(&input.address_country)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Institution not found".into()))
    }

    async fn delete_institution(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM institutions WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Institution not found".into()));
        }
        Ok(())
    }

    async fn link_institution(
        &self,
        investigation_id: i64,
        link: &InstitutionLink,
    ) -> Result<InvestigationInstitution> {
        let mut tx = self.db.begin().await?;
        let (investigation_exists, institution_exists): (bool, bool) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM investigations WHERE id = $1), \
                    EXISTS (SELECT 1 FROM institutions WHERE id = $2)",
        )
        .bind(investigation_id)
        .bind(link.institution_id)
        .fetch_one(&mut *tx)
        .await?;
        if !investigation_exists {
            return Err(AppError::NotFound("Investigation not found".into()));
        }
        if !institution_exists {
            return Err(AppError::NotFound("Institution not found".into()));
        }

        sqlx::query(
            "INSERT INTO investigation_institutions \
                (investigation_id, institution_id, contribution_amount, join_date) \
             VALUES ($1, $2, $3::numeric, $4)",
        )
        .bind(investigation_id)
        .bind(link.institution_id)
        .bind(&link.contribution_amount)
        .bind(link.join_date)
        .execute(&mut *tx)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict("Institution already takes part in this investigation".into())
            }
            other => other,
        })?;

        let joined = sqlx::query_as::<_, InvestigationInstitution>(&format!(
            "{} WHERE p.investigation_id = $1 AND p.institution_id = $2",
            PARTICIPATION_SELECT
        ))
        .bind(investigation_id)
        .bind(link.institution_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(joined)
    }

    async fn unlink_institution(
        &self,
        investigation_id: i64,
        institution_id: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM investigation_institutions \
             WHERE investigation_id = $1 AND institution_id = $2",
        )
        .bind(investigation_id)
        .bind(institution_id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_investigation_institutions(
        &self,
        investigation_id: i64,
    ) -> Result<Vec<InvestigationInstitution>> {
        let rows = sqlx::query_as::<_, InvestigationInstitution>(&format!(
            "{} WHERE p.investigation_id = $1 ORDER BY p.join_date, i.name",
            PARTICIPATION_SELECT
        ))
        .bind(investigation_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    // ---- roles ----

    async fn get_role(
        &self,
        user_id: Uuid,
        kind: ResourceKind,
        resource_id: i64,
    ) -> Result<Option<AssignedRole>> {
        let role: Option<AssignedRole> = sqlx::query_scalar(
            "SELECT role FROM role_assignments \
             WHERE user_id = $1 AND resource_kind = $2 AND resource_id = $3",
        )
        .bind(user_id)
        .bind(kind)
        .bind(resource_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(role)
    }

    async fn set_role(
        &self,
        user_id: Uuid,
        kind: ResourceKind,
        resource_id: i64,
        role: AssignedRole,
    ) -> Result<()> {
        let mut tx = self.db.begin().await?;
        if role != AssignedRole::Owner {
            let owners = lock_owners(&mut tx, kind, resource_id).await?;
            if is_sole_owner(&owners, user_id) {
                return Err(AppError::Validation(LAST_OWNER.into()));
            }
        }
        sqlx::query(
            "INSERT INTO role_assignments (user_id, resource_kind, resource_id, role) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, resource_kind, resource_id) \
             DO UPDATE SET role = EXCLUDED.role, updated_at = NOW()",
        )
        .bind(user_id)
        .bind(kind)
        .bind(resource_id)
        .bind(role)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn clear_role(
        &self,
        user_id: Uuid,
        kind: ResourceKind,
        resource_id: i64,
    ) -> Result<bool> {
        let mut tx = self.db.begin().await?;
        let owners = lock_owners(&mut tx, kind, resource_id).await?;
        if is_sole_owner(&owners, user_id) {
            return Err(AppError::Validation(LAST_OWNER.into()));
        }
        let result = sqlx::query(
            "DELETE FROM role_assignments \
             WHERE user_id = $1 AND resource_kind = $2 AND resource_id = $3",
        )
        .bind(user_id)
        .bind(kind)
        .bind(resource_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_role_members(
        &self,
        kind: ResourceKind,
        resource_id: i64,
    ) -> Result<Vec<RoleMember>> {
        let members = sqlx::query_as::<_, RoleMember>(
            "SELECT u.id AS user_id, u.username, u.email, u.first_name, u.last_name, r.role \
             FROM role_assignments r JOIN users u ON u.id = r.user_id \
             WHERE r.resource_kind = $1 AND r.resource_id = $2 \
             ORDER BY u.username",
        )
        .bind(kind)
        .bind(resource_id)
        .fetch_all(&self.db)
        .await?;
        Ok(members)
    }

    async fn roles_for_user(
        &self,
        user_id: Uuid,
        kind: ResourceKind,
    ) -> Result<HashMap<i64, AssignedRole>> {
        let rows: Vec<(i64, AssignedRole)> = sqlx::query_as(
            "SELECT resource_id, role FROM role_assignments \
             WHERE user_id = $1 AND resource_kind = $2",
        )
        .bind(user_id)
        .bind(kind)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("barley"), "%barley%");
        assert_eq!(contains_pattern("50%_done"), "%50\\%\\_done%");
    }
}
