//! Version 2 of the catalogue API.
//!
//! Flat routes for investigations, studies, assays and samples, plus the ISA
//! folder export. Every route except `/token` requires authentication.
//! Records carry the role holders and the caller's own permissions.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};

use super::auth::obtain_token;
use super::payloads::{AssayPayload, InvestigationPayload, StudyPayload};
use super::roles;
use super::v1::{assay_refs, study_refs};
use crate::api::dto::{Pagination, PaginationQuery};
use crate::api::middleware::auth::{principal_of, AuthExtension};
use crate::api::openapi::ErrorResponse;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::assay::AssayFilter;
use crate::models::choices::{MeasurementType, TechnologyPlatform, WorkPackage};
use crate::models::investigation::InvestigationFilter;
use crate::models::role::{AssignedRole, ResourceKind};
use crate::models::sample::SampleFilter;
use crate::models::security_level::SecurityLevel;
use crate::models::study::StudyFilter;
use crate::services::assay_service::{AssayService, AssayView};
use crate::services::export_service::{ExportService, IsaNode};
use crate::services::investigation_service::{InvestigationService, InvestigationView};
use crate::services::rbac::{Principal, ResourceAccess};
use crate::services::sample_service::{SampleService, SampleView};
use crate::services::study_service::{StudyService, StudyView};
use crate::storage::CatalogueStore;

/// Routes that require authentication.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/investigations",
            get(list_investigations).post(create_investigation),
        )
        .route(
            "/investigations/:accession_code",
            get(get_investigation)
                .put(replace_investigation)
                .patch(update_investigation)
                .delete(delete_investigation),
        )
        .route(
            "/investigations/:accession_code/roles",
            get(roles::list_investigation_roles).post(roles::assign_investigation_role),
        )
        .route(
            "/investigations/:accession_code/roles/:user_id",
            delete(roles::remove_investigation_role),
        )
        .route("/studies", get(list_studies).post(create_study))
        .route(
            "/studies/:accession_code",
            get(get_study)
                .put(replace_study)
                .patch(update_study)
                .delete(delete_study),
        )
        .route(
            "/studies/:accession_code/roles",
            get(roles::list_study_roles).post(roles::assign_study_role),
        )
        .route(
            "/studies/:accession_code/roles/:user_id",
            delete(roles::remove_study_role),
        )
        .route("/assays", get(list_assays).post(create_assay))
        .route(
            "/assays/:accession_code",
            get(get_assay)
                .put(replace_assay)
                .patch(update_assay)
                .delete(delete_assay),
        )
        .route("/samples", get(list_samples))
        .route("/samples/:accession_code", get(get_sample))
        .route(
            "/samples/:accession_code/roles",
            get(roles::list_sample_roles).post(roles::assign_sample_role),
        )
        .route(
            "/samples/:accession_code/roles/:user_id",
            delete(roles::remove_sample_role),
        )
        .route("/export/isa/:code", get(export_isa))
        .route("/:accession_code", get(direct_access))
}

/// Token issuance, reachable without credentials.
pub fn public_router() -> Router<SharedState> {
    Router::new().route("/token", post(obtain_token))
}

// ---- representations ----

/// Display strings of the users holding each role.
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct RoleHolders {
    pub owners: Vec<String>,
    pub contributors: Vec<String>,
    pub readers: Vec<String>,
}

impl RoleHolders {
    async fn load(store: &dyn CatalogueStore, kind: ResourceKind, id: i64) -> Result<Self> {
        let mut holders = Self::default();
        for member in store.list_role_members(kind, id).await? {
            let name = member.display_name();
            match member.role {
                AssignedRole::Owner => holders.owners.push(name),
                AssignedRole::Contributor => holders.contributors.push(name),
                AssignedRole::Authorized => holders.readers.push(name),
            }
        }
        Ok(holders)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvestigationV2 {
    pub accession_code: String,
    pub title: String,
    pub description: Option<String>,
    pub work_package: Option<WorkPackage>,
    pub notes: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub submission_date: Option<NaiveDate>,
    pub public_release_date: Option<NaiveDate>,
    pub principal_investigator_name: Option<String>,
    pub principal_investigator_email: Option<String>,
    pub security_level: SecurityLevel,
    /// `[accession_code, title]` of every study the caller can read
    #[schema(value_type = Vec<Vec<String>>)]
    pub studies: Vec<[String; 2]>,
    /// Ids of the institutions taking part
    pub participating_institutions: Vec<i64>,
    #[serde(flatten)]
    pub roles: RoleHolders,
    pub permissions: ResourceAccess,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StudyV2 {
    pub accession_code: String,
    pub investigation_accession: String,
    pub investigation_title: String,
    pub investigation_work_package: Option<WorkPackage>,
    pub investigation_security_level: SecurityLevel,
    pub title: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub study_design: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub submission_date: Option<NaiveDate>,
    pub public_release_date: Option<NaiveDate>,
    pub principal_investigator_name: Option<String>,
    pub principal_investigator_email: Option<String>,
    pub effective_principal_investigator_name: Option<String>,
    pub effective_principal_investigator_email: Option<String>,
    pub effective_start_date: Option<NaiveDate>,
    pub effective_end_date: Option<NaiveDate>,
    pub effective_submission_date: Option<NaiveDate>,
    pub effective_public_release_date: Option<NaiveDate>,
    pub security_level: SecurityLevel,
    pub folder_name: String,
    /// `[accession_code, measurement_type]` of the study's assays
    #[schema(value_type = Vec<Vec<String>>)]
    pub assays: Vec<[String; 2]>,
    #[serde(flatten)]
    pub roles: RoleHolders,
    pub permissions: ResourceAccess,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssayV2 {
    pub accession_code: String,
    pub study_accession: String,
    pub study_title: String,
    pub title: String,
    pub description: String,
    pub measurement_type: MeasurementType,
    pub technology_platform: TechnologyPlatform,
    /// Inherited from the study
    pub security_level: SecurityLevel,
    #[serde(flatten)]
    pub roles: RoleHolders,
    pub permissions: ResourceAccess,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SampleV2 {
    pub accession_code: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub sample_type: String,
    pub security_level: SecurityLevel,
    #[serde(flatten)]
    pub roles: RoleHolders,
    pub permissions: ResourceAccess,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvestigationV2ListResponse {
    pub results: Vec<InvestigationV2>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StudyV2ListResponse {
    pub results: Vec<StudyV2>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssayV2ListResponse {
    pub results: Vec<AssayV2>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SampleV2ListResponse {
    pub results: Vec<SampleV2>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum RecordV2 {
    Investigation(InvestigationV2),
    Study(StudyV2),
    Assay(AssayV2),
    Sample(SampleV2),
}

/// Build the v2 form of investigations, attaching readable studies.
pub(super) async fn investigation_v2s(
    state: &SharedState,
    principal: &Principal,
    views: Vec<InvestigationView>,
) -> Result<Vec<InvestigationV2>> {
    let filter = match views.as_slice() {
        [only] => StudyFilter::for_investigation(only.investigation.id),
        _ => StudyFilter::default(),
    };
    let mut studies = study_refs(state, principal, &filter).await?;

    let mut results = Vec::with_capacity(views.len());
    for InvestigationView {
        investigation: inv,
        access,
    } in views
    {
        let roles =
            RoleHolders::load(state.store.as_ref(), ResourceKind::Investigation, inv.id).await?;
        let participating_institutions = state
            .store
            .list_investigation_institutions(inv.id)
            .await?
            .into_iter()
            .map(|p| p.institution_id)
            .collect();
        results.push(InvestigationV2 {
            studies: studies.remove(&inv.id).unwrap_or_default(),
            participating_institutions,
            accession_code: inv.accession_code,
            title: inv.title,
            description: inv.description,
            work_package: inv.work_package,
            notes: inv.notes,
            start_date: inv.start_date,
            end_date: inv.end_date,
            submission_date: inv.submission_date,
            public_release_date: inv.public_release_date,
            principal_investigator_name: inv.principal_investigator_name,
            principal_investigator_email: inv.principal_investigator_email,
            security_level: inv.security_level,
            roles,
            permissions: access,
            created_at: inv.created_at,
            updated_at: inv.updated_at,
        });
    }
    Ok(results)
}

async fn investigation_v2(
    state: &SharedState,
    principal: &Principal,
    view: InvestigationView,
) -> Result<InvestigationV2> {
    investigation_v2s(state, principal, vec![view])
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal("Investigation representation missing".into()))
}

async fn study_v2s(
    state: &SharedState,
    principal: &Principal,
    views: Vec<StudyView>,
) -> Result<Vec<StudyV2>> {
    let filter = match views.as_slice() {
        [only] => AssayFilter::for_study(only.study.id),
        _ => AssayFilter::default(),
    };
    let mut assays = assay_refs(state, principal, &filter).await?;

    let mut results = Vec::with_capacity(views.len());
    for StudyView {
        study,
        investigation,
        access,
    } in views
    {
        let roles = RoleHolders::load(state.store.as_ref(), ResourceKind::Study, study.id).await?;
        let effective = study.effective_fields(&investigation);
        let folder_name = study.folder_name(&investigation);
        results.push(StudyV2 {
            assays: assays.remove(&study.id).unwrap_or_default(),
            accession_code: study.accession_code,
            investigation_accession: investigation.accession_code,
            investigation_title: investigation.title,
            investigation_work_package: investigation.work_package,
            investigation_security_level: investigation.security_level,
            title: study.title,
            slug: study.slug,
            description: study.description,
            notes: study.notes,
            study_design: study.study_design,
            start_date: study.start_date,
            end_date: study.end_date,
            submission_date: study.submission_date,
            public_release_date: study.public_release_date,
            principal_investigator_name: study.principal_investigator_name,
            principal_investigator_email: study.principal_investigator_email,
            effective_principal_investigator_name: effective.principal_investigator_name,
            effective_principal_investigator_email: effective.principal_investigator_email,
            effective_start_date: effective.start_date,
            effective_end_date: effective.end_date,
            effective_submission_date: effective.submission_date,
            effective_public_release_date: effective.public_release_date,
            security_level: study.security_level,
            folder_name,
            roles,
            permissions: access,
            created_at: study.created_at,
            updated_at: study.updated_at,
        });
    }
    Ok(results)
}

async fn study_v2(state: &SharedState, principal: &Principal, view: StudyView) -> Result<StudyV2> {
    study_v2s(state, principal, vec![view])
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal("Study representation missing".into()))
}

async fn assay_v2(state: &SharedState, view: AssayView) -> Result<AssayV2> {
    let AssayView {
        assay,
        study,
        access,
    } = view;
    let roles = RoleHolders::load(state.store.as_ref(), ResourceKind::Assay, assay.id).await?;
    Ok(AssayV2 {
        accession_code: assay.accession_code,
        study_accession: study.accession_code,
        study_title: study.title,
        title: assay.title,
        description: assay.description,
        measurement_type: assay.measurement_type,
        technology_platform: assay.technology_platform,
        security_level: study.security_level,
        roles,
        permissions: access,
        created_at: assay.created_at,
        updated_at: assay.updated_at,
    })
}

pub(super) async fn sample_v2(state: &SharedState, view: SampleView) -> Result<SampleV2> {
    let SampleView { sample, access } = view;
    let roles = RoleHolders::load(state.store.as_ref(), ResourceKind::Sample, sample.id).await?;
    Ok(SampleV2 {
        accession_code: sample.accession_code,
        name: sample.name,
        description: sample.description,
        sample_type: sample.sample_type,
        security_level: sample.security_level,
        roles,
        permissions: access,
        created_at: sample.created_at,
        updated_at: sample.updated_at,
    })
}

// ---- list queries ----

#[derive(Debug, Deserialize, IntoParams)]
pub struct InvestigationListQuery {
    /// Case-insensitive substring of the title
    pub title: Option<String>,
    pub security_level: Option<SecurityLevel>,
    pub work_package: Option<WorkPackage>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StudyListQuery {
    pub investigation_accession: Option<String>,
    /// Case-insensitive substring of the title
    pub title: Option<String>,
    /// Case-insensitive substring of the description
    pub description: Option<String>,
    pub security_level: Option<SecurityLevel>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AssayListQuery {
    pub investigation_accession: Option<String>,
    pub study_accession: Option<String>,
    /// Case-insensitive substring of the title
    pub title: Option<String>,
    pub measurement_type: Option<MeasurementType>,
    pub technology_platform: Option<TechnologyPlatform>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Row id for an accession filter. `Ok(None)` means the filter is unset;
/// `Err(())` means nothing can match.
async fn filter_id(
    store: &dyn CatalogueStore,
    kind: ResourceKind,
    accession_code: Option<&str>,
) -> Result<std::result::Result<Option<i64>, ()>> {
    let Some(code) = accession_code else {
        return Ok(Ok(None));
    };
    let id = match kind {
        ResourceKind::Investigation => store.find_investigation(code).await?.map(|inv| inv.id),
        ResourceKind::Study => store.find_study(code).await?.map(|study| study.id),
        ResourceKind::Assay => store.find_assay(code).await?.map(|assay| assay.id),
        ResourceKind::Sample => store.find_sample(code).await?.map(|sample| sample.id),
    };
    Ok(id.map(Some).ok_or(()))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SampleListQuery {
    /// Case-insensitive substring of the name
    pub name: Option<String>,
    pub sample_type: Option<String>,
    pub security_level: Option<SecurityLevel>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

fn empty_page<T>(query: &PaginationQuery) -> (Vec<T>, Pagination) {
    query.paginate(Vec::new())
}

// ---- investigations ----

/// List investigations the caller can read
#[utoipa::path(
    get,
    path = "/investigations",
    context_path = "/api/v2",
    tag = "v2",
    params(InvestigationListQuery),
    responses(
        (status = 200, description = "Readable investigations", body = InvestigationV2ListResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn list_investigations(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Query(query): Query<InvestigationListQuery>,
) -> Result<Json<InvestigationV2ListResponse>> {
    let principal = principal_of(&auth);
    let filter = InvestigationFilter {
        title: query.title,
        security_level: query.security_level,
        work_package: query.work_package,
    };
    let views = InvestigationService::new(state.store.clone())
        .list(&principal, &filter)
        .await?;
    let (page, pagination) = PaginationQuery::new(query.page, query.per_page).paginate(views);
    let results = investigation_v2s(&state, &principal, page).await?;
    Ok(Json(InvestigationV2ListResponse {
        results,
        pagination,
    }))
}

/// Create an investigation; the caller becomes its owner
#[utoipa::path(
    post,
    path = "/investigations",
    context_path = "/api/v2",
    tag = "v2",
    request_body = InvestigationPayload,
    responses(
        (status = 201, description = "Investigation created", body = InvestigationV2),
        (status = 400, description = "Validation error", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn create_investigation(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Json(payload): Json<InvestigationPayload>,
) -> Result<(StatusCode, Json<InvestigationV2>)> {
    let principal = principal_of(&auth);
    let view = InvestigationService::new(state.store.clone())
        .create(&principal, payload.into_input()?)
        .await?;
    let body = investigation_v2(&state, &principal, view).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

/// Get an investigation
#[utoipa::path(
    get,
    path = "/investigations/{accession_code}",
    context_path = "/api/v2",
    tag = "v2",
    params(("accession_code" = String, Path, description = "Investigation accession code")),
    responses(
        (status = 200, description = "Investigation", body = InvestigationV2),
        (status = 403, description = "Not readable", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn get_investigation(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
) -> Result<Json<InvestigationV2>> {
    let principal = principal_of(&auth);
    let view = InvestigationService::new(state.store.clone())
        .get(&principal, &code)
        .await?;
    Ok(Json(investigation_v2(&state, &principal, view).await?))
}

/// Replace an investigation
#[utoipa::path(
    put,
    path = "/investigations/{accession_code}",
    context_path = "/api/v2",
    tag = "v2",
    params(("accession_code" = String, Path, description = "Investigation accession code")),
    request_body = InvestigationPayload,
    responses((status = 200, description = "Investigation replaced", body = InvestigationV2)),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn replace_investigation(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
    Json(payload): Json<InvestigationPayload>,
) -> Result<Json<InvestigationV2>> {
    let principal = principal_of(&auth);
    let view = InvestigationService::new(state.store.clone())
        .update(&principal, &code, |_| payload.into_input())
        .await?;
    Ok(Json(investigation_v2(&state, &principal, view).await?))
}

/// Partially update an investigation
#[utoipa::path(
    patch,
    path = "/investigations/{accession_code}",
    context_path = "/api/v2",
    tag = "v2",
    params(("accession_code" = String, Path, description = "Investigation accession code")),
    request_body = InvestigationPayload,
    responses((status = 200, description = "Investigation updated", body = InvestigationV2)),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn update_investigation(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
    Json(payload): Json<InvestigationPayload>,
) -> Result<Json<InvestigationV2>> {
    let principal = principal_of(&auth);
    let view = InvestigationService::new(state.store.clone())
        .update(&principal, &code, |current| Ok(payload.merge_into(current)))
        .await?;
    Ok(Json(investigation_v2(&state, &principal, view).await?))
}

/// Delete an investigation with its studies and assays
#[utoipa::path(
    delete,
    path = "/investigations/{accession_code}",
    context_path = "/api/v2",
    tag = "v2",
    params(("accession_code" = String, Path, description = "Investigation accession code")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "No delete access", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn delete_investigation(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
) -> Result<StatusCode> {
    InvestigationService::new(state.store.clone())
        .delete(&principal_of(&auth), &code)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- studies ----

/// List studies the caller can read
#[utoipa::path(
    get,
    path = "/studies",
    context_path = "/api/v2",
    tag = "v2",
    params(StudyListQuery),
    responses((status = 200, description = "Readable studies", body = StudyV2ListResponse)),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn list_studies(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Query(query): Query<StudyListQuery>,
) -> Result<Json<StudyV2ListResponse>> {
    let principal = principal_of(&auth);
    let pages = PaginationQuery::new(query.page, query.per_page);
    let investigation_id = match filter_id(
        state.store.as_ref(),
        ResourceKind::Investigation,
        query.investigation_accession.as_deref(),
    )
    .await?
    {
        Ok(id) => id,
        Err(()) => {
            let (results, pagination) = empty_page(&pages);
            return Ok(Json(StudyV2ListResponse {
                results,
                pagination,
            }));
        }
    };

    let filter = StudyFilter {
        investigation_id,
        title: query.title,
        description: query.description,
        security_level: query.security_level,
    };
    let views = StudyService::new(state.store.clone())
        .list(&principal, &filter)
        .await?;
    let (page, pagination) = pages.paginate(views);
    let results = study_v2s(&state, &principal, page).await?;
    Ok(Json(StudyV2ListResponse {
        results,
        pagination,
    }))
}

/// Create a study in the investigation named by `investigation`
#[utoipa::path(
    post,
    path = "/studies",
    context_path = "/api/v2",
    tag = "v2",
    request_body = StudyPayload,
    responses(
        (status = 201, description = "Study created", body = StudyV2),
        (
            status = 400,
            description = "Missing investigation or invalid fields",
            body = ErrorResponse
        ),
        (status = 403, description = "No write access to the investigation", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn create_study(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Json(payload): Json<StudyPayload>,
) -> Result<(StatusCode, Json<StudyV2>)> {
    let principal = principal_of(&auth);
    let investigation = payload
        .investigation
        .clone()
        .ok_or_else(|| AppError::Validation("investigation is required".into()))?;
    let service = StudyService::new(state.store.clone());
    let view = service
        .create_in_investigation(&principal, &investigation, payload.into_input(0)?)
        .await?;
    let body = study_v2(&state, &principal, view).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

/// Investigation id a study should end up in after an update.
async fn target_investigation(
    state: &SharedState,
    payload: &StudyPayload,
) -> Result<Option<i64>> {
    match payload.investigation.as_deref() {
        Some(code) => {
            let investigation = InvestigationService::new(state.store.clone())
                .lookup(code)
                .await?;
            Ok(Some(investigation.id))
        }
        None => Ok(None),
    }
}

/// Get a study
#[utoipa::path(
    get,
    path = "/studies/{accession_code}",
    context_path = "/api/v2",
    tag = "v2",
    params(("accession_code" = String, Path, description = "Study accession code")),
    responses(
        (status = 200, description = "Study", body = StudyV2),
        (status = 403, description = "Not readable", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn get_study(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
) -> Result<Json<StudyV2>> {
    let principal = principal_of(&auth);
    let view = StudyService::new(state.store.clone())
        .get(&principal, &code)
        .await?;
    Ok(Json(study_v2(&state, &principal, view).await?))
}

/// Replace a study; `investigation` moves it
#[utoipa::path(
    put,
    path = "/studies/{accession_code}",
    context_path = "/api/v2",
    tag = "v2",
    params(("accession_code" = String, Path, description = "Study accession code")),
    request_body = StudyPayload,
    responses((status = 200, description = "Study replaced", body = StudyV2)),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn replace_study(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
    Json(payload): Json<StudyPayload>,
) -> Result<Json<StudyV2>> {
    let principal = principal_of(&auth);
    let target = target_investigation(&state, &payload).await?;
    let view = StudyService::new(state.store.clone())
        .update(&principal, &code, |current| {
            payload.into_input(target.unwrap_or(current.study.investigation_id))
        })
        .await?;
    Ok(Json(study_v2(&state, &principal, view).await?))
}

/// Partially update a study
#[utoipa::path(
    patch,
    path = "/studies/{accession_code}",
    context_path = "/api/v2",
    tag = "v2",
    params(("accession_code" = String, Path, description = "Study accession code")),
    request_body = StudyPayload,
    responses((status = 200, description = "Study updated", body = StudyV2)),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn update_study(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
    Json(payload): Json<StudyPayload>,
) -> Result<Json<StudyV2>> {
    let principal = principal_of(&auth);
    let target = target_investigation(&state, &payload).await?;
    let view = StudyService::new(state.store.clone())
        .update(&principal, &code, |current| {
            let investigation_id = target.unwrap_or(current.study.investigation_id);
            Ok(payload.merge_into(&current.study, investigation_id))
        })
        .await?;
    Ok(Json(study_v2(&state, &principal, view).await?))
}

/// Delete a study with its assays
#[utoipa::path(
    delete,
    path = "/studies/{accession_code}",
    context_path = "/api/v2",
    tag = "v2",
    params(("accession_code" = String, Path, description = "Study accession code")),
    responses((status = 204, description = "Deleted")),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn delete_study(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
) -> Result<StatusCode> {
    StudyService::new(state.store.clone())
        .delete(&principal_of(&auth), &code)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- assays ----

/// List assays the caller can read
#[utoipa::path(
    get,
    path = "/assays",
    context_path = "/api/v2",
    tag = "v2",
    params(AssayListQuery),
    responses((status = 200, description = "Readable assays", body = AssayV2ListResponse)),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn list_assays(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Query(query): Query<AssayListQuery>,
) -> Result<Json<AssayV2ListResponse>> {
    let principal = principal_of(&auth);
    let pages = PaginationQuery::new(query.page, query.per_page);
    let store = state.store.as_ref();
    let ids = (
        filter_id(
            store,
            ResourceKind::Investigation,
            query.investigation_accession.as_deref(),
        )
        .await?,
        filter_id(store, ResourceKind::Study, query.study_accession.as_deref()).await?,
    );
    let (Ok(investigation_id), Ok(study_id)) = ids else {
        let (results, pagination) = empty_page(&pages);
        return Ok(Json(AssayV2ListResponse {
            results,
            pagination,
        }));
    };

    let filter = AssayFilter {
        study_id,
        investigation_id,
        title: query.title,
        measurement_type: query.measurement_type,
        technology_platform: query.technology_platform,
    };
    let views = AssayService::new(state.store.clone())
        .list(&principal, &filter)
        .await?;
    let (page, pagination) = pages.paginate(views);
    let mut results = Vec::with_capacity(page.len());
    for view in page {
        results.push(assay_v2(&state, view).await?);
    }
    Ok(Json(AssayV2ListResponse {
        results,
        pagination,
    }))
}

/// Create an assay in the study named by `study`
#[utoipa::path(
    post,
    path = "/assays",
    context_path = "/api/v2",
    tag = "v2",
    request_body = AssayPayload,
    responses(
        (status = 201, description = "Assay created", body = AssayV2),
        (status = 400, description = "Missing study or invalid fields", body = ErrorResponse),
        (status = 403, description = "No write access to the study", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn create_assay(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Json(payload): Json<AssayPayload>,
) -> Result<(StatusCode, Json<AssayV2>)> {
    let principal = principal_of(&auth);
    let study_code = payload
        .study
        .clone()
        .ok_or_else(|| AppError::Validation("study is required".into()))?;
    let study = StudyService::new(state.store.clone())
        .lookup(&study_code)
        .await?;
    let view = AssayService::new(state.store.clone())
        .create(&principal, payload.into_input(study.id)?)
        .await?;
    Ok((StatusCode::CREATED, Json(assay_v2(&state, view).await?)))
}

async fn target_study(state: &SharedState, payload: &AssayPayload) -> Result<Option<i64>> {
    match payload.study.as_deref() {
        Some(code) => {
            let study = StudyService::new(state.store.clone()).lookup(code).await?;
            Ok(Some(study.id))
        }
        None => Ok(None),
    }
}

/// Get an assay
#[utoipa::path(
    get,
    path = "/assays/{accession_code}",
    context_path = "/api/v2",
    tag = "v2",
    params(("accession_code" = String, Path, description = "Assay accession code")),
    responses(
        (status = 200, description = "Assay", body = AssayV2),
        (status = 403, description = "Not readable", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn get_assay(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
) -> Result<Json<AssayV2>> {
    let view = AssayService::new(state.store.clone())
        .get(&principal_of(&auth), &code)
        .await?;
    Ok(Json(assay_v2(&state, view).await?))
}

/// Replace an assay; `study` moves it
#[utoipa::path(
    put,
    path = "/assays/{accession_code}",
    context_path = "/api/v2",
    tag = "v2",
    params(("accession_code" = String, Path, description = "Assay accession code")),
    request_body = AssayPayload,
    responses((status = 200, description = "Assay replaced", body = AssayV2)),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn replace_assay(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
    Json(payload): Json<AssayPayload>,
) -> Result<Json<AssayV2>> {
    let target = target_study(&state, &payload).await?;
    let view = AssayService::new(state.store.clone())
        .update(&principal_of(&auth), &code, |current| {
            payload.into_input(target.unwrap_or(current.assay.study_id))
        })
        .await?;
    Ok(Json(assay_v2(&state, view).await?))
}

/// Partially update an assay
#[utoipa::path(
    patch,
    path = "/assays/{accession_code}",
    context_path = "/api/v2",
    tag = "v2",
    params(("accession_code" = String, Path, description = "Assay accession code")),
    request_body = AssayPayload,
    responses((status = 200, description = "Assay updated", body = AssayV2)),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn update_assay(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
    Json(payload): Json<AssayPayload>,
) -> Result<Json<AssayV2>> {
    let target = target_study(&state, &payload).await?;
    let view = AssayService::new(state.store.clone())
        .update(&principal_of(&auth), &code, |current| {
            let study_id = target.unwrap_or(current.assay.study_id);
            Ok(payload.merge_into(&current.assay, study_id))
        })
        .await?;
    Ok(Json(assay_v2(&state, view).await?))
}

/// Delete an assay
#[utoipa::path(
    delete,
    path = "/assays/{accession_code}",
    context_path = "/api/v2",
    tag = "v2",
    params(("accession_code" = String, Path, description = "Assay accession code")),
    responses((status = 204, description = "Deleted")),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn delete_assay(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
) -> Result<StatusCode> {
    AssayService::new(state.store.clone())
        .delete(&principal_of(&auth), &code)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- samples ----

/// List samples the caller can read
#[utoipa::path(
    get,
    path = "/samples",
    context_path = "/api/v2",
    tag = "v2",
    params(SampleListQuery),
    responses((status = 200, description = "Readable samples", body = SampleV2ListResponse)),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn list_samples(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Query(query): Query<SampleListQuery>,
) -> Result<Json<SampleV2ListResponse>> {
    let filter = SampleFilter {
        name: query.name,
        sample_type: query.sample_type,
        security_level: query.security_level,
    };
    let views = SampleService::new(state.store.clone())
        .list(&principal_of(&auth), &filter)
        .await?;
    let pages = PaginationQuery::new(query.page, query.per_page);
    let (views, pagination) = pages.paginate(views);
    let mut results = Vec::with_capacity(views.len());
    for view in views {
        results.push(sample_v2(&state, view).await?);
    }
    Ok(Json(SampleV2ListResponse {
        results,
        pagination,
    }))
}

/// Get a sample
#[utoipa::path(
    get,
    path = "/samples/{accession_code}",
    context_path = "/api/v2",
    tag = "v2",
    params(("accession_code" = String, Path, description = "Sample accession code")),
    responses(
        (status = 200, description = "Sample", body = SampleV2),
        (status = 403, description = "Not readable", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn get_sample(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
) -> Result<Json<SampleV2>> {
    let view = SampleService::new(state.store.clone())
        .get(&principal_of(&auth), &code)
        .await?;
    Ok(Json(sample_v2(&state, view).await?))
}

// ---- export ----

/// Export an investigation as an ISA folder tree
///
/// Accepts an accession code in any case or a bare investigation id. Files
/// are strings holding their content; folders are objects.
#[utoipa::path(
    get,
    path = "/export/isa/{code}",
    context_path = "/api/v2",
    tag = "v2",
    params(("code" = String, Path, description = "Investigation accession code or id")),
    responses(
        (status = 200, description = "Folder tree", body = Object),
        (status = 403, description = "Investigation not readable", body = ErrorResponse),
        (status = 404, description = "Investigation not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn export_isa(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
) -> Result<Json<IsaNode>> {
    let tree = ExportService::new(state.store.clone())
        .isa_tree(&principal_of(&auth), &code)
        .await?;
    Ok(Json(tree))
}

// ---- direct access ----

/// Fetch any record by accession code
#[utoipa::path(
    get,
    path = "/{accession_code}",
    context_path = "/api/v2",
    tag = "v2",
    params(("accession_code" = String, Path, description = "Any accession code")),
    responses(
        (status = 200, description = "The record", body = RecordV2),
        (status = 404, description = "Unknown accession code", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn direct_access(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
) -> Result<Json<RecordV2>> {
    let principal = principal_of(&auth);
    let record = match ResourceKind::parse_accession(&code) {
        Some((ResourceKind::Investigation, _)) => {
            let view = InvestigationService::new(state.store.clone())
                .get(&principal, &code)
                .await?;
            RecordV2::Investigation(investigation_v2(&state, &principal, view).await?)
        }
        Some((ResourceKind::Study, _)) => {
            let view = StudyService::new(state.store.clone())
                .get(&principal, &code)
                .await?;
            RecordV2::Study(study_v2(&state, &principal, view).await?)
        }
        Some((ResourceKind::Assay, _)) => {
            let view = AssayService::new(state.store.clone())
                .get(&principal, &code)
                .await?;
            RecordV2::Assay(assay_v2(&state, view).await?)
        }
        Some((ResourceKind::Sample, _)) => {
            let view = SampleService::new(state.store.clone())
                .get(&principal, &code)
                .await?;
            RecordV2::Sample(sample_v2(&state, view).await?)
        }
        None => {
            return Err(AppError::NotFound(format!(
                "No record with accession code {}",
                code
            )))
        }
    };
    Ok(Json(record))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        list_investigations,
        create_investigation,
        get_investigation,
        replace_investigation,
        update_investigation,
        delete_investigation,
        list_studies,
        create_study,
        get_study,
        replace_study,
        update_study,
        delete_study,
        list_assays,
        create_assay,
        get_assay,
        replace_assay,
        update_assay,
        delete_assay,
        list_samples,
        get_sample,
        export_isa,
        direct_access,
    ),
    components(schemas(
        InvestigationV2,
        StudyV2,
        AssayV2,
        SampleV2,
        RecordV2,
        RoleHolders,
        ResourceAccess,
        InvestigationV2ListResponse,
        StudyV2ListResponse,
        AssayV2ListResponse,
        SampleV2ListResponse,
    ))
)]
pub struct V2ApiDoc;
