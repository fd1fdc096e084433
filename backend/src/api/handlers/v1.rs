//! Version 1 of the catalogue API.
//!
//! Studies and assays are addressed through their parents
//! (`/investigations/{code}/studies/{code}/assays/{code}`). Anonymous callers
//! are served whatever the security matrix lets a guest read.

use std::collections::HashMap;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use super::auth::obtain_token;
use super::payloads::{AssayPayload, InvestigationPayload, StudyPayload};
use super::roles::{self, RoleListResponse, RoleRequest};
use crate::api::dto::{Pagination, PaginationQuery};
use crate::api::middleware::auth::{principal_of, AuthExtension};
use crate::api::openapi::ErrorResponse;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::assay::{Assay, AssayFilter};
use crate::models::choices::{MeasurementType, TechnologyPlatform};
use crate::models::investigation::{Investigation, InvestigationFilter};
use crate::models::role::ResourceKind;
use crate::models::sample::Sample;
use crate::models::security_level::SecurityLevel;
use crate::models::study::{Study, StudyFilter};
use crate::services::assay_service::AssayService;
use crate::services::investigation_service::InvestigationService;
use crate::services::rbac::Principal;
use crate::services::role_service::RoleEntry;
use crate::services::sample_service::SampleService;
use crate::services::study_service::StudyService;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/investigations",
            get(list_investigations).post(create_investigation),
        )
        .route(
            "/investigations/:investigation",
            get(get_investigation)
                .put(replace_investigation)
                .patch(update_investigation)
                .delete(delete_investigation),
        )
        .route(
            "/investigations/:investigation/studies",
            get(list_studies).post(create_study),
        )
        .route(
            "/investigations/:investigation/studies/:study",
            get(get_study)
                .put(replace_study)
                .patch(update_study)
                .delete(delete_study),
        )
        .route(
            "/investigations/:investigation/studies/:study/assays",
            get(list_assays).post(create_assay),
        )
        .route(
            "/investigations/:investigation/studies/:study/assays/:assay",
            get(get_assay),
        )
        .route(
            "/investigations/:investigation/roles",
            get(roles::list_investigation_roles).post(roles::assign_investigation_role),
        )
        .route(
            "/investigations/:investigation/roles/:user_id",
            delete(roles::remove_investigation_role),
        )
        .route(
            "/investigations/:investigation/studies/:study/roles",
            get(list_study_roles).post(assign_study_role),
        )
        .route(
            "/investigations/:investigation/studies/:study/roles/:user_id",
            delete(remove_study_role),
        )
        .route("/token", post(obtain_token))
        .route("/:accession_code", get(direct_access))
}

// ---- representations ----

#[derive(Debug, Serialize, ToSchema)]
pub struct InvestigationV1 {
    pub accession_code: String,
    pub security_level: SecurityLevel,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub submission_date: Option<NaiveDate>,
    pub public_release_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `[accession_code, title]` of every study the caller can read
    #[schema(value_type = Vec<Vec<String>>)]
    pub studies: Vec<[String; 2]>,
}

impl InvestigationV1 {
    fn new(investigation: Investigation, studies: Vec<[String; 2]>) -> Self {
        Self {
            accession_code: investigation.accession_code,
            security_level: investigation.security_level,
            title: investigation.title,
            description: investigation.description,
            start_date: investigation.start_date,
            end_date: investigation.end_date,
            submission_date: investigation.submission_date,
            public_release_date: investigation.public_release_date,
            created_at: investigation.created_at,
            updated_at: investigation.updated_at,
            studies,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StudyV1 {
    pub accession_code: String,
    pub investigation_accession: String,
    pub title: String,
    pub description: Option<String>,
    pub submission_date: Option<NaiveDate>,
    pub study_design: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// `[accession_code, measurement_type]` of the study's assays
    #[schema(value_type = Vec<Vec<String>>)]
    pub assays: Vec<[String; 2]>,
    pub security_level: SecurityLevel,
}

impl StudyV1 {
    fn new(study: Study, investigation_accession: String, assays: Vec<[String; 2]>) -> Self {
        Self {
            accession_code: study.accession_code,
            investigation_accession,
            title: study.title,
            description: study.description,
            submission_date: study.submission_date,
            study_design: study.study_design,
            start_date: study.start_date,
            end_date: study.end_date,
            assays,
            security_level: study.security_level,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssayV1 {
    pub accession_code: String,
    pub study_accession: String,
    pub title: String,
    pub description: String,
    pub measurement_type: MeasurementType,
    pub technology_platform: TechnologyPlatform,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssayV1 {
    fn new(assay: Assay, study_accession: String) -> Self {
        Self {
            accession_code: assay.accession_code,
            study_accession,
            title: assay.title,
            description: assay.description,
            measurement_type: assay.measurement_type,
            technology_platform: assay.technology_platform,
            created_at: assay.created_at,
            updated_at: assay.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SampleV1 {
    pub accession_code: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub sample_type: String,
    pub security_level: SecurityLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Sample> for SampleV1 {
    fn from(sample: Sample) -> Self {
        Self {
            accession_code: sample.accession_code,
            name: sample.name,
            description: sample.description,
            sample_type: sample.sample_type,
            security_level: sample.security_level,
            created_at: sample.created_at,
            updated_at: sample.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvestigationV1ListResponse {
    pub results: Vec<InvestigationV1>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StudyV1ListResponse {
    pub results: Vec<StudyV1>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssayV1ListResponse {
    pub results: Vec<AssayV1>,
    pub pagination: Pagination,
}

/// Record reached through `/{accession_code}`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum RecordV1 {
    Investigation(InvestigationV1),
    Study(StudyV1),
    Assay(AssayV1),
    Sample(SampleV1),
}

/// Readable studies grouped by investigation id, as `[code, title]` pairs.
pub(super) async fn study_refs(
    state: &SharedState,
    principal: &Principal,
    filter: &StudyFilter,
) -> Result<HashMap<i64, Vec<[String; 2]>>> {
    let studies = StudyService::new(state.store.clone())
        .list(principal, filter)
        .await?;
    let mut grouped: HashMap<i64, Vec<[String; 2]>> = HashMap::new();
    for view in studies {
        grouped
            .entry(view.study.investigation_id)
            .or_default()
            .push([view.study.accession_code, view.study.title]);
    }
    Ok(grouped)
}

/// Readable assays grouped by study id, as `[code, measurement_type]` pairs.
pub(super) async fn assay_refs(
    state: &SharedState,
    principal: &Principal,
    filter: &AssayFilter,
) -> Result<HashMap<i64, Vec<[String; 2]>>> {
    let assays = AssayService::new(state.store.clone())
        .list(principal, filter)
        .await?;
    let mut grouped: HashMap<i64, Vec<[String; 2]>> = HashMap::new();
    for view in assays {
        grouped.entry(view.assay.study_id).or_default().push([
            view.assay.accession_code,
            view.assay.measurement_type.as_str().to_string(),
        ]);
    }
    Ok(grouped)
}

async fn investigation_v1(
    state: &SharedState,
    principal: &Principal,
    investigation: Investigation,
) -> Result<InvestigationV1> {
    let mut refs = study_refs(
        state,
        principal,
        &StudyFilter::for_investigation(investigation.id),
    )
    .await?;
    let studies = refs.remove(&investigation.id).unwrap_or_default();
    Ok(InvestigationV1::new(investigation, studies))
}

async fn study_v1(
    state: &SharedState,
    principal: &Principal,
    study: Study,
    investigation_accession: String,
) -> Result<StudyV1> {
    let mut refs = assay_refs(state, principal, &AssayFilter::for_study(study.id)).await?;
    let assays = refs.remove(&study.id).unwrap_or_default();
    Ok(StudyV1::new(study, investigation_accession, assays))
}

// ---- investigations ----

/// List investigations the caller can read
#[utoipa::path(
    get,
    path = "/investigations",
    context_path = "/api/v1",
    tag = "v1",
    params(PaginationQuery),
    responses(
        (status = 200, description = "Readable investigations", body = InvestigationV1ListResponse)
    )
)]
pub async fn list_investigations(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<InvestigationV1ListResponse>> {
    let principal = principal_of(&auth);
    let views = InvestigationService::new(state.store.clone())
        .list(&principal, &InvestigationFilter::default())
        .await?;
    let (page, pagination) = query.paginate(views);

    let mut studies = study_refs(&state, &principal, &StudyFilter::default()).await?;
    let results = page
        .into_iter()
        .map(|view| {
            let refs = studies.remove(&view.investigation.id).unwrap_or_default();
            InvestigationV1::new(view.investigation, refs)
        })
        .collect();

    Ok(Json(InvestigationV1ListResponse {
        results,
        pagination,
    }))
}

/// Create an investigation; the caller becomes its owner
#[utoipa::path(
    post,
    path = "/investigations",
    context_path = "/api/v1",
    tag = "v1",
    request_body = InvestigationPayload,
    responses(
        (status = 201, description = "Investigation created", body = InvestigationV1),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn create_investigation(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Json(payload): Json<InvestigationPayload>,
) -> Result<(StatusCode, Json<InvestigationV1>)> {
    let principal = principal_of(&auth);
    let view = InvestigationService::new(state.store.clone())
        .create(&principal, payload.into_input()?)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(InvestigationV1::new(view.investigation, Vec::new())),
    ))
}

/// Get an investigation
#[utoipa::path(
    get,
    path = "/investigations/{investigation}",
    context_path = "/api/v1",
    tag = "v1",
    params(("investigation" = String, Path, description = "Investigation accession code")),
    responses(
        (status = 200, description = "Investigation", body = InvestigationV1),
        (status = 403, description = "Not readable", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
    )
)]
pub async fn get_investigation(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
) -> Result<Json<InvestigationV1>> {
    let principal = principal_of(&auth);
    let view = InvestigationService::new(state.store.clone())
        .get(&principal, &code)
        .await?;
    Ok(Json(investigation_v1(&state, &principal, view.investigation).await?))
}

/// Replace an investigation
#[utoipa::path(
    put,
    path = "/investigations/{investigation}",
    context_path = "/api/v1",
    tag = "v1",
    params(("investigation" = String, Path, description = "Investigation accession code")),
    request_body = InvestigationPayload,
    responses(
        (status = 200, description = "Investigation replaced", body = InvestigationV1),
        (status = 403, description = "No write access", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn replace_investigation(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
    Json(payload): Json<InvestigationPayload>,
) -> Result<Json<InvestigationV1>> {
    let principal = principal_of(&auth);
    let view = InvestigationService::new(state.store.clone())
        .update(&principal, &code, |_| payload.into_input())
        .await?;
    Ok(Json(investigation_v1(&state, &principal, view.investigation).await?))
}

/// Partially update an investigation
#[utoipa::path(
    patch,
    path = "/investigations/{investigation}",
    context_path = "/api/v1",
    tag = "v1",
    params(("investigation" = String, Path, description = "Investigation accession code")),
    request_body = InvestigationPayload,
    responses(
        (status = 200, description = "Investigation updated", body = InvestigationV1),
        (status = 403, description = "No write access", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn update_investigation(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
    Json(payload): Json<InvestigationPayload>,
) -> Result<Json<InvestigationV1>> {
    let principal = principal_of(&auth);
    let view = InvestigationService::new(state.store.clone())
        .update(&principal, &code, |current| Ok(payload.merge_into(current)))
        .await?;
    Ok(Json(investigation_v1(&state, &principal, view.investigation).await?))
}

/// Delete an investigation with its studies and assays
#[utoipa::path(
    delete,
    path = "/investigations/{investigation}",
    context_path = "/api/v1",
    tag = "v1",
    params(("investigation" = String, Path, description = "Investigation accession code")),
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

/// List readable studies of an investigation
#[utoipa::path(
    get,
    path = "/investigations/{investigation}/studies",
    context_path = "/api/v1",
    tag = "v1",
    params(
        ("investigation" = String, Path, description = "Investigation accession code"),
        PaginationQuery,
    ),
    responses(
        (status = 200, description = "Readable studies", body = StudyV1ListResponse),
        (status = 403, description = "Investigation not readable", body = ErrorResponse),
    )
)]
pub async fn list_studies(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(investigation): Path<String>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<StudyV1ListResponse>> {
    let principal = principal_of(&auth);
    let views = StudyService::new(state.store.clone())
        .list_in_investigation(&principal, &investigation, StudyFilter::default())
        .await?;
    let (page, pagination) = query.paginate(views);

    let mut assays = match page.first() {
        Some(view) => {
            let filter = AssayFilter {
                investigation_id: Some(view.investigation.id),
                ..Default::default()
            };
            assay_refs(&state, &principal, &filter).await?
        }
        None => HashMap::new(),
    };
    let results = page
        .into_iter()
        .map(|view| {
            let refs = assays.remove(&view.study.id).unwrap_or_default();
            StudyV1::new(view.study, view.investigation.accession_code, refs)
        })
        .collect();

    Ok(Json(StudyV1ListResponse {
        results,
        pagination,
    }))
}

/// Create a study in an investigation
#[utoipa::path(
    post,
    path = "/investigations/{investigation}/studies",
    context_path = "/api/v1",
    tag = "v1",
    params(("investigation" = String, Path, description = "Investigation accession code")),
    request_body = StudyPayload,
    responses(
        (status = 201, description = "Study created", body = StudyV1),
        (status = 403, description = "No write access to the investigation", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn create_study(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(investigation): Path<String>,
    Json(payload): Json<StudyPayload>,
) -> Result<(StatusCode, Json<StudyV1>)> {
    let principal = principal_of(&auth);
    let input = payload.into_input(0)?;
    let view = StudyService::new(state.store.clone())
        .create_in_investigation(&principal, &investigation, input)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(StudyV1::new(
            view.study,
            view.investigation.accession_code,
            Vec::new(),
        )),
    ))
}

/// Get a study of an investigation
#[utoipa::path(
    get,
    path = "/investigations/{investigation}/studies/{study}",
    context_path = "/api/v1",
    tag = "v1",
    params(
        ("investigation" = String, Path, description = "Investigation accession code"),
        ("study" = String, Path, description = "Study accession code"),
    ),
    responses(
        (status = 200, description = "Study", body = StudyV1),
        (status = 403, description = "Not readable", body = ErrorResponse),
        (status = 404, description = "Not found in this investigation", body = ErrorResponse),
    )
)]
pub async fn get_study(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path((investigation, study)): Path<(String, String)>,
) -> Result<Json<StudyV1>> {
    let principal = principal_of(&auth);
    let view = StudyService::new(state.store.clone())
        .get_in_investigation(&principal, &investigation, &study)
        .await?;
    Ok(Json(
        study_v1(&state, &principal, view.study, view.investigation.accession_code).await?,
    ))
}

/// Replace a study
#[utoipa::path(
    put,
    path = "/investigations/{investigation}/studies/{study}",
    context_path = "/api/v1",
    tag = "v1",
    params(
        ("investigation" = String, Path, description = "Investigation accession code"),
        ("study" = String, Path, description = "Study accession code"),
    ),
    request_body = StudyPayload,
    responses((status = 200, description = "Study replaced", body = StudyV1)),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn replace_study(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path((investigation, study)): Path<(String, String)>,
    Json(payload): Json<StudyPayload>,
) -> Result<Json<StudyV1>> {
    let principal = principal_of(&auth);
    let service = StudyService::new(state.store.clone());
    service
        .get_in_investigation(&principal, &investigation, &study)
        .await?;
    let view = service
        .update(&principal, &study, |current| {
            payload.into_input(current.study.investigation_id)
        })
        .await?;
    Ok(Json(
        study_v1(&state, &principal, view.study, view.investigation.accession_code).await?,
    ))
}

/// Partially update a study
#[utoipa::path(
    patch,
    path = "/investigations/{investigation}/studies/{study}",
    context_path = "/api/v1",
    tag = "v1",
    params(
        ("investigation" = String, Path, description = "Investigation accession code"),
        ("study" = String, Path, description = "Study accession code"),
    ),
    request_body = StudyPayload,
    responses((status = 200, description = "Study updated", body = StudyV1)),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn update_study(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path((investigation, study)): Path<(String, String)>,
    Json(payload): Json<StudyPayload>,
) -> Result<Json<StudyV1>> {
    let principal = principal_of(&auth);
    let service = StudyService::new(state.store.clone());
    service
        .get_in_investigation(&principal, &investigation, &study)
        .await?;
    let view = service
        .update(&principal, &study, |current| {
            Ok(payload.merge_into(&current.study, current.study.investigation_id))
        })
        .await?;
    Ok(Json(
        study_v1(&state, &principal, view.study, view.investigation.accession_code).await?,
    ))
}

/// Delete a study with its assays
#[utoipa::path(
    delete,
    path = "/investigations/{investigation}/studies/{study}",
    context_path = "/api/v1",
    tag = "v1",
    params(
        ("investigation" = String, Path, description = "Investigation accession code"),
        ("study" = String, Path, description = "Study accession code"),
    ),
    responses((status = 204, description = "Deleted")),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn delete_study(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path((investigation, study)): Path<(String, String)>,
) -> Result<StatusCode> {
    let principal = principal_of(&auth);
    let service = StudyService::new(state.store.clone());
    service
        .get_in_investigation(&principal, &investigation, &study)
        .await?;
    service.delete(&principal, &study).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- assays ----

/// List assays of a study
#[utoipa::path(
    get,
    path = "/investigations/{investigation}/studies/{study}/assays",
    context_path = "/api/v1",
    tag = "v1",
    params(
        ("investigation" = String, Path, description = "Investigation accession code"),
        ("study" = String, Path, description = "Study accession code"),
        PaginationQuery,
    ),
    responses((status = 200, description = "Assays of the study", body = AssayV1ListResponse))
)]
pub async fn list_assays(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path((investigation, study)): Path<(String, String)>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<AssayV1ListResponse>> {
    let principal = principal_of(&auth);
    let study = StudyService::new(state.store.clone())
        .get_in_investigation(&principal, &investigation, &study)
        .await?;
    let views = AssayService::new(state.store.clone())
        .list_in_study(&principal, &study.study)
        .await?;
    let (page, pagination) = query.paginate(views);
    let results = page
        .into_iter()
        .map(|view| AssayV1::new(view.assay, view.study.accession_code))
        .collect();
    Ok(Json(AssayV1ListResponse {
        results,
        pagination,
    }))
}

/// Create an assay in a study
#[utoipa::path(
    post,
    path = "/investigations/{investigation}/studies/{study}/assays",
    context_path = "/api/v1",
    tag = "v1",
    params(
        ("investigation" = String, Path, description = "Investigation accession code"),
        ("study" = String, Path, description = "Study accession code"),
    ),
    request_body = AssayPayload,
    responses(
        (status = 201, description = "Assay created", body = AssayV1),
        (status = 403, description = "No write access to the study", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn create_assay(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path((investigation, study)): Path<(String, String)>,
    Json(payload): Json<AssayPayload>,
) -> Result<(StatusCode, Json<AssayV1>)> {
    let principal = principal_of(&auth);
    let study = StudyService::new(state.store.clone())
        .get_in_investigation(&principal, &investigation, &study)
        .await?;
    let view = AssayService::new(state.store.clone())
        .create(&principal, payload.into_input(study.study.id)?)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AssayV1::new(view.assay, view.study.accession_code)),
    ))
}

/// Get an assay of a study
#[utoipa::path(
    get,
    path = "/investigations/{investigation}/studies/{study}/assays/{assay}",
    context_path = "/api/v1",
    tag = "v1",
    params(
        ("investigation" = String, Path, description = "Investigation accession code"),
        ("study" = String, Path, description = "Study accession code"),
        ("assay" = String, Path, description = "Assay accession code"),
    ),
    responses(
        (status = 200, description = "Assay", body = AssayV1),
        (status = 404, description = "Not found in this study", body = ErrorResponse),
    )
)]
pub async fn get_assay(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path((investigation, study, assay)): Path<(String, String, String)>,
) -> Result<Json<AssayV1>> {
    let principal = principal_of(&auth);
    let study = StudyService::new(state.store.clone())
        .get_in_investigation(&principal, &investigation, &study)
        .await?;
    let view = AssayService::new(state.store.clone())
        .get_in_study(&principal, &study.study, &assay)
        .await?;
    Ok(Json(AssayV1::new(view.assay, view.study.accession_code)))
}

// ---- nested study roles ----

async fn nested_study_code(
    state: &SharedState,
    principal: &Principal,
    investigation: &str,
    study: &str,
) -> Result<String> {
    let view = StudyService::new(state.store.clone())
        .get_in_investigation(principal, investigation, study)
        .await?;
    Ok(view.study.accession_code)
}

pub async fn list_study_roles(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path((investigation, study)): Path<(String, String)>,
) -> Result<Json<RoleListResponse>> {
    let principal = principal_of(&auth);
    let code = nested_study_code(&state, &principal, &investigation, &study).await?;
    roles::list_roles(&state, &principal, ResourceKind::Study, &code).await
}

pub async fn assign_study_role(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path((investigation, study)): Path<(String, String)>,
    Json(request): Json<RoleRequest>,
) -> Result<Json<RoleEntry>> {
    let principal = principal_of(&auth);
    let code = nested_study_code(&state, &principal, &investigation, &study).await?;
    roles::assign_role(&state, &principal, ResourceKind::Study, &code, request).await
}

pub async fn remove_study_role(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path((investigation, study, user_id)): Path<(String, String, Uuid)>,
) -> Result<StatusCode> {
    let principal = principal_of(&auth);
    let code = nested_study_code(&state, &principal, &investigation, &study).await?;
    roles::remove_role(&state, &principal, ResourceKind::Study, &code, user_id).await
}

// ---- direct access ----

/// Fetch any record by accession code
///
/// `CXRP…` resolves to an investigation, `CXRS…` to a study and `CXRA…` to an
/// assay.
#[utoipa::path(
    get,
    path = "/{accession_code}",
    context_path = "/api/v1",
    tag = "v1",
    params(("accession_code" = String, Path, description = "Any accession code")),
    responses(
        (status = 200, description = "The record", body = RecordV1),
        (status = 403, description = "Not readable", body = ErrorResponse),
        (status = 404, description = "Unknown accession code", body = ErrorResponse),
    )
)]
pub async fn direct_access(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(code): Path<String>,
) -> Result<Json<RecordV1>> {
    let principal = principal_of(&auth);
    let record = match ResourceKind::parse_accession(&code) {
        Some((ResourceKind::Investigation, _)) => {
            let view = InvestigationService::new(state.store.clone())
                .get(&principal, &code)
                .await?;
            RecordV1::Investigation(investigation_v1(&state, &principal, view.investigation).await?)
        }
        Some((ResourceKind::Study, _)) => {
            let view = StudyService::new(state.store.clone())
                .get(&principal, &code)
                .await?;
            RecordV1::Study(
                study_v1(&state, &principal, view.study, view.investigation.accession_code)
                    .await?,
            )
        }
        Some((ResourceKind::Assay, _)) => {
            let view = AssayService::new(state.store.clone())
                .get(&principal, &code)
                .await?;
            RecordV1::Assay(AssayV1::new(view.assay, view.study.accession_code))
        }
        Some((ResourceKind::Sample, _)) => {
            let view = SampleService::new(state.store.clone())
                .get(&principal, &code)
                .await?;
            RecordV1::Sample(view.sample.into())
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
        direct_access,
    ),
    components(schemas(
        InvestigationV1,
        StudyV1,
        AssayV1,
        SampleV1,
        RecordV1,
        InvestigationV1ListResponse,
        StudyV1ListResponse,
        AssayV1ListResponse,
        InvestigationPayload,
        StudyPayload,
        AssayPayload,
        Pagination,
    ))
)]
pub struct V1ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    fn investigation() -> Investigation {
        Investigation {
            id: 2,
            accession_code: "CXRP2".into(),
            title: "Heat stress".into(),
            description: None,
            work_package: None,
            notes: Some("internal notes".into()),
            start_date: None,
            end_date: None,
            submission_date: None,
            public_release_date: None,
            principal_investigator_name: None,
            principal_investigator_email: None,
            security_level: SecurityLevel::Public,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_investigation_studies_serialize_as_pairs() {
        let rep = InvestigationV1::new(
            investigation(),
            vec![["CXRS4".to_string(), "Field trial".to_string()]],
        );
        let json = serde_json::to_value(&rep).unwrap();
        assert_eq!(json["studies"], serde_json::json!([["CXRS4", "Field trial"]]));
        assert_eq!(json["security_level"], "public");
    }

    #[test]
    fn test_v1_investigation_omits_v2_fields() {
        let json = serde_json::to_value(InvestigationV1::new(investigation(), Vec::new())).unwrap();
        assert!(json.get("notes").is_none());
        assert!(json.get("owners").is_none());
        assert!(json.get("permissions").is_none());
    }

    #[test]
    fn test_record_is_untagged() {
        let record = RecordV1::Investigation(InvestigationV1::new(investigation(), Vec::new()));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["accession_code"], "CXRP2");
        assert!(json.get("Investigation").is_none());
    }
}
