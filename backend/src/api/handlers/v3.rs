//! Version 3: read-only listing endpoints and the HTML catalogue.

use askama::Template;
use axum::{
    extract::{Extension, Path, Query, State},
    response::Html,
    routing::get,
    Json, Router,
};
use utoipa::OpenApi;

use super::v2::{
    investigation_v2s, InvestigationListQuery, InvestigationV2, InvestigationV2ListResponse,
};
use crate::api::dto::PaginationQuery;
use crate::api::middleware::auth::{principal_of, AuthExtension};
use crate::api::openapi::ErrorResponse;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::investigation::InvestigationFilter;
use crate::services::investigation_service::InvestigationService;
use crate::services::rbac::has_investigation_permission;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(index_page))
        .route("/catalogue", get(catalogue_page))
        .route("/investigations", get(list_investigations))
        .route("/investigations/:accession_code", get(get_investigation))
}

/// List investigations the caller can read
#[utoipa::path(
    get,
    path = "/investigations",
    context_path = "/api/v3",
    tag = "v3",
    params(InvestigationListQuery),
    responses(
        (status = 200, description = "Readable investigations", body = InvestigationV2ListResponse)
    )
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

/// Get an investigation
#[utoipa::path(
    get,
    path = "/investigations/{accession_code}",
    context_path = "/api/v3",
    tag = "v3",
    params(("accession_code" = String, Path, description = "Investigation accession code")),
    responses(
        (status = 200, description = "Investigation", body = InvestigationV2),
        (status = 403, description = "Not readable", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
    )
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
    investigation_v2s(&state, &principal, vec![view])
        .await?
        .pop()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Investigation {} not found", code)))
}

// ---- HTML ----

pub struct CatalogueRow {
    pub accession_code: String,
    pub title: String,
    pub security_level: &'static str,
    pub study_count: usize,
    pub can_read: bool,
    pub can_write: bool,
}

#[derive(Template)]
#[template(path = "catalogue.html")]
pub struct CatalogueTemplate {
    pub rows: Vec<CatalogueRow>,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub version: &'static str,
    pub username: Option<String>,
}

/// Landing page.
pub async fn index_page(Extension(auth): Extension<Option<AuthExtension>>) -> Result<Html<String>> {
    let template = IndexTemplate {
        version: env!("CARGO_PKG_VERSION"),
        username: auth.map(|a| a.username),
    };
    Ok(Html(template.render()?))
}

/// Readable investigations with read/write badges.
pub async fn catalogue_page(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
) -> Result<Html<String>> {
    let principal = principal_of(&auth);
    let views = InvestigationService::new(state.store.clone())
        .list(&principal, &InvestigationFilter::default())
        .await?;

    let mut rows = Vec::with_capacity(views.len());
    for record in investigation_v2s(&state, &principal, views).await? {
        rows.push(CatalogueRow {
            can_read: has_investigation_permission(Some(&record.permissions), "read"),
            can_write: has_investigation_permission(Some(&record.permissions), "write"),
            study_count: record.studies.len(),
            security_level: record.security_level.label(),
            accession_code: record.accession_code,
            title: record.title,
        });
    }
    Ok(Html(CatalogueTemplate { rows }.render()?))
}

#[derive(OpenApi)]
#[openapi(paths(list_investigations, get_investigation))]
pub struct V3ApiDoc;
