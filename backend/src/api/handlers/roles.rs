//! Role management handlers for investigations, studies and samples.
//!
//! Investigation and study roles are mounted under both `/api/v1` and
//! `/api/v2`; sample roles only under `/api/v2`. Listing needs read access to
//! the resource; assigning and removing need the manage-permissions right.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::middleware::auth::{principal_of, AuthExtension};
use crate::api::openapi::ErrorResponse;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::role::{AssignedRole, ResourceKind};
use crate::services::rbac::Principal;
use crate::services::role_service::{RoleEntry, RoleService};

/// Grant a role to a user, identified by id or username.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleRequest {
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    /// `authorized` (or `viewer`), `contributor` or `owner`
    pub role: AssignedRole,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleListResponse {
    pub results: Vec<RoleEntry>,
}

async fn resolve_user(state: &SharedState, request: &RoleRequest) -> Result<Uuid> {
    if let Some(user_id) = request.user_id {
        return Ok(user_id);
    }
    let username = request
        .username
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::Validation("user_id or username is required".into()))?;
    state
        .store
        .find_user_by_username(username)
        .await?
        .map(|user| user.id)
        .ok_or_else(|| AppError::NotFound(format!("User \"{}\" does not exist", username)))
}

pub(crate) async fn list_roles(
    state: &SharedState,
    principal: &Principal,
    kind: ResourceKind,
    accession_code: &str,
) -> Result<Json<RoleListResponse>> {
    let results = RoleService::new(state.store.clone())
        .list(principal, kind, accession_code)
        .await?;
    Ok(Json(RoleListResponse { results }))
}

pub(crate) async fn assign_role(
    state: &SharedState,
    principal: &Principal,
    kind: ResourceKind,
    accession_code: &str,
    request: RoleRequest,
) -> Result<Json<RoleEntry>> {
    let user_id = resolve_user(state, &request).await?;
    let entry = RoleService::new(state.store.clone())
        .assign(principal, kind, accession_code, user_id, request.role)
        .await?;
    Ok(Json(entry))
}

pub(crate) async fn remove_role(
    state: &SharedState,
    principal: &Principal,
    kind: ResourceKind,
    accession_code: &str,
    user_id: Uuid,
) -> Result<StatusCode> {
    RoleService::new(state.store.clone())
        .remove(principal, kind, accession_code, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List users holding a role on an investigation
#[utoipa::path(
    get,
    path = "/investigations/{accession_code}/roles",
    context_path = "/api/v2",
    tag = "roles",
    params(("accession_code" = String, Path, description = "Investigation accession code")),
    responses(
        (status = 200, description = "Role assignments", body = RoleListResponse),
        (status = 403, description = "Investigation not readable", body = ErrorResponse),
        (status = 404, description = "Investigation not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn list_investigation_roles(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(accession_code): Path<String>,
) -> Result<Json<RoleListResponse>> {
    list_roles(&state, &principal_of(&auth), ResourceKind::Investigation, &accession_code).await
}

/// Assign a role on an investigation
#[utoipa::path(
    post,
    path = "/investigations/{accession_code}/roles",
    context_path = "/api/v2",
    tag = "roles",
    params(("accession_code" = String, Path, description = "Investigation accession code")),
    request_body = RoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = RoleEntry),
        (status = 400, description = "Last owner would be demoted", body = ErrorResponse),
        (status = 403, description = "Caller cannot manage permissions", body = ErrorResponse),
        (status = 404, description = "Investigation or user not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn assign_investigation_role(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(accession_code): Path<String>,
    Json(request): Json<RoleRequest>,
) -> Result<Json<RoleEntry>> {
    assign_role(
        &state,
        &principal_of(&auth),
        ResourceKind::Investigation,
        &accession_code,
        request,
    )
    .await
}

/// Remove a user's role on an investigation
#[utoipa::path(
    delete,
    path = "/investigations/{accession_code}/roles/{user_id}",
    context_path = "/api/v2",
    tag = "roles",
    params(
        ("accession_code" = String, Path, description = "Investigation accession code"),
        ("user_id" = Uuid, Path, description = "User ID"),
    ),
    responses(
        (status = 204, description = "Role removed"),
        (status = 400, description = "Last owner cannot be removed", body = ErrorResponse),
        (status = 403, description = "Caller cannot manage permissions", body = ErrorResponse),
        (status = 404, description = "No such role", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn remove_investigation_role(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path((accession_code, user_id)): Path<(String, Uuid)>,
) -> Result<StatusCode> {
    remove_role(
        &state,
        &principal_of(&auth),
        ResourceKind::Investigation,
        &accession_code,
        user_id,
    )
    .await
}

/// List users holding a role on a study
#[utoipa::path(
    get,
    path = "/studies/{accession_code}/roles",
    context_path = "/api/v2",
    tag = "roles",
    params(("accession_code" = String, Path, description = "Study accession code")),
    responses(
        (status = 200, description = "Role assignments", body = RoleListResponse),
        (status = 403, description = "Study not readable", body = ErrorResponse),
        (status = 404, description = "Study not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn list_study_roles(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(accession_code): Path<String>,
) -> Result<Json<RoleListResponse>> {
    list_roles(&state, &principal_of(&auth), ResourceKind::Study, &accession_code).await
}

/// Assign a role on a study
#[utoipa::path(
    post,
    path = "/studies/{accession_code}/roles",
    context_path = "/api/v2",
    tag = "roles",
    params(("accession_code" = String, Path, description = "Study accession code")),
    request_body = RoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = RoleEntry),
        (status = 403, description = "Caller cannot manage permissions", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn assign_study_role(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(accession_code): Path<String>,
    Json(request): Json<RoleRequest>,
) -> Result<Json<RoleEntry>> {
    assign_role(
        &state,
        &principal_of(&auth),
        ResourceKind::Study,
        &accession_code,
        request,
    )
    .await
}

/// Remove a user's role on a study
#[utoipa::path(
    delete,
    path = "/studies/{accession_code}/roles/{user_id}",
    context_path = "/api/v2",
    tag = "roles",
    params(
        ("accession_code" = String, Path, description = "Study accession code"),
        ("user_id" = Uuid, Path, description = "User ID"),
    ),
    responses(
        (status = 204, description = "Role removed"),
        (status = 400, description = "Last owner cannot be removed", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn remove_study_role(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path((accession_code, user_id)): Path<(String, Uuid)>,
) -> Result<StatusCode> {
    remove_role(
        &state,
        &principal_of(&auth),
        ResourceKind::Study,
        &accession_code,
        user_id,
    )
    .await
}

/// List users holding a role on a sample
#[utoipa::path(
    get,
    path = "/samples/{accession_code}/roles",
    context_path = "/api/v2",
    tag = "roles",
    params(("accession_code" = String, Path, description = "Sample accession code")),
    responses(
        (status = 200, description = "Role assignments", body = RoleListResponse),
        (status = 403, description = "Sample not readable", body = ErrorResponse),
        (status = 404, description = "Sample not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn list_sample_roles(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(accession_code): Path<String>,
) -> Result<Json<RoleListResponse>> {
    list_roles(&state, &principal_of(&auth), ResourceKind::Sample, &accession_code).await
}

/// Assign a role on a sample
#[utoipa::path(
    post,
    path = "/samples/{accession_code}/roles",
    context_path = "/api/v2",
    tag = "roles",
    params(("accession_code" = String, Path, description = "Sample accession code")),
    request_body = RoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = RoleEntry),
        (status = 403, description = "Caller cannot manage permissions", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn assign_sample_role(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path(accession_code): Path<String>,
    Json(request): Json<RoleRequest>,
) -> Result<Json<RoleEntry>> {
    assign_role(
        &state,
        &principal_of(&auth),
        ResourceKind::Sample,
        &accession_code,
        request,
    )
    .await
}

/// Remove a user's role on a sample
#[utoipa::path(
    delete,
    path = "/samples/{accession_code}/roles/{user_id}",
    context_path = "/api/v2",
    tag = "roles",
    params(
        ("accession_code" = String, Path, description = "Sample accession code"),
        ("user_id" = Uuid, Path, description = "User ID"),
    ),
    responses((status = 204, description = "Role removed")),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn remove_sample_role(
    State(state): State<SharedState>,
    Extension(auth): Extension<Option<AuthExtension>>,
    Path((accession_code, user_id)): Path<(String, Uuid)>,
) -> Result<StatusCode> {
    remove_role(
        &state,
        &principal_of(&auth),
        ResourceKind::Sample,
        &accession_code,
        user_id,
    )
    .await
}

#[derive(OpenApi)]
#[openapi(
    paths(
        list_investigation_roles,
        assign_investigation_role,
        remove_investigation_role,
        list_study_roles,
        assign_study_role,
        remove_study_role,
        list_sample_roles,
        assign_sample_role,
        remove_sample_role,
    ),
    components(schemas(RoleRequest, RoleListResponse, RoleEntry, AssignedRole))
)]
pub struct RolesApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_request_accepts_viewer_alias() {
        let req: RoleRequest =
            serde_json::from_str(r#"{"username": "authorized", "role": "viewer"}"#).unwrap();
        assert_eq!(req.role, AssignedRole::Authorized);
        assert!(req.user_id.is_none());
    }

    #[test]
    fn test_role_request_rejects_unknown_role() {
        let result: std::result::Result<RoleRequest, _> =
            serde_json::from_str(r#"{"username": "x", "role": "admin"}"#);
        assert!(result.is_err());
    }
}
