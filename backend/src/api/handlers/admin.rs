//! Admin handlers: user accounts, API tokens, samples, institutions and
//! investigation participation.
//!
//! Mounted behind the superuser-only middleware.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use super::payloads::{InstitutionPayload, ParticipationPayload, SamplePayload};
use super::v2::{sample_v2, SampleV2, SampleV2ListResponse};
use crate::api::dto::{Pagination, PaginationQuery, UserResponse};
use crate::api::middleware::auth::AuthExtension;
use crate::api::openapi::ErrorResponse;
use crate::api::SharedState;
use crate::error::Result;
use crate::models::institution::{Institution, InvestigationInstitution};
use crate::models::sample::SampleFilter;
use crate::models::security_level::SecurityLevel;
use crate::services::institution_service::InstitutionService;
use crate::services::sample_service::SampleService;
use crate::services::token_service::{TokenInfo, TokenService};
use crate::services::user_service::{CreateUser, UpdateUser, UserService};

/// Create admin routes
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/users/:id/token", post(issue_user_token))
        .route("/tokens", get(list_tokens))
        .route("/samples", get(list_samples).post(create_sample))
        .route(
            "/samples/:accession_code",
            get(get_sample).patch(update_sample).delete(delete_sample),
        )
        .route("/institutions", get(list_institutions).post(create_institution))
        .route(
            "/institutions/:id",
            get(get_institution)
                .patch(update_institution)
                .delete(delete_institution),
        )
        .route(
            "/investigations/:accession_code/institutions",
            get(list_participants).post(add_participant),
        )
        .route(
            "/investigations/:accession_code/institutions/:institution_id",
            delete(remove_participant),
        )
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListUsersQuery {
    /// Matches username, email or names
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(default)]
    pub email: String,
    /// Without a password the account can only use API tokens
    pub password: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

redacted_debug!(CreateUserRequest {
    show username,
    show email,
    redact_option password,
    show is_staff,
    show is_superuser,
});

impl From<CreateUserRequest> for CreateUser {
    fn from(req: CreateUserRequest) -> Self {
        Self {
            username: req.username,
            email: req.email,
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
            is_staff: req.is_staff,
            is_superuser: req.is_superuser,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
}

redacted_debug!(UpdateUserRequest {
    show email,
    redact_option password,
    show is_active,
    show is_staff,
    show is_superuser,
});

impl From<UpdateUserRequest> for UpdateUser {
    fn from(req: UpdateUserRequest) -> Self {
        Self {
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            password: req.password,
            is_active: req.is_active,
            is_staff: req.is_staff,
            is_superuser: req.is_superuser,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub results: Vec<UserResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct IssueTokenRequest {
    /// Replace an existing token with a new key
    #[serde(default)]
    pub regenerate: bool,
}

#[derive(Serialize, ToSchema)]
pub struct IssuedTokenResponse {
    pub token: String,
    /// False when the existing token was returned
    pub created: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenListResponse {
    pub results: Vec<TokenInfo>,
}

/// List users
#[utoipa::path(
    get,
    path = "/users",
    context_path = "/api/admin",
    tag = "admin",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Users", body = UserListResponse),
        (status = 403, description = "Superuser required", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn list_users(
    State(state): State<SharedState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<UserListResponse>> {
    let pages = PaginationQuery::new(query.page, query.per_page);
    let search = query.search.as_deref().filter(|s| !s.trim().is_empty());
    let page = UserService::new(state.store.clone())
        .list(search, pages.page(), pages.per_page())
        .await?;
    Ok(Json(UserListResponse {
        pagination: Pagination::from_query_and_total(&pages, page.total),
        results: page.users.into_iter().map(UserResponse::from).collect(),
    }))
}

/// Create a user
#[utoipa::path(
    post,
    path = "/users",
    context_path = "/api/admin",
    tag = "admin",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid username or email", body = ErrorResponse),
        (status = 409, description = "Username taken", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn create_user(
    State(state): State<SharedState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    let user = UserService::new(state.store.clone())
        .create(payload.into())
        .await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Get a user
#[utoipa::path(
    get,
    path = "/users/{id}",
    context_path = "/api/admin",
    tag = "admin",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn get_user(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>> {
    let user = UserService::new(state.store.clone()).get(id).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Update a user
#[utoipa::path(
    patch,
    path = "/users/{id}",
    context_path = "/api/admin",
    tag = "admin",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn update_user(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>> {
    let user = UserService::new(state.store.clone())
        .update(id, payload.into())
        .await?;
    Ok(Json(UserResponse::from(user)))
}

/// Delete a user
#[utoipa::path(
    delete,
    path = "/users/{id}",
    context_path = "/api/admin",
    tag = "admin",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Cannot delete own account", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn delete_user(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    UserService::new(state.store.clone())
        .delete(auth.user_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Issue or regenerate a user's API token
#[utoipa::path(
    post,
    path = "/users/{id}/token",
    context_path = "/api/admin",
    tag = "admin",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = IssueTokenRequest,
    responses(
        (status = 200, description = "The user's token", body = IssuedTokenResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn issue_user_token(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    payload: Option<Json<IssueTokenRequest>>,
) -> Result<Json<IssuedTokenResponse>> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let user = UserService::new(state.store.clone()).get(id).await?;
    let tokens = TokenService::new(state.store.clone());
    let issued = if request.regenerate {
        tokens.regenerate(user.id).await?
    } else {
        tokens.get_or_create(user.id).await?
    };
    Ok(Json(IssuedTokenResponse {
        token: issued.token.key,
        created: issued.created,
    }))
}

/// List API tokens with masked keys
#[utoipa::path(
    get,
    path = "/tokens",
    context_path = "/api/admin",
    tag = "admin",
    responses((status = 200, description = "Tokens", body = TokenListResponse)),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn list_tokens(State(state): State<SharedState>) -> Result<Json<TokenListResponse>> {
    let results = TokenService::new(state.store.clone()).list(false).await?;
    Ok(Json(TokenListResponse { results }))
}

// ---- samples ----

#[derive(Debug, Deserialize, IntoParams)]
pub struct AdminSampleQuery {
    /// Case-insensitive substring of the name
    pub name: Option<String>,
    pub sample_type: Option<String>,
    pub security_level: Option<SecurityLevel>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// List all samples
#[utoipa::path(
    get,
    path = "/samples",
    context_path = "/api/admin",
    tag = "admin",
    params(AdminSampleQuery),
    responses((status = 200, description = "Samples", body = SampleV2ListResponse)),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn list_samples(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Query(query): Query<AdminSampleQuery>,
) -> Result<Json<SampleV2ListResponse>> {
    let filter = SampleFilter {
        name: query.name,
        sample_type: query.sample_type,
        security_level: query.security_level,
    };
    let views = SampleService::new(state.store.clone())
        .list(&auth.principal(), &filter)
        .await?;
    let (views, pagination) = PaginationQuery::new(query.page, query.per_page).paginate(views);
    let mut results = Vec::with_capacity(views.len());
    for view in views {
        results.push(sample_v2(&state, view).await?);
    }
    Ok(Json(SampleV2ListResponse {
        results,
        pagination,
    }))
}

/// Register a sample owned by the calling admin
#[utoipa::path(
    post,
    path = "/samples",
    context_path = "/api/admin",
    tag = "admin",
    request_body = SamplePayload,
    responses(
        (status = 201, description = "Sample registered", body = SampleV2),
        (status = 400, description = "Missing or invalid sample_type", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn create_sample(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Json(payload): Json<SamplePayload>,
) -> Result<(StatusCode, Json<SampleV2>)> {
    let view = SampleService::new(state.store.clone())
        .create(&auth.principal(), payload.into_input()?)
        .await?;
    Ok((StatusCode::CREATED, Json(sample_v2(&state, view).await?)))
}

/// Get a sample
#[utoipa::path(
    get,
    path = "/samples/{accession_code}",
    context_path = "/api/admin",
    tag = "admin",
    params(("accession_code" = String, Path, description = "Sample accession code")),
    responses(
        (status = 200, description = "Sample", body = SampleV2),
        (status = 404, description = "Sample not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn get_sample(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(code): Path<String>,
) -> Result<Json<SampleV2>> {
    let view = SampleService::new(state.store.clone())
        .get(&auth.principal(), &code)
        .await?;
    Ok(Json(sample_v2(&state, view).await?))
}

/// Update a sample
#[utoipa::path(
    patch,
    path = "/samples/{accession_code}",
    context_path = "/api/admin",
    tag = "admin",
    params(("accession_code" = String, Path, description = "Sample accession code")),
    request_body = SamplePayload,
    responses((status = 200, description = "Sample updated", body = SampleV2)),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn update_sample(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(code): Path<String>,
    Json(payload): Json<SamplePayload>,
) -> Result<Json<SampleV2>> {
    let view = SampleService::new(state.store.clone())
        .update(&auth.principal(), &code, |current| Ok(payload.merge_into(current)))
        .await?;
    Ok(Json(sample_v2(&state, view).await?))
}

/// Delete a sample
#[utoipa::path(
    delete,
    path = "/samples/{accession_code}",
    context_path = "/api/admin",
    tag = "admin",
    params(("accession_code" = String, Path, description = "Sample accession code")),
    responses((status = 204, description = "Sample deleted")),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn delete_sample(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(code): Path<String>,
) -> Result<StatusCode> {
    SampleService::new(state.store.clone())
        .delete(&auth.principal(), &code)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- institutions ----

#[derive(Debug, Deserialize, IntoParams)]
pub struct InstitutionQuery {
    /// Matches the institution name
    pub search: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InstitutionListResponse {
    pub results: Vec<Institution>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantListResponse {
    pub results: Vec<InvestigationInstitution>,
}

/// List institutions
#[utoipa::path(
    get,
    path = "/institutions",
    context_path = "/api/admin",
    tag = "admin",
    params(InstitutionQuery),
    responses((status = 200, description = "Institutions by name", body = InstitutionListResponse)),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn list_institutions(
    State(state): State<SharedState>,
    Query(query): Query<InstitutionQuery>,
) -> Result<Json<InstitutionListResponse>> {
    let search = query.search.as_deref().filter(|s| !s.trim().is_empty());
    let results = InstitutionService::new(state.store.clone())
        .list(search)
        .await?;
    Ok(Json(InstitutionListResponse { results }))
}

/// Create an institution
#[utoipa::path(
    post,
    path = "/institutions",
    context_path = "/api/admin",
    tag = "admin",
    request_body = InstitutionPayload,
    responses(
        (status = 201, description = "Institution created", body = Institution),
        (status = 400, description = "Invalid fields", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn create_institution(
    State(state): State<SharedState>,
    Json(payload): Json<InstitutionPayload>,
) -> Result<(StatusCode, Json<Institution>)> {
    let institution = InstitutionService::new(state.store.clone())
        .create(payload.into_input()?)
        .await?;
    Ok((StatusCode::CREATED, Json(institution)))
}

/// Get an institution
#[utoipa::path(
    get,
    path = "/institutions/{id}",
    context_path = "/api/admin",
    tag = "admin",
    params(("id" = i64, Path, description = "Institution ID")),
    responses(
        (status = 200, description = "Institution", body = Institution),
        (status = 404, description = "Institution not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn get_institution(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Institution>> {
    let institution = InstitutionService::new(state.store.clone()).get(id).await?;
    Ok(Json(institution))
}

/// Update an institution
#[utoipa::path(
    patch,
    path = "/institutions/{id}",
    context_path = "/api/admin",
    tag = "admin",
    params(("id" = i64, Path, description = "Institution ID")),
    request_body = InstitutionPayload,
    responses((status = 200, description = "Institution updated", body = Institution)),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn update_institution(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(payload): Json<InstitutionPayload>,
) -> Result<Json<Institution>> {
    let institution = InstitutionService::new(state.store.clone())
        .update(id, |current| Ok(payload.merge_into(current)))
        .await?;
    Ok(Json(institution))
}

/// Delete an institution and its participations
#[utoipa::path(
    delete,
    path = "/institutions/{id}",
    context_path = "/api/admin",
    tag = "admin",
    params(("id" = i64, Path, description = "Institution ID")),
    responses((status = 204, description = "Institution deleted")),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn delete_institution(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    InstitutionService::new(state.store.clone()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Institutions taking part in an investigation
#[utoipa::path(
    get,
    path = "/investigations/{accession_code}/institutions",
    context_path = "/api/admin",
    tag = "admin",
    params(("accession_code" = String, Path, description = "Investigation accession code")),
    responses(
        (status = 200, description = "Participants by join date", body = ParticipantListResponse),
        (status = 404, description = "Investigation not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn list_participants(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<ParticipantListResponse>> {
    let results = InstitutionService::new(state.store.clone())
        .participants(&code)
        .await?;
    Ok(Json(ParticipantListResponse { results }))
}

/// Add an institution to an investigation
#[utoipa::path(
    post,
    path = "/investigations/{accession_code}/institutions",
    context_path = "/api/admin",
    tag = "admin",
    params(("accession_code" = String, Path, description = "Investigation accession code")),
    request_body = ParticipationPayload,
    responses(
        (status = 201, description = "Institution added", body = InvestigationInstitution),
        (status = 400, description = "Invalid contribution amount", body = ErrorResponse),
        (status = 409, description = "Institution already takes part", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn add_participant(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<ParticipationPayload>,
) -> Result<(StatusCode, Json<InvestigationInstitution>)> {
    let joined = InstitutionService::new(state.store.clone())
        .join(&code, payload.into())
        .await?;
    Ok((StatusCode::CREATED, Json(joined)))
}

/// Remove an institution from an investigation
#[utoipa::path(
    delete,
    path = "/investigations/{accession_code}/institutions/{institution_id}",
    context_path = "/api/admin",
    tag = "admin",
    params(
        ("accession_code" = String, Path, description = "Investigation accession code"),
        ("institution_id" = i64, Path, description = "Institution ID"),
    ),
    responses((status = 204, description = "Institution removed")),
    security(("bearer_auth" = []), ("token_auth" = []))
)]
pub async fn remove_participant(
    State(state): State<SharedState>,
    Path((code, institution_id)): Path<(String, i64)>,
) -> Result<StatusCode> {
    InstitutionService::new(state.store.clone())
        .leave(&code, institution_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        list_users,
        create_user,
        get_user,
        update_user,
        delete_user,
        issue_user_token,
        list_tokens,
        list_samples,
        create_sample,
        get_sample,
        update_sample,
        delete_sample,
        list_institutions,
        create_institution,
        get_institution,
        update_institution,
        delete_institution,
        list_participants,
        add_participant,
        remove_participant,
    ),
    components(schemas(
        CreateUserRequest,
        UpdateUserRequest,
        UserListResponse,
        IssueTokenRequest,
        IssuedTokenResponse,
        TokenListResponse,
        TokenInfo,
        SamplePayload,
        InstitutionPayload,
        ParticipationPayload,
        Institution,
        InvestigationInstitution,
        InstitutionListResponse,
        ParticipantListResponse,
    ))
)]
pub struct AdminApiDoc;
