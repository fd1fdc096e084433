//! OpenAPI specification generated from handler annotations via utoipa.

use utoipa::openapi::security::{
    ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme,
};
use utoipa::{Modify, OpenApi};

/// Top-level OpenAPI document for the catalogue API.
///
/// Each handler module contributes its own paths and schemas via per-module
/// `#[derive(OpenApi)]` structs that are merged into this root document at
/// startup.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "ISA Catalogue API",
        description = "Metadata catalogue for investigations, studies and assays.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
    ),
    servers(
        (url = "/", description = "Current server"),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Login, JWT refresh and API tokens"),
        (name = "v1", description = "Nested routes, anonymous access allowed"),
        (name = "v2", description = "Flat routes with role holders and caller permissions"),
        (name = "v3", description = "Read-only listing"),
        (name = "roles", description = "Per-resource role assignments"),
        (name = "admin", description = "Users, tokens, samples and institutions"),
        (name = "health", description = "Health and readiness checks"),
    ),
    components(schemas(ErrorResponse))
)]
pub struct ApiDoc;

/// Standard error response body returned by all endpoints on failure.
#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g. "NOT_FOUND", "VALIDATION_ERROR")
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// Registers the JWT bearer scheme and the `Authorization: Token <key>` scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "token_auth",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "Authorization",
                    "API token as `Token <key>`",
                ))),
            );
        }
    }
}

/// Build the merged OpenAPI document from all handler modules.
pub fn build_openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    doc.merge(super::handlers::auth::AuthApiDoc::openapi());
    doc.merge(super::handlers::v1::V1ApiDoc::openapi());
    doc.merge(super::handlers::v2::V2ApiDoc::openapi());
    doc.merge(super::handlers::v3::V3ApiDoc::openapi());
    doc.merge(super::handlers::roles::RolesApiDoc::openapi());
    doc.merge(super::handlers::admin::AdminApiDoc::openapi());
    doc.merge(super::handlers::health::HealthApiDoc::openapi());

    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_is_valid() {
        let spec = build_openapi();

        assert_eq!(spec.info.title, "ISA Catalogue API");

        let path_count = spec.paths.paths.len();
        assert!(
            path_count >= 25,
            "Expected at least 25 paths, got {path_count}. A module merge may be missing."
        );

        let schemes = spec
            .components
            .as_ref()
            .map(|c| c.security_schemes.clone())
            .unwrap_or_default();
        assert!(schemes.contains_key("bearer_auth"), "Bearer auth scheme is missing.");
        assert!(schemes.contains_key("token_auth"), "Token auth scheme is missing.");

        let tags: Vec<&str> = spec
            .tags
            .as_ref()
            .map_or(vec![], |t| t.iter().map(|tag| tag.name.as_str()).collect());
        for expected_tag in ["auth", "v1", "v2", "v3", "roles", "admin", "health"] {
            assert!(
                tags.contains(&expected_tag),
                "Missing expected tag: {expected_tag}"
            );
        }
    }

    #[test]
    fn test_versioned_paths_registered() {
        let spec = build_openapi();
        let paths: Vec<&str> = spec.paths.paths.keys().map(|k| k.as_str()).collect();
        for expected in [
            "/api/v1/investigations",
            "/api/v1/investigations/{investigation}/studies/{study}",
            "/api/v1/token",
            "/api/v2/studies/{accession_code}",
            "/api/v2/investigations/{accession_code}/roles/{user_id}",
            "/api/v3/investigations",
            "/api/auth/login",
            "/api/admin/users/{id}/token",
            "/api/admin/samples/{accession_code}",
            "/api/admin/institutions/{id}",
            "/api/admin/investigations/{accession_code}/institutions",
            "/api/v2/samples/{accession_code}/roles",
            "/api/v2/export/isa/{code}",
            "/health",
        ] {
            assert!(paths.contains(&expected), "Missing path {expected}");
        }

        let v2_study = &spec.paths.paths["/api/v2/studies/{accession_code}"];
        assert!(v2_study.get.is_some());
        assert!(v2_study.put.is_some());
        assert!(v2_study.patch.is_some());
        assert!(v2_study.delete.is_some());
    }

    #[test]
    fn test_spec_serializes() {
        let json = serde_json::to_string(&build_openapi()).expect("Spec should serialize to JSON");
        assert!(json.contains("\"ISA Catalogue API\""));
    }
}
