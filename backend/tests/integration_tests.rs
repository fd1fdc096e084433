//! Integration tests against a running catalogue server.
//!
//! The server must have been seeded with `isa-catalogue seed-testdata`.
//! Set TEST_BASE_URL to the server URL and TEST_SEED_PASSWORD if the seed
//! used a non-default password.
//!
//! Example:
//! ```sh
//! export TEST_BASE_URL="http://127.0.0.1:8080"
//! cargo test --test integration_tests -- --ignored
//! ```
//!
//! Note: These tests are marked with #[ignore] because they require
//! a running HTTP server. In CI, run them separately with a service container.

use std::env;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

/// Test server configuration
struct TestServer {
    base_url: String,
    client: Client,
}

impl TestServer {
    fn new() -> Self {
        Self {
            base_url: env::var("TEST_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".into()),
            client: Client::new(),
        }
    }

    fn password() -> String {
        env::var("TEST_SEED_PASSWORD").unwrap_or_else(|_| "userpass123".into())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// API token for a seeded user, via the v1 token endpoint.
    async fn token(&self, username: &str) -> Result<String, Box<dyn std::error::Error>> {
        let resp = self
            .client
            .post(self.url("/api/v1/token"))
            .json(&json!({ "username": username, "password": Self::password() }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(format!("Token request for {} failed: {}", username, resp.status()).into());
        }
        let body: Value = resp.json().await?;
        Ok(body["token"].as_str().ok_or("No token")?.to_string())
    }

    async fn get(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<(StatusCode, Value), Box<dyn std::error::Error>> {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.header("Authorization", format!("Token {}", token));
        }
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.json().await.unwrap_or(Value::Null);
        Ok((status, body))
    }
}

fn codes(body: &Value) -> Vec<String> {
    body["results"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["accession_code"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
#[ignore]
async fn test_health_and_ready() {
    let server = TestServer::new();
    let (status, body) = server.get("/health", None).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = server.get("/ready", None).await.unwrap();
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
#[ignore]
async fn test_schema_document() {
    let server = TestServer::new();
    let (status, body) = server.get("/schema", None).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["info"]["title"], "ISA Catalogue API");
}

#[tokio::test]
#[ignore]
async fn test_anonymous_listing_is_public_only() {
    let server = TestServer::new();
    let (status, body) = server.get("/api/v1/investigations", None).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    for item in body["results"].as_array().unwrap() {
        assert_eq!(item["security_level"], "public");
    }
}

#[tokio::test]
#[ignore]
async fn test_seeded_users_see_their_levels() {
    let server = TestServer::new();

    let guest = server.token("guest").await.unwrap();
    let (_, body) = server.get("/api/v2/investigations", Some(&guest)).await.unwrap();
    let guest_count = codes(&body).len();

    let internal = server.token("internal").await.unwrap();
    let (_, body) = server.get("/api/v2/investigations", Some(&internal)).await.unwrap();
    let internal_count = codes(&body).len();

    let superuser = server.token("superuser").await.unwrap();
    let (_, body) = server.get("/api/v2/investigations", Some(&superuser)).await.unwrap();
    let all_count = codes(&body).len();

    assert!(guest_count < internal_count);
    assert!(internal_count < all_count);
}

#[tokio::test]
#[ignore]
async fn test_direct_accession_access() {
    let server = TestServer::new();
    let token = server.token("superuser").await.unwrap();
    let (_, body) = server.get("/api/v2/studies", Some(&token)).await.unwrap();
    let study = codes(&body).into_iter().next().expect("seeded study");

    let (status, body) = server
        .get(&format!("/api/v2/{}", study), Some(&token))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accession_code"], study.as_str());

    let (status, _) = server.get("/api/v1/CXRZ1", None).await.unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore]
async fn test_v2_rejects_anonymous() {
    let server = TestServer::new();
    let (status, body) = server.get("/api/v2/assays", None).await.unwrap();
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTH_ERROR");
}

#[tokio::test]
#[ignore]
async fn test_catalogue_page_renders() {
    let server = TestServer::new();
    let resp = server
        .client
        .get(server.url("/api/v3/catalogue"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let html = resp.text().await.unwrap();
    assert!(html.contains("<h1>Investigations</h1>"));
}
