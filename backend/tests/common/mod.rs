//! Common test utilities for backend API tests
//!
//! This module provides shared infrastructure for testing:
//! - A full router over the in-memory catalogue store
//! - Account and API token helpers
//! - Request helpers returning status and JSON body

#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use isa_catalogue_backend::api::{routes::create_router, AppState};
use isa_catalogue_backend::config::Config;
use isa_catalogue_backend::models::user::{NewUser, User};
use isa_catalogue_backend::services::token_service::TokenService;
use isa_catalogue_backend::storage::{CatalogueStore, MemoryStore};

pub const TEST_PASSWORD: &str = "password123";
const TEST_SECRET: &str = "integration-test-secret";

/// Router plus direct access to the store behind it
pub struct TestApp {
    pub router: Router,
    pub store: Arc<dyn CatalogueStore>,
}

impl TestApp {
    pub fn new() -> Self {
        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        let state = Arc::new(AppState::new(
            Config::for_memory_store(TEST_SECRET),
            store.clone(),
        ));
        Self {
            router: create_router(state),
            store,
        }
    }

    /// Create an account whose password is [`TEST_PASSWORD`].
    pub async fn create_user(&self, username: &str, is_staff: bool, is_superuser: bool) -> User {
        self.store
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{}@test.local", username),
                first_name: String::new(),
                last_name: String::new(),
                // Low cost keeps the suite fast
                password_hash: bcrypt::hash(TEST_PASSWORD, 4).unwrap(),
                is_staff,
                is_superuser,
            })
            .await
            .unwrap()
    }

    /// The user's API token key.
    pub async fn token_for(&self, user: &User) -> String {
        TokenService::new(self.store.clone())
            .get_or_create(user.id)
            .await
            .unwrap()
            .token
            .key
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Token {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PATCH, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, token, None).await
    }
}

/// Accession codes from a list response's `results`.
pub fn accession_codes(body: &Value) -> Vec<String> {
    body["results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .filter_map(|r| r["accession_code"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
