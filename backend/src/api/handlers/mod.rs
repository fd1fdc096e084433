//! HTTP request handlers.

pub mod admin;
pub mod auth;
pub mod health;
pub mod payloads;
pub mod roles;
pub mod v1;
pub mod v2;
pub mod v3;
