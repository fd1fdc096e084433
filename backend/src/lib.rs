//! ISA Catalogue - Backend Library
//!
//! Metadata catalogue of investigations, studies and assays with
//! security-level and per-resource role based access control.

#[macro_use]
mod macros;

pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, Result};
