//! Assay model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::check_title;
use super::choices::{MeasurementType, TechnologyPlatform};
use crate::error::Result;

/// A single measurement run within a study. Visibility follows the study.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Assay {
    pub id: i64,
    pub accession_code: String,
    pub study_id: i64,
    pub title: String,
    pub description: String,
    pub measurement_type: MeasurementType,
    pub technology_platform: TechnologyPlatform,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AssayInput {
    pub study_id: i64,
    pub title: String,
    pub description: String,
    pub measurement_type: MeasurementType,
    pub technology_platform: TechnologyPlatform,
}

impl AssayInput {
    pub fn validate(&self) -> Result<()> {
        check_title("title", &self.title, 1000)
    }
}

impl From<&Assay> for AssayInput {
    fn from(assay: &Assay) -> Self {
        Self {
            study_id: assay.study_id,
            title: assay.title.clone(),
            description: assay.description.clone(),
            measurement_type: assay.measurement_type,
            technology_platform: assay.technology_platform,
        }
    }
}

/// Assay list filter
#[derive(Debug, Clone, Default)]
pub struct AssayFilter {
    pub study_id: Option<i64>,
    /// Matches assays whose study belongs to this investigation
    pub investigation_id: Option<i64>,
    pub title: Option<String>,
    pub measurement_type: Option<MeasurementType>,
    pub technology_platform: Option<TechnologyPlatform>,
}

impl AssayFilter {
    pub fn for_study(study_id: i64) -> Self {
        Self {
            study_id: Some(study_id),
            ..Default::default()
        }
    }

    /// `investigation_id` is the investigation owning the assay's study.
    pub fn matches(&self, assay: &Assay, investigation_id: i64) -> bool {
        if self.study_id.is_some_and(|id| id != assay.study_id) {
            return false;
        }
        if self.investigation_id.is_some_and(|id| id != investigation_id) {
            return false;
        }
        if let Some(title) = &self.title {
            if !assay.title.to_lowercase().contains(&title.to_lowercase()) {
                return false;
            }
        }
        if self.measurement_type.is_some_and(|m| m != assay.measurement_type) {
            return false;
        }
        if self.technology_platform.is_some_and(|t| t != assay.technology_platform) {
            return false;
        }
        true
    }
}
