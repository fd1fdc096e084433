//! Study model.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;
use sqlx::FromRow;

use super::investigation::Investigation;
use super::security_level::SecurityLevel;
use super::{check_email, check_title};
use crate::error::{AppError, Result};

static SLUG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_-]+$").expect("slug pattern is valid")
});

const SLUG_MAX_LEN: usize = 100;

/// A study within an investigation.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Study {
    pub id: i64,
    pub accession_code: String,
    pub investigation_id: i64,
    pub title: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub study_design: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub submission_date: Option<NaiveDate>,
    pub public_release_date: Option<NaiveDate>,
    pub principal_investigator_name: Option<String>,
    pub principal_investigator_email: Option<String>,
    pub security_level: SecurityLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Study values with unset fields inherited from the parent investigation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveStudyFields {
    pub principal_investigator_name: Option<String>,
    pub principal_investigator_email: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub submission_date: Option<NaiveDate>,
    pub public_release_date: Option<NaiveDate>,
}

impl Study {
    /// Directory name used when exporting the study:
    /// `i_{work_package}_{investigation}/s_{investigation}-{study}[__{slug}]`.
    pub fn folder_name(&self, investigation: &Investigation) -> String {
        let work_package = investigation
            .work_package
            .map(|wp| wp.as_str())
            .unwrap_or("None");
        let mut name = format!(
            "i_{}_{}/s_{}-{}",
            work_package,
            investigation.accession_code,
            investigation.accession_code,
            self.accession_code
        );
        if let Some(slug) = self.slug.as_deref().filter(|s| !s.is_empty()) {
            name.push_str("__");
            name.push_str(slug);
        }
        name
    }

    pub fn effective_fields(&self, investigation: &Investigation) -> EffectiveStudyFields {
        EffectiveStudyFields {
            principal_investigator_name: self
                .principal_investigator_name
                .clone()
                .or_else(|| investigation.principal_investigator_name.clone()),
            principal_investigator_email: self
                .principal_investigator_email
                .clone()
                .or_else(|| investigation.principal_investigator_email.clone()),
            start_date: self.start_date.or(investigation.start_date),
            end_date: self.end_date.or(investigation.end_date),
            submission_date: self.submission_date.or(investigation.submission_date),
            public_release_date: self.public_release_date.or(investigation.public_release_date),
        }
    }
}

/// Writable study fields, used for both create and full replace.
#[derive(Debug, Clone, Default)]
pub struct StudyInput {
    pub investigation_id: i64,
    pub title: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub study_design: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub submission_date: Option<NaiveDate>,
    pub public_release_date: Option<NaiveDate>,
    pub principal_investigator_name: Option<String>,
    pub principal_investigator_email: Option<String>,
    pub security_level: SecurityLevel,
}

impl StudyInput {
    pub fn validate(&self) -> Result<()> {
        check_title("title", &self.title, 255)?;
        if let Some(slug) = self.slug.as_deref().filter(|s| !s.is_empty()) {
            validate_slug(slug)?;
        }
        if let Some(email) = &self.principal_investigator_email {
            check_email("principal_investigator_email", email)?;
        }
        Ok(())
    }
}

impl From<&Study> for StudyInput {
    fn from(study: &Study) -> Self {
        Self {
            investigation_id: study.investigation_id,
            title: study.title.clone(),
            slug: study.slug.clone(),
            description: study.description.clone(),
            notes: study.notes.clone(),
            study_design: study.study_design.clone(),
            start_date: study.start_date,
            end_date: study.end_date,
            submission_date: study.submission_date,
            public_release_date: study.public_release_date,
            principal_investigator_name: study.principal_investigator_name.clone(),
            principal_investigator_email: study.principal_investigator_email.clone(),
            security_level: study.security_level,
        }
    }
}

pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.len() > SLUG_MAX_LEN {
        return Err(AppError::Validation(format!(
            "slug must be at most {} characters",
            SLUG_MAX_LEN
        )));
    }
    if !SLUG_RE.is_match(slug) {
        return Err(AppError::Validation(
            "Slug label must contain only alphanumeric characters, underscores, and hyphens"
                .to_string(),
        ));
    }
    Ok(())
}

/// Study list filter
#[derive(Debug, Clone, Default)]
pub struct StudyFilter {
    pub investigation_id: Option<i64>,
    /// Case-insensitive substring of the title
    pub title: Option<String>,
    /// Case-insensitive substring of the description
    pub description: Option<String>,
    pub security_level: Option<SecurityLevel>,
}

impl StudyFilter {
    pub fn for_investigation(investigation_id: i64) -> Self {
        Self {
            investigation_id: Some(investigation_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, study: &Study) -> bool {
        if self.investigation_id.is_some_and(|id| id != study.investigation_id) {
            return false;
        }
        if let Some(title) = &self.title {
            if !study.title.to_lowercase().contains(&title.to_lowercase()) {
                return false;
            }
        }
        if let Some(needle) = &self.description {
            let haystack = study.description.as_deref().unwrap_or_default().to_lowercase();
            if !haystack.contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if self.security_level.is_some_and(|level| level != study.security_level) {
            return false;
        }
        true
    }
}
