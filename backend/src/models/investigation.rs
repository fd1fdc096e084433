//! Investigation model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::choices::WorkPackage;
use super::security_level::SecurityLevel;
use super::{check_email, check_title};
use crate::error::Result;

/// Top-level project grouping one or more studies.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Investigation {
    pub id: i64,
    pub accession_code: String,
    pub title: String,
    pub description: Option<String>,
    pub work_package: Option<WorkPackage>,
    pub notes: Option<String>,
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

/// Writable investigation fields, used for both create and full replace.
#[derive(Debug, Clone, Default)]
pub struct InvestigationInput {
    pub title: String,
    pub description: Option<String>,
    pub work_package: Option<WorkPackage>,
    pub notes: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub submission_date: Option<NaiveDate>,
    pub public_release_date: Option<NaiveDate>,
    pub principal_investigator_name: Option<String>,
    pub principal_investigator_email: Option<String>,
    pub security_level: SecurityLevel,
}

impl InvestigationInput {
    pub fn validate(&self) -> Result<()> {
        check_title("title", &self.title, 1000)?;
        if let Some(email) = &self.principal_investigator_email {
            check_email("principal_investigator_email", email)?;
        }
        Ok(())
    }
}

impl From<&Investigation> for InvestigationInput {
    fn from(inv: &Investigation) -> Self {
        Self {
            title: inv.title.clone(),
            description: inv.description.clone(),
            work_package: inv.work_package,
            notes: inv.notes.clone(),
            start_date: inv.start_date,
            end_date: inv.end_date,
            submission_date: inv.submission_date,
            public_release_date: inv.public_release_date,
            principal_investigator_name: inv.principal_investigator_name.clone(),
            principal_investigator_email: inv.principal_investigator_email.clone(),
            security_level: inv.security_level,
        }
    }
}

/// Investigation list filter
#[derive(Debug, Clone, Default)]
pub struct InvestigationFilter {
    /// Case-insensitive substring of the title
    pub title: Option<String>,
    pub security_level: Option<SecurityLevel>,
    pub work_package: Option<WorkPackage>,
}

impl InvestigationFilter {
    pub fn matches(&self, inv: &Investigation) -> bool {
        if let Some(title) = &self.title {
            if !inv.title.to_lowercase().contains(&title.to_lowercase()) {
                return false;
            }
        }
        if self.security_level.is_some_and(|level| level != inv.security_level) {
            return false;
        }
        if self.work_package.is_some() && self.work_package != inv.work_package {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(level: SecurityLevel) -> Investigation {
        Investigation {
            id: 1,
            accession_code: "CXRP1".into(),
            title: "Drought tolerance in barley".into(),
            description: None,
            work_package: Some(WorkPackage::WPC2),
            notes: None,
            start_date: None,
            end_date: None,
            submission_date: None,
            public_release_date: None,
            principal_investigator_name: None,
            principal_investigator_email: None,
            security_level: level,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_validate_requires_title() {
        let input = InvestigationInput::default();
        assert!(input.validate().is_err());

        let input = InvestigationInput {
            title: "Soil microbiome".into(),
            ..Default::default()
        };
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_email() {
        let input = InvestigationInput {
            title: "Soil microbiome".into(),
            principal_investigator_email: Some("not-an-email".into()),
            ..Default::default()
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_filter_title_case_insensitive() {
        let inv = sample(SecurityLevel::Public);
        let filter = InvestigationFilter {
            title: Some("BARLEY".into()),
            ..Default::default()
        };
        assert!(filter.matches(&inv));

        let filter = InvestigationFilter {
            title: Some("wheat".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&inv));
    }

    #[test]
    fn test_filter_security_level_and_work_package() {
        let inv = sample(SecurityLevel::Internal);
        let filter = InvestigationFilter {
            security_level: Some(SecurityLevel::Internal),
            work_package: Some(WorkPackage::WPC2),
            ..Default::default()
        };
        assert!(filter.matches(&inv));

        let filter = InvestigationFilter {
            work_package: Some(WorkPackage::S1),
            ..Default::default()
        };
        assert!(!filter.matches(&inv));
    }

    #[test]
    fn test_input_round_trips_from_record() {
        let inv = sample(SecurityLevel::Restricted);
        let input = InvestigationInput::from(&inv);
        assert_eq!(input.title, inv.title);
        assert_eq!(input.security_level, SecurityLevel::Restricted);
        assert_eq!(input.work_package, Some(WorkPackage::WPC2));
    }
}
