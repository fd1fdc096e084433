//! Sample model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::check_title;
use super::security_level::SecurityLevel;
use crate::error::{AppError, Result};

/// Physical or biological material registered in the catalogue.
///
/// Samples stand on their own: they have no parent record and carry their
/// own security level and role assignments.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Sample {
    pub id: i64,
    pub accession_code: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub sample_type: String,
    pub security_level: SecurityLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sample {
    /// Name if set, otherwise the accession code.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.accession_code)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SampleInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sample_type: String,
    pub security_level: SecurityLevel,
}

impl SampleInput {
    pub fn validate(&self) -> Result<()> {
        check_title("sample_type", &self.sample_type, 50)?;
        if let Some(name) = &self.name {
            if name.chars().count() > 255 {
                return Err(AppError::Validation(
                    "name must be at most 255 characters".into(),
                ));
            }
        }
        Ok(())
    }
}

impl From<&Sample> for SampleInput {
    fn from(sample: &Sample) -> Self {
        Self {
            name: sample.name.clone(),
            description: sample.description.clone(),
            sample_type: sample.sample_type.clone(),
            security_level: sample.security_level,
        }
    }
}

/// Sample list filter
#[derive(Debug, Clone, Default)]
pub struct SampleFilter {
    /// Case-insensitive substring of the name
    pub name: Option<String>,
    /// Exact sample type
    pub sample_type: Option<String>,
    pub security_level: Option<SecurityLevel>,
}

impl SampleFilter {
    pub fn matches(&self, sample: &Sample) -> bool {
        if let Some(name) = &self.name {
            let needle = name.to_lowercase();
            let hit = sample
                .name
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if self
            .sample_type
            .as_deref()
            .is_some_and(|t| t != sample.sample_type)
        {
            return false;
        }
        if self.security_level.is_some_and(|level| level != sample.security_level) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Sample {
        Sample {
            id: 4,
            accession_code: "CXRX4".into(),
            name: Some("Root tissue, plot 7".into()),
            description: None,
            sample_type: "tissue".into(),
            security_level: SecurityLevel::Confidential,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_default_level_is_confidential() {
        assert_eq!(SampleInput::default().security_level, SecurityLevel::Confidential);
    }

    #[test]
    fn test_sample_type_limits() {
        let mut input = SampleInput::from(&sample());
        assert!(input.validate().is_ok());
        input.sample_type = "x".repeat(51);
        assert!(input.validate().is_err());
        input.sample_type = " ".into();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_filter() {
        let s = sample();
        let filter = SampleFilter {
            name: Some("ROOT".into()),
            sample_type: Some("tissue".into()),
            ..Default::default()
        };
        assert!(filter.matches(&s));

        let filter = SampleFilter {
            sample_type: Some("soil".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&s));
    }

    #[test]
    fn test_label_falls_back_to_accession() {
        let mut s = sample();
        assert_eq!(s.label(), "Root tissue, plot 7");
        s.name = None;
        assert_eq!(s.label(), "CXRX4");
    }
}
