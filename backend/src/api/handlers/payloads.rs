//! Request bodies shared by the catalogue API versions.
//!
//! The same body type serves create, full replace (`PUT`) and partial update
//! (`PATCH`). Create and replace build a fresh input where absent fields are
//! empty; partial update starts from the stored record and only overwrites
//! fields that are present.

use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::{AppError, Result};
use crate::models::assay::{Assay, AssayInput};
use crate::models::choices::{MeasurementType, TechnologyPlatform, WorkPackage};
use crate::models::institution::{Institution, InstitutionInput, InstitutionLink};
use crate::models::investigation::{Investigation, InvestigationInput};
use crate::models::sample::{Sample, SampleInput};
use crate::models::security_level::SecurityLevel;
use crate::models::study::{Study, StudyInput};

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| AppError::Validation(format!("{} is required", field)))
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct InvestigationPayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub work_package: Option<WorkPackage>,
    pub notes: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub submission_date: Option<NaiveDate>,
    pub public_release_date: Option<NaiveDate>,
    pub principal_investigator_name: Option<String>,
    pub principal_investigator_email: Option<String>,
    /// Defaults to `confidential`
    pub security_level: Option<SecurityLevel>,
}

impl InvestigationPayload {
    pub fn into_input(self) -> Result<InvestigationInput> {
        Ok(InvestigationInput {
            title: required(self.title, "title")?,
            description: self.description,
            work_package: self.work_package,
            notes: self.notes,
            start_date: self.start_date,
            end_date: self.end_date,
            submission_date: self.submission_date,
            public_release_date: self.public_release_date,
            principal_investigator_name: self.principal_investigator_name,
            principal_investigator_email: self.principal_investigator_email,
            security_level: self.security_level.unwrap_or_default(),
        })
    }

    pub fn merge_into(self, current: &Investigation) -> InvestigationInput {
        let base = InvestigationInput::from(current);
        InvestigationInput {
            title: self.title.unwrap_or(base.title),
            description: self.description.or(base.description),
            work_package: self.work_package.or(base.work_package),
            notes: self.notes.or(base.notes),
            start_date: self.start_date.or(base.start_date),
            end_date: self.end_date.or(base.end_date),
            submission_date: self.submission_date.or(base.submission_date),
            public_release_date: self.public_release_date.or(base.public_release_date),
            principal_investigator_name: self
                .principal_investigator_name
                .or(base.principal_investigator_name),
            principal_investigator_email: self
                .principal_investigator_email
                .or(base.principal_investigator_email),
            security_level: self.security_level.unwrap_or(base.security_level),
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct StudyPayload {
    /// Accession code of the parent investigation (flat routes only)
    pub investigation: Option<String>,
    pub title: Option<String>,
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
    /// Defaults to `confidential`
    pub security_level: Option<SecurityLevel>,
}

impl StudyPayload {
    pub fn into_input(self, investigation_id: i64) -> Result<StudyInput> {
        Ok(StudyInput {
            investigation_id,
            title: required(self.title, "title")?,
            slug: self.slug,
            description: self.description,
            notes: self.notes,
            study_design: self.study_design,
            start_date: self.start_date,
            end_date: self.end_date,
            submission_date: self.submission_date,
            public_release_date: self.public_release_date,
            principal_investigator_name: self.principal_investigator_name,
            principal_investigator_email: self.principal_investigator_email,
            security_level: self.security_level.unwrap_or_default(),
        })
    }

    pub fn merge_into(self, current: &Study, investigation_id: i64) -> StudyInput {
        let base = StudyInput::from(current);
        StudyInput {
            investigation_id,
            title: self.title.unwrap_or(base.title),
            slug: self.slug.or(base.slug),
            description: self.description.or(base.description),
            notes: self.notes.or(base.notes),
            study_design: self.study_design.or(base.study_design),
            start_date: self.start_date.or(base.start_date),
            end_date: self.end_date.or(base.end_date),
            submission_date: self.submission_date.or(base.submission_date),
            public_release_date: self.public_release_date.or(base.public_release_date),
            principal_investigator_name: self
                .principal_investigator_name
                .or(base.principal_investigator_name),
            principal_investigator_email: self
                .principal_investigator_email
                .or(base.principal_investigator_email),
            security_level: self.security_level.unwrap_or(base.security_level),
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AssayPayload {
    /// Accession code of the parent study (flat routes only)
    pub study: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub measurement_type: Option<MeasurementType>,
    pub technology_platform: Option<TechnologyPlatform>,
}

impl AssayPayload {
    pub fn into_input(self, study_id: i64) -> Result<AssayInput> {
        Ok(AssayInput {
            study_id,
            title: required(self.title, "title")?,
            description: self.description.unwrap_or_default(),
            measurement_type: required(self.measurement_type, "measurement_type")?,
            technology_platform: required(self.technology_platform, "technology_platform")?,
        })
    }

    pub fn merge_into(self, current: &Assay, study_id: i64) -> AssayInput {
        let base = AssayInput::from(current);
        AssayInput {
            study_id,
            title: self.title.unwrap_or(base.title),
            description: self.description.unwrap_or(base.description),
            measurement_type: self.measurement_type.unwrap_or(base.measurement_type),
            technology_platform: self.technology_platform.unwrap_or(base.technology_platform),
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SamplePayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sample_type: Option<String>,
    /// Defaults to `confidential`
    pub security_level: Option<SecurityLevel>,
}

impl SamplePayload {
    pub fn into_input(self) -> Result<SampleInput> {
        Ok(SampleInput {
            name: self.name,
            description: self.description,
            sample_type: required(self.sample_type, "sample_type")?,
            security_level: self.security_level.unwrap_or_default(),
        })
    }

    pub fn merge_into(self, current: &Sample) -> SampleInput {
        let base = SampleInput::from(current);
        SampleInput {
            name: self.name.or(base.name),
            description: self.description.or(base.description),
            sample_type: self.sample_type.unwrap_or(base.sample_type),
            security_level: self.security_level.unwrap_or(base.security_level),
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct InstitutionPayload {
    pub name: Option<String>,
    pub website: Option<String>,
    pub address_street: Option<String>,
    pub address_house_number: Option<String>,
    pub address_addition: Option<String>,
    pub address_postcode: Option<String>,
    pub address_city: Option<String>,
    /// ISO 3166-1 alpha-2 code
    pub address_country: Option<String>,
}

impl InstitutionPayload {
    pub fn into_input(self) -> Result<InstitutionInput> {
        Ok(InstitutionInput {
            name: required(self.name, "name")?,
            website: self.website,
            address_street: self.address_street,
            address_house_number: self.address_house_number,
            address_addition: self.address_addition,
            address_postcode: self.address_postcode,
            address_city: self.address_city,
            address_country: required(self.address_country, "address_country")?,
        })
    }

    pub fn merge_into(self, current: &Institution) -> InstitutionInput {
        let base = InstitutionInput::from(current);
        InstitutionInput {
            name: self.name.unwrap_or(base.name),
            website: self.website.or(base.website),
            address_street: self.address_street.or(base.address_street),
            address_house_number: self.address_house_number.or(base.address_house_number),
            address_addition: self.address_addition.or(base.address_addition),
            address_postcode: self.address_postcode.or(base.address_postcode),
            address_city: self.address_city.or(base.address_city),
            address_country: self.address_country.unwrap_or(base.address_country),
        }
    }
}

/// Add an institution to an investigation.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ParticipationPayload {
    pub institution_id: i64,
    /// Decimal with up to two places, as a string or number
    #[serde(default, deserialize_with = "amount::deserialize")]
    #[schema(value_type = Option<String>)]
    pub contribution_amount: Option<String>,
    pub join_date: NaiveDate,
}

impl From<ParticipationPayload> for InstitutionLink {
    fn from(payload: ParticipationPayload) -> Self {
        Self {
            institution_id: payload.institution_id,
            contribution_amount: payload.contribution_amount,
            join_date: payload.join_date,
        }
    }
}

mod amount {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<Raw>::deserialize(d)?.map(|raw| match raw {
            Raw::Text(text) => text,
            Raw::Number(number) => number.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn investigation() -> Investigation {
        Investigation {
            id: 1,
            accession_code: "CXRP1".into(),
            title: "Original".into(),
            description: Some("Kept".into()),
            work_package: None,
            notes: None,
            start_date: None,
            end_date: None,
            submission_date: None,
            public_release_date: None,
            principal_investigator_name: None,
            principal_investigator_email: None,
            security_level: SecurityLevel::Internal,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_create_defaults_to_confidential() {
        let payload: InvestigationPayload =
            serde_json::from_str(r#"{"title": "New"}"#).unwrap();
        let input = payload.into_input().unwrap();
        assert_eq!(input.security_level, SecurityLevel::Confidential);
    }

    #[test]
    fn test_create_requires_title() {
        let err = InvestigationPayload::default().into_input().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_patch_keeps_absent_fields() {
        let payload: InvestigationPayload =
            serde_json::from_str(r#"{"title": "Renamed"}"#).unwrap();
        let input = payload.merge_into(&investigation());
        assert_eq!(input.title, "Renamed");
        assert_eq!(input.description.as_deref(), Some("Kept"));
        assert_eq!(input.security_level, SecurityLevel::Internal);
    }

    #[test]
    fn test_put_clears_absent_fields() {
        let payload: InvestigationPayload =
            serde_json::from_str(r#"{"title": "Replaced", "security_level": "public"}"#).unwrap();
        let input = payload.into_input().unwrap();
        assert_eq!(input.description, None);
        assert_eq!(input.security_level, SecurityLevel::Public);
    }

    #[test]
    fn test_assay_requires_vocabulary() {
        let payload: AssayPayload =
            serde_json::from_str(r#"{"title": "Run", "measurement_type": "genomics"}"#).unwrap();
        let err = payload.into_input(1).unwrap_err();
        match err {
            AppError::Validation(msg) => assert!(msg.contains("technology_platform")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_sample_requires_type() {
        let err = SamplePayload::default().into_input().unwrap_err();
        match err {
            AppError::Validation(msg) => assert!(msg.contains("sample_type")),
            other => panic!("unexpected error: {:?}", other),
        }
        let payload: SamplePayload = serde_json::from_str(r#"{"sample_type": "soil"}"#).unwrap();
        let input = payload.into_input().unwrap();
        assert_eq!(input.security_level, SecurityLevel::Confidential);
    }

    #[test]
    fn test_participation_amount_accepts_numbers() {
        let payload: ParticipationPayload = serde_json::from_str(
            r#"{"institution_id": 1, "contribution_amount": 12.5, "join_date": "2024-02-01"}"#,
        )
        .unwrap();
        assert_eq!(payload.contribution_amount.as_deref(), Some("12.5"));

        let payload: ParticipationPayload =
            serde_json::from_str(r#"{"institution_id": 1, "join_date": "2024-02-01"}"#).unwrap();
        assert!(payload.contribution_amount.is_none());

        let missing_date: std::result::Result<ParticipationPayload, _> =
            serde_json::from_str(r#"{"institution_id": 1}"#);
        assert!(missing_date.is_err());
    }

    #[test]
    fn test_unknown_security_level_rejected() {
        let result: std::result::Result<StudyPayload, _> =
            serde_json::from_str(r#"{"title": "S", "security_level": "secret"}"#);
        assert!(result.is_err());
    }
}
