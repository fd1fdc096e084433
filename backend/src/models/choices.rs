//! Controlled vocabularies for investigations and assays.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Work package an investigation is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "work_package")]
pub enum WorkPackage {
    WPC1,
    WPC2,
    WPC3,
    WPC4,
    WPC5,
    WPC6,
    WPC7,
    WPT,
    WPD,
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
}

impl WorkPackage {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkPackage::WPC1 => "WPC1",
            WorkPackage::WPC2 => "WPC2",
            WorkPackage::WPC3 => "WPC3",
            WorkPackage::WPC4 => "WPC4",
            WorkPackage::WPC5 => "WPC5",
            WorkPackage::WPC6 => "WPC6",
            WorkPackage::WPC7 => "WPC7",
            WorkPackage::WPT => "WPT",
            WorkPackage::WPD => "WPD",
            WorkPackage::S1 => "S1",
            WorkPackage::S2 => "S2",
            WorkPackage::S3 => "S3",
            WorkPackage::S4 => "S4",
            WorkPackage::S5 => "S5",
            WorkPackage::S6 => "S6",
        }
    }
}

/// Kind of measurement an assay produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "measurement_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MeasurementType {
    Genomics,
    Transcriptomics,
    Proteomics,
    Metabolomics,
    Phenotyping,
    Other,
}

impl MeasurementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementType::Genomics => "genomics",
            MeasurementType::Transcriptomics => "transcriptomics",
            MeasurementType::Proteomics => "proteomics",
            MeasurementType::Metabolomics => "metabolomics",
            MeasurementType::Phenotyping => "phenotyping",
            MeasurementType::Other => "other",
        }
    }
}

/// Instrument family used for an assay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "technology_platform", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TechnologyPlatform {
    /// Sequencing
    Seq,
    /// Microarray
    Micro,
    /// Mass spectrometry
    Ms,
    Nmr,
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_package_serializes_verbatim() {
        assert_eq!(serde_json::to_string(&WorkPackage::WPC3).unwrap(), "\"WPC3\"");
        assert_eq!(
            serde_json::from_str::<WorkPackage>("\"S6\"").unwrap(),
            WorkPackage::S6
        );
        assert!(serde_json::from_str::<WorkPackage>("\"wpc3\"").is_err());
    }

    #[test]
    fn test_measurement_and_platform_codes() {
        assert_eq!(MeasurementType::Metabolomics.as_str(), "metabolomics");
        assert_eq!(
            serde_json::to_string(&TechnologyPlatform::Ms).unwrap(),
            "\"ms\""
        );
        assert_eq!(
            serde_json::from_str::<TechnologyPlatform>("\"micro\"").unwrap(),
            TechnologyPlatform::Micro
        );
    }
}
