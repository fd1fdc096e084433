//! Security level classification.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

/// Visibility tier of an investigation or study.
///
/// Ordered from least to most sensitive. New records default to
/// [`SecurityLevel::Confidential`].
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    sqlx::Type,
    ToSchema,
)]
#[sqlx(type_name = "security_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Public,
    Internal,
    Restricted,
    #[default]
    Confidential,
}

impl SecurityLevel {
    pub const ALL: [SecurityLevel; 4] = [
        SecurityLevel::Public,
        SecurityLevel::Internal,
        SecurityLevel::Restricted,
        SecurityLevel::Confidential,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Public => "public",
            SecurityLevel::Internal => "internal",
            SecurityLevel::Restricted => "restricted",
            SecurityLevel::Confidential => "confidential",
        }
    }

    /// Human-readable label used in the catalogue page.
    pub fn label(&self) -> &'static str {
        match self {
            SecurityLevel::Public => "Public",
            SecurityLevel::Internal => "Internal",
            SecurityLevel::Restricted => "Restricted",
            SecurityLevel::Confidential => "Confidential",
        }
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SecurityLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(SecurityLevel::Public),
            "internal" => Ok(SecurityLevel::Internal),
            "restricted" => Ok(SecurityLevel::Restricted),
            "confidential" => Ok(SecurityLevel::Confidential),
            other => Err(AppError::Validation(format!(
                "'{}' is not a valid security level",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_confidential() {
        assert_eq!(SecurityLevel::default(), SecurityLevel::Confidential);
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&SecurityLevel::Restricted).unwrap();
        assert_eq!(json, "\"restricted\"");
        let parsed: SecurityLevel = serde_json::from_str("\"internal\"").unwrap();
        assert_eq!(parsed, SecurityLevel::Internal);
        assert!(serde_json::from_str::<SecurityLevel>("\"secret\"").is_err());
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("PUBLIC".parse::<SecurityLevel>().unwrap(), SecurityLevel::Public);
        assert!("top-secret".parse::<SecurityLevel>().is_err());
    }

    #[test]
    fn test_ordering_follows_sensitivity() {
        assert!(SecurityLevel::Public < SecurityLevel::Internal);
        assert!(SecurityLevel::Restricted < SecurityLevel::Confidential);
    }
}
