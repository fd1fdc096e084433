//! Institutions and their participation in investigations.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

use super::check_title;
use crate::error::{AppError, Result};

/// At most eight integer digits and two decimals, like `NUMERIC(10, 2)`.
static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?(\d{1,8})(?:\.(\d{1,2}))?$").expect("amount pattern is valid")
});

/// Organisation taking part in investigations.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Institution {
    pub id: i64,
    pub name: String,
    pub website: Option<String>,
    pub address_street: Option<String>,
    pub address_house_number: Option<String>,
    pub address_addition: Option<String>,
    pub address_postcode: Option<String>,
    pub address_city: Option<String>,
    /// ISO 3166-1 alpha-2 code
    pub address_country: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct InstitutionInput {
    pub name: String,
    pub website: Option<String>,
    pub address_street: Option<String>,
    pub address_house_number: Option<String>,
    pub address_addition: Option<String>,
    pub address_postcode: Option<String>,
    pub address_city: Option<String>,
    pub address_country: String,
}

fn check_optional(field: &str, value: &Option<String>, max_len: usize) -> Result<()> {
    match value {
        Some(v) if v.chars().count() > max_len => Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, max_len
        ))),
        _ => Ok(()),
    }
}

impl InstitutionInput {
    /// Validate and normalise the country code to upper case.
    pub fn validate(&mut self) -> Result<()> {
        check_title("name", &self.name, 500)?;
        check_optional("website", &self.website, 500)?;
        check_optional("address_street", &self.address_street, 500)?;
        check_optional("address_house_number", &self.address_house_number, 10)?;
        check_optional("address_addition", &self.address_addition, 100)?;
        check_optional("address_postcode", &self.address_postcode, 10)?;
        check_optional("address_city", &self.address_city, 100)?;

        if let Some(website) = self.website.as_deref().filter(|w| !w.is_empty()) {
            let host = website
                .strip_prefix("https://")
                .or_else(|| website.strip_prefix("http://"))
                .unwrap_or_default();
            if host.is_empty() || host.starts_with('/') {
                return Err(AppError::Validation("website must be an http(s) URL".into()));
            }
        }

        let country = self.address_country.trim().to_ascii_uppercase();
        if country.len() != 2 || !country.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(AppError::Validation(
                "address_country must be a two-letter country code".into(),
            ));
        }
        self.address_country = country;
        Ok(())
    }
}

impl From<&Institution> for InstitutionInput {
    fn from(inst: &Institution) -> Self {
        Self {
            name: inst.name.clone(),
            website: inst.website.clone(),
            address_street: inst.address_street.clone(),
            address_house_number: inst.address_house_number.clone(),
            address_addition: inst.address_addition.clone(),
            address_postcode: inst.address_postcode.clone(),
            address_city: inst.address_city.clone(),
            address_country: inst.address_country.clone(),
        }
    }
}

/// An institution's participation in one investigation.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct InvestigationInstitution {
    pub investigation_id: i64,
    pub institution_id: i64,
    pub institution_name: String,
    /// Decimal string with two places, e.g. `"1250.00"`
    pub contribution_amount: Option<String>,
    pub join_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct InstitutionLink {
    pub institution_id: i64,
    pub contribution_amount: Option<String>,
    pub join_date: NaiveDate,
}

impl InstitutionLink {
    /// Validate the amount and rewrite it with exactly two decimals.
    pub fn validate(&mut self) -> Result<()> {
        if let Some(amount) = self.contribution_amount.take() {
            self.contribution_amount = Some(normalize_amount(amount.trim())?);
        }
        Ok(())
    }
}

/// Render a decimal amount with two places, rejecting anything that does
/// not fit ten digits.
pub fn normalize_amount(raw: &str) -> Result<String> {
    let caps = AMOUNT_RE.captures(raw).ok_or_else(|| {
        AppError::Validation(
            "contribution_amount must be a number with at most 8 digits before \
             and 2 after the decimal point"
                .into(),
        )
    })?;
    let sign = if raw.starts_with('-') { "-" } else { "" };
    let whole = caps[1].trim_start_matches('0');
    let whole = if whole.is_empty() { "0" } else { whole };
    let fraction = caps.get(2).map_or("", |m| m.as_str());
    Ok(format!("{}{}.{:0<2}", sign, whole, fraction))
}
