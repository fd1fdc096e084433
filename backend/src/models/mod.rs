//! Domain models.

pub mod api_token;
pub mod assay;
pub mod choices;
pub mod institution;
pub mod investigation;
pub mod role;
pub mod sample;
pub mod security_level;
pub mod study;
pub mod user;

use crate::error::{AppError, Result};

pub(crate) fn check_title(field: &str, value: &str, max_len: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    if value.chars().count() > max_len {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, max_len
        )));
    }
    Ok(())
}

pub(crate) fn check_email(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    let valid = value
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
        && value.len() <= 255;
    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(format!("{} is not a valid email address", field)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_email() {
        assert!(check_email("email", "pi@example.org").is_ok());
        assert!(check_email("email", "").is_ok());
        assert!(check_email("email", "pi@localhost").is_err());
        assert!(check_email("email", "@example.org").is_err());
    }

    #[test]
    fn test_check_title_counts_chars() {
        assert!(check_title("title", "äöü", 3).is_ok());
        assert!(check_title("title", "äöüß", 3).is_err());
    }
}
