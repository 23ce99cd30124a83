//! Client-side form checks. They run before any network call.

use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::SettingsPatch;

pub const MIN_PASSWORD_LEN: usize = 6;

pub const MSG_REQUIRED: &str = "please fill in all fields";
pub const MSG_LOGIN_REQUIRED: &str = "please fill in email and password";
pub const MSG_PASSWORD_SHORT: &str = "password must be at least 6 characters long";
pub const MSG_PASSWORD_LOWERCASE: &str = "password must contain at least one lowercase letter";
pub const MSG_PASSWORD_UPPERCASE: &str = "password must contain at least one uppercase letter";
pub const MSG_PASSWORD_MISMATCH: &str = "passwords do not match";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

impl RegistrationForm {
    /// Checks run in a fixed order; the first failure wins.
    pub fn validate(&self) -> Result<()> {
        if [&self.name, &self.email, &self.password, &self.confirm_password]
            .iter()
            .any(|field| field.is_empty())
        {
            return Err(AppError::validation(MSG_REQUIRED));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation(MSG_PASSWORD_SHORT));
        }
        if !self.password.chars().any(|c| c.is_ascii_lowercase()) {
            return Err(AppError::validation(MSG_PASSWORD_LOWERCASE));
        }
        if !self.password.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(AppError::validation(MSG_PASSWORD_UPPERCASE));
        }
        if self.password != self.confirm_password {
            return Err(AppError::validation(MSG_PASSWORD_MISMATCH));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<()> {
        if self.email.is_empty() || self.password.is_empty() {
            return Err(AppError::validation(MSG_LOGIN_REQUIRED));
        }
        Ok(())
    }
}

/// Slider bounds, inclusive, in percent. All sliders move in steps of 5.
pub const FONT_SIZE_RANGE: (i32, i32) = (80, 150);
pub const SPACING_RANGE: (i32, i32) = (80, 150);
pub const CONTRAST_RANGE: (i32, i32) = (80, 120);
pub const INTERFACE_RHYTHM_RANGE: (i32, i32) = (50, 150);
pub const SLIDER_STEP: i32 = 5;

fn check_slider(field: &str, value: Option<i32>, (min, max): (i32, i32)) -> Result<()> {
    let Some(value) = value else { return Ok(()) };
    if value < min || value > max {
        return Err(AppError::validation(format!("{field} must be between {min} and {max}")));
    }
    if value % SLIDER_STEP != 0 {
        return Err(AppError::validation(format!("{field} must be a multiple of {SLIDER_STEP}")));
    }
    Ok(())
}

impl SettingsPatch {
    pub fn validate(&self) -> Result<()> {
        check_slider("font_size", self.font_size, FONT_SIZE_RANGE)?;
        check_slider("spacing", self.spacing, SPACING_RANGE)?;
        check_slider("contrast", self.contrast, CONTRAST_RANGE)?;
        check_slider("interface_rhythm", self.interface_rhythm, INTERFACE_RHYTHM_RANGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(password: &str, confirm: &str) -> RegistrationForm {
        RegistrationForm {
            name: "Ana".into(),
            email: "ana@example.com".into(),
            password: password.into(),
            confirm_password: confirm.into(),
        }
    }

    fn message(result: Result<()>) -> String {
        result.unwrap_err().to_string()
    }

    #[test]
    fn registration_rules_apply_in_order() {
        assert_eq!(message(form("", "").validate()), MSG_REQUIRED);
        assert_eq!(message(form("aB1", "aB1").validate()), MSG_PASSWORD_SHORT);
        assert_eq!(message(form("ABC123", "ABC123").validate()), MSG_PASSWORD_LOWERCASE);
        assert_eq!(message(form("abc123", "abc123").validate()), MSG_PASSWORD_UPPERCASE);
        assert_eq!(message(form("Abc123", "Abc124").validate()), MSG_PASSWORD_MISMATCH);
        assert!(form("Abc123", "Abc123").validate().is_ok());
    }

    #[test]
    fn login_requires_both_fields() {
        let login = LoginForm { email: "ana@example.com".into(), password: String::new() };
        assert_eq!(message(login.validate()), MSG_LOGIN_REQUIRED);
    }

    #[test]
    fn settings_sliders_are_bounded_and_stepped() {
        let ok = SettingsPatch { font_size: Some(150), contrast: Some(80), ..Default::default() };
        assert!(ok.validate().is_ok());

        let too_big = SettingsPatch { contrast: Some(125), ..Default::default() };
        assert_eq!(message(too_big.validate()), "contrast must be between 80 and 120");

        let off_step = SettingsPatch { spacing: Some(103), ..Default::default() };
        assert_eq!(message(off_step.validate()), "spacing must be a multiple of 5");

        let rhythm = SettingsPatch { interface_rhythm: Some(50), ..Default::default() };
        assert!(rhythm.validate().is_ok());
    }
}
