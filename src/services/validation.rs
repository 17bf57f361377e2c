use thiserror::Error;

use crate::constants::limits::{MAX_EMAIL_LENGTH, MAX_NAME_LENGTH, MAX_PASSWORD_LENGTH};

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Trims and lower-cases an email address after a structural check.
pub fn normalize_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim().to_lowercase();

    if email.is_empty() {
        return Err(ValidationError::new("email", "Email is required"));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::new(
            "email",
            format!("Email must be {MAX_EMAIL_LENGTH} characters or less"),
        ));
    }

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(email)
    } else {
        Err(ValidationError::new("email", "Email is invalid"))
    }
}

/// Required free-text field such as a name or title. Returns it trimmed.
pub fn require_text(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(field, format!("{field} is required")));
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::new(
            field,
            format!("{field} must be {MAX_NAME_LENGTH} characters or less"),
        ));
    }
    Ok(trimmed.to_string())
}

pub fn validate_password(password: &str, min_length: usize) -> Result<(), ValidationError> {
    let length = password.chars().count();
    if length < min_length {
        return Err(ValidationError::new(
            "password",
            format!("Password must be at least {min_length} characters"),
        ));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::new(
            "password",
            format!("Password must be {MAX_PASSWORD_LENGTH} characters or less"),
        ));
    }
    Ok(())
}

/// Password plus its confirmation, as entered on registration and reset forms.
pub fn validate_new_password(
    password: &str,
    confirm_password: &str,
    min_length: usize,
) -> Result<(), ValidationError> {
    validate_password(password, min_length)?;
    if password != confirm_password {
        return Err(ValidationError::new("confirmPassword", "Passwords must match"));
    }
    Ok(())
}

pub fn require_token<'a>(field: &'static str, token: &'a str) -> Result<&'a str, ValidationError> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(field, "Token is required"));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM ").unwrap(), "alice@example.com");
        assert!(normalize_email("").is_err());
        assert!(normalize_email("alice").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("alice@localhost").is_err());
        assert!(normalize_email("a@b@example.com").is_err());
        assert!(normalize_email("al ice@example.com").is_err());
        assert_eq!(normalize_email("x").unwrap_err().field, "email");
    }

    #[test]
    fn test_require_text() {
        assert_eq!(require_text("firstName", "  Ada ").unwrap(), "Ada");
        assert!(require_text("firstName", "   ").is_err());
        assert!(require_text("firstName", &"a".repeat(MAX_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_new_password() {
        assert!(validate_new_password("secret1", "secret1", 6).is_ok());
        assert_eq!(
            validate_new_password("short", "short", 6).unwrap_err().field,
            "password"
        );
        assert_eq!(
            validate_new_password("secret1", "secret2", 6).unwrap_err().field,
            "confirmPassword"
        );
    }

    #[test]
    fn test_require_token() {
        assert_eq!(require_token("token", " abc ").unwrap(), "abc");
        assert!(require_token("token", "").is_err());
    }
}
