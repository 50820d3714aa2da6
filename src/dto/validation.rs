//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted team or player display name.
const MAX_NAME_LENGTH: usize = 40;

/// Validates that a display name is non-blank and within the length bound.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("name_blank");
        err.message = Some("name must not be blank".into());
        return Err(err);
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        let mut err = ValidationError::new("name_length");
        err.message = Some(
            format!(
                "name must be at most {} characters (got {})",
                MAX_NAME_LENGTH,
                name.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_display_name_valid() {
        assert!(validate_display_name("Sharks").is_ok());
        assert!(validate_display_name("The Cup Crushers").is_ok());
    }

    #[test]
    fn test_validate_display_name_blank() {
        assert!(validate_display_name("").is_err());
        assert!(validate_display_name("   ").is_err());
    }

    #[test]
    fn test_validate_display_name_too_long() {
        assert!(validate_display_name(&"x".repeat(41)).is_err());
        assert!(validate_display_name(&"x".repeat(40)).is_ok());
    }
}
