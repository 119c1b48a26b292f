//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest identifier (team or station id) accepted from clients.
pub const MAX_ID_LEN: usize = 64;
/// Longest free-text field (code, answer, participant name).
pub const MAX_TEXT_LEN: usize = 128;
/// Highest number of roster name slots.
pub const MAX_NAME_SLOTS: usize = 200;

/// Validates that an identifier is non-empty, short and made of ASCII
/// letters, digits, `-` or `_`.
///
/// # Examples
///
/// ```ignore
/// validate_identifier("red")     // Ok
/// validate_identifier("")        // Err - empty
/// validate_identifier("red team") // Err - space
/// ```
pub fn validate_identifier(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_ID_LEN {
        let mut err = ValidationError::new("identifier_length");
        err.message = Some(
            format!(
                "Identifier must be 1 to {MAX_ID_LEN} characters (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        let mut err = ValidationError::new("identifier_format");
        err.message = Some("Identifier may only contain letters, digits, '-' and '_'".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a free-text field stays under [`MAX_TEXT_LEN`] characters.
pub fn validate_text(value: &str) -> Result<(), ValidationError> {
    let length = value.chars().count();
    if length > MAX_TEXT_LEN {
        let mut err = ValidationError::new("text_length");
        err.message =
            Some(format!("Text must be at most {MAX_TEXT_LEN} characters (got {length})").into());
        return Err(err);
    }
    Ok(())
}

/// Validates that a roster slot index is within bounds.
pub fn validate_slot(index: usize) -> Result<(), ValidationError> {
    if index >= MAX_NAME_SLOTS {
        let mut err = ValidationError::new("slot_range");
        err.message = Some(format!("Name slot must be below {MAX_NAME_SLOTS}").into());
        return Err(err);
    }
    Ok(())
}
