//! Justification text checks run before an activation is sent.

use crate::error::ValidationError;

/// Longest justification PIM accepts from us.
pub const MAX_JUSTIFICATION_LEN: usize = 500;

/// Capacity of the input box. Larger than [`MAX_JUSTIFICATION_LEN`] so an
/// over-long text reaches [`validate`] and stays editable instead of being cut.
pub const INPUT_CAPACITY: usize = 4 * MAX_JUSTIFICATION_LEN;

/// Validate a justification and return it trimmed.
///
/// Tabs, newlines and carriage returns are allowed inside the text; every
/// other ASCII control character is rejected.
pub fn validate(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::JustificationRequired);
    }

    let len = trimmed.chars().count();
    if len > MAX_JUSTIFICATION_LEN {
        return Err(ValidationError::JustificationTooLong {
            len,
            max: MAX_JUSTIFICATION_LEN,
        });
    }

    if trimmed
        .chars()
        .any(|c| c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r'))
    {
        return Err(ValidationError::JustificationControlChars);
    }

    Ok(trimmed.to_string())
}
