//! Display-name validation.
//!
//! Lobby names and member display names share one format rule: up to
//! 50 characters, word characters (`[A-Za-z0-9_]`) plus spaces, and
//! the first character must be a word character. The same check backs
//! both the HTTP surface (rejecting with 400) and the registries.

use thiserror::Error;

/// Maximum length of a lobby or member display name.
pub const MAX_NAME_LEN: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("name must not be empty")]
    Empty,

    #[error("name must be at most {MAX_NAME_LEN} characters")]
    TooLong,

    #[error("name contains invalid characters")]
    InvalidCharacters,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Validate a lobby or member display name.
///
/// # Errors
///
/// Returns a [`NameError`] describing the first rule the name breaks.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(NameError::TooLong);
    }

    let mut chars = name.chars();
    // First character may not be a space.
    let first = chars.next().ok_or(NameError::Empty)?;
    if !is_word_char(first) {
        return Err(NameError::InvalidCharacters);
    }
    if !chars.all(|c| is_word_char(c) || c == ' ') {
        return Err(NameError::InvalidCharacters);
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_simple_names() {
        assert_eq!(validate_name("jt"), Ok(()));
        assert_eq!(validate_name("My lobby"), Ok(()));
        assert_eq!(validate_name("peer_0"), Ok(()));
        assert_eq!(validate_name("A1 B2 C3"), Ok(()));
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(validate_name(""), Err(NameError::Empty));
    }

    #[test]
    fn test_rejects_leading_space() {
        assert_eq!(validate_name(" lobby"), Err(NameError::InvalidCharacters));
    }

    #[test]
    fn test_rejects_punctuation() {
        assert_eq!(validate_name("lob:by"), Err(NameError::InvalidCharacters));
        assert_eq!(validate_name("lobby!"), Err(NameError::InvalidCharacters));
    }

    #[test]
    fn test_length_boundary() {
        let fifty = "a".repeat(MAX_NAME_LEN);
        assert_eq!(validate_name(&fifty), Ok(()));

        let fifty_one = "a".repeat(MAX_NAME_LEN + 1);
        assert_eq!(validate_name(&fifty_one), Err(NameError::TooLong));
    }

    #[test]
    fn test_trailing_space_allowed() {
        // Only the leading position is restricted.
        assert_eq!(validate_name("lobby "), Ok(()));
    }
}
