use thiserror::Error;

pub const MIN_USERNAME_LEN: usize = 2;
pub const MAX_USERNAME_LEN: usize = 24;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsernameError {
    #[error("a name needs at least {} characters", MIN_USERNAME_LEN)]
    TooShort,
    #[error("a name can have at most {} characters", MAX_USERNAME_LEN)]
    TooLong,
}

/// Trims surrounding whitespace and checks the length of a display name.
/// Lengths are counted in characters, not bytes.
pub fn normalize_username(input: &str) -> Result<String, UsernameError> {
    let name = input.trim();
    match name.chars().count() {
        n if n < MIN_USERNAME_LEN => Err(UsernameError::TooShort),
        n if n > MAX_USERNAME_LEN => Err(UsernameError::TooLong),
        _ => Ok(name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_and_accepts() {
        assert_eq!(normalize_username("  SwiftFox42 \n"), Ok("SwiftFox42".to_string()));
        assert_eq!(normalize_username("Jo"), Ok("Jo".to_string()));
    }

    #[test]
    fn test_rejects_short_names() {
        assert_eq!(normalize_username(""), Err(UsernameError::TooShort));
        assert_eq!(normalize_username("  a  "), Err(UsernameError::TooShort));
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        assert_eq!(normalize_username("Їж"), Ok("Їж".to_string()));
        let long = "ж".repeat(MAX_USERNAME_LEN + 1);
        assert_eq!(normalize_username(&long), Err(UsernameError::TooLong));
    }
}
