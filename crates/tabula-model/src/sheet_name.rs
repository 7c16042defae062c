use thiserror::Error;

/// Maximum sheet name length in characters.
pub const SHEET_NAME_MAX_LEN: usize = 31;

const FORBIDDEN: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SheetNameError {
    #[error("sheet name cannot be empty")]
    Empty,
    #[error("sheet name is too long ({len} > {max})", max = SHEET_NAME_MAX_LEN)]
    TooLong { len: usize },
    #[error("sheet name contains invalid character '{0}'")]
    InvalidCharacter(char),
    #[error("sheet name cannot begin or end with an apostrophe")]
    LeadingOrTrailingApostrophe,
}

/// Validate a worksheet name.
pub fn validate_sheet_name(name: &str) -> Result<(), SheetNameError> {
    if name.is_empty() {
        return Err(SheetNameError::Empty);
    }
    let len = name.chars().count();
    if len > SHEET_NAME_MAX_LEN {
        return Err(SheetNameError::TooLong { len });
    }
    if let Some(ch) = name.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(SheetNameError::InvalidCharacter(ch));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(SheetNameError::LeadingOrTrailingApostrophe);
    }
    Ok(())
}

/// Case-insensitive sheet name comparison.
pub fn sheet_name_eq_case_insensitive(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_sheet_names() {
        assert!(validate_sheet_name("Sheet 1").is_ok());
        assert_eq!(validate_sheet_name(""), Err(SheetNameError::Empty));
        assert_eq!(
            validate_sheet_name("a/b"),
            Err(SheetNameError::InvalidCharacter('/'))
        );
        assert_eq!(
            validate_sheet_name(&"x".repeat(32)),
            Err(SheetNameError::TooLong { len: 32 })
        );
        assert!(sheet_name_eq_case_insensitive("Data", "DATA"));
    }
}
