//! Input validation for the console prompts.
//!
//! Pure functions from a trimmed input line to a value; an empty line picks
//! the default where there is one. The console re-asks on `Err`.

use crate::cache::MergePolicy;

/// Why an answer was rejected. Displayed to the user before asking again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Please enter a number")]
    NotANumber,

    #[error("Please enter a number between {min} and {max}")]
    OutOfRange { min: u32, max: u32 },

    #[error("Please enter at least {min}")]
    TooSmall { min: u32 },

    #[error("Please answer y or n")]
    NotYesNo,

    #[error("Please enter a value")]
    Empty,

    #[error("There is nothing to choose from")]
    NoChoices,
}

/// Pick an index from a numbered menu of `len` entries.
pub fn parse_menu_choice(input: &str, len: usize, default: Option<usize>) -> Result<usize, InputError> {
    if len == 0 {
        return Err(InputError::NoChoices);
    }
    let max = u32::try_from(len - 1).unwrap_or(u32::MAX);

    let input = input.trim();
    if input.is_empty() {
        return default
            .filter(|d| *d < len)
            .ok_or(InputError::OutOfRange { min: 0, max });
    }

    let choice: usize = input.parse().map_err(|_| InputError::NotANumber)?;
    if choice < len {
        Ok(choice)
    } else {
        Err(InputError::OutOfRange { min: 0, max })
    }
}

/// y/n question; empty input takes `default` when there is one.
pub fn parse_yes_no(input: &str, default: Option<bool>) -> Result<bool, InputError> {
    match input.trim().to_lowercase().as_str() {
        "" => default.ok_or(InputError::Empty),
        "y" | "yes" => Ok(true),
        "n" | "no" => Ok(false),
        _ => Err(InputError::NotYesNo),
    }
}

/// Only an explicit "y" confirms; anything else declines.
pub fn is_confirmation(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case("y")
}

/// Whole number of at least `min`, `default` when empty.
pub fn parse_count(input: &str, default: u32, min: u32) -> Result<u32, InputError> {
    let input = input.trim();
    let value = if input.is_empty() {
        default
    } else {
        input.parse().map_err(|_| InputError::NotANumber)?
    };
    if value < min {
        return Err(InputError::TooSmall { min });
    }
    Ok(value)
}

/// Conflict policy: 0 = skip known, 1 = replace, 2 = average.
pub fn parse_policy(input: &str, default: MergePolicy) -> Result<MergePolicy, InputError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(default);
    }
    let index: u32 = input.parse().map_err(|_| InputError::NotANumber)?;
    MergePolicy::from_index(index).ok_or(InputError::OutOfRange { min: 0, max: 2 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_choice() {
        assert_eq!(parse_menu_choice("2", 3, None), Ok(2));
        assert_eq!(parse_menu_choice(" 0 ", 3, None), Ok(0));
        assert_eq!(
            parse_menu_choice("3", 3, None),
            Err(InputError::OutOfRange { min: 0, max: 2 })
        );
        assert_eq!(parse_menu_choice("-1", 3, None), Err(InputError::NotANumber));
        assert_eq!(parse_menu_choice("abc", 3, None), Err(InputError::NotANumber));
    }

    #[test]
    fn test_menu_default() {
        assert_eq!(parse_menu_choice("", 3, Some(0)), Ok(0));
        assert!(parse_menu_choice("", 3, None).is_err());
        assert_eq!(parse_menu_choice("", 0, Some(0)), Err(InputError::NoChoices));
    }

    #[test]
    fn test_yes_no() {
        assert_eq!(parse_yes_no("Y", None), Ok(true));
        assert_eq!(parse_yes_no("no", None), Ok(false));
        assert_eq!(parse_yes_no("", Some(true)), Ok(true));
        assert_eq!(parse_yes_no("", None), Err(InputError::Empty));
        assert_eq!(parse_yes_no("maybe", Some(true)), Err(InputError::NotYesNo));
    }

    #[test]
    fn test_confirmation() {
        assert!(is_confirmation("y"));
        assert!(is_confirmation(" Y "));
        assert!(!is_confirmation(""));
        assert!(!is_confirmation("yes please"));
    }

    #[test]
    fn test_count() {
        assert_eq!(parse_count("", 8, 2), Ok(8));
        assert_eq!(parse_count("12", 8, 2), Ok(12));
        assert_eq!(parse_count("1", 8, 2), Err(InputError::TooSmall { min: 2 }));
        assert_eq!(parse_count("0", 30, 0), Ok(0));
        assert_eq!(parse_count("eight", 8, 2), Err(InputError::NotANumber));
    }

    #[test]
    fn test_policy() {
        assert_eq!(parse_policy("0", MergePolicy::Replace), Ok(MergePolicy::Skip));
        assert_eq!(parse_policy("1", MergePolicy::Skip), Ok(MergePolicy::Replace));
        assert_eq!(parse_policy("2", MergePolicy::Skip), Ok(MergePolicy::Average));
        assert_eq!(parse_policy("", MergePolicy::Replace), Ok(MergePolicy::Replace));
        assert_eq!(
            parse_policy("3", MergePolicy::Replace),
            Err(InputError::OutOfRange { min: 0, max: 2 })
        );
    }
}
