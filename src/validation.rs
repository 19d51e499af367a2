//! Outbound request validation.
//!
//! Anything typed into a send request ends up verbatim inside an
//! `AT+CMGS="<number>"` command or the message body, so both are checked
//! before they reach the wire.

use crate::modem::commands::{CTRL_Z, ESC};

/// Longest accepted destination, digits and dial symbols included.
pub const MAX_NUMBER_LEN: usize = 32;

/// Outbound validation errors with helpful messages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutboundError {
    #[error("number and text required")]
    Missing,

    #[error("Number is too long (maximum {max} characters)")]
    NumberTooLong { max: usize },

    #[error("Number contains invalid characters: {chars}")]
    InvalidNumber { chars: String },

    #[error("Number must contain at least one digit")]
    NoDigits,

    #[error("Text contains a control byte that would end composition early")]
    ControlByte,
}

/// Validate a destination number. Returns the trimmed number.
///
/// Accepts `+`, digits, `*` and `#` (USSD-style and short codes included).
pub fn validate_number(number: &str) -> Result<String, OutboundError> {
    let trimmed = number.trim();
    if trimmed.is_empty() {
        return Err(OutboundError::Missing);
    }
    if trimmed.chars().count() > MAX_NUMBER_LEN {
        return Err(OutboundError::NumberTooLong { max: MAX_NUMBER_LEN });
    }

    let mut invalid: Vec<char> = trimmed
        .chars()
        .filter(|c| !(c.is_ascii_digit() || matches!(c, '+' | '*' | '#')))
        .collect();
    if !invalid.is_empty() {
        invalid.sort_unstable();
        invalid.dedup();
        return Err(OutboundError::InvalidNumber {
            chars: invalid.into_iter().collect(),
        });
    }
    if !trimmed.chars().any(|c| c.is_ascii_digit()) {
        return Err(OutboundError::NoDigits);
    }
    Ok(trimmed.to_string())
}

/// Validate a message body. Whitespace-only text counts as missing.
pub fn validate_text(text: &str) -> Result<String, OutboundError> {
    if text.trim().is_empty() {
        return Err(OutboundError::Missing);
    }
    if text.bytes().any(|b| b == CTRL_Z || b == ESC) {
        return Err(OutboundError::ControlByte);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_numbers() {
        assert_eq!(validate_number("+15551234567").unwrap(), "+15551234567");
        assert_eq!(validate_number(" 10086 ").unwrap(), "10086");
        assert_eq!(validate_number("*100#").unwrap(), "*100#");
    }

    #[test]
    fn rejects_bad_numbers() {
        assert_eq!(validate_number(""), Err(OutboundError::Missing));
        assert_eq!(validate_number("   "), Err(OutboundError::Missing));
        assert!(matches!(
            validate_number("+1555\",\"x"),
            Err(OutboundError::InvalidNumber { .. })
        ));
        assert!(matches!(
            validate_number("555 1234"),
            Err(OutboundError::InvalidNumber { .. })
        ));
        assert_eq!(validate_number("+#"), Err(OutboundError::NoDigits));
        let long = "1".repeat(MAX_NUMBER_LEN + 1);
        assert_eq!(
            validate_number(&long),
            Err(OutboundError::NumberTooLong { max: MAX_NUMBER_LEN })
        );
    }

    #[test]
    fn invalid_characters_are_listed_once() {
        match validate_number("12a3a-") {
            Err(OutboundError::InvalidNumber { chars }) => assert_eq!(chars, "-a"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn text_rules() {
        assert_eq!(validate_text("Hello\nWorld").unwrap(), "Hello\nWorld");
        assert_eq!(validate_text(""), Err(OutboundError::Missing));
        assert_eq!(validate_text(" \t"), Err(OutboundError::Missing));
        assert_eq!(validate_text("stop\u{1a}here"), Err(OutboundError::ControlByte));
        assert_eq!(validate_text("esc\u{1b}"), Err(OutboundError::ControlByte));
    }

    #[test]
    fn missing_message_matches_control_surface_wording() {
        assert_eq!(OutboundError::Missing.to_string(), "number and text required");
    }
}
