//! Outbound message validation gate.
//!
//! Marketplace policy: players and coaches must not exchange contact details
//! through direct messages (bookings and payments stay on-platform), so
//! outbound text is checked for phone numbers, email addresses, and links
//! before a send is attempted. Staff accounts are privileged and exempt from
//! the contact-info rules; empty messages are rejected for everyone.
//!
//! The gate is pure: same input and rule set, same verdict, no side effects.
//! Malformed input is itself a rejection case, never a panic.

use std::sync::LazyLock;

use regex::Regex;

/// Structured reason an outbound message was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationRejection {
    Empty,
    PhoneNumber,
    EmailAddress,
    Link,
    Profanity,
}

impl std::fmt::Display for ValidationRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationRejection::Empty => write!(f, "message is empty"),
            ValidationRejection::PhoneNumber => write!(f, "message contains a phone number"),
            ValidationRejection::EmailAddress => write!(f, "message contains an email address"),
            ValidationRejection::Link => write!(f, "message contains a link"),
            ValidationRejection::Profanity => write!(f, "message contains offensive language"),
        }
    }
}

impl std::error::Error for ValidationRejection {}

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d\s().\-]{6,}\d").unwrap());

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}\b").unwrap());

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").unwrap());

/// Disallowed words, Spanish and English. Matched as whole words,
/// case-insensitively.
const PROFANITY: &[&str] = &[
    "gilipollas",
    "joder",
    "mierda",
    "asshole",
    "fuck",
    "shit",
];

static PROFANITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"(?i)\b(?:{})\b", PROFANITY.join("|"));
    Regex::new(&pattern).unwrap()
});

/// Validate outbound text, returning the trimmed body on acceptance.
///
/// Empty or whitespace-only text is always rejected. Unless `privileged`,
/// text matching a contact-info pattern or the profanity list is rejected
/// with the first rule that fired, checked in a fixed order so the verdict
/// is deterministic.
pub fn validate_outbound(text: &str, privileged: bool) -> Result<String, ValidationRejection> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationRejection::Empty);
    }

    if !privileged {
        if PHONE_RE.is_match(trimmed) {
            return Err(ValidationRejection::PhoneNumber);
        }
        if EMAIL_RE.is_match(trimmed) {
            return Err(ValidationRejection::EmailAddress);
        }
        if LINK_RE.is_match(trimmed) {
            return Err(ValidationRejection::Link);
        }
        if PROFANITY_RE.is_match(trimmed) {
            return Err(ValidationRejection::Profanity);
        }
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_text() {
        assert_eq!(
            validate_outbound("  nos vemos en la pista 4  ", false),
            Ok("nos vemos en la pista 4".to_string())
        );
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        assert_eq!(validate_outbound("", false), Err(ValidationRejection::Empty));
        assert_eq!(
            validate_outbound("   \n\t ", false),
            Err(ValidationRejection::Empty)
        );
        // Privilege does not exempt the empty check.
        assert_eq!(validate_outbound("  ", true), Err(ValidationRejection::Empty));
    }

    #[test]
    fn rejects_phone_numbers() {
        for text in [
            "llámame al 612 345 678",
            "my number is +34 612345678",
            "call (555) 123-4567 tonight",
        ] {
            assert_eq!(
                validate_outbound(text, false),
                Err(ValidationRejection::PhoneNumber),
                "should reject: {text}"
            );
        }
    }

    #[test]
    fn rejects_emails_and_links() {
        assert_eq!(
            validate_outbound("escríbeme a ana.garcia@example.com", false),
            Err(ValidationRejection::EmailAddress)
        );
        assert_eq!(
            validate_outbound("book here https://example.com/court", false),
            Err(ValidationRejection::Link)
        );
        assert_eq!(
            validate_outbound("see www.example.com for details", false),
            Err(ValidationRejection::Link)
        );
    }

    #[test]
    fn rejects_profanity_as_whole_words() {
        assert_eq!(
            validate_outbound("qué mierda de partido", false),
            Err(ValidationRejection::Profanity)
        );
        // Substrings of clean words do not fire.
        assert!(validate_outbound("scunthorpe classic", false).is_ok());
    }

    #[test]
    fn privileged_bypasses_content_rules() {
        assert!(validate_outbound("call me at 612 345 678", true).is_ok());
        assert!(validate_outbound("support@rally.example", true).is_ok());
    }

    #[test]
    fn ordinary_numbers_are_not_phone_numbers() {
        assert!(validate_outbound("nos vemos a las 18:30", false).is_ok());
        assert!(validate_outbound("gané 6-3 6-4", false).is_ok());
    }
}
