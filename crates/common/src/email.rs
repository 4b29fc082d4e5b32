//! Email address value type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Address the storefront submits for guests that never entered one.
///
/// Orders must never be recorded against it.
pub const PLACEHOLDER_GUEST_EMAIL: &str = "guest@example.com";

/// Errors produced when parsing an email address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmailError {
    #[error("email address is empty")]
    Empty,

    #[error("email address is malformed: {0}")]
    Malformed(String),

    #[error("placeholder guest address cannot own an order")]
    Placeholder,
}

/// A syntactically plausible, non-placeholder email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Parses an address, trimming surrounding whitespace.
    ///
    /// Only a minimal shape check is done (one `@` with text on both sides
    /// and a dot in the domain); deliverability is the provider's problem.
    pub fn parse(raw: &str) -> Result<Self, EmailError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EmailError::Empty);
        }
        if is_placeholder(trimmed) {
            return Err(EmailError::Placeholder);
        }

        let mut parts = trimmed.splitn(2, '@');
        let local = parts.next().unwrap_or_default();
        let domain = parts.next().unwrap_or_default();
        if local.is_empty()
            || domain.is_empty()
            || domain.contains('@')
            || !domain.contains('.')
            || trimmed.chars().any(char::is_whitespace)
        {
            return Err(EmailError::Malformed(trimmed.to_string()));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Returns true if `raw` is the storefront's placeholder guest address.
pub fn is_placeholder(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case(PLACEHOLDER_GUEST_EMAIL)
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_trims() {
        let email = Email::parse("  jane@banners.test ").unwrap();
        assert_eq!(email.as_str(), "jane@banners.test");
    }

    #[test]
    fn rejects_placeholder_in_any_case() {
        assert_eq!(Email::parse("guest@example.com"), Err(EmailError::Placeholder));
        assert_eq!(Email::parse("GUEST@Example.COM"), Err(EmailError::Placeholder));
    }

    #[test]
    fn rejects_empty_and_malformed() {
        assert_eq!(Email::parse("   "), Err(EmailError::Empty));
        assert!(matches!(Email::parse("nobody"), Err(EmailError::Malformed(_))));
        assert!(matches!(Email::parse("a@b"), Err(EmailError::Malformed(_))));
        assert!(matches!(Email::parse("@b.com"), Err(EmailError::Malformed(_))));
        assert!(matches!(Email::parse("a@@b.com"), Err(EmailError::Malformed(_))));
        assert!(matches!(Email::parse("a b@c.com"), Err(EmailError::Malformed(_))));
    }

    #[test]
    fn deserialization_validates() {
        let ok: Result<Email, _> = serde_json::from_str("\"a@b.co\"");
        assert!(ok.is_ok());
        let bad: Result<Email, _> = serde_json::from_str("\"guest@example.com\"");
        assert!(bad.is_err());
    }
}
