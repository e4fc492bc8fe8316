//! User identities.
//!
//! An [`Identity`] is either an integer or a text key. Comparison is strict:
//! `Identity::Int(1)` and `Identity::Text("1")` are different identities.
//! Conversions between the two forms are explicit: [`Identity::from_param`]
//! normalizes request values and [`Identity::as_text_identity`] undoes it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a switchable user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identity {
    /// Numeric identifier (auto-increment primary keys and the like).
    Int(i64),
    /// Textual identifier (UUIDs, slugs, usernames).
    Text(String),
}

impl Identity {
    /// Normalize a raw request parameter into an identity.
    ///
    /// Text that is the canonical decimal form of an `i64` becomes
    /// [`Identity::Int`]. Anything else, including `"042"`, `"+1"` or
    /// `" 7"`, stays [`Identity::Text`] unchanged.
    pub fn from_param(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(n) if n.to_string() == raw => Self::Int(n),
            _ => Self::Text(raw.to_string()),
        }
    }

    /// The text identity an integer was normalized from.
    ///
    /// Widget links carry identities as plain text, so a text key such as
    /// `"42"` arrives as `Int(42)`. Lookups retry with this form on a miss.
    pub fn as_text_identity(&self) -> Option<Self> {
        match self {
            Self::Int(n) => Some(Self::Text(n.to_string())),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Identity {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Identity {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_param_canonical_integer() {
        assert_eq!(Identity::from_param("42"), Identity::Int(42));
        assert_eq!(Identity::from_param("-3"), Identity::Int(-3));
    }

    #[test]
    fn test_from_param_keeps_non_canonical_text() {
        assert_eq!(Identity::from_param("042"), Identity::Text("042".into()));
        assert_eq!(Identity::from_param("+1"), Identity::Text("+1".into()));
        assert_eq!(Identity::from_param(" 7"), Identity::Text(" 7".into()));
        assert_eq!(
            Identity::from_param("user-abc"),
            Identity::Text("user-abc".into())
        );
    }

    #[test]
    fn test_strict_equality() {
        assert_ne!(Identity::Int(1), Identity::Text("1".into()));
    }

    #[test]
    fn test_as_text_identity() {
        assert_eq!(
            Identity::Int(42).as_text_identity(),
            Some(Identity::Text("42".into()))
        );
        assert_eq!(Identity::from("bob").as_text_identity(), None);
    }

    #[test]
    fn test_serde_untagged() {
        let int: Identity = serde_json::from_str("5").unwrap();
        let text: Identity = serde_json::from_str("\"5\"").unwrap();
        assert_eq!(int, Identity::Int(5));
        assert_eq!(text, Identity::Text("5".into()));
        assert_eq!(serde_json::to_string(&Identity::Int(5)).unwrap(), "5");
    }

    #[test]
    fn test_display() {
        assert_eq!(Identity::Int(9).to_string(), "9");
        assert_eq!(Identity::from("alice").to_string(), "alice");
    }
}
