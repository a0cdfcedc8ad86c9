#![allow(dead_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// The owner of session state: an anonymous guest token or an authenticated
/// user id. Modeled as a tagged enum so ownership checks and migration
/// direction checks are exhaustive matches, never string comparisons.
///
/// Canonical string encoding is `guest:<token>` / `user:<id>` everywhere a
/// subject crosses a boundary (HTTP parameters, database columns).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SubjectId {
    Guest(String),
    User(String),
}

impl SubjectId {
    pub fn is_guest(&self) -> bool {
        matches!(self, SubjectId::Guest(_))
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectId::Guest(token) => write!(f, "guest:{token}"),
            SubjectId::User(id) => write!(f, "user:{id}"),
        }
    }
}

impl FromStr for SubjectId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(token) = s.strip_prefix("guest:") {
            if token.is_empty() {
                return Err(AppError::Validation("guest subject id has an empty token".into()));
            }
            Ok(SubjectId::Guest(token.to_string()))
        } else if let Some(id) = s.strip_prefix("user:") {
            if id.is_empty() {
                return Err(AppError::Validation("user subject id has an empty id".into()));
            }
            Ok(SubjectId::User(id.to_string()))
        } else {
            Err(AppError::Validation(format!(
                "invalid subject id '{s}': expected 'guest:<token>' or 'user:<id>'"
            )))
        }
    }
}

impl TryFrom<String> for SubjectId {
    type Error = AppError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SubjectId> for String {
    fn from(subject: SubjectId) -> Self {
        subject.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_guest() {
        let s: SubjectId = "guest:abc-123".parse().unwrap();
        assert_eq!(s, SubjectId::Guest("abc-123".to_string()));
        assert!(s.is_guest());
    }

    #[test]
    fn test_parse_user() {
        let s: SubjectId = "user:42".parse().unwrap();
        assert_eq!(s, SubjectId::User("42".to_string()));
        assert!(!s.is_guest());
    }

    #[test]
    fn test_display_round_trip() {
        for raw in ["guest:tok", "user:abc"] {
            let s: SubjectId = raw.parse().unwrap();
            assert_eq!(s.to_string(), raw);
        }
    }

    #[test]
    fn test_rejects_unknown_prefix() {
        assert!("admin:1".parse::<SubjectId>().is_err());
        assert!("plain-id".parse::<SubjectId>().is_err());
    }

    #[test]
    fn test_rejects_empty_token() {
        assert!("guest:".parse::<SubjectId>().is_err());
        assert!("user:".parse::<SubjectId>().is_err());
    }
}
