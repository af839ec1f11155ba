//! Session Management
//!
//! Identity of a single doctor consultation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_client_supplied_id_round_trips() {
        let id = SessionId::from_string("case-1");
        assert_eq!(id.as_str(), "case-1");
        assert_eq!(id.to_string(), "case-1");
        assert_eq!(id, SessionId::from_string("case-1"));
    }
}
