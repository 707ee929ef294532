//! Typed identifiers for sessions, stories, votes, users, and cards.
//!
//! Every identifier is assigned outside this client (by the backend, or by
//! the deck definition for cards) and arrives as plain text, so the types are
//! thin string wrappers. They are `#[serde(transparent)]` on the wire and
//! exist to keep a `StoryId` from being passed where a `VoteId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An estimation session (room) identifier.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

/// A story identifier, unique within a session.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoryId(String);

/// A server-assigned vote identifier.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoteId(String);

/// A participant's username, unique within a session.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

/// A card identifier. Doubles as the value carried by a vote.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(String);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_text_id {
    ($T:ident, $name:literal) => {
        impl $T {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $T {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $T {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $T {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $T {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", $name, self.0)
            }
        }
    };
}

impl_text_id!(SessionId, "SessionId");
impl_text_id!(StoryId, "StoryId");
impl_text_id!(VoteId, "VoteId");
impl_text_id!(Username, "Username");
impl_text_id!(CardId, "CardId");

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparent_on_the_wire() {
        let id = StoryId::new("s-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"s-42\"");
        let parsed: StoryId = serde_json::from_str("\"s-42\"").unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_display_is_raw_text() {
        assert_eq!(Username::from("amy").to_string(), "amy");
        assert_eq!(format!("{:?}", VoteId::from("v1")), "VoteId(\"v1\")");
    }

    #[test]
    fn test_compare_with_str() {
        let card = CardId::from("13");
        assert!(card == "13");
        assert_eq!(card.as_str(), "13");
    }
}
