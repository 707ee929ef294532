//! Backend reply envelope and push-event tags.

use serde::{Deserialize, Serialize};
use strum::EnumString;

/// Outcome tag carried by every mutating backend reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "KO")]
    Ko,
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseStatus::Ok => f.write_str("OK"),
            ResponseStatus::Ko => f.write_str("KO"),
        }
    }
}

/// A backend reply: a status tag plus, on success, the canonical record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply<T> {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Reply<T> {
    pub fn ok(data: T) -> Self {
        Self { status: ResponseStatus::Ok, data: Some(data) }
    }

    /// A successful reply with no record attached.
    pub fn ok_empty() -> Self {
        Self { status: ResponseStatus::Ok, data: None }
    }

    pub fn ko() -> Self {
        Self { status: ResponseStatus::Ko, data: None }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

/// The closed set of push-event tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum EventKind {
    StoryAdded,
    StoryRemoved,
    StoryEnded,
    VoteAdded,
    VoteRemoved,
    UserConnected,
    UserDisconnected,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::StoryAdded => "STORY_ADDED",
            EventKind::StoryRemoved => "STORY_REMOVED",
            EventKind::StoryEnded => "STORY_ENDED",
            EventKind::VoteAdded => "VOTE_ADDED",
            EventKind::VoteRemoved => "VOTE_REMOVED",
            EventKind::UserConnected => "USER_CONNECTED",
            EventKind::UserDisconnected => "USER_DISCONNECTED",
        };
        f.write_str(s)
    }
}
