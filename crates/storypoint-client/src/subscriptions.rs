//! Server-push event types.
//!
//! Provides [`ServerEvent`], the typed form of the JSON envelopes the push
//! channel delivers:
//!
//! ```json
//! { "type": "VOTE_ADDED", "data": { "voteId": "v1", "storyId": "s1", ... } }
//! ```
//!
//! Decoding is two-step. The envelope's tag is read first; a tag outside the
//! known set decodes to `Ok(None)` so that newer servers can add event kinds
//! without breaking older clients. A known tag whose `data` does not match
//! its payload shape is a [`DecodeError`].

use serde::Deserialize;
use storypoint_types::{EventKind, Story, StoryId, User, Username, Vote, VoteId};
use thiserror::Error;
use tracing::debug;

/// Events pushed from the server to every participant of a room.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    StoryAdded(Story),
    StoryRemoved(StoryId),
    StoryEnded(StoryId),
    VoteAdded(Vote),
    /// Carries only the id; the vote's owner is looked up locally.
    VoteRemoved(VoteId),
    UserConnected(User),
    UserDisconnected(Username),
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::StoryAdded(_) => EventKind::StoryAdded,
            ServerEvent::StoryRemoved(_) => EventKind::StoryRemoved,
            ServerEvent::StoryEnded(_) => EventKind::StoryEnded,
            ServerEvent::VoteAdded(_) => EventKind::VoteAdded,
            ServerEvent::VoteRemoved(_) => EventKind::VoteRemoved,
            ServerEvent::UserConnected(_) => EventKind::UserConnected,
            ServerEvent::UserDisconnected(_) => EventKind::UserDisconnected,
        }
    }

    /// Decode one push envelope from JSON text.
    pub fn decode(json: &str) -> Result<Option<Self>, DecodeError> {
        let envelope: Envelope = serde_json::from_str(json)?;
        Self::from_envelope(envelope)
    }

    /// Decode one push envelope from an already-parsed JSON value.
    pub fn decode_value(value: serde_json::Value) -> Result<Option<Self>, DecodeError> {
        let envelope: Envelope = serde_json::from_value(value)?;
        Self::from_envelope(envelope)
    }

    fn from_envelope(envelope: Envelope) -> Result<Option<Self>, DecodeError> {
        let Ok(kind) = envelope.kind.parse::<EventKind>() else {
            debug!("ignoring push event with unknown type {:?}", envelope.kind);
            return Ok(None);
        };

        let data = envelope.data;
        let payload_err = |source| DecodeError::Payload { kind, source };
        let event = match kind {
            EventKind::StoryAdded => {
                ServerEvent::StoryAdded(serde_json::from_value(data).map_err(payload_err)?)
            }
            EventKind::StoryRemoved => {
                ServerEvent::StoryRemoved(serde_json::from_value(data).map_err(payload_err)?)
            }
            EventKind::StoryEnded => {
                ServerEvent::StoryEnded(serde_json::from_value(data).map_err(payload_err)?)
            }
            EventKind::VoteAdded => {
                ServerEvent::VoteAdded(serde_json::from_value(data).map_err(payload_err)?)
            }
            EventKind::VoteRemoved => {
                ServerEvent::VoteRemoved(serde_json::from_value(data).map_err(payload_err)?)
            }
            EventKind::UserConnected => {
                ServerEvent::UserConnected(serde_json::from_value(data).map_err(payload_err)?)
            }
            EventKind::UserDisconnected => {
                ServerEvent::UserDisconnected(serde_json::from_value(data).map_err(payload_err)?)
            }
        };
        Ok(Some(event))
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// A push envelope that could not be decoded.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Not JSON, or no `type` field.
    #[error("malformed event envelope: {0}")]
    Envelope(#[from] serde_json::Error),
    /// Known tag, wrong payload shape.
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// Tests
// ============================================================================
