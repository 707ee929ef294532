//! Session, story, user, and vote records.
//!
//! Field names follow the backend's camelCase JSON. Records are plain data:
//! the client crate decides how they are stored and merged.

use serde::{Deserialize, Serialize};

use crate::deck::DeckKind;
use crate::ids::{CardId, SessionId, StoryId, Username, VoteId};

/// Session descriptor. Loaded once when the room opens and never changed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: SessionId,
    /// Display name of the room.
    pub sprint_name: String,
    pub card_set: DeckKind,
}

/// A story being estimated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub story_id: StoryId,
    pub session_id: SessionId,
    pub story_name: String,
    /// Display rank, 1-based, matches creation order.
    pub order: u32,
    #[serde(default)]
    pub ended: bool,
}

/// Body of a story creation request. The backend assigns the id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStory {
    pub session_id: SessionId,
    pub story_name: String,
    pub order: u32,
}

/// A connected participant.
///
/// `has_voted` and `vote` are derived locally from the votes of the active
/// story. They never cross the wire in either direction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: Username,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(skip)]
    pub has_voted: bool,
    #[serde(skip)]
    pub vote: Option<CardId>,
}

impl User {
    pub fn new(username: impl Into<Username>) -> Self {
        Self {
            username: username.into(),
            session_id: None,
            has_voted: false,
            vote: None,
        }
    }

    /// Clear the derived vote annotations.
    pub fn clear_vote(&mut self) {
        self.has_voted = false;
        self.vote = None;
    }

    pub fn set_vote(&mut self, value: CardId) {
        self.has_voted = true;
        self.vote = Some(value);
    }
}

/// One participant's estimate for one story.
///
/// `vote_id` is `None` while the vote is in flight and the backend has not
/// yet assigned an id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_id: Option<VoteId>,
    pub session_id: SessionId,
    pub story_id: StoryId,
    pub username: Username,
    /// The id of the chosen card.
    pub value: CardId,
}

impl Vote {
    pub fn is_persisted(&self) -> bool {
        self.vote_id.is_some()
    }

    /// Whether this vote was cast by `username` for `story_id`.
    pub fn is_for(&self, story_id: &StoryId, username: &Username) -> bool {
        self.story_id == *story_id && self.username == *username
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_story_wire_shape() {
        let json = r#"{"storyId":"s1","sessionId":"room","storyName":"Login page","order":1}"#;
        let story: Story = serde_json::from_str(json).unwrap();
        assert_eq!(
            story,
            Story {
                story_id: StoryId::from("s1"),
                session_id: SessionId::from("room"),
                story_name: "Login page".into(),
                order: 1,
                ended: false,
            }
        );
    }

    #[test]
    fn test_user_annotations_never_serialized() {
        let mut user = User::new("amy");
        user.set_vote(CardId::from("5"));
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json, serde_json::json!({ "username": "amy" }));
    }

    #[test]
    fn test_user_annotations_ignored_on_input() {
        let json = r#"{"username":"bob","sessionId":"room","hasVoted":true,"vote":"8"}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert!(!user.has_voted);
        assert_eq!(user.vote, None);
    }

    #[test]
    fn test_pending_vote_omits_id() {
        let vote = Vote {
            vote_id: None,
            session_id: SessionId::from("room"),
            story_id: StoryId::from("s1"),
            username: Username::from("amy"),
            value: CardId::from("3"),
        };
        let json = serde_json::to_value(&vote).unwrap();
        assert!(json.get("voteId").is_none());
        assert_eq!(json["value"], "3");
        assert!(!vote.is_persisted());
        assert!(vote.is_for(&StoryId::from("s1"), &Username::from("amy")));
    }

    #[test]
    fn test_session_deck() {
        let json = r#"{"sessionId":"room","sprintName":"Sprint 12","cardSet":"fibonacci"}"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.card_set, DeckKind::Fibonacci);
    }

    #[test]
    fn test_session_with_unlisted_deck_name() {
        let json = r#"{"sessionId":"r","sprintName":"s","cardSet":"modifiedFibonacci"}"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.card_set, DeckKind::ModifiedFibonacci);
    }
}
