//! Identity lookup over ordered collections.
//!
//! Every record kind names the field(s) that identify it through [`Keyed`].
//! [`locate`] scans a slice for the first record matching a probe key.
//! Collections are session-sized (tens of records), so a linear scan is all
//! that is needed and no ordering or uniqueness is assumed of the slice.

use std::fmt;

use storypoint_types::{Card, CardId, Story, StoryId, User, Username, Vote, VoteId};

/// A record kind with an identity.
pub trait Keyed {
    /// The identity probe: only the identifying field(s) of the record.
    type Key: PartialEq + Clone + fmt::Debug;

    /// This record's identity.
    fn key(&self) -> Self::Key;

    /// Whether this record has the identity `probe`.
    fn matches(&self, probe: &Self::Key) -> bool {
        self.key() == *probe
    }
}

/// Identity of a vote.
///
/// A vote the backend has persisted is identified by its id. A vote still in
/// flight has no id yet, so it is identified by the (story, user) pair it was
/// cast for; there is at most one such vote per pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VoteKey {
    Persisted(VoteId),
    Pending { story_id: StoryId, username: Username },
}

impl VoteKey {
    pub fn pending(story_id: &StoryId, username: &Username) -> Self {
        VoteKey::Pending {
            story_id: story_id.clone(),
            username: username.clone(),
        }
    }
}

impl From<VoteId> for VoteKey {
    fn from(id: VoteId) -> Self {
        VoteKey::Persisted(id)
    }
}

impl Keyed for Story {
    type Key = StoryId;

    fn key(&self) -> StoryId {
        self.story_id.clone()
    }

    fn matches(&self, probe: &StoryId) -> bool {
        self.story_id == *probe
    }
}

impl Keyed for User {
    type Key = Username;

    fn key(&self) -> Username {
        self.username.clone()
    }

    fn matches(&self, probe: &Username) -> bool {
        self.username == *probe
    }
}

impl Keyed for Card {
    type Key = CardId;

    fn key(&self) -> CardId {
        self.id.clone()
    }

    fn matches(&self, probe: &CardId) -> bool {
        self.id == *probe
    }
}

impl Keyed for Vote {
    type Key = VoteKey;

    fn key(&self) -> VoteKey {
        match &self.vote_id {
            Some(id) => VoteKey::Persisted(id.clone()),
            None => VoteKey::pending(&self.story_id, &self.username),
        }
    }

    fn matches(&self, probe: &VoteKey) -> bool {
        match (probe, &self.vote_id) {
            (VoteKey::Persisted(id), Some(own)) => own == id,
            (VoteKey::Pending { story_id, username }, None) => self.is_for(story_id, username),
            _ => false,
        }
    }
}

/// Position of the first record in `items` whose identity is `probe`.
///
/// `None` means not found. That is an ordinary outcome, not an error.
pub fn locate<T: Keyed>(items: &[T], probe: &T::Key) -> Option<usize> {
    items.iter().position(|item| item.matches(probe))
}

// ============================================================================
// Tests
// ============================================================================
