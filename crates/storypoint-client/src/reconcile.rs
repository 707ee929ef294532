//! Event reconciliation: merging the server's push stream into the room.
//!
//! Delivery is at-least-once and unordered across event kinds, and it is not
//! correlated with this client's own requests. Every handler is therefore a
//! guarded, identity-keyed merge: a second delivery of an event that already
//! took effect finds nothing left to do and is reported as skipped.
//!
//! | Event               | Merge                                           |
//! |---------------------|-------------------------------------------------|
//! | `STORY_ADDED`       | insert if absent                                |
//! | `STORY_REMOVED`     | remove by id                                    |
//! | `STORY_ENDED`       | set `ended`, recompute statistics               |
//! | `VOTE_ADDED`        | merge vote, annotate its user                   |
//! | `VOTE_REMOVED`      | clear annotations, remove vote (others only)    |
//! | `USER_CONNECTED`    | insert if absent, annotate from known votes     |
//! | `USER_DISCONNECTED` | remove by username                              |

use storypoint_types::{Story, StoryId, User, Username, Vote, VoteId};
use tracing::{debug, trace};

use crate::derived;
use crate::index::{Keyed, VoteKey};
use crate::room::{ChangeCause, Room};
use crate::subscriptions::ServerEvent;

/// Result of applying one push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The room changed; observers were notified.
    Applied,
    /// Nothing changed (see reason).
    Skipped { reason: SkipReason },
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied)
    }

    fn skipped(reason: SkipReason) -> Self {
        ApplyOutcome::Skipped { reason }
    }
}

/// Why an event left the room untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The record is already in its collection (duplicate or own echo).
    AlreadyPresent,
    /// The record the event refers to is not known locally.
    NotFound,
    /// The event echoes the local user's own retraction, already applied.
    OwnEcho,
    /// The record already has the state the event describes.
    Unchanged,
}

impl Room {
    /// Apply one push event. Notifies observers once if anything changed.
    pub fn apply(&mut self, event: &ServerEvent) -> ApplyOutcome {
        if self.closed {
            trace!("room closed, dropping {}", event.kind());
            return ApplyOutcome::skipped(SkipReason::Unchanged);
        }

        let outcome = match event {
            ServerEvent::StoryAdded(story) => self.on_story_added(story),
            ServerEvent::StoryRemoved(story_id) => self.on_story_removed(story_id),
            ServerEvent::StoryEnded(story_id) => self.on_story_ended(story_id),
            ServerEvent::VoteAdded(vote) => self.on_vote_added(vote),
            ServerEvent::VoteRemoved(vote_id) => self.on_vote_removed(vote_id),
            ServerEvent::UserConnected(user) => self.on_user_connected(user),
            ServerEvent::UserDisconnected(username) => self.on_user_disconnected(username),
        };

        match &outcome {
            ApplyOutcome::Applied => self.notify(ChangeCause::Event(event.kind())),
            ApplyOutcome::Skipped { reason } => {
                debug!("{} skipped: {:?}", event.kind(), reason);
            }
        }
        outcome
    }

    fn on_story_added(&mut self, story: &Story) -> ApplyOutcome {
        if !self.store.stories_mut().insert_absent(story.clone()) {
            return ApplyOutcome::skipped(SkipReason::AlreadyPresent);
        }
        ApplyOutcome::Applied
    }

    fn on_story_removed(&mut self, story_id: &StoryId) -> ApplyOutcome {
        if self.store.stories_mut().remove(story_id).is_none() {
            return ApplyOutcome::skipped(SkipReason::NotFound);
        }
        if self.is_active(story_id) {
            self.recompute_statistics();
        }
        ApplyOutcome::Applied
    }

    fn on_story_ended(&mut self, story_id: &StoryId) -> ApplyOutcome {
        let Some(story) = self.store.stories().get(story_id) else {
            return ApplyOutcome::skipped(SkipReason::NotFound);
        };
        if story.ended {
            return ApplyOutcome::skipped(SkipReason::Unchanged);
        }
        self.store.stories_mut().update(story_id, |s| s.ended = true);
        self.recompute_statistics();
        ApplyOutcome::Applied
    }

    fn on_vote_added(&mut self, vote: &Vote) -> ApplyOutcome {
        if self.store.votes().get(&vote.key()) == Some(vote) {
            return ApplyOutcome::skipped(SkipReason::Unchanged);
        }
        self.store.merge_vote(vote.clone());

        if self.is_active(&vote.story_id) {
            // The roster may not have caught up yet; the user's own
            // USER_CONNECTED annotates them from the stored vote.
            let value = vote.value.clone();
            let found = self
                .store
                .users_mut()
                .update(&vote.username, |u| u.set_vote(value));
            if !found {
                trace!("vote from {} before they joined the roster", vote.username);
            }
            self.recompute_statistics();
        }
        ApplyOutcome::Applied
    }

    fn on_vote_removed(&mut self, vote_id: &VoteId) -> ApplyOutcome {
        let key = VoteKey::Persisted(vote_id.clone());
        let Some(vote) = self.store.votes().get(&key) else {
            return ApplyOutcome::skipped(SkipReason::NotFound);
        };
        if vote.username == *self.local_user() {
            return ApplyOutcome::skipped(SkipReason::OwnEcho);
        }

        let username = vote.username.clone();
        let on_active = self.is_active(&vote.story_id);
        if on_active {
            self.store.users_mut().update(&username, User::clear_vote);
        }
        self.store.votes_mut().remove(&key);
        if on_active {
            self.recompute_statistics();
        }
        ApplyOutcome::Applied
    }

    fn on_user_connected(&mut self, user: &User) -> ApplyOutcome {
        let username = user.username.clone();
        if !self.store.users_mut().insert_absent(user.clone()) {
            return ApplyOutcome::skipped(SkipReason::AlreadyPresent);
        }
        derived::annotate_user(&mut self.store, self.active_story.as_ref(), &username);
        ApplyOutcome::Applied
    }

    fn on_user_disconnected(&mut self, username: &Username) -> ApplyOutcome {
        if self.store.users_mut().remove(username).is_none() {
            return ApplyOutcome::skipped(SkipReason::NotFound);
        }
        ApplyOutcome::Applied
    }
}

// ============================================================================
// Tests
// ============================================================================
