//! The room: one participant's local view of an estimation session.
//!
//! [`Room`] owns the [`EntityStore`] and the per-client state around it (the
//! active story, the local user, the selected card, statistics, the story
//! draft). Inbound events are merged by [`Room::apply`] (see `reconcile`),
//! local actions by the `begin_*`/`complete_*` pairs in `optimistic`. Both
//! paths end in [`Room::notify`], which bumps the version and tells observers
//! exactly once per change.
//!
//! The room is plain synchronous state with no I/O. The async driver lives
//! in [`crate::actor`].

use serde::{Deserialize, Serialize};
use storypoint_types::{
    Card, CardColor, CardId, EventKind, Session, Story, StoryId, User, Username, Vote,
};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::constants::DEFAULT_CHANGE_CAPACITY;
use crate::derived::{self, CardSelection, Statistics};
use crate::optimistic::VoteFetch;
use crate::store::{Collection, EntityStore};

/// Everything the session bootstrap hands over before the room activates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBootstrap {
    pub session: Session,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub stories: Vec<Story>,
}

/// Error building a room from a bootstrap snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    /// The local user is not on the session's roster.
    #[error("user {0} is not connected to session {1}")]
    UnknownUser(Username, String),
}

/// Local actions, as reported in [`ChangeCause::Action`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    SelectStory,
    VotesLoaded,
    CastVote,
    RetractVote,
    CreateStory,
    RemoveStory,
    EndStory,
    Leave,
}

/// Why the room changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeCause {
    /// A push event was applied.
    Event(EventKind),
    /// A local action, or the backend's answer to one, was applied.
    Action(ActionKind),
}

/// Notification sent to observers after every change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoomChange {
    /// Room version after the change.
    pub version: u64,
    pub cause: ChangeCause,
}

/// A user as rendered: the roster entry plus its derived vote annotations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub username: Username,
    pub has_voted: bool,
    pub vote: Option<CardId>,
    /// Only set once the active story has ended.
    pub color: Option<CardColor>,
}

/// Owned snapshot of everything a renderer needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoomView {
    pub version: u64,
    pub session: Session,
    pub active_story: Option<Story>,
    pub stories: Vec<Story>,
    pub users: Vec<UserView>,
    /// Votes on the active story.
    pub votes: Vec<Vote>,
    pub cards: Vec<Card>,
    pub selected_card: Option<CardId>,
    pub statistics: Statistics,
    pub draft_story_name: String,
    pub closed: bool,
}

/// One participant's local state for a session.
pub struct Room {
    session: Session,
    local_user: Username,
    pub(crate) store: EntityStore,
    /// Pointer into the stories collection, not ownership. May dangle if the
    /// story is removed.
    pub(crate) active_story: Option<StoryId>,
    pub(crate) selection: CardSelection,
    pub(crate) statistics: Statistics,
    pub(crate) draft_story_name: String,
    pub(crate) closed: bool,
    version: u64,
    changes: broadcast::Sender<RoomChange>,
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("session", &self.session.session_id)
            .field("local_user", &self.local_user)
            .field("active_story", &self.active_story)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl Room {
    /// Build a room from the bootstrap snapshot, with the first story active.
    ///
    /// Votes are not part of the snapshot: fetch them with
    /// [`Room::initial_fetch`].
    pub fn bootstrap(
        bootstrap: SessionBootstrap,
        local_user: Username,
    ) -> Result<Self, BootstrapError> {
        let SessionBootstrap { session, users, stories } = bootstrap;
        let users = Collection::from_records(users);
        if !users.contains(&local_user) {
            return Err(BootstrapError::UnknownUser(
                local_user,
                session.session_id.to_string(),
            ));
        }

        let mut store = EntityStore::new(session.card_set);
        *store.users_mut() = users;
        *store.stories_mut() = Collection::from_records(stories);
        let active_story = store.stories().iter().next().map(|s| s.story_id.clone());

        info!(
            "room {} ({}) ready for {}: {} users, {} stories, {} deck",
            session.session_id,
            session.sprint_name,
            local_user,
            store.users().len(),
            store.stories().len(),
            session.card_set
        );

        let (changes, _) = broadcast::channel(DEFAULT_CHANGE_CAPACITY);
        let mut room = Self {
            session,
            local_user,
            store,
            active_story,
            selection: CardSelection::default(),
            statistics: Statistics::default(),
            draft_story_name: String::new(),
            closed: false,
            version: 0,
            changes,
        };
        room.refresh_derived();
        Ok(room)
    }

    /// Vote fetch for the story made active by [`Room::bootstrap`].
    pub fn initial_fetch(&self) -> Option<VoteFetch> {
        self.active_story().map(|s| VoteFetch::new(s.story_id.clone()))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn local_user(&self) -> &Username {
        &self.local_user
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Version counter, bumped once per applied change.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn active_story_id(&self) -> Option<&StoryId> {
        self.active_story.as_ref()
    }

    /// The active story, if it is still in the stories collection.
    pub fn active_story(&self) -> Option<&Story> {
        self.active_story
            .as_ref()
            .and_then(|id| self.store.stories().get(id))
    }

    /// The local user's vote on the active story, pending or persisted.
    pub fn current_vote(&self) -> Option<&Vote> {
        let story_id = self.active_story.as_ref()?;
        self.store
            .votes()
            .iter()
            .find(|v| v.is_for(story_id, &self.local_user))
    }

    /// Votes on the active story, in arrival order.
    pub fn active_votes(&self) -> impl Iterator<Item = &Vote> {
        let story_id = self.active_story.clone();
        self.store
            .votes()
            .iter()
            .filter(move |v| Some(&v.story_id) == story_id.as_ref())
    }

    pub fn selection(&self) -> &CardSelection {
        &self.selection
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn draft_story_name(&self) -> &str {
        &self.draft_story_name
    }

    /// Whether the local user has left the room.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Color shown behind a vote value, revealed once the active story ends.
    pub fn vote_color(&self, value: &CardId) -> Option<CardColor> {
        derived::vote_color(&self.store, self.active_story(), value)
    }

    /// Owned snapshot for rendering.
    pub fn view(&self) -> RoomView {
        let users = self
            .store
            .users()
            .iter()
            .map(|u| UserView {
                username: u.username.clone(),
                has_voted: u.has_voted,
                vote: u.vote.clone(),
                color: u.vote.as_ref().and_then(|v| self.vote_color(v)),
            })
            .collect();

        RoomView {
            version: self.version,
            session: self.session.clone(),
            active_story: self.active_story().cloned(),
            stories: self.store.stories().as_slice().to_vec(),
            users,
            votes: self.active_votes().cloned().collect(),
            cards: self.store.cards().to_vec(),
            selected_card: self.selection.selected().cloned(),
            statistics: self.statistics.clone(),
            draft_story_name: self.draft_story_name.clone(),
            closed: self.closed,
        }
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomChange> {
        self.changes.subscribe()
    }

    pub(crate) fn change_sender(&self) -> broadcast::Sender<RoomChange> {
        self.changes.clone()
    }

    /// Bump the version and tell observers what changed.
    pub(crate) fn notify(&mut self, cause: ChangeCause) {
        self.version = self.version.wrapping_add(1);
        debug!("room v{} after {:?}", self.version, cause);
        // No subscribers is fine.
        let _ = self.changes.send(RoomChange { version: self.version, cause });
    }

    // =========================================================================
    // Derived state
    // =========================================================================

    pub(crate) fn recompute_annotations(&mut self) {
        derived::recompute_user_annotations(&mut self.store, self.active_story.as_ref());
    }

    pub(crate) fn recompute_statistics(&mut self) {
        let stats = derived::recompute_statistics(&self.store, self.active_story());
        self.statistics = stats;
    }

    /// Recompute every derived value from the collections.
    pub(crate) fn refresh_derived(&mut self) {
        self.recompute_annotations();
        self.recompute_statistics();
    }

    pub(crate) fn is_active(&self, story_id: &StoryId) -> bool {
        self.active_story.as_ref() == Some(story_id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use storypoint_types::{DeckKind, SessionId, VoteId};

    pub(crate) fn session() -> Session {
        Session {
            session_id: SessionId::from("room"),
            sprint_name: "Sprint 12".into(),
            card_set: DeckKind::Fibonacci,
        }
    }

    pub(crate) fn story(id: &str, order: u32) -> Story {
        Story {
            story_id: StoryId::from(id),
            session_id: SessionId::from("room"),
            story_name: format!("story {id}"),
            order,
            ended: false,
        }
    }

    pub(crate) fn vote(id: Option<&str>, story: &str, user: &str, value: &str) -> Vote {
        Vote {
            vote_id: id.map(VoteId::from),
            session_id: SessionId::from("room"),
            story_id: StoryId::from(story),
            username: Username::from(user),
            value: CardId::from(value),
        }
    }

    /// Room for `amy` with roster [amy, bob] and stories [s1, s2], s1 active.
    pub(crate) fn room() -> Room {
        Room::bootstrap(
            SessionBootstrap {
                session: session(),
                users: vec![User::new("amy"), User::new("bob")],
                stories: vec![story("s1", 1), story("s2", 2)],
            },
            Username::from("amy"),
        )
        .unwrap()
    }

    pub(crate) fn user<'a>(room: &'a Room, name: &str) -> Option<&'a User> {
        room.store().users().get(&Username::from(name))
    }

    #[test]
    fn test_bootstrap_selects_first_story() {
        let room = room();
        assert_eq!(room.active_story_id(), Some(&StoryId::from("s1")));
        assert_eq!(room.initial_fetch(), Some(VoteFetch::new(StoryId::from("s1"))));
        assert_eq!(room.version(), 0);
        assert!(room.statistics().is_unset());
        assert_eq!(room.store().cards().len(), DeckKind::Fibonacci.cards().len());
    }

    #[test]
    fn test_bootstrap_rejects_unknown_user() {
        let err = Room::bootstrap(
            SessionBootstrap { session: session(), users: vec![User::new("bob")], stories: vec![] },
            Username::from("amy"),
        )
        .unwrap_err();
        assert_eq!(err, BootstrapError::UnknownUser(Username::from("amy"), "room".into()));
    }

    #[test]
    fn test_bootstrap_without_stories() {
        let room = Room::bootstrap(
            SessionBootstrap { session: session(), users: vec![User::new("amy")], stories: vec![] },
            Username::from("amy"),
        )
        .unwrap();
        assert_eq!(room.active_story(), None);
        assert_eq!(room.initial_fetch(), None);
        assert_eq!(room.current_vote(), None);
    }

    #[test]
    fn test_notify_bumps_version_once() {
        let mut room = room();
        let mut rx = room.subscribe();
        room.notify(ChangeCause::Action(ActionKind::CastVote));
        let change = rx.try_recv().unwrap();
        assert_eq!(change.version, 1);
        assert_eq!(change.cause, ChangeCause::Action(ActionKind::CastVote));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_current_vote_is_local_vote_on_active_story() {
        let mut room = room();
        room.store.merge_vote(vote(Some("v1"), "s2", "amy", "3"));
        room.store.merge_vote(vote(Some("v2"), "s1", "bob", "5"));
        assert_eq!(room.current_vote(), None);

        room.store.merge_vote(vote(Some("v3"), "s1", "amy", "8"));
        assert_eq!(room.current_vote().unwrap().vote_id, Some(VoteId::from("v3")));
        assert_eq!(room.active_votes().count(), 2);
    }

    #[test]
    fn test_view_reveals_colors_only_when_ended() {
        let mut room = room();
        room.store.merge_vote(vote(Some("v1"), "s1", "bob", "89"));
        room.refresh_derived();
        let view = room.view();
        let bob = view.users.iter().find(|u| u.username == "bob").unwrap();
        assert!(bob.has_voted);
        assert_eq!(bob.color, None);

        room.store.stories_mut().update(&StoryId::from("s1"), |s| s.ended = true);
        room.refresh_derived();
        let view = room.view();
        let bob = view.users.iter().find(|u| u.username == "bob").unwrap();
        assert_eq!(bob.color, Some(CardColor::Red));
        assert_eq!(view.statistics.max, "89");
    }
}
