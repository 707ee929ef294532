//! Entity store: the room's ordered collections.
//!
//! [`Collection`] is an ordered `Vec` whose only mutators are identity-keyed:
//! upsert, remove, restore, and in-place update. That keeps the invariant
//! that no two records of a kind share an identity, whatever order events and
//! optimistic actions arrive in. [`EntityStore`] groups the four collections
//! of a room; the card deck is loaded once and never changes.

use storypoint_types::{Card, CardId, DeckKind, Story, User, Vote};
use tracing::trace;

use crate::index::{locate, Keyed, VoteKey};

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    /// The record was new and was appended.
    Inserted,
    /// A record with the same identity was replaced in place.
    Replaced,
}

/// An ordered collection with identity-based deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection<T> {
    items: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Keyed> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a snapshot. Later duplicates replace earlier ones in place.
    pub fn from_records(records: impl IntoIterator<Item = T>) -> Self {
        let mut collection = Self::new();
        for record in records {
            collection.upsert(record);
        }
        collection
    }

    // =========================================================================
    // Read
    // =========================================================================

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn locate(&self, probe: &T::Key) -> Option<usize> {
        locate(&self.items, probe)
    }

    pub fn contains(&self, probe: &T::Key) -> bool {
        self.locate(probe).is_some()
    }

    pub fn get(&self, probe: &T::Key) -> Option<&T> {
        self.locate(probe).map(|i| &self.items[i])
    }

    // =========================================================================
    // Mutate
    // =========================================================================

    /// Replace the record with the same identity in place, or append.
    pub fn upsert(&mut self, record: T) -> Upserted {
        match self.locate(&record.key()) {
            Some(i) => {
                self.items[i] = record;
                Upserted::Replaced
            }
            None => {
                self.items.push(record);
                Upserted::Inserted
            }
        }
    }

    /// Append only if no record has this identity. Returns whether it was added.
    pub fn insert_absent(&mut self, record: T) -> bool {
        if self.contains(&record.key()) {
            return false;
        }
        self.items.push(record);
        true
    }

    /// Remove the record with this identity, returning it with its position.
    ///
    /// Removing an absent identity is a no-op.
    pub fn remove(&mut self, probe: &T::Key) -> Option<(usize, T)> {
        let i = self.locate(probe)?;
        Some((i, self.items.remove(i)))
    }

    /// Put a previously removed record back at `index` (clamped to the end).
    ///
    /// If the identity reappeared in the meantime, the newer record wins and
    /// nothing is inserted.
    pub fn restore(&mut self, index: usize, record: T) -> bool {
        if self.contains(&record.key()) {
            trace!("restore skipped, {:?} already present", record.key());
            return false;
        }
        let index = index.min(self.items.len());
        self.items.insert(index, record);
        true
    }

    /// Mutate the record with this identity in place.
    ///
    /// The closure must not change identity fields. Returns whether a record
    /// was found.
    pub fn update(&mut self, probe: &T::Key, f: impl FnOnce(&mut T)) -> bool {
        match self.locate(probe) {
            Some(i) => {
                f(&mut self.items[i]);
                debug_assert!(self.items[i].matches(probe), "update changed record identity");
                true
            }
            None => false,
        }
    }

    /// Mutate every record in place. Identity fields must not change.
    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(&mut T)) {
        self.items.iter_mut().for_each(&mut f);
    }

    fn replace_at(&mut self, index: usize, record: T) {
        self.items[index] = record;
    }

    fn retain(&mut self, f: impl FnMut(&T) -> bool) {
        self.items.retain(f);
    }
}

impl<'a, T> IntoIterator for &'a Collection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// The room's stories, users, votes, and card deck.
#[derive(Debug, Clone)]
pub struct EntityStore {
    stories: Collection<Story>,
    users: Collection<User>,
    votes: Collection<Vote>,
    cards: Vec<Card>,
}

impl EntityStore {
    /// An empty store using the given deck.
    pub fn new(deck: DeckKind) -> Self {
        Self {
            stories: Collection::new(),
            users: Collection::new(),
            votes: Collection::new(),
            cards: deck.cards(),
        }
    }

    pub fn stories(&self) -> &Collection<Story> {
        &self.stories
    }

    pub fn stories_mut(&mut self) -> &mut Collection<Story> {
        &mut self.stories
    }

    pub fn users(&self) -> &Collection<User> {
        &self.users
    }

    pub fn users_mut(&mut self) -> &mut Collection<User> {
        &mut self.users
    }

    pub fn votes(&self) -> &Collection<Vote> {
        &self.votes
    }

    pub fn votes_mut(&mut self) -> &mut Collection<Vote> {
        &mut self.votes
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn card(&self, id: &CardId) -> Option<&Card> {
        locate(&self.cards, id).map(|i| &self.cards[i])
    }

    /// Ordinal position of a card within the deck.
    pub fn card_position(&self, id: &CardId) -> Option<usize> {
        locate(&self.cards, id)
    }

    /// Merge a vote, keeping at most one vote per (story, user).
    ///
    /// - A record with the same identity is replaced in place.
    /// - A persisted vote with no match by id takes the place of the pending
    ///   vote for its (story, user), which is how an in-flight vote learns
    ///   its server id.
    /// - Once a persisted vote lands, any other record for the same
    ///   (story, user) is dropped.
    pub fn merge_vote(&mut self, vote: Vote) -> Upserted {
        let persisted_id = vote.vote_id.clone();
        let story_id = vote.story_id.clone();
        let username = vote.username.clone();

        let outcome = if self.votes.contains(&vote.key()) || persisted_id.is_none() {
            self.votes.upsert(vote)
        } else {
            match self.votes.locate(&VoteKey::pending(&story_id, &username)) {
                Some(i) => {
                    trace!("promoting pending vote of {username} on {story_id}");
                    self.votes.replace_at(i, vote);
                    Upserted::Replaced
                }
                None => self.votes.upsert(vote),
            }
        };

        if let Some(id) = persisted_id {
            self.votes
                .retain(|v| !v.is_for(&story_id, &username) || v.vote_id.as_ref() == Some(&id));
        }
        outcome
    }

    /// Replace all votes with a fresh snapshot, applying the merge rule.
    pub fn replace_votes(&mut self, votes: impl IntoIterator<Item = Vote>) {
        self.votes = Collection::new();
        for vote in votes {
            self.merge_vote(vote);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
