//! Optimistic mutator: local actions applied before the backend answers.
//!
//! Every action is split in two. A synchronous `begin_*` step checks the
//! action is allowed, applies whatever is applied optimistically, and hands
//! back a ticket describing the request to send. The matching `complete_*`
//! step takes that ticket together with the backend's outcome and confirms,
//! rolls back, or (when newer state has since replaced ours) leaves the room
//! alone.
//!
//! | Action        | Before the reply                | On rejection                   |
//! |---------------|---------------------------------|--------------------------------|
//! | cast vote     | provisional vote, card selected | restore previous / drop vote   |
//! | retract vote  | nothing                         | nothing                        |
//! | create story  | draft kept                      | draft kept                     |
//! | remove story  | story removed                   | re-inserted at its old index   |
//! | end story     | `ended = true`, statistics      | `ended = false`, statistics    |
//! | select story  | pointer moved, selection lowered| votes left as they were        |
//! | leave         | nothing                         | nothing                        |
//!
//! A transport failure is handled exactly like a `KO` reply.

use storypoint_types::{CardId, NewStory, Story, StoryId, Username, Vote, VoteId};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{confirmed, BackendError, Outcome};
use crate::derived;
use crate::index::{Keyed, VoteKey};
use crate::room::{ActionKind, ChangeCause, Room};

// ============================================================================
// Errors and outcomes
// ============================================================================

/// A local action refused before anything was sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionRejected {
    #[error("no story is active")]
    NoActiveStory,
    #[error("story {0} has ended")]
    StoryEnded(StoryId),
    #[error("card {0} is not in the deck")]
    UnknownCard(CardId),
    #[error("no vote to retract")]
    NothingToRetract,
    #[error("vote is still waiting for the backend")]
    VoteInFlight,
    #[error("story name is blank")]
    BlankStoryName,
    #[error("unknown story {0}")]
    UnknownStory(StoryId),
    #[error("story {0} already ended")]
    AlreadyEnded(StoryId),
    #[error("room is closed")]
    Closed,
}

/// How a backend outcome was reconciled with the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The backend accepted the action.
    Confirmed,
    /// The backend refused; the optimistic change was undone.
    RolledBack,
    /// The backend refused; nothing had been applied, so nothing changed.
    Declined,
    /// The outcome no longer applies: newer state replaced what was sent.
    Stale,
}

// ============================================================================
// Tickets
// ============================================================================

/// A vote cast, awaiting the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVote {
    /// The local user's vote on the story before this cast.
    previous: Option<Vote>,
    request: Vote,
}

impl PendingVote {
    /// The vote to create, or update when it carries an id.
    pub fn request(&self) -> &Vote {
        &self.request
    }

    pub fn story_id(&self) -> &StoryId {
        &self.request.story_id
    }
}

/// A vote retraction, awaiting the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRetract {
    vote_id: VoteId,
    story_id: StoryId,
    value: CardId,
}

impl PendingRetract {
    pub fn vote_id(&self) -> &VoteId {
        &self.vote_id
    }
}

/// A story creation, awaiting the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingStory {
    request: NewStory,
}

impl PendingStory {
    pub fn request(&self) -> &NewStory {
        &self.request
    }
}

/// A story removed locally, awaiting the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRemoval {
    /// Position the story held before removal.
    index: usize,
    story: Story,
}

impl PendingRemoval {
    pub fn story_id(&self) -> &StoryId {
        &self.story.story_id
    }
}

/// A story ended locally, awaiting the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEnd {
    story_id: StoryId,
}

impl PendingEnd {
    pub fn story_id(&self) -> &StoryId {
        &self.story_id
    }
}

/// Fetch of the votes already cast on a story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteFetch {
    story_id: StoryId,
}

impl VoteFetch {
    pub fn new(story_id: StoryId) -> Self {
        Self { story_id }
    }

    pub fn story_id(&self) -> &StoryId {
        &self.story_id
    }
}

/// The local user leaving, awaiting the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLeave {
    username: Username,
}

impl PendingLeave {
    pub fn username(&self) -> &Username {
        &self.username
    }
}

/// What clicking a card turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardAction {
    Cast(PendingVote),
    Retract(PendingRetract),
}

// ============================================================================
// Actions
// ============================================================================

impl Room {
    fn ensure_open(&self) -> Result<(), ActionRejected> {
        if self.closed {
            return Err(ActionRejected::Closed);
        }
        Ok(())
    }

    /// The active story, provided votes can still change on it.
    fn votable_story(&self) -> Result<&Story, ActionRejected> {
        self.ensure_open()?;
        let story = self.active_story().ok_or(ActionRejected::NoActiveStory)?;
        if story.ended {
            return Err(ActionRejected::StoryEnded(story.story_id.clone()));
        }
        Ok(story)
    }

    fn notify_action(&mut self, kind: ActionKind) {
        self.notify(ChangeCause::Action(kind));
    }

    fn reannotate_local_user(&mut self) {
        let local = self.local_user().clone();
        derived::annotate_user(&mut self.store, self.active_story.as_ref(), &local);
    }

    /// Click on a card: the selected card retracts the vote, any other casts.
    pub fn select_card(&mut self, card: CardId) -> Result<CardAction, ActionRejected> {
        if self.selection.is_selected(&card) {
            self.begin_retract_vote().map(CardAction::Retract)
        } else {
            self.begin_cast_vote(card).map(CardAction::Cast)
        }
    }

    // ── Cast ─────────────────────────────────────────────────────────────

    /// Store a provisional vote for `card` on the active story and select it.
    ///
    /// Changing an estimate reuses the existing vote id so the backend
    /// updates instead of creating.
    pub fn begin_cast_vote(&mut self, card: CardId) -> Result<PendingVote, ActionRejected> {
        let story_id = self.votable_story()?.story_id.clone();
        if self.store.card(&card).is_none() {
            return Err(ActionRejected::UnknownCard(card));
        }

        let previous = self.current_vote().cloned();
        let request = Vote {
            vote_id: previous.as_ref().and_then(|v| v.vote_id.clone()),
            session_id: self.session().session_id.clone(),
            story_id,
            username: self.local_user().clone(),
            value: card.clone(),
        };

        debug!("casting {} on {}", card, request.story_id);
        self.store.merge_vote(request.clone());
        self.selection.select(card);
        self.reannotate_local_user();
        self.notify_action(ActionKind::CastVote);

        Ok(PendingVote { previous, request })
    }

    /// Reconcile a cast with the backend's answer.
    ///
    /// Whatever the outcome, the selected card ends up matching the local
    /// user's stored vote on the active story.
    pub fn complete_cast_vote(&mut self, pending: PendingVote, outcome: Outcome<Vote>) -> Settlement {
        if confirmed(&outcome) {
            match outcome.ok().and_then(|reply| reply.data) {
                Some(vote) => {
                    debug!("vote {:?} confirmed", vote.vote_id);
                    self.store.merge_vote(vote);
                }
                None => debug!("vote confirmed without a record, keeping provisional"),
            }
            self.reselect_own_card();
            self.reannotate_local_user();
            self.recompute_statistics();
            self.notify_action(ActionKind::CastVote);
            return Settlement::Confirmed;
        }

        let PendingVote { previous, request } = pending;
        warn!("vote on {} rejected: {}", request.story_id, describe(&outcome));

        // A later cast or a fetched snapshot owns the record now.
        if self.store.votes().get(&request.key()) != Some(&request) {
            debug!("rejected vote already superseded");
            if self.reselect_own_card() {
                self.notify_action(ActionKind::CastVote);
            }
            return Settlement::Stale;
        }

        match previous {
            Some(previous) => {
                self.store.merge_vote(previous);
            }
            None => {
                self.store.votes_mut().remove(&request.key());
            }
        }
        self.reselect_own_card();
        self.reannotate_local_user();
        self.recompute_statistics();
        self.notify_action(ActionKind::CastVote);
        Settlement::RolledBack
    }

    /// Select the card of the local user's vote on the active story, or
    /// nothing. Returns whether the selection changed.
    fn reselect_own_card(&mut self) -> bool {
        let before = self.selection.selected().cloned();
        match self.current_vote().map(|v| v.value.clone()) {
            Some(value) => self.selection.select(value),
            None => self.selection.clear(),
        }
        self.selection.selected() != before.as_ref()
    }

    // ── Retract ──────────────────────────────────────────────────────────

    /// Ask to retract the local user's vote on the active story.
    ///
    /// Nothing changes locally until the backend confirms.
    pub fn begin_retract_vote(&mut self) -> Result<PendingRetract, ActionRejected> {
        self.votable_story()?;
        let vote = self.current_vote().ok_or(ActionRejected::NothingToRetract)?;
        let vote_id = vote.vote_id.clone().ok_or(ActionRejected::VoteInFlight)?;
        Ok(PendingRetract {
            vote_id,
            story_id: vote.story_id.clone(),
            value: vote.value.clone(),
        })
    }

    pub fn complete_retract_vote(&mut self, pending: PendingRetract, outcome: Outcome<()>) -> Settlement {
        if !confirmed(&outcome) {
            warn!("retracting vote {} rejected: {}", pending.vote_id, describe(&outcome));
            return Settlement::Declined;
        }

        let removed = self.store.votes_mut().remove(&VoteKey::Persisted(pending.vote_id.clone()));
        if removed.is_none() {
            debug!("retracted vote {} already gone", pending.vote_id);
            return Settlement::Stale;
        }
        if self.is_active(&pending.story_id) && self.selection.is_selected(&pending.value) {
            self.selection.clear();
        }
        self.reannotate_local_user();
        self.recompute_statistics();
        self.notify_action(ActionKind::RetractVote);
        Settlement::Confirmed
    }

    // ── Stories ──────────────────────────────────────────────────────────

    /// Request a new story named `name`, ranked after the existing ones.
    ///
    /// The name is kept as the draft until the backend confirms.
    pub fn begin_create_story(&mut self, name: &str) -> Result<PendingStory, ActionRejected> {
        self.ensure_open()?;
        if name.trim().is_empty() {
            return Err(ActionRejected::BlankStoryName);
        }
        if self.draft_story_name != name {
            self.draft_story_name = name.to_string();
            self.notify_action(ActionKind::CreateStory);
        }
        let order = u32::try_from(self.store.stories().len()).unwrap_or(u32::MAX).saturating_add(1);
        Ok(PendingStory {
            request: NewStory {
                session_id: self.session().session_id.clone(),
                story_name: name.to_string(),
                order,
            },
        })
    }

    pub fn complete_create_story(&mut self, pending: PendingStory, outcome: Outcome<Story>) -> Settlement {
        if !confirmed(&outcome) {
            warn!("creating story {:?} rejected: {}", pending.request.story_name, describe(&outcome));
            return Settlement::Declined;
        }
        if let Some(story) = outcome.ok().and_then(|reply| reply.data) {
            info!("story {} created", story.story_id);
            // The STORY_ADDED echo may have landed first.
            self.store.stories_mut().upsert(story);
        }
        self.draft_story_name.clear();
        self.notify_action(ActionKind::CreateStory);
        Settlement::Confirmed
    }

    /// Remove a story locally and ask the backend to delete it.
    pub fn begin_remove_story(&mut self, story_id: &StoryId) -> Result<PendingRemoval, ActionRejected> {
        self.ensure_open()?;
        let (index, story) = self
            .store
            .stories_mut()
            .remove(story_id)
            .ok_or_else(|| ActionRejected::UnknownStory(story_id.clone()))?;
        if self.is_active(story_id) {
            self.recompute_statistics();
        }
        self.notify_action(ActionKind::RemoveStory);
        Ok(PendingRemoval { index, story })
    }

    pub fn complete_remove_story(&mut self, pending: PendingRemoval, outcome: Outcome<()>) -> Settlement {
        if confirmed(&outcome) {
            return Settlement::Confirmed;
        }
        let PendingRemoval { index, story } = pending;
        warn!("removing story {} rejected: {}", story.story_id, describe(&outcome));

        let story_id = story.story_id.clone();
        if !self.store.stories_mut().restore(index, story) {
            return Settlement::Stale;
        }
        if self.is_active(&story_id) {
            self.recompute_statistics();
        }
        self.notify_action(ActionKind::RemoveStory);
        Settlement::RolledBack
    }

    /// End the active story locally, revealing statistics.
    pub fn begin_end_story(&mut self) -> Result<PendingEnd, ActionRejected> {
        self.ensure_open()?;
        let story = self.active_story().ok_or(ActionRejected::NoActiveStory)?;
        let story_id = story.story_id.clone();
        if story.ended {
            return Err(ActionRejected::AlreadyEnded(story_id));
        }
        self.store.stories_mut().update(&story_id, |s| s.ended = true);
        self.recompute_statistics();
        self.notify_action(ActionKind::EndStory);
        Ok(PendingEnd { story_id })
    }

    pub fn complete_end_story(&mut self, pending: PendingEnd, outcome: Outcome<()>) -> Settlement {
        if confirmed(&outcome) {
            let before = self.statistics.clone();
            self.recompute_statistics();
            if self.statistics != before {
                self.notify_action(ActionKind::EndStory);
            }
            return Settlement::Confirmed;
        }

        warn!("ending story {} rejected: {}", pending.story_id, describe(&outcome));
        let ended = self.store.stories().get(&pending.story_id).is_some_and(|s| s.ended);
        if !ended {
            return Settlement::Stale;
        }
        self.store.stories_mut().update(&pending.story_id, |s| s.ended = false);
        self.recompute_statistics();
        self.notify_action(ActionKind::EndStory);
        Settlement::RolledBack
    }

    // ── Navigation ───────────────────────────────────────────────────────

    /// Make `story_id` the active story. Its votes have to be fetched.
    pub fn select_story(&mut self, story_id: &StoryId) -> Result<VoteFetch, ActionRejected> {
        self.ensure_open()?;
        if !self.store.stories().contains(story_id) {
            return Err(ActionRejected::UnknownStory(story_id.clone()));
        }
        debug!("selecting story {}", story_id);
        self.active_story = Some(story_id.clone());
        self.selection.clear();
        self.refresh_derived();
        self.notify_action(ActionKind::SelectStory);
        Ok(VoteFetch::new(story_id.clone()))
    }

    /// Replace the votes with the fetched snapshot of the active story.
    ///
    /// Local votes still waiting for an id survive unless the snapshot
    /// already has a vote for the same pair. The local user's card is
    /// selected again from their fetched vote.
    pub fn complete_vote_fetch(
        &mut self,
        fetch: VoteFetch,
        outcome: Result<Vec<Vote>, BackendError>,
    ) -> Settlement {
        if !self.is_active(&fetch.story_id) {
            debug!("dropping votes of {}, no longer active", fetch.story_id);
            return Settlement::Stale;
        }
        let votes = match outcome {
            Ok(votes) => votes,
            Err(e) => {
                warn!("fetching votes of {} failed: {}", fetch.story_id, e);
                return Settlement::Declined;
            }
        };

        let pending: Vec<Vote> = self
            .store
            .votes()
            .iter()
            .filter(|v| !v.is_persisted())
            .filter(|v| !votes.iter().any(|s| s.is_for(&v.story_id, &v.username)))
            .cloned()
            .collect();
        debug!("{} votes on {}, {} pending kept", votes.len(), fetch.story_id, pending.len());
        self.store.replace_votes(votes.into_iter().chain(pending));

        self.reselect_own_card();
        self.refresh_derived();
        self.notify_action(ActionKind::VotesLoaded);
        Settlement::Confirmed
    }

    // ── Leave ────────────────────────────────────────────────────────────

    pub fn begin_leave(&mut self) -> Result<PendingLeave, ActionRejected> {
        self.ensure_open()?;
        Ok(PendingLeave { username: self.local_user().clone() })
    }

    /// Close the room once the backend has disconnected the local user.
    pub fn complete_leave(&mut self, pending: PendingLeave, outcome: Outcome<()>) -> Settlement {
        if !confirmed(&outcome) {
            warn!("disconnecting {} rejected: {}", pending.username, describe(&outcome));
            return Settlement::Declined;
        }
        info!("{} left {}", pending.username, self.session().session_id);
        self.closed = true;
        self.selection.clear();
        self.notify_action(ActionKind::Leave);
        Settlement::Confirmed
    }
}

fn describe<T>(outcome: &Outcome<T>) -> String {
    match outcome {
        Ok(reply) => reply.status.to_string(),
        Err(e) => e.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
