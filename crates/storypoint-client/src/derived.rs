//! Derived view state: vote annotations on users, min/max statistics, and
//! the locally selected card.
//!
//! Nothing here is authoritative. Annotations and statistics are recomputed
//! from the votes and users collections whenever those change.

use serde::Serialize;
use storypoint_types::{CardColor, CardId, Story, StoryId, Username};
use tracing::trace;

use crate::constants::STAT_PLACEHOLDER;
use crate::store::EntityStore;

/// Reset every user's annotations, then set them from the active story's votes.
///
/// The first vote found for a user wins; there should be at most one.
pub fn recompute_user_annotations(store: &mut EntityStore, active_story: Option<&StoryId>) {
    let votes: Vec<(Username, CardId)> = match active_story {
        Some(story_id) => store
            .votes()
            .iter()
            .filter(|v| v.story_id == *story_id)
            .map(|v| (v.username.clone(), v.value.clone()))
            .collect(),
        None => Vec::new(),
    };

    store.users_mut().for_each_mut(|user| {
        user.clear_vote();
        if let Some((_, value)) = votes.iter().find(|(name, _)| *name == user.username) {
            user.set_vote(value.clone());
        }
    });
}

/// Recompute the annotations of a single user. Returns whether they have voted.
pub fn annotate_user(
    store: &mut EntityStore,
    active_story: Option<&StoryId>,
    username: &Username,
) -> bool {
    let value = active_story.and_then(|story_id| {
        store
            .votes()
            .iter()
            .find(|v| v.is_for(story_id, username))
            .map(|v| v.value.clone())
    });
    let voted = value.is_some();
    store.users_mut().update(username, |user| match value {
        Some(value) => user.set_vote(value),
        None => user.clear_vote(),
    });
    voted
}

/// Lowest and highest revealed estimate of the active story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub min: String,
    pub max: String,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            min: STAT_PLACEHOLDER.to_string(),
            max: STAT_PLACEHOLDER.to_string(),
        }
    }
}

impl Statistics {
    pub fn is_unset(&self) -> bool {
        self.min == STAT_PLACEHOLDER && self.max == STAT_PLACEHOLDER
    }
}

/// Rank the active story's votes by card position in the deck.
///
/// Only meaningful once the story has ended; before that, and when there are
/// no votes on deck cards, both ends are the placeholder.
pub fn recompute_statistics(store: &EntityStore, active_story: Option<&Story>) -> Statistics {
    let Some(story) = active_story.filter(|s| s.ended) else {
        return Statistics::default();
    };

    let positions = store
        .votes()
        .iter()
        .filter(|v| v.story_id == story.story_id)
        .filter_map(|v| store.card_position(&v.value));

    let (mut min, mut max) = (None::<usize>, None::<usize>);
    for pos in positions {
        min = Some(min.map_or(pos, |m| m.min(pos)));
        max = Some(max.map_or(pos, |m| m.max(pos)));
    }

    let label = |pos: Option<usize>| {
        pos.and_then(|p| store.cards().get(p))
            .map(|card| card.label())
            .unwrap_or_else(|| STAT_PLACEHOLDER.to_string())
    };
    let stats = Statistics { min: label(min), max: label(max) };
    trace!("statistics for {}: {} .. {}", story.story_id, stats.min, stats.max);
    stats
}

/// Color shown behind a user's vote. Hidden until the active story ends.
pub fn vote_color(
    store: &EntityStore,
    active_story: Option<&Story>,
    value: &CardId,
) -> Option<CardColor> {
    active_story
        .filter(|s| s.ended)
        .and_then(|_| store.card(value))
        .map(|card| card.color)
}

/// UI transition hint for a card whose selection changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardMotion {
    /// Newly selected; moves up.
    Raise,
    /// Deselected; moves down.
    Lower,
}

/// The locally selected card. At most one card is selected at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardSelection {
    selected: Option<CardId>,
    transitions: Vec<(CardId, CardMotion)>,
}

impl CardSelection {
    pub fn selected(&self) -> Option<&CardId> {
        self.selected.as_ref()
    }

    pub fn is_selected(&self, card: &CardId) -> bool {
        self.selected.as_ref() == Some(card)
    }

    /// Transition hints from the most recent selection change.
    pub fn transitions(&self) -> &[(CardId, CardMotion)] {
        &self.transitions
    }

    /// Select `card`, lowering the previously selected card if any.
    pub fn select(&mut self, card: CardId) {
        if self.is_selected(&card) {
            return;
        }
        self.transitions.clear();
        if let Some(previous) = self.selected.take() {
            self.transitions.push((previous, CardMotion::Lower));
        }
        self.transitions.push((card.clone(), CardMotion::Raise));
        self.selected = Some(card);
    }

    /// Lower the selected card, if any.
    pub fn clear(&mut self) {
        if let Some(previous) = self.selected.take() {
            self.transitions.clear();
            self.transitions.push((previous, CardMotion::Lower));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
