//! Shared types for storypoint, a planning-poker room client.
//!
//! This is the leaf crate: typed identifiers, the card decks, the records
//! exchanged with the backend, and the push-event tags. It has **no internal
//! storypoint dependencies**.
//!
//! # Entity Overview
//!
//! ```text
//! Session (SessionId) ← one estimation room, one deck
//!     └── Story (StoryId, ordered, active → ended)
//!     │       └── Vote (VoteId once persisted; one per user per story)
//!     └── User (Username) ← connected participant
//!
//! Deck (DeckKind) ← fixed ordered cards; a vote's value is a CardId
//! ```

pub mod deck;
pub mod ids;
pub mod model;
pub mod wire;

pub use deck::{Card, CardColor, DeckKind};
pub use ids::{CardId, SessionId, StoryId, Username, VoteId};
pub use model::{NewStory, Session, Story, User, Vote};
pub use wire::{EventKind, Reply, ResponseStatus};
