//! Storypoint room client library
//!
//! Keeps one participant's view of a planning-poker room consistent with the
//! server. Two streams feed the same [`Room`]: push events from the server,
//! merged idempotently by the reconciler, and the local user's own actions,
//! applied optimistically and settled when the backend answers.
//!
//! ```text
//!   local action ──▶ optimistic ─┐
//!                                ├──▶ EntityStore ──▶ derived ──▶ RoomChange
//!   push event ────▶ reconcile ──┘
//! ```
//!
//! [`Room`] is plain synchronous state. [`spawn_room`] runs it in a tokio task
//! next to a [`Backend`] implementation.

pub mod actor;
pub mod backend;
pub mod config;
pub mod constants;
pub mod derived;
pub mod index;
pub mod optimistic;
pub mod reconcile;
pub mod room;
pub mod store;
pub mod subscriptions;

pub use actor::{ActorError, RoomHandle, event_channel, spawn_room};
pub use backend::{Backend, BackendError, Outcome};
pub use config::{ClientConfig, ConfigError};
pub use derived::{CardMotion, CardSelection, Statistics};
pub use index::{Keyed, VoteKey, locate};
pub use optimistic::{
    ActionRejected, CardAction, PendingEnd, PendingLeave, PendingRemoval, PendingRetract,
    PendingStory, PendingVote, Settlement, VoteFetch,
};
pub use reconcile::{ApplyOutcome, SkipReason};
pub use room::{
    ActionKind, BootstrapError, ChangeCause, Room, RoomChange, RoomView, SessionBootstrap,
    UserView,
};
pub use store::{Collection, EntityStore, Upserted};
pub use subscriptions::{DecodeError, ServerEvent};
