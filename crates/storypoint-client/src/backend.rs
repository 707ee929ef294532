//! Backend collaborator contract.
//!
//! The room never talks to the network itself. Every request/response call it
//! needs goes through [`Backend`]; the transport behind it (HTTP, a test
//! double) is someone else's concern. Mutating calls answer with a
//! [`Reply`] whose status is `OK` or `KO`; a request that never got an answer
//! is a [`BackendError`].

use async_trait::async_trait;
use storypoint_types::{NewStory, Reply, Story, StoryId, Username, Vote, VoteId};
use thiserror::Error;

/// The request never produced a reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("unreadable response: {0}")]
    Decode(String),
}

/// Result of a mutating backend call.
pub type Outcome<T> = Result<Reply<T>, BackendError>;

/// Whether an outcome is a confirmed success.
///
/// Transport failures count as rejections: either way the optimistic state
/// has to be reconciled without a server record.
pub(crate) fn confirmed<T>(outcome: &Outcome<T>) -> bool {
    matches!(outcome, Ok(reply) if reply.is_ok())
}

/// Story, vote, and user operations of the estimation backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Create a vote, or update it when `vote.vote_id` is set.
    async fn create_vote(&self, vote: Vote) -> Outcome<Vote>;

    async fn remove_vote(&self, vote_id: VoteId) -> Outcome<()>;

    /// All votes cast so far on a story.
    async fn list_votes(&self, story_id: StoryId) -> Result<Vec<Vote>, BackendError>;

    async fn create_story(&self, story: NewStory) -> Outcome<Story>;

    async fn remove_story(&self, story_id: StoryId) -> Outcome<()>;

    async fn end_story(&self, story_id: StoryId) -> Outcome<()>;

    /// Leave the room.
    async fn disconnect(&self, username: Username) -> Outcome<()>;
}
