//! Room actor: one task owning the [`Room`], driven by three sources.
//!
//! ```text
//!   RoomHandle (Clone)        mpsc        RoomActor (tokio task)
//!   ┌──────────────────┐  ──────────▶  ┌───────────────────────────────┐
//!   │ .select_card()   │               │ Room                          │
//!   │ .add_story()     │  ◀──────────  │ push events   (mpsc)          │
//!   │ .view()          │    oneshot    │ backend calls (FuturesUnordered)
//!   └──────────────────┘               └───────────────────────────────┘
//!            ▲                                       │
//!            └─────────── broadcast<RoomChange> ─────┘
//! ```
//!
//! Commands, push events, and backend completions are each handled to the
//! end before the next one is looked at, so handlers never overlap. Backend
//! calls run concurrently: a command replies as soon as its optimistic step
//! ran, and the reply from the backend is settled whenever it arrives,
//! interleaved with whatever events came in meanwhile.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use storypoint_types::{CardId, Story, StoryId, Vote};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, trace};

use crate::backend::{Backend, BackendError, Outcome};
use crate::optimistic::{
    ActionRejected, CardAction, PendingEnd, PendingLeave, PendingRemoval, PendingRetract,
    PendingStory, PendingVote, VoteFetch,
};
use crate::room::{Room, RoomChange, RoomView};
use crate::subscriptions::ServerEvent;

// ============================================================================
// Error Type
// ============================================================================

/// Errors from the room actor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActorError {
    #[error("action rejected: {0}")]
    Rejected(#[from] ActionRejected),
    #[error("room actor shut down")]
    Shutdown,
}

// ============================================================================
// Commands (internal)
// ============================================================================

type Responder<T> = oneshot::Sender<Result<T, ActorError>>;

/// Internal command sent from RoomHandle → RoomActor via mpsc.
enum RoomCommand {
    SelectCard { card: CardId, reply: Responder<()> },
    SelectStory { story_id: StoryId, reply: Responder<()> },
    AddStory { name: String, reply: Responder<()> },
    RemoveStory { story_id: StoryId, reply: Responder<()> },
    EndStory { reply: Responder<()> },
    Leave { reply: Responder<()> },
    View { reply: Responder<RoomView> },
}

/// A backend call that returned, with the ticket it settles.
enum Completion {
    Cast(PendingVote, Outcome<Vote>),
    Retract(PendingRetract, Outcome<()>),
    CreateStory(PendingStory, Outcome<Story>),
    RemoveStory(PendingRemoval, Outcome<()>),
    EndStory(PendingEnd, Outcome<()>),
    Votes(VoteFetch, Result<Vec<Vote>, BackendError>),
    Leave(PendingLeave, Outcome<()>),
}

// ============================================================================
// RoomHandle (public API)
// ============================================================================

/// Handle to a running room actor.
///
/// Action methods return once the action has been applied locally; the
/// backend's answer arrives later as a [`RoomChange`]. The handle can be
/// cloned and shared across tasks.
#[derive(Clone)]
pub struct RoomHandle {
    tx: mpsc::UnboundedSender<RoomCommand>,
    changes: broadcast::Sender<RoomChange>,
}

impl RoomHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(Responder<T>) -> RoomCommand,
    ) -> Result<T, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).map_err(|_| ActorError::Shutdown)?;
        rx.await.map_err(|_| ActorError::Shutdown)?
    }

    /// Click a card: cast it, or retract the vote if it is already selected.
    pub async fn select_card(&self, card: impl Into<CardId>) -> Result<(), ActorError> {
        let card = card.into();
        self.call(|reply| RoomCommand::SelectCard { card, reply }).await
    }

    /// Switch the active story and fetch its votes.
    pub async fn select_story(&self, story_id: impl Into<StoryId>) -> Result<(), ActorError> {
        let story_id = story_id.into();
        self.call(|reply| RoomCommand::SelectStory { story_id, reply }).await
    }

    pub async fn add_story(&self, name: &str) -> Result<(), ActorError> {
        let name = name.to_string();
        self.call(|reply| RoomCommand::AddStory { name, reply }).await
    }

    pub async fn remove_story(&self, story_id: impl Into<StoryId>) -> Result<(), ActorError> {
        let story_id = story_id.into();
        self.call(|reply| RoomCommand::RemoveStory { story_id, reply }).await
    }

    /// End the active story.
    pub async fn end_story(&self) -> Result<(), ActorError> {
        self.call(|reply| RoomCommand::EndStory { reply }).await
    }

    /// Disconnect the local user. The actor stops once the backend agrees.
    pub async fn leave(&self) -> Result<(), ActorError> {
        self.call(|reply| RoomCommand::Leave { reply }).await
    }

    /// Snapshot of the room as it is now.
    pub async fn view(&self) -> Result<RoomView, ActorError> {
        self.call(|reply| RoomCommand::View { reply }).await
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomChange> {
        self.changes.subscribe()
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// RoomActor (internal)
// ============================================================================

struct RoomActor {
    room: Room,
    backend: Arc<dyn Backend>,
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
}

impl RoomActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<RoomCommand>,
        mut events: mpsc::Receiver<ServerEvent>,
    ) {
        let mut events_open = true;
        loop {
            if self.room.is_closed() && self.in_flight.is_empty() {
                info!("room {} closed", self.room.session().session_id);
                break;
            }

            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!("room actor shutting down: all handles dropped");
                        break;
                    }
                },
                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        self.room.apply(&event);
                    }
                    None => {
                        debug!("push channel closed");
                        events_open = false;
                    }
                },
                Some(done) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.settle(done);
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::SelectCard { card, reply } => {
                let result = self.room.select_card(card).map(|action| match action {
                    CardAction::Cast(pending) => self.send_cast(pending),
                    CardAction::Retract(pending) => self.send_retract(pending),
                });
                let _ = reply.send(result.map_err(ActorError::from));
            }
            RoomCommand::SelectStory { story_id, reply } => {
                let result = self.room.select_story(&story_id).map(|fetch| self.send_fetch(fetch));
                let _ = reply.send(result.map_err(ActorError::from));
            }
            RoomCommand::AddStory { name, reply } => {
                let result = self.room.begin_create_story(&name).map(|pending| {
                    let backend = Arc::clone(&self.backend);
                    self.spawn(async move {
                        let outcome = backend.create_story(pending.request().clone()).await;
                        Completion::CreateStory(pending, outcome)
                    });
                });
                let _ = reply.send(result.map_err(ActorError::from));
            }
            RoomCommand::RemoveStory { story_id, reply } => {
                let result = self.room.begin_remove_story(&story_id).map(|pending| {
                    let backend = Arc::clone(&self.backend);
                    self.spawn(async move {
                        let outcome = backend.remove_story(pending.story_id().clone()).await;
                        Completion::RemoveStory(pending, outcome)
                    });
                });
                let _ = reply.send(result.map_err(ActorError::from));
            }
            RoomCommand::EndStory { reply } => {
                let result = self.room.begin_end_story().map(|pending| {
                    let backend = Arc::clone(&self.backend);
                    self.spawn(async move {
                        let outcome = backend.end_story(pending.story_id().clone()).await;
                        Completion::EndStory(pending, outcome)
                    });
                });
                let _ = reply.send(result.map_err(ActorError::from));
            }
            RoomCommand::Leave { reply } => {
                let result = self.room.begin_leave().map(|pending| {
                    let backend = Arc::clone(&self.backend);
                    self.spawn(async move {
                        let outcome = backend.disconnect(pending.username().clone()).await;
                        Completion::Leave(pending, outcome)
                    });
                });
                let _ = reply.send(result.map_err(ActorError::from));
            }
            RoomCommand::View { reply } => {
                let _ = reply.send(Ok(self.room.view()));
            }
        }
    }

    fn spawn(&mut self, request: impl Future<Output = Completion> + Send + 'static) {
        self.in_flight.push(request.boxed());
        trace!("{} backend calls in flight", self.in_flight.len());
    }

    fn send_cast(&mut self, pending: PendingVote) {
        let backend = Arc::clone(&self.backend);
        self.spawn(async move {
            let outcome = backend.create_vote(pending.request().clone()).await;
            Completion::Cast(pending, outcome)
        });
    }

    fn send_retract(&mut self, pending: PendingRetract) {
        let backend = Arc::clone(&self.backend);
        self.spawn(async move {
            let outcome = backend.remove_vote(pending.vote_id().clone()).await;
            Completion::Retract(pending, outcome)
        });
    }

    fn send_fetch(&mut self, fetch: VoteFetch) {
        let backend = Arc::clone(&self.backend);
        self.spawn(async move {
            let outcome = backend.list_votes(fetch.story_id().clone()).await;
            Completion::Votes(fetch, outcome)
        });
    }

    fn settle(&mut self, done: Completion) {
        let settlement = match done {
            Completion::Cast(p, outcome) => self.room.complete_cast_vote(p, outcome),
            Completion::Retract(p, outcome) => self.room.complete_retract_vote(p, outcome),
            Completion::CreateStory(p, outcome) => self.room.complete_create_story(p, outcome),
            Completion::RemoveStory(p, outcome) => self.room.complete_remove_story(p, outcome),
            Completion::EndStory(p, outcome) => self.room.complete_end_story(p, outcome),
            Completion::Votes(fetch, outcome) => self.room.complete_vote_fetch(fetch, outcome),
            Completion::Leave(p, outcome) => self.room.complete_leave(p, outcome),
        };
        trace!("settled: {:?}", settlement);
    }
}

// ============================================================================
// Public spawn functions
// ============================================================================

/// Bounded channel feeding push events to [`spawn_room`].
pub fn event_channel(capacity: usize) -> (mpsc::Sender<ServerEvent>, mpsc::Receiver<ServerEvent>) {
    mpsc::channel(capacity.max(1))
}

/// Spawn a room actor on the current tokio runtime.
///
/// The votes of the active story are fetched right away. The actor stops
/// when every [`RoomHandle`] is dropped, or once the local user has left and
/// no backend call is outstanding.
pub fn spawn_room(
    room: Room,
    backend: Arc<dyn Backend>,
    events: mpsc::Receiver<ServerEvent>,
) -> RoomHandle {
    let (tx, commands) = mpsc::unbounded_channel();
    let changes = room.change_sender();
    let initial = room.initial_fetch();

    let mut actor = RoomActor {
        room,
        backend,
        in_flight: FuturesUnordered::new(),
    };
    if let Some(fetch) = initial {
        actor.send_fetch(fetch);
    }
    tokio::spawn(actor.run(commands, events));

    RoomHandle { tx, changes }
}
