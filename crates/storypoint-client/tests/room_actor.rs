//! Room actor tests against an in-memory backend.
//!
//! The backend answers immediately unless told to hold vote creation, in
//! which case each `create_vote` waits for one `release()`.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::{Notify, broadcast, mpsc};

use storypoint_client::{
    ActionKind, ActionRejected, ActorError, Backend, BackendError, ChangeCause, Outcome, Room,
    RoomChange, RoomHandle, ServerEvent, SessionBootstrap, event_channel, spawn_room,
};
use storypoint_types::{
    CardId, DeckKind, EventKind, NewStory, Reply, Session, SessionId, Story, StoryId, User,
    Username, Vote, VoteId,
};

// ============================================================================
// Scripted backend
// ============================================================================

#[derive(Default)]
struct ScriptedBackend {
    /// Votes already on the server, returned by `list_votes`.
    votes: Mutex<Vec<Vote>>,
    /// Operations that answer `KO`.
    rejects: Mutex<HashSet<&'static str>>,
    hold_votes: AtomicBool,
    release: Notify,
    next_id: AtomicU32,
}

impl ScriptedBackend {
    fn reject(&self, op: &'static str) {
        self.rejects.lock().unwrap().insert(op);
    }

    fn rejects(&self, op: &str) -> bool {
        self.rejects.lock().unwrap().contains(op)
    }

    fn release(&self) {
        self.release.notify_one();
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn answer(&self, op: &'static str) -> Outcome<()> {
        if self.rejects(op) {
            Ok(Reply::ko())
        } else {
            Ok(Reply::ok_empty())
        }
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn create_vote(&self, mut vote: Vote) -> Outcome<Vote> {
        if self.hold_votes.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        if self.rejects("create_vote") {
            return Ok(Reply::ko());
        }
        if vote.vote_id.is_none() {
            vote.vote_id = Some(VoteId::new(self.next_id("v")));
        }
        Ok(Reply::ok(vote))
    }

    async fn remove_vote(&self, _vote_id: VoteId) -> Outcome<()> {
        self.answer("remove_vote")
    }

    async fn list_votes(&self, story_id: StoryId) -> Result<Vec<Vote>, BackendError> {
        if self.rejects("list_votes") {
            return Err(BackendError::Transport("connection reset".into()));
        }
        let votes = self.votes.lock().unwrap();
        Ok(votes.iter().filter(|v| v.story_id == story_id).cloned().collect())
    }

    async fn create_story(&self, story: NewStory) -> Outcome<Story> {
        if self.rejects("create_story") {
            return Ok(Reply::ko());
        }
        Ok(Reply::ok(Story {
            story_id: StoryId::new(self.next_id("s")),
            session_id: story.session_id,
            story_name: story.story_name,
            order: story.order,
            ended: false,
        }))
    }

    async fn remove_story(&self, _story_id: StoryId) -> Outcome<()> {
        self.answer("remove_story")
    }

    async fn end_story(&self, _story_id: StoryId) -> Outcome<()> {
        self.answer("end_story")
    }

    async fn disconnect(&self, _username: Username) -> Outcome<()> {
        self.answer("disconnect")
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn story(id: &str, order: u32) -> Story {
    Story {
        story_id: StoryId::from(id),
        session_id: SessionId::from("room"),
        story_name: format!("story {id}"),
        order,
        ended: false,
    }
}

fn vote(id: &str, story: &str, user: &str, value: &str) -> Vote {
    Vote {
        vote_id: Some(VoteId::from(id)),
        session_id: SessionId::from("room"),
        story_id: StoryId::from(story),
        username: Username::from(user),
        value: CardId::from(value),
    }
}

/// Room for `A` with roster [A, B], fibonacci deck, stories `stories`.
fn room(stories: Vec<Story>) -> Room {
    let bootstrap = SessionBootstrap {
        session: Session {
            session_id: SessionId::from("room"),
            sprint_name: "Sprint 12".into(),
            card_set: DeckKind::Fibonacci,
        },
        users: vec![User::new("A"), User::new("B")],
        stories,
    };
    Room::bootstrap(bootstrap, Username::from("A")).unwrap()
}

struct Harness {
    handle: RoomHandle,
    events: mpsc::Sender<ServerEvent>,
    changes: broadcast::Receiver<RoomChange>,
}

/// Spawn the actor and wait for the initial vote fetch to settle.
async fn start(room: Room, backend: Arc<ScriptedBackend>) -> Harness {
    let mut changes = room.subscribe();
    let (events, rx) = event_channel(16);
    let handle = spawn_room(room, backend, rx);
    wait_for(&mut changes, ChangeCause::Action(ActionKind::VotesLoaded)).await;
    Harness { handle, events, changes }
}

async fn wait_for(changes: &mut broadcast::Receiver<RoomChange>, cause: ChangeCause) -> RoomChange {
    let wait = async {
        loop {
            let change = changes.recv().await.expect("change channel closed");
            if change.cause == cause {
                return change;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {cause:?}"))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_cast_with_echo_before_reply() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.hold_votes.store(true, Ordering::SeqCst);
    let mut h = start(room(vec![story("S1", 1)]), backend.clone()).await;

    h.handle.select_card("3").await.unwrap();
    let view = h.handle.view().await.unwrap();
    assert_eq!(view.votes.len(), 1);
    assert_eq!(view.votes[0].vote_id, None);
    assert_eq!(view.selected_card, Some(CardId::from("3")));

    // The push channel delivers our own vote before the reply arrives.
    h.events
        .send(ServerEvent::VoteAdded(vote("v1", "S1", "A", "3")))
        .await
        .unwrap();
    wait_for(&mut h.changes, ChangeCause::Event(EventKind::VoteAdded)).await;

    backend.release();
    wait_for(&mut h.changes, ChangeCause::Action(ActionKind::CastVote)).await;

    let view = h.handle.view().await.unwrap();
    assert_eq!(view.votes, vec![vote("v1", "S1", "A", "3")]);
    let a = view.users.iter().find(|u| u.username == "A").unwrap();
    assert!(a.has_voted);
    assert_eq!(a.vote, Some(CardId::from("3")));
}

#[tokio::test]
async fn test_initial_fetch_annotates_roster() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.votes.lock().unwrap().extend([
        vote("v9", "S1", "B", "8"),
        vote("v10", "S2", "A", "1"),
    ]);
    let h = start(room(vec![story("S1", 1), story("S2", 2)]), backend).await;

    let view = h.handle.view().await.unwrap();
    assert_eq!(view.votes, vec![vote("v9", "S1", "B", "8")]);
    let b = view.users.iter().find(|u| u.username == "B").unwrap();
    assert_eq!(b.vote, Some(CardId::from("8")));
    let a = view.users.iter().find(|u| u.username == "A").unwrap();
    assert!(!a.has_voted);
    assert_eq!(view.selected_card, None);
}

#[tokio::test]
async fn test_select_story_loads_own_vote() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.votes.lock().unwrap().push(vote("v10", "S2", "A", "13"));
    let mut h = start(room(vec![story("S1", 1), story("S2", 2)]), backend).await;

    h.handle.select_story("S2").await.unwrap();
    wait_for(&mut h.changes, ChangeCause::Action(ActionKind::VotesLoaded)).await;

    let view = h.handle.view().await.unwrap();
    assert_eq!(view.active_story.unwrap().story_id, StoryId::from("S2"));
    assert_eq!(view.selected_card, Some(CardId::from("13")));
}

#[tokio::test]
async fn test_rejected_story_removal_is_rolled_back() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.reject("remove_story");
    let mut h = start(room(vec![story("S1", 1), story("S2", 2), story("S3", 3)]), backend).await;

    h.handle.remove_story("S2").await.unwrap();
    wait_for(&mut h.changes, ChangeCause::Action(ActionKind::RemoveStory)).await;
    wait_for(&mut h.changes, ChangeCause::Action(ActionKind::RemoveStory)).await;

    let view = h.handle.view().await.unwrap();
    let ids: Vec<&str> = view.stories.iter().map(|s| s.story_id.as_str()).collect();
    assert_eq!(ids, vec!["S1", "S2", "S3"]);
}

#[tokio::test]
async fn test_rejected_end_is_rolled_back() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.reject("end_story");
    let mut h = start(room(vec![story("S1", 1)]), backend).await;

    h.handle.end_story().await.unwrap();
    wait_for(&mut h.changes, ChangeCause::Action(ActionKind::EndStory)).await;
    wait_for(&mut h.changes, ChangeCause::Action(ActionKind::EndStory)).await;

    let view = h.handle.view().await.unwrap();
    assert!(!view.active_story.unwrap().ended);
    assert_eq!(view.statistics.min, "-");
}

#[tokio::test]
async fn test_created_story_is_appended() {
    let backend = Arc::new(ScriptedBackend::default());
    let mut h = start(room(vec![story("S1", 1)]), backend).await;

    h.handle.add_story("Checkout flow").await.unwrap();
    wait_for(&mut h.changes, ChangeCause::Action(ActionKind::CreateStory)).await;
    wait_for(&mut h.changes, ChangeCause::Action(ActionKind::CreateStory)).await;

    let view = h.handle.view().await.unwrap();
    assert_eq!(view.stories.len(), 2);
    assert_eq!(view.stories[1].story_name, "Checkout flow");
    assert_eq!(view.stories[1].order, 2);
    assert_eq!(view.draft_story_name, "");
}

#[tokio::test]
async fn test_out_of_order_and_duplicate_events() {
    let backend = Arc::new(ScriptedBackend::default());
    let mut h = start(room(vec![story("S1", 1)]), backend).await;

    for event in [
        ServerEvent::VoteAdded(vote("v5", "S1", "C", "21")),
        ServerEvent::UserConnected(User::new("C")),
        ServerEvent::UserConnected(User::new("C")),
        ServerEvent::VoteAdded(vote("v5", "S1", "C", "21")),
        ServerEvent::StoryAdded(story("S9", 2)),
    ] {
        h.events.send(event).await.unwrap();
    }
    wait_for(&mut h.changes, ChangeCause::Event(EventKind::StoryAdded)).await;

    let view = h.handle.view().await.unwrap();
    assert_eq!(view.users.len(), 3);
    assert_eq!(view.votes.len(), 1);
    let c = view.users.iter().find(|u| u.username == "C").unwrap();
    assert!(c.has_voted);
    assert_eq!(c.vote, Some(CardId::from("21")));
}

#[tokio::test]
async fn test_guard_rejection_reaches_caller() {
    let backend = Arc::new(ScriptedBackend::default());
    let h = start(room(vec![story("S1", 1)]), backend).await;

    let err = h.handle.select_card("4").await.unwrap_err();
    assert_eq!(err, ActorError::Rejected(ActionRejected::UnknownCard(CardId::from("4"))));
    let err = h.handle.add_story("   ").await.unwrap_err();
    assert_eq!(err, ActorError::Rejected(ActionRejected::BlankStoryName));
}

#[tokio::test]
async fn test_leave_stops_actor() {
    let backend = Arc::new(ScriptedBackend::default());
    let mut h = start(room(vec![story("S1", 1)]), backend).await;

    h.handle.leave().await.unwrap();
    let change = wait_for(&mut h.changes, ChangeCause::Action(ActionKind::Leave)).await;
    assert!(change.version > 0);

    assert_eq!(h.handle.view().await.unwrap_err(), ActorError::Shutdown);
}

#[tokio::test]
async fn test_rejected_leave_keeps_room_open() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.reject("disconnect");
    let h = start(room(vec![story("S1", 1)]), backend).await;

    h.handle.leave().await.unwrap();
    // A later command is only served after the leave has settled or is
    // still in flight; either way the room must stay open.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let view = h.handle.view().await.unwrap();
    assert!(!view.closed);
}
