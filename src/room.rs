// src/room.rs

//! The per-room broadcast hub.
//!
//! A room is a single tokio task that owns the membership set. Joins,
//! leaves, broadcasts and membership queries all travel through one FIFO
//! queue, so every event observes exactly the membership left behind by the
//! events submitted before it. Nothing outside the loop ever touches the
//! member map, which is why fan-out needs no locking.
//!
//! Each member has a bounded mailbox. Fan-out uses `try_send`; a member
//! whose mailbox is full (or whose writer is gone) is evicted on the spot,
//! so one slow editor never holds up the rest of the room.

use crate::{
    config::RoomSettings,
    error::AppError,
    models::{ConnectionId, Frame, GridSnapshot, MemberInfo, RoomId},
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// Receiving end of a member's outbound queue. Yields `None` once the room
/// has closed the mailbox (leave, eviction or room shutdown).
pub type Mailbox = mpsc::Receiver<Frame>;

/// A connection as seen by the room: identity plus the sending half of its
/// mailbox. Once joined, only the room holds the sender.
#[derive(Debug)]
pub struct Member {
    pub connection_id: ConnectionId,
    pub participant: Option<String>,
    mailbox: mpsc::Sender<Frame>,
}

impl Member {
    pub fn new(
        connection_id: ConnectionId,
        participant: Option<String>,
        capacity: usize,
    ) -> (Self, Mailbox) {
        let (tx, rx) = mpsc::channel(capacity);
        let member = Self {
            connection_id,
            participant,
            mailbox: tx,
        };
        (member, rx)
    }

    fn info(&self) -> MemberInfo {
        MemberInfo {
            connection_id: self.connection_id,
            participant: self.participant.clone(),
        }
    }
}

enum RoomEvent {
    Join(Member),
    Leave(ConnectionId),
    Broadcast {
        origin: Option<ConnectionId>,
        frame: Frame,
    },
    Members(oneshot::Sender<Vec<MemberInfo>>),
}

/// Cloneable handle to a running room.
#[derive(Clone, Debug)]
pub struct Room {
    id: RoomId,
    snapshot: Arc<GridSnapshot>,
    mailbox_capacity: usize,
    events: mpsc::Sender<RoomEvent>,
}

/// Ownership of a room's task. Whoever holds this decides when the room
/// stops; dropping it without calling [`RoomTask::terminate`] stops the room
/// as well.
pub struct RoomTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl RoomTask {
    /// Signals the loop to stop and waits for it to tear down membership.
    pub async fn terminate(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "room task ended abnormally");
        }
    }
}

impl Room {
    /// Starts the event loop for a new, empty room.
    pub fn open(id: RoomId, snapshot: GridSnapshot, settings: &RoomSettings) -> (Room, RoomTask) {
        let (events_tx, events_rx) = mpsc::channel(settings.queue_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let hub = Hub {
            room_id: id,
            members: HashMap::new(),
            echo_to_sender: settings.echo_to_sender,
        };
        let handle = tokio::spawn(hub.run(events_rx, shutdown_rx));

        let room = Room {
            id,
            snapshot: Arc::new(snapshot),
            mailbox_capacity: settings.mailbox_capacity,
            events: events_tx,
        };
        let task = RoomTask {
            shutdown: shutdown_tx,
            handle,
        };
        (room, task)
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn snapshot(&self) -> &GridSnapshot {
        &self.snapshot
    }

    /// True once the event loop has exited.
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    /// Builds a member handle sized for this room's mailboxes.
    pub fn new_member(&self, participant: Option<String>) -> (Member, Mailbox) {
        Member::new(ConnectionId::new(), participant, self.mailbox_capacity)
    }

    pub async fn join(&self, member: Member) -> Result<(), AppError> {
        self.post(RoomEvent::Join(member)).await
    }

    pub async fn leave(&self, connection_id: ConnectionId) -> Result<(), AppError> {
        self.post(RoomEvent::Leave(connection_id)).await
    }

    /// Queues a frame for fan-out. Waits while the room's queue is full.
    pub async fn broadcast(
        &self,
        origin: Option<ConnectionId>,
        frame: Frame,
    ) -> Result<(), AppError> {
        self.post(RoomEvent::Broadcast { origin, frame }).await
    }

    /// Current membership, as seen after every previously queued event.
    pub async fn members(&self) -> Result<Vec<MemberInfo>, AppError> {
        let (tx, rx) = oneshot::channel();
        self.post(RoomEvent::Members(tx)).await?;
        rx.await.map_err(|_| self.closed())
    }

    async fn post(&self, event: RoomEvent) -> Result<(), AppError> {
        self.events.send(event).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> AppError {
        AppError::NotFound(format!("room {} is closed", self.id))
    }
}

/// State private to the room task.
struct Hub {
    room_id: RoomId,
    members: HashMap<ConnectionId, Member>,
    echo_to_sender: bool,
}

impl Hub {
    async fn run(
        mut self,
        mut events: mpsc::Receiver<RoomEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        info!(room_id = %self.room_id, "room opened");

        loop {
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                event = events.recv() => event,
            };
            let Some(event) = event else { break };
            self.handle(event);
        }

        // Dropping the members drops the last mailbox senders, which ends
        // every outbound pump.
        let remaining = self.members.len();
        self.members.clear();
        info!(room_id = %self.room_id, remaining, "room closed");
    }

    fn handle(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Join(member) => self.join(member),
            RoomEvent::Leave(connection_id) => self.leave(connection_id),
            RoomEvent::Broadcast { origin, frame } => self.broadcast(origin, frame),
            RoomEvent::Members(reply) => {
                let _ = reply.send(self.members.values().map(Member::info).collect());
            }
        }
    }

    fn join(&mut self, member: Member) {
        let connection_id = member.connection_id;
        if self.members.contains_key(&connection_id) {
            debug!(room_id = %self.room_id, %connection_id, "duplicate join ignored");
            return;
        }
        self.members.insert(connection_id, member);
        info!(
            room_id = %self.room_id,
            %connection_id,
            total = self.members.len(),
            "client registered"
        );
    }

    fn leave(&mut self, connection_id: ConnectionId) {
        if self.members.remove(&connection_id).is_some() {
            info!(
                room_id = %self.room_id,
                %connection_id,
                remaining = self.members.len(),
                "client unregistered"
            );
        }
    }

    fn broadcast(&mut self, origin: Option<ConnectionId>, frame: Frame) {
        // Evicted or departed connections may still have frames in flight.
        if let Some(origin) = origin.filter(|id| !self.members.contains_key(id)) {
            debug!(
                room_id = %self.room_id,
                connection_id = %origin,
                "dropping frame from non-member"
            );
            return;
        }

        debug!(
            room_id = %self.room_id,
            bytes = frame.len(),
            recipients = self.members.len(),
            "broadcasting frame"
        );

        let mut evicted = Vec::new();
        for (id, member) in &self.members {
            if !self.echo_to_sender && Some(*id) == origin {
                continue;
            }
            if member.mailbox.try_send(frame.clone()).is_err() {
                evicted.push(*id);
            }
        }

        for connection_id in evicted {
            self.members.remove(&connection_id);
            warn!(
                room_id = %self.room_id,
                %connection_id,
                "client evicted: mailbox full or closed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn settings(mailbox_capacity: usize) -> RoomSettings {
        RoomSettings {
            mailbox_capacity,
            ..RoomSettings::default()
        }
    }

    fn open_room(mailbox_capacity: usize) -> (Room, RoomTask) {
        let snapshot = GridSnapshot::new(
            vec!["a".into(), "b".into()],
            vec![vec!["1".into(), "2".into()]],
        );
        Room::open(RoomId::random(), snapshot, &settings(mailbox_capacity))
    }

    async fn member_ids(room: &Room) -> HashSet<ConnectionId> {
        room.members()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.connection_id)
            .collect()
    }

    #[tokio::test]
    async fn membership_follows_joins_and_leaves() {
        let (room, _task) = open_room(8);
        let (a, mut a_box) = room.new_member(Some("a".into()));
        let (b, mut b_box) = room.new_member(Some("b".into()));
        let (c, mut c_box) = room.new_member(None);
        let (a_id, b_id, c_id) = (a.connection_id, b.connection_id, c.connection_id);

        room.join(a).await.unwrap();
        room.join(b).await.unwrap();
        room.join(c).await.unwrap();
        room.leave(b_id).await.unwrap();
        room.broadcast(Some(a_id), Frame::from("patch")).await.unwrap();

        assert_eq!(member_ids(&room).await, HashSet::from([a_id, c_id]));
        assert_eq!(a_box.recv().await, Some(Frame::from("patch")));
        assert_eq!(c_box.recv().await, Some(Frame::from("patch")));
        // Leaving closes the mailbox without delivering the later frame.
        assert_eq!(b_box.recv().await, None);
    }

    #[tokio::test]
    async fn rejoin_keeps_membership_size() {
        let (room, _task) = open_room(8);
        let (a, _a_box) = room.new_member(None);
        let a_id = a.connection_id;
        room.join(a).await.unwrap();

        let (dup, _dup_box) = Member::new(a_id, None, 8);
        room.join(dup).await.unwrap();

        assert_eq!(room.members().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn leave_of_unknown_member_is_a_no_op() {
        let (room, _task) = open_room(8);
        let (a, _a_box) = room.new_member(None);
        room.join(a).await.unwrap();
        room.leave(ConnectionId::new()).await.unwrap();
        assert_eq!(room.members().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn frames_from_one_sender_keep_their_order() {
        let (room, _task) = open_room(64);
        let (a, mut a_box) = room.new_member(None);
        let (b, mut b_box) = room.new_member(None);
        let a_id = a.connection_id;
        room.join(a).await.unwrap();
        room.join(b).await.unwrap();

        let sent: Vec<Frame> = (0..50)
            .map(|i| Frame::Text(format!("patch-{i}").into()))
            .collect();
        for frame in &sent {
            room.broadcast(Some(a_id), frame.clone()).await.unwrap();
        }
        room.members().await.unwrap();

        for mailbox in [&mut a_box, &mut b_box] {
            let mut received = Vec::new();
            while let Ok(frame) = mailbox.try_recv() {
                received.push(frame);
            }
            assert_eq!(received, sent);
        }
    }

    #[tokio::test]
    async fn saturated_member_is_evicted_without_hurting_others() {
        let (room, _task) = open_room(1);
        let (a, mut a_box) = room.new_member(Some("A".into()));
        let (b, mut b_box) = room.new_member(Some("B".into()));
        let (a_id, b_id) = (a.connection_id, b.connection_id);
        room.join(a).await.unwrap();
        room.join(b).await.unwrap();

        room.broadcast(Some(a_id), Frame::from("P1")).await.unwrap();
        room.members().await.unwrap();
        assert_eq!(a_box.recv().await, Some(Frame::from("P1")));

        // B never drained P1, so its single slot is still taken.
        room.broadcast(Some(a_id), Frame::from("P2")).await.unwrap();
        assert_eq!(member_ids(&room).await, HashSet::from([a_id]));
        assert_eq!(a_box.recv().await, Some(Frame::from("P2")));

        assert_eq!(b_box.recv().await, Some(Frame::from("P1")));
        assert_eq!(b_box.recv().await, None);
        assert!(!member_ids(&room).await.contains(&b_id));
    }

    #[tokio::test]
    async fn evicted_member_can_no_longer_broadcast() {
        let (room, _task) = open_room(1);
        let (a, mut a_box) = room.new_member(Some("A".into()));
        let (b, _b_box) = room.new_member(Some("B".into()));
        let (a_id, b_id) = (a.connection_id, b.connection_id);
        room.join(a).await.unwrap();
        room.join(b).await.unwrap();

        room.broadcast(Some(a_id), Frame::from("P1")).await.unwrap();
        room.members().await.unwrap();
        assert_eq!(a_box.recv().await, Some(Frame::from("P1")));
        room.broadcast(Some(a_id), Frame::from("P2")).await.unwrap();
        assert_eq!(member_ids(&room).await, HashSet::from([a_id]));
        assert_eq!(a_box.recv().await, Some(Frame::from("P2")));

        room.broadcast(Some(b_id), Frame::from("from B")).await.unwrap();
        room.members().await.unwrap();
        assert!(a_box.try_recv().is_err());

        // Frames without an origin still reach everyone.
        room.broadcast(None, Frame::from("notice")).await.unwrap();
        assert_eq!(a_box.recv().await, Some(Frame::from("notice")));
    }

    #[tokio::test]
    async fn closed_mailbox_is_evicted_on_next_broadcast() {
        let (room, _task) = open_room(4);
        let (a, a_box) = room.new_member(None);
        room.join(a).await.unwrap();
        drop(a_box);

        room.broadcast(None, Frame::from("x")).await.unwrap();
        assert!(room.members().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sender_is_skipped_when_echo_is_off() {
        let settings = RoomSettings {
            echo_to_sender: false,
            ..RoomSettings::default()
        };
        let (room, _task) = Room::open(RoomId::random(), GridSnapshot::default(), &settings);
        let (a, mut a_box) = room.new_member(None);
        let (b, mut b_box) = room.new_member(None);
        let a_id = a.connection_id;
        room.join(a).await.unwrap();
        room.join(b).await.unwrap();

        room.broadcast(Some(a_id), Frame::from("edit")).await.unwrap();
        room.members().await.unwrap();

        assert_eq!(b_box.try_recv().ok(), Some(Frame::from("edit")));
        assert!(a_box.try_recv().is_err());
    }

    #[tokio::test]
    async fn terminate_closes_mailboxes_and_rejects_events() {
        let (room, task) = open_room(4);
        let (a, mut a_box) = room.new_member(None);
        room.join(a).await.unwrap();
        room.members().await.unwrap();

        task.terminate().await;

        assert!(room.is_closed());
        assert_eq!(a_box.recv().await, None);
        let (late, _late_box) = room.new_member(None);
        assert!(matches!(room.join(late).await, Err(AppError::NotFound(_))));
        assert!(room.members().await.is_err());
    }

    #[tokio::test]
    async fn snapshot_is_kept_as_created() {
        let (room, _task) = open_room(4);
        room.broadcast(None, Frame::from("{\"cell\":[0,0]}")).await.unwrap();
        room.members().await.unwrap();
        assert_eq!(room.snapshot().headers, vec!["a", "b"]);
        assert_eq!(room.snapshot().rows, vec![vec!["1", "2"]]);
    }
}
