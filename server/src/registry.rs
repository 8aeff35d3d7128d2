use parking_lot::Mutex;
use semchat_protocol::SemesterId;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique id of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Sending half of a connection's outbound queue; the socket task drains
/// the other end. Sends never block.
pub type Outbound = mpsc::UnboundedSender<String>;

#[derive(Default)]
struct Inner {
    rooms: HashMap<SemesterId, HashMap<ConnectionId, Outbound>>,
    joined: HashMap<ConnectionId, SemesterId>,
}

/// Tracks which live connections currently belong to which room. The only
/// mutable shared state in the core; join/leave/broadcast/disconnect race
/// on a multi-threaded runtime, so everything goes through one lock.
#[derive(Default)]
pub struct RoomRegistry {
    inner: Mutex<Inner>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room. Idempotent; a connection already in a
    /// different room is moved (single active room per connection).
    pub fn join(&self, conn: ConnectionId, room: SemesterId, tx: Outbound) {
        let mut inner = self.inner.lock();
        if let Some(prev) = inner.joined.insert(conn, room) {
            if prev != room {
                if let Some(members) = inner.rooms.get_mut(&prev) {
                    members.remove(&conn);
                    if members.is_empty() {
                        inner.rooms.remove(&prev);
                    }
                }
            }
        }
        inner.rooms.entry(room).or_default().insert(conn, tx);
    }

    /// Remove a connection from a room; a no-op if it is not a member.
    pub fn leave(&self, conn: ConnectionId, room: SemesterId) {
        let mut inner = self.inner.lock();
        if inner.joined.get(&conn) == Some(&room) {
            inner.joined.remove(&conn);
        }
        if let Some(members) = inner.rooms.get_mut(&room) {
            members.remove(&conn);
            if members.is_empty() {
                inner.rooms.remove(&room);
            }
        }
    }

    /// Drop all membership for a disconnected transport. Wired into the
    /// socket teardown path; stale members after churn are a correctness
    /// bug, not a leak to clean up later.
    pub fn remove_connection(&self, conn: ConnectionId) {
        let mut inner = self.inner.lock();
        if let Some(room) = inner.joined.remove(&conn) {
            if let Some(members) = inner.rooms.get_mut(&room) {
                members.remove(&conn);
                if members.is_empty() {
                    inner.rooms.remove(&room);
                }
            }
        }
    }

    /// Membership of a room at this instant.
    pub fn members_of(&self, room: SemesterId) -> HashSet<ConnectionId> {
        let inner = self.inner.lock();
        inner
            .rooms
            .get(&room)
            .map(|members| members.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Room the connection has currently joined, if any.
    pub fn room_of(&self, conn: ConnectionId) -> Option<SemesterId> {
        self.inner.lock().joined.get(&conn).copied()
    }

    /// Run `f` for each member's outbound sender under the membership
    /// lock, so delivery order within a room matches trigger order.
    pub(crate) fn for_each_member(
        &self,
        room: SemesterId,
        mut f: impl FnMut(ConnectionId, &Outbound),
    ) {
        let inner = self.inner.lock();
        if let Some(members) = inner.rooms.get(&room) {
            for (conn, tx) in members {
                f(*conn, tx);
            }
        }
    }
}
