use crate::registry::{ConnectionId, RoomRegistry};
use semchat_protocol::{SemesterId, ServerEvent};
use std::sync::Arc;

/// Best-effort fan-out of one event to all current members of a room.
/// Delivery is fire-and-forget per connection: a dead or slow peer never
/// blocks the others and never fails the ingress call that triggered the
/// broadcast. Reliability for the sender's own copy is the direct ack's
/// job, not this layer's.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<RoomRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver to every member of the room.
    pub fn broadcast(&self, room: SemesterId, event: &ServerEvent) {
        self.send(room, event, None);
    }

    /// Deliver to every member except the originating connection.
    pub fn broadcast_except(&self, room: SemesterId, event: &ServerEvent, excluded: ConnectionId) {
        self.send(room, event, Some(excluded));
    }

    fn send(&self, room: SemesterId, event: &ServerEvent, excluded: Option<ConnectionId>) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(%err, "failed to encode broadcast event");
                return;
            }
        };
        let mut delivered = 0usize;
        self.registry.for_each_member(room, |conn, tx| {
            if excluded == Some(conn) {
                return;
            }
            // A closed peer is cleaned up by its own disconnect handler.
            if tx.send(payload.clone()).is_ok() {
                delivered += 1;
            }
        });
        tracing::debug!(room = %room.room_name(), delivered, "broadcast");
    }
}
