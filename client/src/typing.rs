use std::time::{Duration, Instant};

/// Peers currently typing in the room. An indicator expires after a fixed
/// window when no stop signal arrives; the server only relays typing
/// events and keeps no state. The clock is passed in so this stays
/// deterministic under test.
pub struct TypingPeers {
    window: Duration,
    peers: Vec<(String, String, Instant)>,
}

impl TypingPeers {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            peers: Vec::new(),
        }
    }

    /// Register a `user:typing` signal; repeated signals extend the window.
    pub fn on_typing(&mut self, user_id: &str, name: &str, now: Instant) {
        if let Some(peer) = self.peers.iter_mut().find(|(id, _, _)| id == user_id) {
            peer.2 = now;
        } else {
            self.peers
                .push((user_id.to_string(), name.to_string(), now));
        }
    }

    /// Register a `user:stopTyping` signal.
    pub fn on_stop_typing(&mut self, user_id: &str) {
        self.peers.retain(|(id, _, _)| id != user_id);
    }

    /// Names of peers whose indicator is still live at `now`.
    pub fn active(&mut self, now: Instant) -> Vec<String> {
        let window = self.window;
        self.peers
            .retain(|(_, _, last)| now.duration_since(*last) < window);
        self.peers.iter().map(|(_, name, _)| name.clone()).collect()
    }
}
