use semchat_protocol::{AckResult, ChatMessage, ClientEvent, SemesterId, ServerEvent, UserRef};
use uuid::Uuid;

/// Delivery state of one rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Optimistic entry, awaiting the server's acknowledgment.
    Sending,
    /// Confirmed by the server; `id` and `created_at` are set.
    Sent,
    /// The server reported a failure; the entry stays visible so the
    /// user can see it and retry.
    Failed,
}

/// One row in the conversation view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Server id once confirmed; optimistic entries have none yet.
    pub id: Option<i64>,
    pub sender: UserRef,
    pub text: String,
    pub temp_id: Option<String>,
    pub created_at: Option<i64>,
    pub status: DeliveryStatus,
}

impl Entry {
    fn confirmed(message: ChatMessage) -> Self {
        Entry {
            id: Some(message.id),
            sender: message.sender,
            text: message.text,
            temp_id: message.temp_id,
            created_at: Some(message.created_at),
            status: DeliveryStatus::Sent,
        }
    }
}

/// Returned by [`ChatViewModel::begin_send`]: the optimistic entry's
/// correlation token plus the wire event to submit. When no live
/// connection exists, the caller instead POSTs `{text, tempId}` to the
/// fallback endpoint and feeds the response through
/// [`ChatViewModel::on_ack`] just like a live acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub temp_id: String,
    pub event: ClientEvent,
}

/// Local conversation state for one room.
pub struct ChatViewModel {
    me: UserRef,
    semester: SemesterId,
    entries: Vec<Entry>,
    unseen: u32,
    at_bottom: bool,
}

impl ChatViewModel {
    pub fn new(me: UserRef, semester: SemesterId) -> Self {
        Self {
            me,
            semester,
            entries: Vec::new(),
            unseen: 0,
            at_bottom: true,
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Live messages that arrived while scrolled away from the tail.
    pub fn unseen(&self) -> u32 {
        self.unseen
    }

    /// Viewport scroll state; returning to the bottom clears the badge.
    pub fn set_at_bottom(&mut self, at_bottom: bool) {
        self.at_bottom = at_bottom;
        if at_bottom {
            self.unseen = 0;
        }
    }

    /// Show the message immediately and produce the submission event.
    pub fn begin_send(&mut self, text: &str) -> PendingSend {
        let temp_id = Uuid::new_v4().to_string();
        self.entries.push(Entry {
            id: None,
            sender: self.me.clone(),
            text: text.to_string(),
            temp_id: Some(temp_id.clone()),
            created_at: None,
            status: DeliveryStatus::Sending,
        });
        PendingSend {
            temp_id: temp_id.clone(),
            event: self.create_event(text, temp_id),
        }
    }

    /// Resend a failed entry, reusing its tempId.
    pub fn retry_send(&mut self, temp_id: &str) -> Option<PendingSend> {
        let entry = self.entries.iter_mut().find(|e| {
            e.status == DeliveryStatus::Failed && e.temp_id.as_deref() == Some(temp_id)
        })?;
        entry.status = DeliveryStatus::Sending;
        let text = entry.text.clone();
        Some(PendingSend {
            temp_id: temp_id.to_string(),
            event: self.create_event(&text, temp_id.to_string()),
        })
    }

    fn create_event(&self, text: &str, temp_id: String) -> ClientEvent {
        ClientEvent::MessageCreate {
            room: self.semester.room_name(),
            text: text.to_string(),
            temp_id: Some(temp_id),
            user: Some(self.me.clone()),
        }
    }

    /// Feed any server event into the view model. Typing indicators are
    /// tracked separately by [`crate::TypingPeers`].
    pub fn apply(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::MessageNew { message } => self.on_message_new(message),
            ServerEvent::MessageAck { temp_id, result } => {
                self.on_ack(temp_id.as_deref(), result)
            }
            ServerEvent::Hello { .. }
            | ServerEvent::UserTyping { .. }
            | ServerEvent::UserStopTyping { .. } => {}
        }
    }

    /// Direct acknowledgment from the server, correlated by tempId.
    pub fn on_ack(&mut self, temp_id: Option<&str>, result: AckResult) {
        match result {
            AckResult::Ok { message } => self.resolve_own(message),
            AckResult::Err { .. } => {
                if let Some(entry) = self.entries.iter_mut().find(|e| {
                    e.status == DeliveryStatus::Sending
                        && temp_id.is_some()
                        && e.temp_id.as_deref() == temp_id
                }) {
                    entry.status = DeliveryStatus::Failed;
                }
            }
        }
    }

    /// A room broadcast arrived on the live connection.
    pub fn on_message_new(&mut self, message: ChatMessage) {
        if message.sender.id == self.me.id {
            self.resolve_own(message);
        } else {
            if self.known(message.id) {
                return;
            }
            self.push_live(Entry::confirmed(message));
        }
    }

    /// Apply the newest history page (chronological, as the endpoint
    /// returns it). Messages already rendered are skipped by server id.
    pub fn load_initial(&mut self, page: Vec<ChatMessage>) {
        for message in page {
            if self.known(message.id) {
                continue;
            }
            self.entries.push(Entry::confirmed(message));
        }
    }

    /// Prepend an older page (chronological) without disturbing the
    /// already-rendered entries.
    pub fn load_older(&mut self, page: Vec<ChatMessage>) {
        let mut older: Vec<Entry> = page
            .into_iter()
            .filter(|message| !self.known(message.id))
            .map(Entry::confirmed)
            .collect();
        older.extend(self.entries.drain(..));
        self.entries = older;
    }

    /// Fold a server-confirmed copy of one of our own messages into the
    /// view, whether it arrived as the direct ack or as a broadcast echo.
    /// Exactly one visible entry remains either way.
    fn resolve_own(&mut self, message: ChatMessage) {
        if self.known(message.id) {
            return;
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| {
            e.status == DeliveryStatus::Sending
                && e.temp_id.is_some()
                && e.temp_id == message.temp_id
        }) {
            *entry = Entry::confirmed(message);
            return;
        }
        // already resolved under a different path; fall back to tempId
        if message.temp_id.is_some()
            && self
                .entries
                .iter()
                .any(|e| e.temp_id == message.temp_id)
        {
            return;
        }
        // no optimistic counterpart (e.g. sent from another session)
        self.push_live(Entry::confirmed(message));
    }

    fn known(&self, id: i64) -> bool {
        self.entries.iter().any(|e| e.id == Some(id))
    }

    fn push_live(&mut self, entry: Entry) {
        let own = entry.sender.id == self.me.id;
        self.entries.push(entry);
        if !self.at_bottom && !own {
            self.unseen += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserRef {
        UserRef {
            id: "u1".into(),
            name: "Alice".into(),
        }
    }

    fn bob() -> UserRef {
        UserRef {
            id: "u2".into(),
            name: "Bob".into(),
        }
    }

    fn model() -> ChatViewModel {
        ChatViewModel::new(alice(), SemesterId(3))
    }

    fn confirmed(id: i64, sender: UserRef, text: &str, temp_id: Option<&str>) -> ChatMessage {
        ChatMessage {
            id,
            semester_id: 3,
            sender,
            text: text.into(),
            temp_id: temp_id.map(str::to_string),
            created_at: 100 + id,
        }
    }

    #[test]
    fn begin_send_shows_optimistic_entry() {
        let mut vm = model();
        let pending = vm.begin_send("hello");
        assert_eq!(vm.entries().len(), 1);
        let entry = &vm.entries()[0];
        assert_eq!(entry.status, DeliveryStatus::Sending);
        assert!(entry.id.is_none());
        assert_eq!(entry.temp_id.as_deref(), Some(pending.temp_id.as_str()));
        match pending.event {
            ClientEvent::MessageCreate { room, temp_id, .. } => {
                assert_eq!(room, "semester:3");
                assert_eq!(temp_id.as_deref(), Some(pending.temp_id.as_str()));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn ack_resolves_optimistic_entry() {
        let mut vm = model();
        let pending = vm.begin_send("hello");
        let msg = confirmed(7, alice(), "hello", Some(&pending.temp_id));
        vm.on_ack(Some(&pending.temp_id), AckResult::Ok { message: msg });
        assert_eq!(vm.entries().len(), 1);
        let entry = &vm.entries()[0];
        assert_eq!(entry.status, DeliveryStatus::Sent);
        assert_eq!(entry.id, Some(7));
    }

    #[test]
    fn ack_then_broadcast_echo_keeps_one_entry() {
        // policy (b): the server echoed the sender's own message back
        let mut vm = model();
        let pending = vm.begin_send("hello");
        let msg = confirmed(7, alice(), "hello", Some(&pending.temp_id));
        vm.on_ack(Some(&pending.temp_id), AckResult::Ok { message: msg.clone() });
        vm.on_message_new(msg);
        assert_eq!(vm.entries().len(), 1);
        assert_eq!(vm.entries()[0].id, Some(7));
    }

    #[test]
    fn broadcast_then_ack_keeps_one_entry() {
        // same pair of events, arrival order reversed
        let mut vm = model();
        let pending = vm.begin_send("hello");
        let msg = confirmed(7, alice(), "hello", Some(&pending.temp_id));
        vm.on_message_new(msg.clone());
        vm.on_ack(Some(&pending.temp_id), AckResult::Ok { message: msg });
        assert_eq!(vm.entries().len(), 1);
        assert_eq!(vm.entries()[0].status, DeliveryStatus::Sent);
    }

    #[test]
    fn failed_ack_keeps_entry_visible_and_retryable() {
        let mut vm = model();
        let pending = vm.begin_send("hello");
        vm.on_ack(
            Some(&pending.temp_id),
            AckResult::Err {
                error: "persistence".into(),
            },
        );
        assert_eq!(vm.entries().len(), 1);
        assert_eq!(vm.entries()[0].status, DeliveryStatus::Failed);

        let retried = vm.retry_send(&pending.temp_id).unwrap();
        assert_eq!(retried.temp_id, pending.temp_id);
        assert_eq!(vm.entries()[0].status, DeliveryStatus::Sending);
        // a sent entry cannot be retried
        let msg = confirmed(9, alice(), "hello", Some(&pending.temp_id));
        vm.on_ack(Some(&pending.temp_id), AckResult::Ok { message: msg });
        assert!(vm.retry_send(&pending.temp_id).is_none());
    }

    #[test]
    fn foreign_broadcasts_append_in_arrival_order() {
        let mut vm = model();
        vm.on_message_new(confirmed(1, bob(), "one", None));
        vm.on_message_new(confirmed(2, bob(), "two", None));
        let texts: Vec<_> = vm.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["one", "two"]);
        // duplicate delivery is dropped by server id
        vm.on_message_new(confirmed(2, bob(), "two", None));
        assert_eq!(vm.entries().len(), 2);
    }

    #[test]
    fn unseen_counts_only_when_scrolled_away() {
        let mut vm = model();
        vm.on_message_new(confirmed(1, bob(), "seen", None));
        assert_eq!(vm.unseen(), 0);

        vm.set_at_bottom(false);
        vm.on_message_new(confirmed(2, bob(), "missed", None));
        vm.on_message_new(confirmed(3, bob(), "missed too", None));
        assert_eq!(vm.unseen(), 2);
        // own confirmations never count as unseen
        let pending = vm.begin_send("mine");
        let msg = confirmed(4, alice(), "mine", Some(&pending.temp_id));
        vm.on_ack(Some(&pending.temp_id), AckResult::Ok { message: msg });
        assert_eq!(vm.unseen(), 2);

        vm.set_at_bottom(true);
        assert_eq!(vm.unseen(), 0);
    }

    #[test]
    fn older_pages_prepend_without_disturbing_the_tail() {
        let mut vm = model();
        vm.load_initial(vec![
            confirmed(10, bob(), "recent a", None),
            confirmed(11, bob(), "recent b", None),
        ]);
        vm.on_message_new(confirmed(12, bob(), "live", None));

        vm.load_older(vec![
            confirmed(8, bob(), "old a", None),
            confirmed(9, bob(), "old b", None),
        ]);
        let texts: Vec<_> = vm.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["old a", "old b", "recent a", "recent b", "live"]);

        // overlapping pages do not duplicate
        vm.load_older(vec![confirmed(9, bob(), "old b", None)]);
        assert_eq!(vm.entries().len(), 5);
    }

    #[test]
    fn own_message_from_another_session_appends_once() {
        let mut vm = model();
        let msg = confirmed(5, alice(), "from my phone", Some("other-session"));
        vm.on_message_new(msg.clone());
        vm.on_message_new(msg);
        assert_eq!(vm.entries().len(), 1);
        assert_eq!(vm.entries()[0].status, DeliveryStatus::Sent);
    }
}
