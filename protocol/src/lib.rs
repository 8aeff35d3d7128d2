//! Wire contract shared by the semester chat server and clients: the
//! persisted message shape, the live-connection event envelopes and the
//! room identifier grammar.

pub mod events;
pub mod model;
pub mod room;

pub use events::{AckResult, ClientEvent, ServerEvent};
pub use model::{ChatMessage, UserRef};
pub use room::{RoomIdError, SemesterId};
