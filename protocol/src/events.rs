//! Live-connection event envelopes. Every frame is a JSON object tagged
//! `{event, data}`; the event names are the wire contract.

use crate::model::{ChatMessage, UserRef};
use serde::{Deserialize, Serialize};

/// Events a client sends over the live connection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "joinRoom")]
    JoinRoom { room: String },
    /// Submit a new message. The server answers with a direct
    /// `message:ack` correlated by `tempId`.
    #[serde(rename = "message:create")]
    MessageCreate {
        room: String,
        text: String,
        #[serde(rename = "tempId", default, skip_serializing_if = "Option::is_none")]
        temp_id: Option<String>,
        /// Carried for wire compatibility; the server stamps the sender
        /// from the authenticated session, not from this field.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<UserRef>,
    },
    #[serde(rename = "typing")]
    Typing {
        room: String,
        #[serde(rename = "userId")]
        user_id: String,
        name: String,
    },
    #[serde(rename = "stopTyping")]
    StopTyping {
        room: String,
        #[serde(rename = "userId")]
        user_id: String,
    },
}

/// Outcome of a message submission, delivered back on the same connection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum AckResult {
    Ok { message: ChatMessage },
    Err { error: String },
}

/// Events the server sends to clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Greeting on connect, echoing the identity the server resolved for
    /// this session.
    #[serde(rename = "hello")]
    Hello { user: UserRef },
    /// Room broadcast carrying a fully persisted message.
    #[serde(rename = "message:new")]
    MessageNew { message: ChatMessage },
    /// Direct acknowledgment to the submitting connection only.
    #[serde(rename = "message:ack")]
    MessageAck {
        #[serde(rename = "tempId", default, skip_serializing_if = "Option::is_none")]
        temp_id: Option<String>,
        result: AckResult,
    },
    #[serde(rename = "user:typing")]
    UserTyping {
        #[serde(rename = "userId")]
        user_id: String,
        name: String,
    },
    #[serde(rename = "user:stopTyping")]
    UserStopTyping {
        #[serde(rename = "userId")]
        user_id: String,
    },
}
