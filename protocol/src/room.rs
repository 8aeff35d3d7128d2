use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ROOM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^semester:(0|[1-9][0-9]*)$").unwrap());
static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(0|[1-9][0-9]*)$").unwrap());

/// Integer id of a semester cohort. One chat room exists per semester and
/// is addressed on the wire as `semester:<id>`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SemesterId(pub i64);

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RoomIdError {
    /// Input does not match the `semester:<integer>` grammar.
    #[error("room `{0}` does not match semester:<id>")]
    Malformed(String),
    /// Digits matched the grammar but overflow the id type.
    #[error("semester id out of range in `{0}`")]
    OutOfRange(String),
}

impl SemesterId {
    /// Parse a structured room string, e.g. `semester:3`.
    pub fn parse_room(room: &str) -> Result<Self, RoomIdError> {
        let caps = ROOM_RE
            .captures(room)
            .ok_or_else(|| RoomIdError::Malformed(room.to_string()))?;
        caps[1]
            .parse::<i64>()
            .map(SemesterId)
            .map_err(|_| RoomIdError::OutOfRange(room.to_string()))
    }

    /// Parse a bare semester id as it appears in REST paths.
    pub fn parse_id(raw: &str) -> Result<Self, RoomIdError> {
        if !ID_RE.is_match(raw) {
            return Err(RoomIdError::Malformed(raw.to_string()));
        }
        raw.parse::<i64>()
            .map(SemesterId)
            .map_err(|_| RoomIdError::OutOfRange(raw.to_string()))
    }

    /// The structured room string for this semester.
    pub fn room_name(&self) -> String {
        format!("semester:{}", self.0)
    }
}

impl std::fmt::Display for SemesterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
