use crate::domain::message::{Message, StatusPatch};
use serde::{Deserialize, Serialize};

/// Frames carried on the real-time channel, encoded as `{"event": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum RealtimeEvent {
    NewMessage(Message),
    StatusUpdate(StatusPatch),
    /// Events were dropped for this subscriber; the client must re-fetch.
    Resync,
}

impl RealtimeEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "new_message",
            Self::StatusUpdate(_) => "status_update",
            Self::Resync => "resync",
        }
    }
}
