//! Server frames and the events fanned out to channel subscribers.
//!
//! The notification server pushes JSON text frames shaped
//! `{"event": "<name>", "data": <any>}`. The channel does not interpret the
//! names; subscribers pick the ones they care about.

use serde::{Deserialize, Serialize};

/// A named event pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    /// Event name, e.g. `"leave_request_created"`.
    pub event: String,
    /// Event payload; `null` when the frame carried none.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ServerEvent {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// What a channel subscriber receives.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// The connection was established (or re-established).
    Connected { identity: String },

    /// The live connection was lost.
    Disconnected,

    /// The first connection attempt for this handle failed. Emitted once so
    /// the UI can warn that live updates are unavailable.
    ConnectionFailed { error: String },

    /// An event pushed by the server.
    Server(ServerEvent),
}

impl RealtimeEvent {
    /// The server event name, if this is a server event.
    pub fn server_event_name(&self) -> Option<&str> {
        match self {
            RealtimeEvent::Server(event) => Some(&event.event),
            _ => None,
        }
    }
}
