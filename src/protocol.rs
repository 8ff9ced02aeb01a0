//! Wire protocol for the Triologue gateway.
//!
//! The gateway speaks line-delimited JSON over a persistent WebSocket.
//! Every frame is a single JSON object with a `type` tag.
//!
//! # Message Types
//!
//! - [`InboundEvent`] - gateway → client events (auth results, messages,
//!   keepalive pings)
//! - [`OutboundEvent`] - client → gateway messages (auth, chat messages,
//!   pong replies)
//!
//! Decoding is schema-lenient: a frame with an unrecognized `type` tag
//! decodes to [`InboundEvent::Unknown`] so the session loop can skip
//! forward-incompatible gateway messages without dying.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Agent identity returned by the gateway at authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Stable login name.
    pub username: String,
    /// Human-facing display name.
    pub name: String,
    /// Optional decoration shown next to the name.
    #[serde(default)]
    pub emoji: Option<String>,
}

impl AgentProfile {
    /// Emoji to display, falling back to the stock robot.
    #[must_use]
    pub fn emoji_or_default(&self) -> &str {
        self.emoji.as_deref().unwrap_or("🤖")
    }
}

/// A chat room the agent is a member of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Opaque room identifier used on the wire.
    pub id: String,
    /// Human-facing room name (filter lookups match against this).
    pub name: String,
}

/// A chat message event.
///
/// Every field is optional on the wire; the gateway omits what it does
/// not know. Field names are camelCase to match the gateway schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub sender_display_name: Option<String>,
    #[serde(default)]
    pub sender_type: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl MessageEvent {
    /// Display name for the sender: display name, then login, then `?`.
    #[must_use]
    pub fn sender_label(&self) -> &str {
        self.sender_display_name
            .as_deref()
            .or(self.sender.as_deref())
            .unwrap_or("?")
    }
}

/// Events received from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Authentication accepted; carries the agent identity and room roster.
    AuthOk {
        agent: AgentProfile,
        #[serde(default)]
        rooms: Vec<Room>,
    },
    /// Authentication rejected. Fatal.
    AuthError { error: String },
    /// A chat message in some room.
    Message(MessageEvent),
    /// Delivery acknowledgement for a message we sent. Ignored.
    MessageSent,
    /// Non-fatal gateway error.
    Error {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    /// Keepalive. Answered with [`OutboundEvent::Pong`], never surfaced.
    Ping,
    /// Any `type` tag this client does not know. Skipped.
    #[serde(other)]
    Unknown,
}

/// Messages sent to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Bearer-token handshake; the first and only pre-auth message.
    Auth { token: String },
    /// Chat message to a room.
    Message { room: String, content: String },
    /// Keepalive reply.
    Pong,
}

/// Decode one inbound frame.
///
/// Unknown `type` tags succeed as [`InboundEvent::Unknown`]. Malformed
/// JSON or a missing required field for the declared type is an error;
/// callers treat that as non-fatal and drop the frame.
pub fn decode(raw: &str) -> Result<InboundEvent, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Encode one outbound event as a JSON text frame.
pub fn encode(event: &OutboundEvent) -> Result<String> {
    serde_json::to_string(event).context("failed to encode outbound event")
}
