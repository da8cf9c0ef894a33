use serde::{ Serialize, Deserialize };
use serde_json::Value;

use super::chat::ChatMessage;

// Outbound event names (client -> backend).
pub const INIT_SESSION: &str = "init_session";
pub const USER_MESSAGE: &str = "user_message";
pub const ADMIN_MESSAGE: &str = "admin_message";
pub const GET_SESSIONS: &str = "get-sessions";
pub const GET_MESSAGES: &str = "get-messages";

// Inbound event names (backend -> client).
pub const SESSION_INIT: &str = "session_init";
pub const MESSAGE: &str = "message";
pub const SESSIONS_LIST: &str = "sessions-list";
pub const NEW_MESSAGE: &str = "new-message";
pub const MESSAGES_HISTORY: &str = "messages-history";

/// One frame on the wire: a named event with a structured payload. The
/// optional `ack` field correlates a request with its acknowledgment; an
/// inbound envelope whose `ack` matches a pending request resolves that
/// request instead of being dispatched to subscribers.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Envelope {
    pub event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<String>,
}

impl Envelope {
    pub fn event(event: &str, data: Value) -> Self {
        Self { event: event.to_string(), data, ack: None }
    }
}

/// Payload of `init_session` and `session_init`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionHandle {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// Payload of `user_message` / `admin_message` / `get-messages`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OutboundMessage {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Payload of `new-message`: a fresh message scoped to one conversation.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewMessagePush {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub message: ChatMessage,
}

/// Response body of the long-polling transport's `/poll` route. The cursor
/// only advances once the client consumes a batch, so an aborted poll
/// request loses no frames.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PollBatch {
    pub cursor: u64,
    #[serde(default)]
    pub frames: Vec<String>,
}
