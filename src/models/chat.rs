use chrono::{ DateTime, Utc };
use serde::{ Serialize, Deserialize };
use std::fmt;
use std::str::FromStr;

/// Party a message is attributed to. The set is closed: system or bot
/// traffic arrives tagged as one of these two roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    User,
    Admin,
}

impl fmt::Display for SenderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderRole::User => write!(f, "user"),
            SenderRole::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for SenderRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(SenderRole::User),
            "admin" | "operator" => Ok(SenderRole::Admin),
            other => Err(format!("unknown role '{}', expected 'user' or 'admin'", other)),
        }
    }
}

/// Whether a message was created locally and is still awaiting the server,
/// or came back confirmed. Never serialized; the wire carries no origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MessageOrigin {
    LocalUnconfirmed,
    #[default]
    Confirmed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: SenderRole,
    pub content: String,
    // The backend may omit createdAt; fall back to receipt time.
    #[serde(rename = "createdAt", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub origin: MessageOrigin,
}

impl ChatMessage {
    pub fn local(sender: SenderRole, content: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
            created_at: Utc::now(),
            origin: MessageOrigin::LocalUnconfirmed,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.origin == MessageOrigin::LocalUnconfirmed
    }
}

/// Summary of one active conversation as shown in the operator roster.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RosterEntry {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "lastMessage", default)]
    pub last_message: Option<String>,
    #[serde(rename = "lastActivity", default = "Utc::now")]
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub unread: bool,
}
