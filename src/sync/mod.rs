use log::debug;
use serde_json::json;
use std::sync::Arc;

use crate::connection::ConnectionManager;
use crate::models::chat::{ ChatMessage, SenderRole };
use crate::models::wire;

/// Single source of truth for one conversation's visible message sequence.
///
/// Locally-submitted messages become visible immediately and are
/// transmitted in the background; server pushes carrying the local actor's
/// own role are echoes of those sends and are discarded on merge. That
/// role-based discard is the only deduplication mechanism — it relies on
/// the backend never delivering genuine peer traffic tagged with this
/// client's role.
pub struct MessageReconciler {
    session_id: String,
    local_role: SenderRole,
    conn: Arc<ConnectionManager>,
    messages: Vec<ChatMessage>,
}

impl MessageReconciler {
    pub fn new(session_id: String, local_role: SenderRole, conn: Arc<ConnectionManager>) -> Self {
        Self {
            session_id,
            local_role,
            conn,
            messages: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn local_role(&self) -> SenderRole {
        self.local_role
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Optimistic insert: the message is visible before the backend ever
    /// sees it, and transmission is fired without awaiting acknowledgment.
    /// Empty or whitespace-only content is a no-op. Returns whether an
    /// entry was appended.
    pub fn append_local(&mut self, content: &str) -> bool {
        if content.trim().is_empty() {
            debug!("ignoring blank outgoing message");
            return false;
        }

        self.messages.push(ChatMessage::local(self.local_role, content));

        let event = match self.local_role {
            SenderRole::User => wire::USER_MESSAGE,
            SenderRole::Admin => wire::ADMIN_MESSAGE,
        };
        self.conn.emit(
            event,
            json!({ "sessionId": self.session_id, "content": content })
        );
        true
    }

    /// Merge a server-pushed message. A message carrying the local actor's
    /// own role is an echo of a prior `append_local` and is discarded; only
    /// the other party's messages are appended. Returns whether the visible
    /// sequence changed.
    pub fn merge_incoming(&mut self, message: ChatMessage) -> bool {
        if message.sender == self.local_role {
            debug!("discarding echo of own {} message", message.sender);
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Wholesale replacement, used when loading history for a newly
    /// selected conversation. Unconfirmed local entries absent from the
    /// replacement are dropped with it; history only loads on conversation
    /// switch, never mid-composition.
    pub fn reset(&mut self, sequence: Vec<ChatMessage>) {
        self.messages = sequence;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ ConnectionConfig, ConnectionManager };
    use crate::models::chat::MessageOrigin;
    use crate::transport::TransportKind;
    use chrono::Utc;
    use std::time::Duration;
    use url::Url;

    fn idle_manager() -> Arc<ConnectionManager> {
        // Never started: emits queue unsent, which is all these tests need.
        Arc::new(
            ConnectionManager::new(ConnectionConfig {
                endpoint: Url::parse("ws://127.0.0.1:4000").unwrap(),
                transports: vec![TransportKind::WebSocket],
                max_reconnect_attempts: 1,
                reconnect_delay: Duration::from_millis(10),
            })
        )
    }

    fn engine(role: SenderRole) -> MessageReconciler {
        MessageReconciler::new("1700000000000-ab12cd34".to_string(), role, idle_manager())
    }

    fn pushed(sender: SenderRole, content: &str) -> ChatMessage {
        ChatMessage {
            sender,
            content: content.to_string(),
            created_at: Utc::now(),
            origin: MessageOrigin::Confirmed,
        }
    }

    #[test]
    fn visible_length_equals_non_empty_append_calls_in_order() {
        let mut engine = engine(SenderRole::User);
        assert!(engine.append_local("first"));
        assert!(!engine.append_local("   "));
        assert!(!engine.append_local(""));
        assert!(engine.append_local("second"));

        let contents: Vec<&str> = engine
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert!(engine.messages().iter().all(|m| m.is_pending()));
    }

    #[test]
    fn own_role_echo_never_changes_the_sequence() {
        let mut engine = engine(SenderRole::User);
        engine.append_local("Hello");

        assert!(!engine.merge_incoming(pushed(SenderRole::User, "Hello")));
        assert_eq!(engine.messages().len(), 1);

        // Even an echo with unfamiliar content is discarded by role alone.
        assert!(!engine.merge_incoming(pushed(SenderRole::User, "never sent")));
        assert_eq!(engine.messages().len(), 1);
    }

    #[test]
    fn peer_message_appends_exactly_one_tail_entry() {
        let mut engine = engine(SenderRole::User);
        engine.append_local("Hello");

        assert!(engine.merge_incoming(pushed(SenderRole::Admin, "Hi there")));
        assert_eq!(engine.messages().len(), 2);
        assert_eq!(engine.messages()[0].content, "Hello");
        assert_eq!(engine.messages()[1].sender, SenderRole::Admin);
    }

    #[test]
    fn admin_side_discards_admin_echoes_and_accepts_user_traffic() {
        let mut engine = engine(SenderRole::Admin);
        engine.append_local("How can I help?");

        assert!(!engine.merge_incoming(pushed(SenderRole::Admin, "How can I help?")));
        assert!(engine.merge_incoming(pushed(SenderRole::User, "My order is late")));
        assert_eq!(engine.messages().len(), 2);
    }

    #[test]
    fn optimistic_append_then_echo_then_peer_reply() {
        let mut engine = engine(SenderRole::User);

        engine.append_local("Hello");
        assert_eq!(engine.messages().len(), 1);
        assert_eq!(engine.messages()[0].sender, SenderRole::User);
        assert_eq!(engine.messages()[0].origin, MessageOrigin::LocalUnconfirmed);

        engine.merge_incoming(pushed(SenderRole::User, "Hello"));
        assert_eq!(engine.messages().len(), 1);

        engine.merge_incoming(pushed(SenderRole::Admin, "Hi there"));
        assert_eq!(engine.messages().len(), 2);
        assert_eq!(engine.messages()[1].sender, SenderRole::Admin);
    }

    #[test]
    fn reset_replaces_the_sequence_and_drops_unconfirmed_entries() {
        let mut engine = engine(SenderRole::Admin);
        engine.append_local("draft");

        engine.reset(vec![
            pushed(SenderRole::User, "older"),
            pushed(SenderRole::Admin, "reply")
        ]);

        assert_eq!(engine.messages().len(), 2);
        assert!(engine.messages().iter().all(|m| !m.is_pending()));
        assert_eq!(engine.messages()[0].content, "older");
    }
}
