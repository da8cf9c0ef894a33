use log::{ error, info };
use std::collections::HashMap;
use std::sync::{ Arc, Mutex, Weak };

use crate::connection::{ ConnectionManager, Subscription };
use crate::models::chat::RosterEntry;
use crate::models::wire::{ self, NewMessagePush };
use crate::sync::MessageReconciler;

/// Live list of active conversations for the operator view. Every
/// `sessions-list` push replaces the whole mapping with the server's
/// snapshot; there is no incremental patching.
#[derive(Default)]
pub struct RosterSync {
    entries: HashMap<String, RosterEntry>,
    selected: Option<String>,
    open_engine: Option<Arc<Mutex<MessageReconciler>>>,
}

impl RosterSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &HashMap<String, RosterEntry> {
        &self.entries
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_engine(&self) -> Option<Arc<Mutex<MessageReconciler>>> {
        self.open_engine.clone()
    }

    /// Replace the roster with a fresh snapshot. The selected conversation
    /// is re-resolved by identifier; if the backend no longer lists it the
    /// selection is cleared.
    pub fn replace(&mut self, snapshot: Vec<RosterEntry>) {
        self.entries = snapshot
            .into_iter()
            .map(|entry| (entry.session_id.clone(), entry))
            .collect();

        if let Some(id) = &self.selected {
            if !self.entries.contains_key(id.as_str()) {
                info!("conversation {} vanished from roster; clearing selection", id);
                self.selected = None;
                self.open_engine = None;
            }
        }
    }

    /// Handle a `new-message` push: refresh the entry's summary state and,
    /// when it targets the open conversation, forward the message to its
    /// reconciliation engine.
    pub fn apply_push(&mut self, push: NewMessagePush) {
        let open = self.selected.as_deref() == Some(push.session_id.as_str());

        let entry = self.entries
            .entry(push.session_id.clone())
            .or_insert_with(|| RosterEntry {
                session_id: push.session_id.clone(),
                last_message: None,
                last_activity: push.message.created_at,
                unread: false,
            });
        entry.last_message = Some(push.message.content.clone());
        entry.last_activity = push.message.created_at;
        entry.unread = !open;

        if open {
            if let Some(engine) = &self.open_engine {
                engine.lock().unwrap().merge_incoming(push.message);
            }
        }
    }

    /// Open a conversation: its engine receives forwarded pushes and its
    /// roster entry is marked read.
    pub fn select(&mut self, session_id: &str, engine: Arc<Mutex<MessageReconciler>>) {
        self.selected = Some(session_id.to_string());
        self.open_engine = Some(engine);
        if let Some(entry) = self.entries.get_mut(session_id) {
            entry.unread = false;
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
        self.open_engine = None;
    }
}

/// Wire the roster to the connection: subscribe to the push events, then
/// request the initial snapshot. The returned guards hold the
/// subscriptions; dropping them on view teardown withdraws the handlers.
pub fn activate(
    conn: &ConnectionManager,
    roster: &Arc<Mutex<RosterSync>>
) -> Vec<Subscription> {
    let subs = vec![
        conn.on(wire::SESSIONS_LIST, on_sessions_list(Arc::downgrade(roster))),
        conn.on(wire::NEW_MESSAGE, on_new_message(Arc::downgrade(roster)))
    ];
    conn.emit(wire::GET_SESSIONS, serde_json::Value::Null);
    subs
}

fn on_sessions_list(
    roster: Weak<Mutex<RosterSync>>
) -> impl Fn(&serde_json::Value) + Send + Sync + 'static {
    move |data| {
        let Some(roster) = roster.upgrade() else {
            return;
        };
        match serde_json::from_value::<Vec<RosterEntry>>(data.clone()) {
            Ok(snapshot) => roster.lock().unwrap().replace(snapshot),
            Err(e) => error!("malformed sessions-list payload: {}", e),
        }
    }
}

fn on_new_message(
    roster: Weak<Mutex<RosterSync>>
) -> impl Fn(&serde_json::Value) + Send + Sync + 'static {
    move |data| {
        let Some(roster) = roster.upgrade() else {
            return;
        };
        match serde_json::from_value::<NewMessagePush>(data.clone()) {
            Ok(push) => roster.lock().unwrap().apply_push(push),
            Err(e) => error!("malformed new-message payload: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ ConnectionConfig, ConnectionManager };
    use crate::models::chat::{ ChatMessage, MessageOrigin, SenderRole };
    use crate::transport::TransportKind;
    use chrono::Utc;
    use std::time::Duration;
    use url::Url;

    fn entry(id: &str) -> RosterEntry {
        RosterEntry {
            session_id: id.to_string(),
            last_message: None,
            last_activity: Utc::now(),
            unread: false,
        }
    }

    fn push(id: &str, sender: SenderRole, content: &str) -> NewMessagePush {
        NewMessagePush {
            session_id: id.to_string(),
            message: ChatMessage {
                sender,
                content: content.to_string(),
                created_at: Utc::now(),
                origin: MessageOrigin::Confirmed,
            },
        }
    }

    fn idle_engine(id: &str) -> Arc<Mutex<MessageReconciler>> {
        let conn = Arc::new(
            ConnectionManager::new(ConnectionConfig {
                endpoint: Url::parse("ws://127.0.0.1:4000").unwrap(),
                transports: vec![TransportKind::WebSocket],
                max_reconnect_attempts: 1,
                reconnect_delay: Duration::from_millis(10),
            })
        );
        Arc::new(Mutex::new(MessageReconciler::new(id.to_string(), SenderRole::Admin, conn)))
    }

    #[test]
    fn snapshot_replacement_is_wholesale() {
        let mut roster = RosterSync::new();
        roster.replace(vec![entry("a"), entry("b")]);
        roster.replace(vec![entry("c")]);

        assert_eq!(roster.entries().len(), 1);
        assert!(roster.entries().contains_key("c"));
    }

    #[test]
    fn selection_survives_replacement_when_still_listed() {
        let mut roster = RosterSync::new();
        roster.replace(vec![entry("a"), entry("b")]);
        roster.select("a", idle_engine("a"));

        roster.replace(vec![entry("a")]);
        assert_eq!(roster.selected(), Some("a"));
        assert!(roster.selected_engine().is_some());
    }

    #[test]
    fn selection_clears_when_absent_from_new_snapshot() {
        let mut roster = RosterSync::new();
        roster.replace(vec![entry("a"), entry("b")]);
        roster.select("a", idle_engine("a"));

        roster.replace(vec![entry("b")]);
        assert_eq!(roster.selected(), None);
        assert!(roster.selected_engine().is_none());
    }

    #[test]
    fn push_for_unopened_conversation_marks_it_unread() {
        let mut roster = RosterSync::new();
        roster.replace(vec![entry("a"), entry("b")]);
        roster.select("a", idle_engine("a"));

        roster.apply_push(push("b", SenderRole::User, "anyone there?"));

        let b = &roster.entries()["b"];
        assert!(b.unread);
        assert_eq!(b.last_message.as_deref(), Some("anyone there?"));
    }

    #[test]
    fn push_for_open_conversation_forwards_to_engine_and_stays_read() {
        let mut roster = RosterSync::new();
        roster.replace(vec![entry("a")]);
        let engine = idle_engine("a");
        roster.select("a", Arc::clone(&engine));

        roster.apply_push(push("a", SenderRole::User, "hello"));

        assert!(!roster.entries()["a"].unread);
        assert_eq!(engine.lock().unwrap().messages().len(), 1);
    }

    #[test]
    fn push_for_unknown_conversation_creates_its_entry() {
        let mut roster = RosterSync::new();
        roster.apply_push(push("fresh", SenderRole::User, "hi"));

        assert_eq!(roster.entries().len(), 1);
        assert!(roster.entries()["fresh"].unread);
    }

    #[test]
    fn echo_pushes_into_the_open_engine_are_discarded_by_role() {
        let mut roster = RosterSync::new();
        roster.replace(vec![entry("a")]);
        let engine = idle_engine("a");
        roster.select("a", Arc::clone(&engine));
        engine.lock().unwrap().append_local("How can I help?");

        roster.apply_push(push("a", SenderRole::Admin, "How can I help?"));

        assert_eq!(engine.lock().unwrap().messages().len(), 1);
    }
}
