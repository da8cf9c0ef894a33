//! Pure mapping from reconciled state to renderable view models. Nothing
//! here touches the connection or does I/O, so any renderer (terminal,
//! widget, dashboard) can sit on top.

use chrono::{ DateTime, Utc };
use std::collections::HashMap;

use crate::models::chat::{ ChatMessage, RosterEntry, SenderRole };

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageView {
    pub content: String,
    pub timestamp: String,
    /// Locally created, not yet confirmed by the backend.
    pub pending: bool,
}

/// Run of consecutive messages from the same sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageGroup {
    pub sender: SenderRole,
    pub messages: Vec<MessageView>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RosterRow {
    pub session_id: String,
    pub preview: String,
    pub last_activity: String,
    pub unread: bool,
    pub selected: bool,
}

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%H:%M").to_string()
}

/// Group the sequence into consecutive same-sender runs, preserving order.
pub fn group_by_sender(messages: &[ChatMessage]) -> Vec<MessageGroup> {
    let mut groups: Vec<MessageGroup> = Vec::new();
    for message in messages {
        let view = MessageView {
            content: message.content.clone(),
            timestamp: format_timestamp(&message.created_at),
            pending: message.is_pending(),
        };
        match groups.last_mut() {
            Some(group) if group.sender == message.sender => group.messages.push(view),
            _ =>
                groups.push(MessageGroup {
                    sender: message.sender,
                    messages: vec![view],
                }),
        }
    }
    groups
}

/// Roster rows sorted by last activity, most recent first. The ordering is
/// a display choice; the roster mapping itself carries none.
pub fn roster_rows(
    entries: &HashMap<String, RosterEntry>,
    selected: Option<&str>
) -> Vec<RosterRow> {
    let mut ordered: Vec<&RosterEntry> = entries.values().collect();
    ordered.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
    ordered
        .into_iter()
        .map(|entry| RosterRow {
            session_id: entry.session_id.clone(),
            preview: entry.last_message.clone().unwrap_or_default(),
            last_activity: format_timestamp(&entry.last_activity),
            unread: entry.unread,
            selected: selected == Some(entry.session_id.as_str()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::MessageOrigin;
    use chrono::TimeZone;

    fn msg(sender: SenderRole, content: &str, origin: MessageOrigin) -> ChatMessage {
        ChatMessage {
            sender,
            content: content.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            origin,
        }
    }

    #[test]
    fn consecutive_same_sender_messages_share_a_group() {
        let messages = vec![
            msg(SenderRole::User, "hi", MessageOrigin::Confirmed),
            msg(SenderRole::User, "anyone?", MessageOrigin::LocalUnconfirmed),
            msg(SenderRole::Admin, "hello", MessageOrigin::Confirmed),
            msg(SenderRole::User, "great", MessageOrigin::Confirmed)
        ];

        let groups = group_by_sender(&messages);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].sender, SenderRole::User);
        assert_eq!(groups[0].messages.len(), 2);
        assert!(groups[0].messages[1].pending);
        assert_eq!(groups[1].sender, SenderRole::Admin);
        assert_eq!(groups[2].messages[0].content, "great");
    }

    #[test]
    fn timestamps_render_as_hour_and_minute() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 42).unwrap();
        assert_eq!(format_timestamp(&at), "09:05");
    }

    #[test]
    fn roster_rows_sort_by_recency_and_flag_selection() {
        let mut entries = HashMap::new();
        entries.insert("old".to_string(), RosterEntry {
            session_id: "old".to_string(),
            last_message: Some("earlier".to_string()),
            last_activity: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            unread: false,
        });
        entries.insert("new".to_string(), RosterEntry {
            session_id: "new".to_string(),
            last_message: None,
            last_activity: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            unread: true,
        });

        let rows = roster_rows(&entries, Some("old"));
        assert_eq!(rows[0].session_id, "new");
        assert!(rows[0].unread);
        assert!(!rows[0].selected);
        assert_eq!(rows[1].session_id, "old");
        assert!(rows[1].selected);
        assert_eq!(rows[1].preview, "earlier");
    }
}
