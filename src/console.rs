use log::error;
use serde_json::json;
use std::error::Error;
use std::sync::{ Arc, Mutex };
use tokio::io::{ AsyncBufReadExt, BufReader };

use crate::assist::ReplyAssistant;
use crate::cli::Args;
use crate::connection::ConnectionManager;
use crate::models::chat::{ ChatMessage, SenderRole };
use crate::models::wire;
use crate::roster::{ self, RosterSync };
use crate::sync::MessageReconciler;
use crate::view;
use crate::widget::spawn_status_reporter;

const HELP: &str = "commands: list | open <session-id> | send <text> | suggest | status | quit";

/// Operator dashboard: the live conversation roster plus one open
/// conversation at a time, driven by terminal commands.
pub async fn run(args: &Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let conn = Arc::new(ConnectionManager::new(args.connection_config()?));
    conn.start();
    spawn_status_reporter(&conn);

    let roster = Arc::new(Mutex::new(RosterSync::new()));
    let _roster_subs = roster::activate(&conn, &roster);

    // History arrives as a push; reset the open conversation when it does.
    let _history_sub = conn.on(wire::MESSAGES_HISTORY, {
        let roster = Arc::downgrade(&roster);
        move |data| {
            let Some(roster) = roster.upgrade() else {
                return;
            };
            match serde_json::from_value::<Vec<ChatMessage>>(data.clone()) {
                Ok(history) => {
                    let engine = roster.lock().unwrap().selected_engine();
                    if let Some(engine) = engine {
                        let mut engine = engine.lock().unwrap();
                        engine.reset(history);
                        render_conversation(engine.messages());
                    }
                }
                Err(e) => error!("malformed messages-history payload: {}", e),
            }
        }
    });

    let assistant = ReplyAssistant::from_args(args);

    println!("operator console — {}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = match line.split_once(' ') {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "list" => {
                let roster = roster.lock().unwrap();
                let rows = view::roster_rows(roster.entries(), roster.selected());
                if rows.is_empty() {
                    println!("no active conversations");
                }
                for row in rows {
                    println!(
                        "{} {} [{}] {} {}",
                        if row.selected { ">" } else { " " },
                        row.session_id,
                        row.last_activity,
                        if row.unread { "*" } else { " " },
                        row.preview
                    );
                }
            }
            "open" => {
                if rest.is_empty() {
                    println!("usage: open <session-id>");
                    continue;
                }
                let engine = Arc::new(
                    Mutex::new(
                        MessageReconciler::new(
                            rest.to_string(),
                            SenderRole::Admin,
                            Arc::clone(&conn)
                        )
                    )
                );
                roster.lock().unwrap().select(rest, engine);
                conn.emit(wire::GET_MESSAGES, json!({ "sessionId": rest }));
            }
            "send" => {
                let engine = roster.lock().unwrap().selected_engine();
                match engine {
                    Some(engine) => {
                        engine.lock().unwrap().append_local(rest);
                    }
                    None => println!("no conversation open — use: open <session-id>"),
                }
            }
            "suggest" => {
                let Some(assistant) = &assistant else {
                    println!("reply assistant is not configured (set ASSIST_BASE_URL)");
                    continue;
                };
                let history = match roster.lock().unwrap().selected_engine() {
                    Some(engine) => engine.lock().unwrap().messages().to_vec(),
                    None => {
                        println!("no conversation open — use: open <session-id>");
                        continue;
                    }
                };
                match assistant.suggest_reply(&history).await {
                    Ok(reply) => println!("suggested reply: {}", reply),
                    Err(e) => println!("suggestion failed: {}", e),
                }
            }
            "status" => {
                let status = conn.status();
                println!("connection: {:?} (retries: {})", status.state, status.retries);
            }
            "quit" => {
                break;
            }
            _ => println!("{}", HELP),
        }
    }

    conn.shutdown();
    Ok(())
}

fn render_conversation(messages: &[ChatMessage]) {
    for group in view::group_by_sender(messages) {
        println!("{}:", group.sender);
        for message in group.messages {
            let marker = if message.pending { " (sending)" } else { "" };
            println!("  [{}] {}{}", message.timestamp, message.content, marker);
        }
    }
}
