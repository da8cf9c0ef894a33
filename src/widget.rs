use log::{ error, info, warn };
use std::error::Error;
use std::path::PathBuf;
use std::sync::{ Arc, Mutex };
use tokio::io::{ AsyncBufReadExt, BufReader };

use crate::cli::Args;
use crate::connection::{ ConnectionManager, ConnectionState };
use crate::models::chat::{ ChatMessage, SenderRole };
use crate::models::wire;
use crate::session::{ default_state_dir, SessionResolver, SessionStorage };
use crate::sync::MessageReconciler;
use crate::view;

/// End-user chat widget: one conversation, bound to the durable session
/// identity, rendered line by line on the terminal.
pub async fn run(args: &Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let state_dir = args.state_dir
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(default_state_dir);
    let resolver = SessionResolver::new(SessionStorage::open(state_dir)?);

    let conn = Arc::new(ConnectionManager::new(args.connection_config()?));
    conn.start();
    spawn_status_reporter(&conn);

    let session_id = resolver.establish(&conn, args.handshake_timeout()).await?;
    let engine = Arc::new(
        Mutex::new(MessageReconciler::new(session_id.clone(), SenderRole::User, Arc::clone(&conn)))
    );

    let _message_sub = conn.on(wire::MESSAGE, {
        let engine = Arc::downgrade(&engine);
        move |data| {
            let Some(engine) = engine.upgrade() else {
                return;
            };
            match serde_json::from_value::<ChatMessage>(data.clone()) {
                Ok(message) => {
                    let mut engine = engine.lock().unwrap();
                    if engine.merge_incoming(message) {
                        if let Some(last) = engine.messages().last() {
                            println!(
                                "[{}] {}: {}",
                                view::format_timestamp(&last.created_at),
                                last.sender,
                                last.content
                            );
                        }
                    }
                }
                Err(e) => error!("malformed message payload: {}", e),
            }
        }
    });

    println!("chatting as session {} — type a message, or /quit to exit", session_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim() == "/quit" {
            break;
        }
        engine.lock().unwrap().append_local(&line);
    }

    conn.shutdown();
    Ok(())
}

/// Surface connectivity transitions without ever blocking the chat: the
/// state is informational, upper layers never force a transition.
pub(crate) fn spawn_status_reporter(conn: &ConnectionManager) {
    let mut status_rx = conn.watch_status();
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = *status_rx.borrow();
            match status.state {
                ConnectionState::Connected => info!("connection established"),
                ConnectionState::Reconnecting =>
                    warn!("connection lost; reconnect attempt {}", status.retries + 1),
                ConnectionState::Disconnected => error!("connection closed"),
                ConnectionState::Connecting => {}
            }
        }
    });
}
