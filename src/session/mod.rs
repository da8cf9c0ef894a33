mod storage;

pub use storage::{ default_state_dir, SessionStorage };

use chrono::Utc;
use log::{ error, info };
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::json;
use std::io;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::connection::ConnectionManager;
use crate::models::wire::{ self, SessionHandle };

/// Fixed durable-storage key holding the session identifier.
pub const SESSION_ID_KEY: &str = "chat_session_id";

const SUFFIX_LEN: usize = 8;

/// Produces the stable conversation identifier for this client and binds
/// it to a server-side conversation record.
pub struct SessionResolver {
    storage: SessionStorage,
}

impl SessionResolver {
    pub fn new(storage: SessionStorage) -> Self {
        Self { storage }
    }

    /// Reuse the persisted identifier, or synthesize and persist a new one.
    /// Persisting happens before any handshake so a reload mid-handshake
    /// comes back with the same tentative id.
    pub fn load_or_create(&self) -> io::Result<String> {
        if let Some(id) = self.storage.get(SESSION_ID_KEY) {
            info!("reusing persisted session id {}", id);
            return Ok(id);
        }
        let id = generate_session_id();
        self.storage.put(SESSION_ID_KEY, &id)?;
        info!("created session id {}", id);
        Ok(id)
    }

    /// Handshake: announce the tentative identifier and adopt whatever the
    /// backend confirms. A missing acknowledgment is logged and the
    /// tentative identifier stays in effect.
    pub async fn establish(
        &self,
        conn: &ConnectionManager,
        timeout: Duration
    ) -> io::Result<String> {
        let tentative = self.load_or_create()?;

        let (tx, rx) = oneshot::channel::<String>();
        let slot = Mutex::new(Some(tx));
        let _sub = conn.on(wire::SESSION_INIT, move |data| {
            let confirmed = match serde_json::from_value::<SessionHandle>(data.clone()) {
                Ok(handle) => handle.session_id,
                Err(e) => {
                    error!("malformed session_init payload: {}", e);
                    return;
                }
            };
            if let Some(tx) = slot.lock().unwrap().take() {
                let _ = tx.send(confirmed);
            }
        });

        conn.emit(wire::INIT_SESSION, json!({ "sessionId": tentative }));

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(confirmed)) => {
                if confirmed != tentative {
                    info!("backend reassigned session id {} -> {}", tentative, confirmed);
                    self.storage.put(SESSION_ID_KEY, &confirmed)?;
                }
                Ok(confirmed)
            }
            _ => {
                error!(
                    "session handshake acknowledgment did not arrive within {:?}; continuing with {}",
                    timeout,
                    tentative
                );
                Ok(tentative)
            }
        }
    }
}

/// Millisecond timestamp plus a random alphanumeric suffix. Collision across
/// concurrently-initializing clients is treated as negligible, not
/// impossible.
pub fn generate_session_id() -> String {
    let suffix: String = rand
        ::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}-{}", Utc::now().timestamp_millis(), suffix)
}
