use clap::Parser;
use std::error::Error;
use std::time::Duration;
use url::Url;

use crate::connection::ConnectionConfig;
use crate::transport::TransportKind;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Client Identity Args ---
    /// Which party this process represents (user, admin)
    #[arg(long, env = "CHAT_ROLE", default_value = "user")]
    pub role: String,

    /// Directory for durable client-side state (defaults to the platform data dir)
    #[arg(long, env = "CHAT_STATE_DIR")]
    pub state_dir: Option<String>,

    // --- Connection Args ---
    /// Backend endpoint address (ws://, wss://, http:// or https://)
    #[arg(long, env = "CHAT_ENDPOINT", default_value = "ws://127.0.0.1:4000")]
    pub endpoint: String,

    /// Transport preference order, comma separated (websocket, polling)
    #[arg(long, env = "CHAT_TRANSPORTS", default_value = "websocket,polling")]
    pub transports: String,

    /// Reconnect attempts before giving the connection up for good
    #[arg(long, env = "CHAT_RECONNECT_ATTEMPTS", default_value = "5")]
    pub reconnect_attempts: u32,

    /// Fixed delay between reconnect attempts, in milliseconds
    #[arg(long, env = "CHAT_RECONNECT_DELAY_MS", default_value = "2000")]
    pub reconnect_delay_ms: u64,

    /// How long to wait for the session handshake acknowledgment, in milliseconds
    #[arg(long, env = "CHAT_HANDSHAKE_TIMEOUT_MS", default_value = "5000")]
    pub handshake_timeout_ms: u64,

    // --- Reply Assistant Args (operator side, optional) ---
    /// Base URL of an OpenAI-compatible completion API for suggested replies
    #[arg(long, env = "ASSIST_BASE_URL")]
    pub assist_base_url: Option<String>,

    /// API key for the reply assistant endpoint
    #[arg(long, env = "ASSIST_API_KEY", default_value = "")]
    pub assist_api_key: String,

    /// Model name for suggested replies
    #[arg(long, env = "ASSIST_MODEL", default_value = "gpt-4o-mini")]
    pub assist_model: String,
}

impl Args {
    pub fn connection_config(&self) -> Result<ConnectionConfig, Box<dyn Error + Send + Sync>> {
        let endpoint = Url::parse(&self.endpoint).map_err(|e|
            format!("invalid endpoint '{}': {}", self.endpoint, e)
        )?;

        let mut transports = Vec::new();
        for part in self.transports.split(',').filter(|p| !p.trim().is_empty()) {
            transports.push(part.parse::<TransportKind>()?);
        }
        if transports.is_empty() {
            return Err("at least one transport must be configured".into());
        }

        Ok(ConnectionConfig {
            endpoint,
            transports,
            max_reconnect_attempts: self.reconnect_attempts,
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
        })
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}
