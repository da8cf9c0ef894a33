pub mod polling;
pub mod websocket;

use async_trait::async_trait;
use log::{ info, warn };
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket transport: {0}")] WebSocket(
        #[from] tokio_tungstenite::tungstenite::Error,
    ),
    #[error("polling transport: {0}")] Http(#[from] reqwest::Error),
    #[error("endpoint '{endpoint}' is not usable over the {kind} transport")] UnsupportedEndpoint {
        endpoint: Url,
        kind: TransportKind,
    },
    #[error("no transport in preference list could connect")]
    Exhausted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    WebSocket,
    Polling,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::WebSocket => write!(f, "websocket"),
            TransportKind::Polling => write!(f, "polling"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "websocket" | "ws" => Ok(TransportKind::WebSocket),
            "polling" | "longpoll" => Ok(TransportKind::Polling),
            other => Err(format!("unknown transport '{}', expected 'websocket' or 'polling'", other)),
        }
    }
}

/// Outbound half of a framed text transport.
#[async_trait]
pub trait TransportSink: Send {
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;
    async fn close(&mut self);
}

/// Inbound half of a framed text transport. `None` means the peer closed
/// the channel cleanly; an error means it was lost.
#[async_trait]
pub trait TransportSource: Send {
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;
}

pub type TransportPair = (Box<dyn TransportSink>, Box<dyn TransportSource>);

/// Walk the preference order and connect over the first transport that
/// succeeds. The caller decides retry policy; one pass through the list is
/// a single connection attempt.
pub async fn negotiate(
    endpoint: &Url,
    preference: &[TransportKind]
) -> Result<(TransportPair, TransportKind), TransportError> {
    let mut last_err = TransportError::Exhausted;
    for kind in preference {
        let attempt = match kind {
            TransportKind::WebSocket => websocket::connect(endpoint).await,
            TransportKind::Polling => polling::connect(endpoint).await,
        };
        match attempt {
            Ok(pair) => {
                info!("connected to {} via {} transport", endpoint, kind);
                return Ok((pair, *kind));
            }
            Err(e) => {
                warn!("{} transport failed for {}: {}", kind, endpoint, e);
                last_err = e;
            }
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kind_parses_aliases() {
        assert_eq!("ws".parse::<TransportKind>().unwrap(), TransportKind::WebSocket);
        assert_eq!("Polling".parse::<TransportKind>().unwrap(), TransportKind::Polling);
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }
}
