use async_trait::async_trait;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client as HttpClient;
use std::collections::VecDeque;
use url::Url;

use crate::models::wire::PollBatch;

use super::{ TransportError, TransportKind, TransportPair, TransportSink, TransportSource };

/// Wide-compatibility fallback: outbound frames are POSTed to `/emit`,
/// inbound frames are fetched with cursor-based long polls against `/poll`.
/// The cursor only advances after a batch is consumed, so a poll aborted
/// mid-flight re-fetches the same frames on the next request.
pub struct PollSink {
    http: HttpClient,
    emit_url: Url,
}

pub struct PollSource {
    http: HttpClient,
    poll_url: Url,
    cursor: u64,
    inbox: VecDeque<String>,
}

pub async fn connect(endpoint: &Url) -> Result<TransportPair, TransportError> {
    let base = http_base(endpoint)?;
    let mut emit_url = base.clone();
    emit_url.set_path("/emit");
    let mut poll_url = base;
    poll_url.set_path("/poll");

    let http = HttpClient::new();

    // Zero-wait probe: validates reachability and picks up any backlog.
    let batch: PollBatch = http
        .get(poll_url.clone())
        .query(&[("cursor", 0u64), ("wait", 0u64)])
        .send().await?
        .error_for_status()?
        .json().await?;
    debug!("polling transport primed at cursor {} with {} frame(s)", batch.cursor, batch.frames.len());

    let source = PollSource {
        http: http.clone(),
        poll_url,
        cursor: batch.cursor,
        inbox: batch.frames.into(),
    };
    Ok((Box::new(PollSink { http, emit_url }), Box::new(source)))
}

fn http_base(endpoint: &Url) -> Result<Url, TransportError> {
    let mut url = endpoint.clone();
    let mapped = match url.scheme() {
        "http" | "https" => return Ok(url),
        "ws" => "http",
        "wss" => "https",
        _ => {
            return Err(TransportError::UnsupportedEndpoint {
                endpoint: endpoint.clone(),
                kind: TransportKind::Polling,
            });
        }
    };
    url.set_scheme(mapped).map_err(|_| TransportError::UnsupportedEndpoint {
        endpoint: endpoint.clone(),
        kind: TransportKind::Polling,
    })?;
    Ok(url)
}

#[async_trait]
impl TransportSink for PollSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.http
            .post(self.emit_url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(frame)
            .send().await?
            .error_for_status()?;
        Ok(())
    }

    async fn close(&mut self) {}
}

#[async_trait]
impl TransportSource for PollSource {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            if let Some(frame) = self.inbox.pop_front() {
                return Some(Ok(frame));
            }
            let batch = self.http
                .get(self.poll_url.clone())
                .query(&[("cursor", self.cursor)])
                .send().await
                .and_then(|resp| resp.error_for_status());
            let batch: PollBatch = match batch {
                Ok(resp) =>
                    match resp.json().await {
                        Ok(b) => b,
                        Err(e) => {
                            return Some(Err(e.into()));
                        }
                    }
                Err(e) => {
                    return Some(Err(e.into()));
                }
            };
            self.cursor = batch.cursor;
            self.inbox.extend(batch.frames);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_endpoints_map_to_http_schemes() {
        let url = http_base(&Url::parse("ws://127.0.0.1:4000").unwrap()).unwrap();
        assert_eq!(url.scheme(), "http");
        let url = http_base(&Url::parse("wss://chat.example.com").unwrap()).unwrap();
        assert_eq!(url.scheme(), "https");
    }
}
