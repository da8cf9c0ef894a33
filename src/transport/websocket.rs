use async_trait::async_trait;
use futures::stream::{ SplitSink, SplitStream };
use futures::{ SinkExt, StreamExt };
use log::{ info, warn };
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{ connect_async, MaybeTlsStream, WebSocketStream };
use url::Url;

use super::{ TransportError, TransportKind, TransportPair, TransportSink, TransportSource };

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsSink {
    inner: SplitSink<WsStream, Message>,
}

pub struct WsSource {
    inner: SplitStream<WsStream>,
}

/// Establish a websocket connection to the endpoint. An http(s) endpoint is
/// rewritten to its ws(s) counterpart so one configured address serves
/// every transport.
pub async fn connect(endpoint: &Url) -> Result<TransportPair, TransportError> {
    let url = socket_url(endpoint)?;
    let (ws, _) = connect_async(url.as_str()).await?;
    let (tx, rx) = ws.split();
    Ok((Box::new(WsSink { inner: tx }), Box::new(WsSource { inner: rx })))
}

fn socket_url(endpoint: &Url) -> Result<Url, TransportError> {
    let mut url = endpoint.clone();
    let mapped = match url.scheme() {
        "ws" | "wss" => return Ok(url),
        "http" => "ws",
        "https" => "wss",
        _ => {
            return Err(TransportError::UnsupportedEndpoint {
                endpoint: endpoint.clone(),
                kind: TransportKind::WebSocket,
            });
        }
    };
    url.set_scheme(mapped).map_err(|_| TransportError::UnsupportedEndpoint {
        endpoint: endpoint.clone(),
        kind: TransportKind::WebSocket,
    })?;
    Ok(url)
}

#[async_trait]
impl TransportSink for WsSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.inner.send(Message::Text(frame)).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.inner.close().await;
    }
}

#[async_trait]
impl TransportSource for WsSource {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        while let Some(msg) = self.inner.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    return Some(Ok(text));
                }
                Ok(Message::Close(_)) => {
                    info!("received close frame from server");
                    return None;
                }
                // The protocol layer queues the matching pong itself.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Binary(_)) => {
                    warn!("ignoring binary frame from server");
                }
                Ok(Message::Frame(_)) => {}
                Err(e) =>
                    match e {
                        | tokio_tungstenite::tungstenite::Error::ConnectionClosed
                        | tokio_tungstenite::tungstenite::Error::Protocol(_)
                        | tokio_tungstenite::tungstenite::Error::Utf8 => {
                            info!("websocket closed or protocol error: {}", e);
                            return None;
                        }
                        tokio_tungstenite::tungstenite::Error::Io(ref io_err) if
                            io_err.kind() == std::io::ErrorKind::ConnectionReset
                        => {
                            info!("websocket connection reset by server");
                            return None;
                        }
                        _ => {
                            return Some(Err(e.into()));
                        }
                    }
            }
        }
        None
    }
}
