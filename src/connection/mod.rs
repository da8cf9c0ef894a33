use log::{ debug, error, info, warn };
use serde_json::Value;
use std::collections::{ HashMap, VecDeque };
use std::sync::{ Arc, Mutex };
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{ mpsc, oneshot, watch };
use url::Url;
use uuid::Uuid;

use crate::models::wire::Envelope;
use crate::transport::{ self, TransportKind, TransportSink };

#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub endpoint: Url,
    /// Transports to attempt, most preferred first.
    pub transports: Vec<TransportKind>,
    /// Reconnect attempts before the connection is given up for good.
    pub max_reconnect_attempts: u32,
    /// Fixed delay between attempts.
    pub reconnect_delay: Duration,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Process-wide connection state. Mutated only by the manager's run loop;
/// everyone else observes it through a watch channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub retries: u32,
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("no acknowledgment within {0:?}")] Timeout(Duration),
    #[error("connection manager is shut down")]
    Closed,
}

type Handler = Box<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct HandlerRegistry {
    next_id: u64,
    handlers: HashMap<String, Vec<(u64, Handler)>>,
}

impl HandlerRegistry {
    fn subscribe(&mut self, event: &str, handler: Handler) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.handlers.entry(event.to_string()).or_default().push((id, handler));
        id
    }

    fn unsubscribe(&mut self, event: &str, id: u64) {
        if let Some(list) = self.handlers.get_mut(event) {
            list.retain(|(handler_id, _)| *handler_id != id);
            if list.is_empty() {
                self.handlers.remove(event);
            }
        }
    }

    fn dispatch(&self, event: &str, data: &Value) {
        if let Some(list) = self.handlers.get(event) {
            for (_, handler) in list {
                handler(data);
            }
        } else {
            debug!("no subscriber for inbound event '{}'", event);
        }
    }
}

/// Scoped subscription: dropping the guard is the matching `off`. Handlers
/// must not subscribe or unsubscribe from inside a callback.
pub struct Subscription {
    registry: Arc<Mutex<HandlerRegistry>>,
    event: String,
    id: u64,
}

impl Subscription {
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.lock().unwrap().unsubscribe(&self.event, self.id);
    }
}

enum Outbound {
    Frame(Envelope),
    Shutdown,
}

/// Owns the single bidirectional channel to the backend. Constructed once
/// per process and handed to every component as an `Arc`; nothing else
/// opens a connection or mutates connection state.
pub struct ConnectionManager {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
    registry: Arc<Mutex<HandlerRegistry>>,
    acks: Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    status_rx: watch::Receiver<ConnectionStatus>,
    config: ConnectionConfig,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        Self {
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            registry: Arc::new(Mutex::new(HandlerRegistry::default())),
            acks: Arc::new(Mutex::new(HashMap::new())),
            status_tx: Arc::new(status_tx),
            status_rx,
            config,
        }
    }

    /// Spawn the run loop. Frames emitted before this point sit in the
    /// outbound queue and are flushed once the first connection is up.
    pub fn start(&self) {
        let Some(rx) = self.outbound_rx.lock().unwrap().take() else {
            warn!("connection manager already started");
            return;
        };
        let config = self.config.clone();
        let registry = Arc::clone(&self.registry);
        let acks = Arc::clone(&self.acks);
        let status = Arc::clone(&self.status_tx);
        tokio::spawn(run_loop(config, rx, registry, acks, status));
    }

    /// Fire a named event toward the server. Returns immediately; frames
    /// queued while the transport is down are sent after reconnect.
    pub fn emit(&self, event: &str, data: Value) {
        self.send_outbound(Envelope::event(event, data));
    }

    /// Fire a named event and await the server's acknowledgment payload,
    /// correlated by a per-request id.
    pub async fn request(
        &self,
        event: &str,
        data: Value,
        timeout: Duration
    ) -> Result<Value, RequestError> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.acks.lock().unwrap().insert(id.clone(), tx);
        self.send_outbound(Envelope {
            event: event.to_string(),
            data,
            ack: Some(id.clone()),
        });

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => {
                self.acks.lock().unwrap().remove(&id);
                Err(RequestError::Closed)
            }
            Err(_) => {
                self.acks.lock().unwrap().remove(&id);
                Err(RequestError::Timeout(timeout))
            }
        }
    }

    /// Register a handler for a named inbound event. Any number of handlers
    /// may coexist per event; the returned guard withdraws this one when
    /// dropped.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
        where F: Fn(&Value) + Send + Sync + 'static
    {
        let id = self.registry.lock().unwrap().subscribe(event, Box::new(handler));
        Subscription {
            registry: Arc::clone(&self.registry),
            event: event.to_string(),
            id,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.outbound_tx.send(Outbound::Shutdown);
    }

    fn send_outbound(&self, envelope: Envelope) {
        if self.outbound_tx.send(Outbound::Frame(envelope)).is_err() {
            warn!("connection manager is shut down; dropping outbound frame");
        }
    }
}

async fn run_loop(
    config: ConnectionConfig,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    registry: Arc<Mutex<HandlerRegistry>>,
    acks: Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>,
    status: Arc<watch::Sender<ConnectionStatus>>
) {
    let mut deferred: VecDeque<Envelope> = VecDeque::new();
    let mut retries: u32 = 0;
    let mut ever_connected = false;

    loop {
        let state = if ever_connected {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        };
        status.send_replace(ConnectionStatus { state, retries });

        match transport::negotiate(&config.endpoint, &config.transports).await {
            Ok(((mut sink, mut source), kind)) => {
                retries = 0;
                ever_connected = true;
                status.send_replace(ConnectionStatus {
                    state: ConnectionState::Connected,
                    retries: 0,
                });

                let mut transport_ok = true;
                while let Some(envelope) = deferred.pop_front() {
                    if let Err(e) = send_envelope(sink.as_mut(), &envelope).await {
                        warn!("failed to flush deferred frame over {}: {}", kind, e);
                        deferred.push_front(envelope);
                        transport_ok = false;
                        break;
                    }
                }

                while transport_ok {
                    tokio::select! {
                        cmd = outbound_rx.recv() => match cmd {
                            Some(Outbound::Frame(envelope)) => {
                                if let Err(e) = send_envelope(sink.as_mut(), &envelope).await {
                                    warn!("send failed over {}: {}", kind, e);
                                    deferred.push_back(envelope);
                                    transport_ok = false;
                                }
                            }
                            Some(Outbound::Shutdown) | None => {
                                sink.close().await;
                                status.send_replace(ConnectionStatus {
                                    state: ConnectionState::Disconnected,
                                    retries: 0,
                                });
                                return;
                            }
                        },
                        inbound = source.recv() => match inbound {
                            Some(Ok(frame)) => dispatch_frame(&registry, &acks, &frame),
                            Some(Err(e)) => {
                                warn!("transport lost: {}", e);
                                transport_ok = false;
                            }
                            None => {
                                info!("transport closed by server");
                                transport_ok = false;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                warn!("connection attempt {} failed: {}", retries + 1, e);
            }
        }

        retries += 1;
        if retries > config.max_reconnect_attempts {
            error!("giving up after {} reconnect attempts", config.max_reconnect_attempts);
            status.send_replace(ConnectionStatus {
                state: ConnectionState::Disconnected,
                retries,
            });
            // Terminal: keep absorbing emits so callers never observe an
            // error, but nothing is transmitted anymore.
            loop {
                match outbound_rx.recv().await {
                    Some(Outbound::Frame(envelope)) => deferred.push_back(envelope),
                    Some(Outbound::Shutdown) | None => {
                        return;
                    }
                }
            }
        }
        tokio::time::sleep(config.reconnect_delay).await;
    }
}

async fn send_envelope(
    sink: &mut dyn TransportSink,
    envelope: &Envelope
) -> Result<(), crate::transport::TransportError> {
    match serde_json::to_string(envelope) {
        Ok(frame) => sink.send(frame).await,
        Err(e) => {
            // Payloads are crate-built serde values; this cannot happen for
            // well-formed envelopes, so log and drop rather than kill the loop.
            error!("failed to serialize outbound envelope '{}': {}", envelope.event, e);
            Ok(())
        }
    }
}

fn dispatch_frame(
    registry: &Arc<Mutex<HandlerRegistry>>,
    acks: &Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>,
    frame: &str
) {
    let envelope: Envelope = match serde_json::from_str(frame) {
        Ok(env) => env,
        Err(e) => {
            warn!("discarding unparseable inbound frame: {}", e);
            return;
        }
    };

    if let Some(id) = &envelope.ack {
        if let Some(tx) = acks.lock().unwrap().remove(id) {
            let _ = tx.send(envelope.data);
            return;
        }
    }

    registry.lock().unwrap().dispatch(&envelope.event, &envelope.data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{ AtomicUsize, Ordering };

    fn test_config() -> ConnectionConfig {
        ConnectionConfig {
            endpoint: Url::parse("ws://127.0.0.1:4000").unwrap(),
            transports: vec![TransportKind::WebSocket],
            max_reconnect_attempts: 3,
            reconnect_delay: Duration::from_millis(50),
        }
    }

    #[test]
    fn registry_supports_multiple_subscribers_per_event() {
        let registry = HandlerRegistry::default();
        let registry = Arc::new(Mutex::new(registry));
        let hits = Arc::new(AtomicUsize::new(0));

        let mut guard = registry.lock().unwrap();
        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            guard.subscribe("message", Box::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }
        guard.dispatch("message", &Value::Null);
        drop(guard);

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_a_subscription_withdraws_its_handler() {
        let manager = ConnectionManager::new(test_config());
        let hits = Arc::new(AtomicUsize::new(0));

        let kept = {
            let hits = Arc::clone(&hits);
            manager.on("message", move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let dropped = {
            let hits = Arc::clone(&hits);
            manager.on("message", move |_| {
                hits.fetch_add(10, Ordering::SeqCst);
            })
        };
        drop(dropped);

        manager.registry.lock().unwrap().dispatch("message", &Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        kept.cancel();
        manager.registry.lock().unwrap().dispatch("message", &Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ack_frames_resolve_pending_requests_without_dispatch() {
        let manager = ConnectionManager::new(test_config());
        let (tx, mut rx) = oneshot::channel();
        manager.acks.lock().unwrap().insert("req-1".to_string(), tx);

        let hits = Arc::new(AtomicUsize::new(0));
        let _sub = {
            let hits = Arc::clone(&hits);
            manager.on("messages-history", move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        let frame = json!({
            "event": "messages-history",
            "data": { "ok": true },
            "ack": "req-1"
        }).to_string();
        dispatch_frame(&manager.registry, &manager.acks, &frame);

        assert_eq!(rx.try_recv().unwrap(), json!({ "ok": true }));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn manager_starts_disconnected_with_zero_retries() {
        let manager = ConnectionManager::new(test_config());
        let status = manager.status();
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert_eq!(status.retries, 0);
    }

    #[tokio::test]
    async fn request_times_out_and_cleans_up_the_pending_entry() {
        let manager = ConnectionManager::new(test_config());
        let result = manager.request(
            "get-messages",
            json!({ "sessionId": "s1" }),
            Duration::from_millis(20)
        ).await;
        assert!(matches!(result, Err(RequestError::Timeout(_))));
        assert!(manager.acks.lock().unwrap().is_empty());
    }
}
