//! Chrome DevTools Protocol client over a WebSocket.
//!
//! Commands are JSON objects `{id, method, params, sessionId?}`. A reader task
//! routes each response to the caller waiting on its id and fans events out
//! to subscribers. When the socket closes every pending caller fails with
//! [`CdpError::Disconnected`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Arc<Mutex<HashMap<u64, Pending>>>;

/// Buffered events per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 256;

#[derive(Error, Debug)]
pub enum CdpError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("{method} failed: {message} (code {code})")]
    Remote {
        method: String,
        code: i64,
        message: String,
    },

    #[error("{method} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    #[error("DevTools connection closed")]
    Disconnected,

    #[error("Unexpected {method} response: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<CdpError> for layoutshot_core::Error {
    fn from(e: CdpError) -> Self {
        layoutshot_core::Error::Protocol(e.to_string())
    }
}

/// A protocol event, e.g. `Page.loadEventFired`.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

struct Pending {
    method: String,
    tx: oneshot::Sender<Result<Value, CdpError>>,
}

#[derive(Deserialize)]
struct Incoming {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<RemoteError>,
    method: Option<String>,
    #[serde(default)]
    params: Value,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct RemoteError {
    code: i64,
    message: String,
}

/// Connected DevTools client. Dropping it stops the reader task.
pub struct CdpClient {
    next_id: AtomicU64,
    pending: PendingMap,
    outgoing: mpsc::UnboundedSender<Message>,
    events: broadcast::Receiver<CdpEvent>,
    closed: Arc<AtomicBool>,
    command_timeout: Duration,
    reader: JoinHandle<()>,
    _writer: JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a DevTools WebSocket endpoint.
    pub async fn connect(ws_url: &str, command_timeout: Duration) -> Result<Self, CdpError> {
        let (socket, _response) = tokio_tungstenite::connect_async(ws_url).await?;
        debug!("Connected to DevTools at {}", ws_url);

        let (sink, stream) = socket.split();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let (events_tx, events_rx) = broadcast::channel(EVENT_CAPACITY);
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(stream, pending.clone(), events_tx, closed.clone()));
        let writer = tokio::spawn(write_loop(sink, outgoing_rx));

        Ok(Self {
            next_id: AtomicU64::new(1),
            pending,
            outgoing,
            events: events_rx,
            closed,
            command_timeout,
            reader,
            _writer: writer,
        })
    }

    /// Whether the socket has closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Subscribe to events. Only events arriving after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.resubscribe()
    }

    /// Send a command and wait for its result.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value, CdpError> {
        self.call_with_timeout(method, params, session_id, self.command_timeout)
            .await
    }

    /// Like [`call`](Self::call), with `timeout` in place of the client default.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> Result<Value, CdpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut message = json!({ "id": id, "method": method, "params": params });
        if let Some(session) = session_id {
            message["sessionId"] = json!(session);
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            id,
            Pending {
                method: method.to_string(),
                tx,
            },
        );
        // The reader flags closure before draining, so a late insert is caught here.
        if self.is_closed() {
            self.pending.lock().remove(&id);
            return Err(CdpError::Disconnected);
        }

        trace!(id, method, "-> {}", message);
        if self.outgoing.send(Message::Text(message.to_string().into())).is_err() {
            self.pending.lock().remove(&id);
            return Err(CdpError::Disconnected);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CdpError::Disconnected),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(CdpError::Timeout {
                    method: method.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Send a command and decode its result.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<T, CdpError> {
        let value = self.call(method, params, session_id).await?;
        serde_json::from_value(value).map_err(|source| CdpError::Decode {
            method: method.to_string(),
            source,
        })
    }

    /// Wait for the next `method` event, optionally scoped to one session.
    pub async fn wait_for_event(
        events: &mut broadcast::Receiver<CdpEvent>,
        method: &str,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> Result<CdpEvent, CdpError> {
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(event)
                        if event.method == method
                            && (session_id.is_none()
                                || event.session_id.as_deref() == session_id) =>
                    {
                        return Ok(event);
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Event subscriber lagged, {} events dropped", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(CdpError::Disconnected)
                    }
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| CdpError::Timeout {
                method: method.to_string(),
                timeout,
            })?
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut stream: SplitStream<Socket>,
    pending: PendingMap,
    events: broadcast::Sender<CdpEvent>,
    closed: Arc<AtomicBool>,
) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("DevTools socket error: {}", e);
                break;
            }
        };

        let incoming: Incoming = match serde_json::from_str(text.as_str()) {
            Ok(m) => m,
            Err(e) => {
                warn!("Ignoring malformed DevTools message: {}", e);
                continue;
            }
        };

        match (incoming.id, incoming.method) {
            (Some(id), _) => {
                let Some(waiter) = pending.lock().remove(&id) else {
                    trace!(id, "Response with no waiter");
                    continue;
                };
                let result = match incoming.error {
                    Some(err) => Err(CdpError::Remote {
                        method: waiter.method,
                        code: err.code,
                        message: err.message,
                    }),
                    None => Ok(incoming.result.unwrap_or(Value::Null)),
                };
                let _ = waiter.tx.send(result);
            }
            (None, Some(method)) => {
                trace!(method = %method, "<- event");
                // No subscribers is fine.
                let _ = events.send(CdpEvent {
                    method,
                    params: incoming.params,
                    session_id: incoming.session_id,
                });
            }
            (None, None) => trace!("Ignoring DevTools message without id or method"),
        }
    }

    closed.store(true, Ordering::SeqCst);
    let drained: Vec<Pending> = pending.lock().drain().map(|(_, p)| p).collect();
    if !drained.is_empty() {
        debug!("DevTools socket closed with {} pending commands", drained.len());
    }
    for waiter in drained {
        let _ = waiter.tx.send(Err(CdpError::Disconnected));
    }
}

async fn write_loop(
    mut sink: SplitSink<Socket, Message>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outgoing.recv().await {
        if let Err(e) = sink.send(message).await {
            debug!("DevTools write failed: {}", e);
            break;
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ok, spawn_devtools, Reply};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_call_round_trip() {
        let url = spawn_devtools(|req| {
            Reply::Messages(vec![ok(
                req,
                json!({ "echo": req["method"], "session": req.get("sessionId") }),
            )])
        })
        .await;
        let client = CdpClient::connect(&url, TIMEOUT).await.unwrap();

        let result = client
            .call("Browser.getVersion", json!({}), None)
            .await
            .unwrap();
        assert_eq!(result["echo"], "Browser.getVersion");
        assert!(result["session"].is_null());

        let result = client
            .call("Page.enable", json!({}), Some("S1"))
            .await
            .unwrap();
        assert_eq!(result["session"], "S1");
    }

    #[tokio::test]
    async fn test_remote_error() {
        let url = spawn_devtools(|req| {
            Reply::Messages(vec![json!({
                "id": req["id"],
                "error": { "code": -32601, "message": "'Nope.nope' wasn't found" }
            })])
        })
        .await;
        let client = CdpClient::connect(&url, TIMEOUT).await.unwrap();

        let err = client.call("Nope.nope", json!({}), None).await.unwrap_err();
        match err {
            CdpError::Remote {
                method,
                code,
                message,
            } => {
                assert_eq!(method, "Nope.nope");
                assert_eq!(code, -32601);
                assert!(message.contains("wasn't found"));
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let url = spawn_devtools(|req| {
            Reply::Messages(vec![
                json!({ "method": "Page.frameNavigated", "params": {}, "sessionId": "S1" }),
                json!({ "method": "Page.loadEventFired", "params": { "timestamp": 1.5 }, "sessionId": "S2" }),
                json!({ "method": "Page.loadEventFired", "params": { "timestamp": 2.5 }, "sessionId": "S1" }),
                ok(req, json!({ "frameId": "F1" })),
            ])
        })
        .await;
        let client = CdpClient::connect(&url, TIMEOUT).await.unwrap();

        let mut events = client.subscribe();
        client
            .call("Page.navigate", json!({ "url": "about:blank" }), Some("S1"))
            .await
            .unwrap();
        let event =
            CdpClient::wait_for_event(&mut events, "Page.loadEventFired", Some("S1"), TIMEOUT)
                .await
                .unwrap();
        assert_eq!(event.params["timestamp"], 2.5);
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let url = spawn_devtools(|_| Reply::Messages(vec![])).await;
        let client = CdpClient::connect(&url, Duration::from_millis(100))
            .await
            .unwrap();

        let err = client.call("Slow.method", json!({}), None).await.unwrap_err();
        assert!(matches!(err, CdpError::Timeout { ref method, .. } if method == "Slow.method"));
        assert!(client.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_fails_pending_calls() {
        let url = spawn_devtools(|_| Reply::Close).await;
        let client = CdpClient::connect(&url, TIMEOUT).await.unwrap();

        let err = client.call("Browser.close", json!({}), None).await.unwrap_err();
        assert!(matches!(err, CdpError::Disconnected));

        // Give the reader a moment to observe the close frame.
        for _ in 0..50 {
            if client.is_closed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(client.is_closed());
        let err = client.call("Page.enable", json!({}), None).await.unwrap_err();
        assert!(matches!(err, CdpError::Disconnected));
    }

    #[tokio::test]
    async fn test_event_wait_times_out() {
        let url = spawn_devtools(|req| Reply::Messages(vec![ok(req, json!({}))])).await;
        let client = CdpClient::connect(&url, TIMEOUT).await.unwrap();

        let mut events = client.subscribe();
        let err = CdpClient::wait_for_event(
            &mut events,
            "Page.loadEventFired",
            None,
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CdpError::Timeout { .. }));
    }

    #[test]
    fn test_error_converts_to_protocol() {
        let err: layoutshot_core::Error = CdpError::Disconnected.into();
        assert!(matches!(err, layoutshot_core::Error::Protocol(_)));
    }
}
