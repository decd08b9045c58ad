//! In-process DevTools endpoint for tests.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// What the fake endpoint does with one incoming command.
pub enum Reply {
    /// Send these messages, in order.
    Messages(Vec<Value>),
    /// Close the socket without answering.
    Close,
}

/// Accept one WebSocket connection and answer every command through `handler`.
pub async fn spawn_devtools<F>(handler: F) -> String
where
    F: Fn(&Value) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(frame)) = ws.next().await {
            let Message::Text(text) = frame else { continue };
            let request: Value = serde_json::from_str(text.as_str()).unwrap();
            match handler(&request) {
                Reply::Messages(out) => {
                    for message in out {
                        if ws.send(Message::Text(message.to_string().into())).await.is_err() {
                            return;
                        }
                    }
                }
                Reply::Close => {
                    let _ = ws.close(None).await;
                    return;
                }
            }
        }
    });

    format!("ws://{}", addr)
}

/// Successful response to `request`.
pub fn ok(request: &Value, result: Value) -> Value {
    json!({ "id": request["id"], "result": result })
}
