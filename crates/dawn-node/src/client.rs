//! Client-attach listener: a WebSocket endpoint carrying the same
//! JSON-RPC `Frame`s peers exchange over libp2p, for a non-P2P client
//! (desktop shell, browser, CLI companion) that wants to talk to a node
//! without joining the mesh itself.
//!
//! An axum `WebSocketUpgrade` handler spawns one task per connection,
//! bridging inbound text frames to dispatch and a reply channel back
//! out. Unlike a peer session, a client session has no libp2p
//! `ResponseChannel` of its own, so forwarded calls are routed through
//! [`crate::swarm::ForwardHandle`] and resolved back here via an
//! unbounded channel instead.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use dawn_protocol::{Frame, JsonRpcError, Message};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::swarm::ForwardHandle;
use crate::{NodeRouter, RequestContext};

#[derive(Clone)]
struct ClientState {
    router: Arc<NodeRouter>,
    forwards: ForwardHandle,
}

/// Build the axum router serving the `/ws` client-attach endpoint.
pub fn router(node_router: Arc<NodeRouter>, forwards: ForwardHandle) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(ClientState { router: node_router, forwards })
}

/// Bind and serve the client-attach listener until the socket is closed
/// or the process exits.
pub async fn serve(
    addr: SocketAddr,
    node_router: Arc<NodeRouter>,
    forwards: ForwardHandle,
) -> std::io::Result<()> {
    let app = router(node_router, forwards);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "client-attach websocket listening");
    axum::serve(listener, app).await
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ClientState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: ClientState) {
    let session_id = format!("ws-{}", Uuid::new_v4());
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Message>();
    debug!(session = %session_id, "client attached");

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(incoming) = incoming else { break };
                let incoming = match incoming {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(session = %session_id, error = %e, "client websocket error");
                        break;
                    }
                };
                match incoming {
                    WsMessage::Text(text) => {
                        if !handle_text(&text, &session_id, &state, &reply_tx, &mut socket).await {
                            break;
                        }
                    }
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
            Some(resolved) = reply_rx.recv() => {
                if !send_frame(&mut socket, Frame::Single(resolved)).await {
                    break;
                }
            }
        }
    }
    debug!(session = %session_id, "client detached");
}

/// Parse one text frame, dispatch it, submit any forwards it produced,
/// and send back a direct response if there is one. Returns `false` if
/// the connection should be torn down (write failure).
async fn handle_text(
    text: &str,
    session_id: &str,
    state: &ClientState,
    reply_tx: &mpsc::UnboundedSender<Message>,
    socket: &mut WebSocket,
) -> bool {
    let frame = match parse_client_frame(text) {
        Ok(f) => f,
        Err(err) => return send_frame(socket, Frame::Single(err)).await,
    };

    let (response, forwards) = state
        .router
        .dispatch_frame(session_id, frame, RequestContext::default())
        .await;

    for forward in forwards {
        state.forwards.send(forward, reply_tx.clone()).await;
    }

    match response {
        Some(frame) => send_frame(socket, frame).await,
        None => true,
    }
}

async fn send_frame(socket: &mut WebSocket, frame: Frame) -> bool {
    let payload = match serde_json::to_string(&frame) {
        Ok(p) => p,
        Err(_) => return true,
    };
    socket.send(WsMessage::Text(payload)).await.is_ok()
}

/// Parse a client-attach text frame, or build the JSON-RPC error response
/// owed back to the client: `-32700 ParseError` for text that isn't even
/// valid JSON, `-32600 InvalidRequest` for valid JSON that isn't a
/// well-formed JSON-RPC request/response/notification/batch (including
/// any non-object, non-array top-level value).
fn parse_client_frame(text: &str) -> Result<Frame, Message> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|e| {
        Message::response_err(
            serde_json::Value::Null,
            JsonRpcError::new(JsonRpcError::PARSE_ERROR, format!("invalid JSON: {e}")),
        )
    })?;
    if !value.is_object() && !value.is_array() {
        return Err(Message::response_err(
            serde_json::Value::Null,
            JsonRpcError::new(
                JsonRpcError::INVALID_REQUEST,
                "request must be a JSON object or a batch array",
            ),
        ));
    }
    serde_json::from_value(value).map_err(|e| {
        Message::response_err(
            serde_json::Value::Null,
            JsonRpcError::new(JsonRpcError::INVALID_REQUEST, format!("invalid JSON-RPC frame: {e}")),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_well_formed_single_request() {
        let text = r#"{"version":"2.0","id":1,"method":"node/get_info"}"#;
        match parse_client_frame(text) {
            Ok(Frame::Single(msg)) => assert_eq!(msg.method(), Some("node/get_info")),
            other => panic!("expected a parsed single message, got {other:?}"),
        }
    }

    #[test]
    fn parses_a_batch() {
        let text = r#"[{"version":"2.0","id":1,"method":"node/get_info"},{"version":"2.0","method":"gossip/announce"}]"#;
        match parse_client_frame(text) {
            Ok(Frame::Batch(messages)) => assert_eq!(messages.len(), 2),
            other => panic!("expected a parsed batch, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_becomes_a_parse_error_response() {
        match parse_client_frame("not json at all") {
            Err(Message::Response { outcome: dawn_protocol::ResponseOutcome::Err { error }, id, .. }) => {
                assert_eq!(error.code, JsonRpcError::PARSE_ERROR);
                assert_eq!(id, serde_json::Value::Null);
            }
            other => panic!("expected a parse-error response, got {other:?}"),
        }
    }

    #[test]
    fn well_formed_json_with_wrong_shape_is_an_invalid_request() {
        match parse_client_frame(&json!({"not": "a valid frame"}).to_string()) {
            Err(Message::Response { outcome: dawn_protocol::ResponseOutcome::Err { error }, .. }) => {
                assert_eq!(error.code, JsonRpcError::INVALID_REQUEST);
            }
            other => panic!("expected an invalid-request response, got {other:?}"),
        }
    }

    #[test]
    fn non_object_non_array_top_level_value_is_an_invalid_request() {
        match parse_client_frame("42") {
            Err(Message::Response { outcome: dawn_protocol::ResponseOutcome::Err { error }, .. }) => {
                assert_eq!(error.code, JsonRpcError::INVALID_REQUEST);
            }
            other => panic!("expected an invalid-request response, got {other:?}"),
        }
    }
}
