//! Per-connection protocol loop for the primary listener.
//!
//! One task per accepted connection. Requests on a connection are served
//! strictly in arrival order: the next frame is not read until the previous
//! response has been sent. Distinct connections interleave freely.
//!
//! Failure handling is asymmetric on purpose:
//! - auth failure (403), unknown endpoint (400), and handler errors (500) are
//!   answered per-message and the loop continues;
//! - an undecodable frame or an untransmissible response payload ends the
//!   connection after a best-effort reply.

use {
    std::{net::SocketAddr, sync::Arc},
    axum::extract::ws::{Message, WebSocket},
    tracing::{debug, info, warn},
    uuid::Uuid,
    tether_protocol::{RequestView, codes, decode_request, error_body, finalize_response, messages},
    crate::{auth, state::ServerState},
};

/// What the loop does after handling one frame. Returned from the encode/send
/// step instead of propagating an error, so connection teardown is ordinary
/// control flow.
enum Flow {
    Continue,
    Close,
}

pub(crate) async fn handle_connection(
    mut socket: WebSocket,
    state: Arc<ServerState>,
    addr: SocketAddr,
) {
    let conn_id = Uuid::new_v4().to_string();
    state.connection_opened();
    info!(%addr, conn_id = %conn_id, "client connected");

    while let Some(message) = socket.recv().await {
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "socket error, closing");
                break;
            },
        };
        let frame = match message {
            Message::Text(t) => t.as_str().as_bytes().to_vec(),
            Message::Binary(b) => b.to_vec(),
            // axum answers pings at the protocol level.
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => break,
        };
        match process_frame(&frame, &state, &mut socket, &conn_id).await {
            Flow::Continue => {},
            Flow::Close => break,
        }
    }

    state.connection_closed();
    info!(conn_id = %conn_id, "client disconnected");
}

/// Decode, authenticate, route, invoke, reply — one request.
async fn process_frame(
    frame: &[u8],
    state: &ServerState,
    socket: &mut WebSocket,
    conn_id: &str,
) -> Flow {
    let (raw, envelope) = match decode_request(frame) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(conn_id = %conn_id, error = %e, "undecodable frame, closing connection");
            return Flow::Close;
        },
    };
    let endpoint = envelope.endpoint.clone().unwrap_or_default();
    debug!(conn_id = %conn_id, endpoint = %endpoint, "request received");

    let reply = if !auth::authenticate(&envelope.headers, &state.config.secret_key) {
        warn!(conn_id = %conn_id, endpoint = %endpoint, "unauthorized request");
        state.events.error(&endpoint, messages::UNAUTHORIZED);
        error_body(codes::UNAUTHORIZED, messages::UNAUTHORIZED)
    } else if let Some(handler) = (!endpoint.is_empty())
        .then(|| state.registry.resolve(&endpoint))
        .flatten()
    {
        let view = RequestView::new(endpoint.clone(), raw, envelope.data);
        match handler(view).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(conn_id = %conn_id, endpoint = %endpoint, error = %e, "handler failed");
                state.events.error(&endpoint, e.to_string());
                error_body(codes::INTERNAL, e.to_string())
            },
        }
    } else {
        warn!(conn_id = %conn_id, endpoint = %endpoint, "unknown endpoint");
        state.events.error(&endpoint, messages::UNKNOWN_ENDPOINT);
        error_body(codes::UNKNOWN_ENDPOINT, messages::UNKNOWN_ENDPOINT)
    };

    send_reply(socket, state, &endpoint, reply, conn_id).await
}

/// Finalize and transmit one response.
///
/// A payload that cannot be shaped into a response envelope gets a fallback
/// `{error, code: 500}` and closes the connection — the one failure here that
/// is fatal rather than per-message.
async fn send_reply(
    socket: &mut WebSocket,
    state: &ServerState,
    endpoint: &str,
    payload: serde_json::Value,
    conn_id: &str,
) -> Flow {
    match finalize_response(payload) {
        Ok(frame) => {
            if socket.send(Message::Text(frame.into())).await.is_err() {
                debug!(conn_id = %conn_id, "send failed, closing");
                return Flow::Close;
            }
            debug!(conn_id = %conn_id, endpoint = %endpoint, "response sent");
            Flow::Continue
        },
        Err(e) => {
            warn!(
                conn_id = %conn_id,
                endpoint = %endpoint,
                error = %e,
                "untransmissible response payload, closing connection"
            );
            state.events.error(endpoint, messages::UNTRANSMISSIBLE);
            if let Ok(fallback) =
                finalize_response(error_body(codes::INTERNAL, messages::UNTRANSMISSIBLE))
            {
                let _ = socket.send(Message::Text(fallback.into())).await;
            }
            Flow::Close
        },
    }
}
