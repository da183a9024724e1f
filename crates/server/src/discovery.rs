//! Discovery listener: tells an authenticated client which port hosts the
//! primary RPC listener.
//!
//! Protocol-symmetric with the primary loop but stateless and routing-free.
//! Each probe is answered independently; nothing carries over between
//! messages, and a failed probe never learns the primary port.

use {
    std::{net::SocketAddr, sync::Arc},
    axum::extract::ws::{Message, WebSocket},
    serde_json::json,
    tracing::{debug, warn},
    tether_protocol::{codes, decode_request, error_body, finalize_response, messages},
    crate::{auth, state::ServerState},
};

pub(crate) async fn handle_probe(
    mut socket: WebSocket,
    state: Arc<ServerState>,
    addr: SocketAddr,
) {
    state.connection_opened();
    debug!(%addr, "discovery probe connected");

    while let Some(Ok(message)) = socket.recv().await {
        let frame = match message {
            Message::Text(t) => t.as_str().as_bytes().to_vec(),
            Message::Binary(b) => b.to_vec(),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => break,
        };

        let envelope = match decode_request(&frame) {
            Ok((_, envelope)) => envelope,
            Err(e) => {
                warn!(%addr, error = %e, "undecodable discovery frame, closing");
                break;
            },
        };

        let reply = if auth::authenticate(&envelope.headers, &state.config.secret_key) {
            json!({
                "message": messages::CONNECTION_SUCCESS,
                "port": state.primary_port,
                "code": codes::OK,
            })
        } else {
            warn!(%addr, "unauthorized discovery probe");
            state.events.error("", messages::DISCOVERY_DENIED);
            error_body(codes::UNAUTHORIZED, messages::DISCOVERY_DENIED)
        };

        let Ok(frame) = finalize_response(reply) else {
            break;
        };
        if socket.send(Message::Text(frame.into())).await.is_err() {
            break;
        }
    }

    state.connection_closed();
    debug!(%addr, "discovery probe disconnected");
}
