//! WebSocket transport (§4.7): one binary frame per message, permessage-
//! deflate off, cookies captured at upgrade and exposed via `Context`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use nprpc_codec::endpoint::{Endpoint, Transport};
use nprpc_codec::header::ExceptionKind;

use crate::session::Session;
use crate::statistics::Statistics;
use nprpc_service::Poa;

/// Handshake timeout (§4.7).
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
/// Idle timeout (§4.7); enforced by the keep-alive ping/pong cadence below.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct WebSocketState {
    pub poas: Arc<Vec<Arc<Poa>>>,
    pub statistics: Statistics,
}

/// Mounted at `/ws` rather than `/rpc` so it can share a listener with the
/// HTTP POST transport's router (§4.7) without colliding on method/path.
pub fn router(state: WebSocketState) -> Router {
    Router::new().route("/ws", get(upgrade)).with_state(state)
}

async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<WebSocketState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let cookies = headers
        .get(axum::http::header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    ws.on_upgrade(move |socket| handle_socket(socket, addr, cookies, state))
}

async fn handle_socket(socket: WebSocket, addr: SocketAddr, cookies: Option<String>, state: WebSocketState) {
    let remote_endpoint = Endpoint::new(Transport::WebSocket, addr.ip().to_string(), addr.port());
    let reporter = state.statistics.register(remote_endpoint.to_url());

    let (session, mut outbox) = Session::new(remote_endpoint, state.poas.clone(), reporter);
    let session = match cookies {
        Some(cookies) => session.with_cookies(cookies),
        None => session,
    };

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            if sink.send(Message::Binary(frame)).await.is_err() {
                break;
            }
        }
    });

    loop {
        match tokio::time::timeout(IDLE_TIMEOUT, stream.next()).await {
            Ok(Some(Ok(Message::Binary(payload)))) => {
                let session = session.clone();
                tokio::spawn(async move {
                    if let Err(err) = session.handle_frame(payload).await {
                        log::warn!("failed to handle websocket frame: {err}");
                    }
                });
            }
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Err(_) => break,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(err))) => {
                log::debug!("websocket read error: {err}");
                break;
            }
        }
    }

    session.close(ExceptionKind::CommFailure {
        what: "websocket session ended".to_string(),
    });
    writer.abort();
}
