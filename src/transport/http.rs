//! HTTP POST transport (§4.7): a degenerate, stateless session — each call
//! is one POST to `/rpc` carrying the raw framed message, answered with the
//! framed Answer as the response body. Static file serving for a configured
//! `root_dir` is an external collaborator and out of scope here.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{options, post},
};
use nprpc_codec::endpoint::{Endpoint, Transport};

use crate::session::Session;
use crate::statistics::Statistics;
use nprpc_service::Poa;

#[derive(Clone)]
pub struct HttpState {
    pub poas: Arc<Vec<Arc<Poa>>>,
    pub statistics: Statistics,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/rpc", post(call).options(preflight).get(get_not_allowed))
        .with_state(state)
}

async fn preflight() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type"),
    );
    (StatusCode::NO_CONTENT, headers)
}

async fn get_not_allowed() -> impl IntoResponse {
    StatusCode::BAD_REQUEST
}

async fn call(
    State(state): State<HttpState>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    body: Bytes,
) -> Response {
    let remote_endpoint = Endpoint::new(Transport::Http, addr.ip().to_string(), addr.port()).with_path("/rpc");
    let reporter = state.statistics.register(format!("http:{}", remote_endpoint.to_url()));

    let (session, mut outbox) = Session::new(remote_endpoint, state.poas.clone(), reporter);

    if let Err(err) = session.handle_frame(body).await {
        log::warn!("failed to handle http rpc call: {err}");
        return StatusCode::BAD_REQUEST.into_response();
    }

    match outbox.recv().await {
        Some(answer) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            answer,
        )
            .into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
