//! HTTP front for the [`TransportGate`], meant for an `auth_request`-style
//! reverse proxy: the proxy forwards the original smart-HTTP URI in
//! [`ORIGINAL_URI_HEADER`] and lets git through only on a 2xx answer.

use crate::gate::{GateRequest, TransportGate, BASIC_CHALLENGE};
use axum::extract::State;
use axum::http::header::{AsHeaderName, AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::net::SocketAddr;
use tracing::info;

/// Header carrying the original request URI, set by the proxy
pub const ORIGINAL_URI_HEADER: &str = "x-original-uri";

/// Every path is answered by the gate
pub fn router(gate: TransportGate) -> Router {
    Router::new().fallback(authorize).with_state(gate)
}

fn header_value(headers: &HeaderMap, name: impl AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn authorize(State(gate): State<TransportGate>, headers: HeaderMap) -> Response {
    let request = GateRequest {
        original_uri: header_value(&headers, ORIGINAL_URI_HEADER),
        authorization: header_value(&headers, AUTHORIZATION),
    };

    let decision = gate.decide(&request).await;
    let Some(code) = decision.status() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if decision.challenge() {
        (status, [(WWW_AUTHENTICATE, BASIC_CHALLENGE)]).into_response()
    } else {
        status.into_response()
    }
}

pub async fn serve(addr: SocketAddr, gate: TransportGate) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %listener.local_addr()?, "Gate listening");
    axum::serve(listener, router(gate)).await
}
