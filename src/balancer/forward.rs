//! Request forwarding: selects a backend, replays the request onto it, and
//! relays the response back verbatim.

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use super::server::AppState;

/// 2 MiB cap on a forwarded request body. The upstream places no limit at
/// all (Go's `io.Copy` streams unbounded); buffering the whole body here is
/// the cost of using a simple, synchronous-looking request builder instead
/// of wiring a streaming body through `reqwest`.
const MAX_FORWARD_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Handles any method, any path: picks the least-loaded healthy backend,
/// forwards the request, and streams the response's status/headers/body
/// back to the caller. Matches the upstream `forward` handler, with the
/// in-flight counter corrected to always decrement once the round trip
/// completes (success or failure) rather than never.
pub async fn forward(State(state): State<AppState>, req: Request<Body>) -> Response {
    let Some(index) = state.pool.dispatch() else {
        warn!("no healthy backends available");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let result = relay(&state, index, req).await;
    state.pool.complete(index);

    match result {
        Ok(response) => response,
        Err(message) => {
            warn!(error = %message, "forward failed");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

async fn relay(state: &AppState, index: usize, req: Request<Body>) -> Result<Response, String> {
    let address = state
        .pool
        .address(index)
        .ok_or_else(|| "backend vanished from pool".to_string())?;

    let (parts, body) = req.into_parts();
    let body_bytes = to_bytes(body, MAX_FORWARD_BODY_BYTES)
        .await
        .map_err(|e| e.to_string())?;

    let url = format!(
        "{}://{}{}",
        state.config.scheme(),
        address,
        parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    );

    let mut headers = parts.headers.clone();
    headers.remove(axum::http::header::HOST);

    let response = state
        .client
        .request(parts.method.clone(), url.as_str())
        .headers(headers)
        .body(body_bytes)
        .timeout(state.config.timeout)
        .send()
        .await
        .map_err(|e| format!("request to {address} failed: {e}"))?;

    info!(backend = %address, status = %response.status(), uri = %parts.uri, "fwd");

    let status = response.status();
    let mut resp_headers = response.headers().clone();
    if state.config.trace {
        if let Ok(value) = axum::http::HeaderValue::from_str(&address) {
            resp_headers.insert("lb-from", value);
        }
    }
    let body = response.bytes().await.map_err(|e| e.to_string())?;

    Ok((status, resp_headers, Body::from(body)).into_response())
}
