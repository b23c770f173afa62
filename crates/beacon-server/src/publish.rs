//! Producer-facing publish endpoints.
//!
//! Bodies are checked for syntactic JSON only; the broker never
//! interprets payload content. A publish to a topic with no subscribers
//! is still accepted — fan-out is simply empty.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use beacon_core::{Scope, DEFAULT_TOPIC};
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use crate::server::AppState;

/// Header carrying the time-window token on the trusted endpoint.
pub const TOKEN_HEADER: &str = "x-api-token";

#[derive(Deserialize)]
pub struct TopicQuery {
    topic: Option<String>,
}

/// `POST /publish` — trusted scope, requires a valid time-window token.
pub async fn trusted(
    State(state): State<AppState>,
    Query(query): Query<TopicQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(token) = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()) else {
        return StatusCode::UNAUTHORIZED;
    };
    if let Err(e) = beacon_auth::timetoken::validate(
        token,
        &state.settings.time_token_secret,
        state.settings.time_window_secs,
        state.settings.allowed_skew,
    ) {
        debug!(error = %e, "rejected publish token");
        return StatusCode::UNAUTHORIZED;
    }
    accept(&state, Scope::Trusted, query.topic, body).await
}

/// `POST /publish/public` — public scope, no token required.
pub async fn public(
    State(state): State<AppState>,
    Query(query): Query<TopicQuery>,
    body: Bytes,
) -> StatusCode {
    accept(&state, Scope::Public, query.topic, body).await
}

async fn accept(state: &AppState, scope: Scope, topic: Option<String>, body: Bytes) -> StatusCode {
    if serde_json::from_slice::<serde_json::Value>(&body).is_err() {
        return StatusCode::BAD_REQUEST;
    }
    let topic = topic.unwrap_or_else(|| DEFAULT_TOPIC.to_owned());
    state.hub.publish(scope, &topic, body).await;
    StatusCode::ACCEPTED
}
