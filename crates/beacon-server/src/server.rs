use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use beacon_core::{Scope, DEFAULT_TOPIC};
use beacon_hub::Hub;
use beacon_settings::Settings;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::connection;
use crate::publish;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub settings: Arc<Settings>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_trusted))
        .route("/ws/public", get(ws_public))
        .route("/publish", post(publish::trusted))
        .route("/publish/public", post(publish::public))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(CorsLayer::permissive())
}

/// Query strings carry credentials on the upgrade endpoints, so trace
/// spans record the method and path only.
fn request_span(request: &Request<Body>) -> tracing::Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
    )
}

/// Bind the listener and serve. Returns a handle keeping the server
/// task alive; `settings.port == 0` binds an ephemeral port.
pub async fn start(settings: Settings, hub: Hub) -> Result<ServerHandle, std::io::Error> {
    let port = settings.port;
    let state = AppState {
        hub,
        settings: Arc::new(settings),
    };
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(port = local_addr.port(), "beacon server started");

    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server,
    })
}

/// Handle returned by [`start`] — keeps the server task alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
    topic: Option<String>,
}

/// Upgrade endpoint for trusted sessions: requires a valid bearer
/// credential in the `token` query parameter.
async fn ws_trusted(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let Some(token) = query.token else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    if let Err(e) = beacon_auth::bearer::verify(&token, &state.settings.jwt_secret) {
        debug!(error = %e, "rejected trusted upgrade");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let topic = query.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_owned());
    ws.on_upgrade(move |socket| connection::serve(socket, Scope::Trusted, topic, state.hub))
}

/// Upgrade endpoint for public sessions: no credential required.
async fn ws_public(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let topic = query.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_owned());
    ws.on_upgrade(move |socket| connection::serve(socket, Scope::Public, topic, state.hub))
}

/// Liveness probe with the current session count.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.hub.session_count().await;
    Json(serde_json::json!({ "status": "ok", "sessions": sessions }))
}
