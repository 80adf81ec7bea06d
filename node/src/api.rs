//! # REST + WebSocket API
//!
//! Read-only inspection surface of a running mesh node.
//!
//! ## Endpoints
//!
//! | Method | Path                   | Description                             |
//! |--------|------------------------|-----------------------------------------|
//! | GET    | `/health`              | Liveness probe                          |
//! | GET    | `/status`              | Node status summary                     |
//! | GET    | `/topology`            | Latest snapshot plus optimization hints |
//! | GET    | `/paths/:destination`  | Active paths to a destination           |
//! | GET    | `/routes`              | Route query (`from`, `to`, `k`)         |
//! | GET    | `/growth/history`      | Recorded growth attempts                |
//! | GET    | `/ws`                  | Live `MeshEvent` stream                 |

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use hypha_protocol::coordinator::{MeshCoordinator, MeshStatus};
use hypha_protocol::routing::GraphStats;
use hypha_protocol::topology::{Optimization, TopologySnapshot};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state for every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub coordinator: Arc<MeshCoordinator>,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/topology", get(topology_handler))
        .route("/paths/:destination", get(paths_handler))
        .route("/routes", get(routes_handler))
        .route("/growth/history", get(growth_history_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
    #[serde(flatten)]
    pub mesh: MeshStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopologyResponse {
    pub snapshot: TopologySnapshot,
    pub optimizations: Vec<Optimization>,
    /// Statistics of the routing graph built from the snapshot.
    pub routing: GraphStats,
}

/// Query string of `GET /routes`.
#[derive(Debug, Deserialize)]
pub struct RouteQuery {
    /// Source node; defaults to the local node.
    pub from: Option<String>,
    pub to: String,
    /// When present, up to `k` diverse routes are returned.
    pub k: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn not_found(error: String) -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error })).into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        version: state.version.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mesh: state.coordinator.status(),
    })
}

/// `GET /topology`: the latest snapshot and routing statistics. A snapshot
/// is taken on demand if the snapshot loop has not produced one yet.
async fn topology_handler(State(state): State<AppState>) -> impl IntoResponse {
    let coordinator = &state.coordinator;
    let snapshot = coordinator
        .topology()
        .latest_snapshot()
        .unwrap_or_else(|| coordinator.refresh_topology());

    Json(TopologyResponse {
        snapshot: (*snapshot).clone(),
        optimizations: coordinator.topology().suggest_optimizations(),
        routing: coordinator.pathfinder().graph_stats(),
    })
}

async fn paths_handler(
    Path(destination): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let paths = state.coordinator.paths().get_all_paths(&destination);
    if paths.is_empty() {
        return not_found(format!("no active path to {destination}"));
    }
    Json(paths).into_response()
}

async fn routes_handler(
    Query(query): Query<RouteQuery>,
    State(state): State<AppState>,
) -> Response {
    let coordinator = &state.coordinator;
    let from = query
        .from
        .unwrap_or_else(|| coordinator.local_id().to_string());

    let routes = match query.k {
        Some(k) => coordinator.find_alternate_routes(&from, &query.to, Some(k)),
        None => coordinator
            .find_route(&from, &query.to)
            .into_iter()
            .collect(),
    };

    if routes.is_empty() {
        return not_found(format!("no route from {from} to {}", query.to));
    }
    Json(routes).into_response()
}

async fn growth_history_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.coordinator.growth().history())
}

/// `GET /ws` pushes every event of the unified bus as JSON text frames.
/// Client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.coordinator.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(ev) => {
                    let payload = match serde_json::to_string(&ev) {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to serialize ws event");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "ws subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
}
