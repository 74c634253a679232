//! Simulator API Server
//!
//! REST and WebSocket endpoints in front of one simulated cluster:
//! - Cluster: current snapshot, live snapshot stream
//! - Nodes: add, remove, crash
//! - Pods: add (first-fit)
//! - Recoveries: recent self-healing reports and queued recoveries
//! - Learning: concept catalog and the AI tutor

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

use super::{
    handle::ClusterHandle,
    healing::{RecoveryReport, RecoveryTask},
    node::NodeId,
    notifier::{Snapshot, SnapshotReceiver},
    store::StoreError,
};
use crate::concepts;
use crate::tutor::{Tutor, TutorError};

/// Shared state for the simulator API
#[derive(Clone)]
pub struct ApiState {
    pub cluster: ClusterHandle,
    pub tutor: Arc<Tutor>,
}

impl ApiState {
    pub fn new(cluster: ClusterHandle, tutor: Tutor) -> Self {
        Self {
            cluster,
            tutor: Arc::new(tutor),
        }
    }
}

impl Default for ApiState {
    fn default() -> Self {
        Self::new(ClusterHandle::default(), Tutor::disabled())
    }
}

/// Create the simulator router
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        // Cluster
        .route("/v1/cluster", get(get_cluster))
        .route("/v1/watch", get(watch_cluster))
        // Nodes
        .route("/v1/nodes", post(add_node))
        .route("/v1/nodes/{id}", delete(remove_node))
        .route("/v1/nodes/{id}/crash", post(crash_node))
        // Pods
        .route("/v1/pods", post(add_pod))
        // Self-healing
        .route("/v1/recoveries", get(list_recoveries))
        // Learning
        .route("/v1/concepts", get(list_concepts))
        .route("/v1/concepts/{id}", get(get_concept))
        .route("/v1/tutor/ask", post(ask_tutor))
        // Health check
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Shared request/response types
// ============================================================================

/// Optional body for add-node and add-pod
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NameRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// A recovery waiting on the virtual clock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRecovery {
    #[serde(rename = "fireAtMs")]
    pub fire_at_ms: u64,
    pub task: RecoveryTask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveriesResponse {
    pub pending: Vec<PendingRecovery>,
    pub history: Vec<RecoveryReport>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// Concept id the learner is reading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

fn store_error_response(err: StoreError) -> Response {
    match err {
        StoreError::ClusterFull(full) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("cluster full").with_detail(full.to_string())),
        )
            .into_response(),
    }
}

// ============================================================================
// Health & Cluster
// ============================================================================

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn get_cluster(State(state): State<ApiState>) -> Json<Snapshot> {
    Json(state.cluster.snapshot().await.as_ref().clone())
}

// ============================================================================
// Node & Pod Endpoints
// ============================================================================

async fn add_node(
    State(state): State<ApiState>,
    body: Option<Json<NameRequest>>,
) -> impl IntoResponse {
    let name = body.and_then(|Json(req)| req.name);
    let snapshot = state.cluster.add_node(name).await;
    (StatusCode::CREATED, Json(snapshot.as_ref().clone()))
}

/// Unknown ids are a no-op answered with the current snapshot
async fn remove_node(State(state): State<ApiState>, Path(id): Path<String>) -> Json<Snapshot> {
    let snapshot = state.cluster.remove_node(&NodeId::from(id)).await;
    Json(snapshot.as_ref().clone())
}

async fn crash_node(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    let snapshot = state.cluster.crash_node(&NodeId::from(id)).await;
    (StatusCode::ACCEPTED, Json(snapshot.as_ref().clone()))
}

async fn add_pod(State(state): State<ApiState>, body: Option<Json<NameRequest>>) -> Response {
    let name = body.and_then(|Json(req)| req.name);
    match state.cluster.add_pod(name).await {
        Ok(snapshot) => (StatusCode::CREATED, Json(snapshot.as_ref().clone())).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn list_recoveries(State(state): State<ApiState>) -> Json<RecoveriesResponse> {
    let pending = state
        .cluster
        .pending_recoveries()
        .await
        .into_iter()
        .map(|(fire_at_ms, task)| PendingRecovery { fire_at_ms, task })
        .collect();
    let history = state.cluster.recovery_history().await;
    Json(RecoveriesResponse { pending, history })
}

// ============================================================================
// Snapshot stream
// ============================================================================

async fn watch_cluster(State(state): State<ApiState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| stream_snapshots(socket, state.cluster))
}

/// Send the current snapshot, then every published one, until the peer leaves
async fn stream_snapshots(socket: WebSocket, cluster: ClusterHandle) {
    let (mut sender, mut receiver) = socket.split();
    let (current, mut updates) = cluster.watch().await;
    info!("Watcher connected at version {}", current.version);

    if send_snapshot(&mut sender, &current).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            update = next_update(&mut updates, &cluster) => match update {
                Some(snapshot) => {
                    if send_snapshot(&mut sender, &snapshot).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("Watcher disconnected");
}

/// Next snapshot for a watcher, or `None` once the store is gone
///
/// A watcher that fell behind the broadcast buffer gets the latest snapshot
/// so it never keeps rendering a stale cluster.
async fn next_update(
    updates: &mut SnapshotReceiver,
    cluster: &ClusterHandle,
) -> Option<Arc<Snapshot>> {
    match updates.recv().await {
        Ok(snapshot) => Some(snapshot),
        Err(RecvError::Lagged(skipped)) => {
            warn!("Watcher lagged, skipped {} snapshot(s); resending latest", skipped);
            Some(cluster.snapshot().await)
        }
        Err(RecvError::Closed) => None,
    }
}

async fn send_snapshot<S>(sender: &mut S, snapshot: &Snapshot) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
{
    let text = serde_json::to_string(snapshot).map_err(|e| {
        warn!("Failed to encode snapshot: {}", e);
    })?;
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

// ============================================================================
// Learning Endpoints
// ============================================================================

async fn list_concepts() -> impl IntoResponse {
    Json(concepts::catalog())
}

async fn get_concept(Path(id): Path<String>) -> Response {
    match concepts::find(&id) {
        Some(concept) => (StatusCode::OK, Json(concept)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("unknown concept '{}'", id))),
        )
            .into_response(),
    }
}

async fn ask_tutor(State(state): State<ApiState>, Json(req): Json<AskRequest>) -> Response {
    let context = req
        .concept
        .as_deref()
        .and_then(concepts::find)
        .map(|c| c.tutor_context());

    match state.tutor.ask(&req.question, context.as_deref()).await {
        Ok(answer) => (StatusCode::OK, Json(AskResponse { answer })).into_response(),
        Err(e) => {
            let status = match &e {
                TutorError::MissingApiKey => StatusCode::SERVICE_UNAVAILABLE,
                TutorError::EmptyQuestion => StatusCode::BAD_REQUEST,
                TutorError::Client(c) if c.is_quota() => StatusCode::TOO_MANY_REQUESTS,
                TutorError::Client(_) | TutorError::EmptyAnswer => StatusCode::BAD_GATEWAY,
            };
            (
                status,
                Json(ErrorResponse::new(e.user_message()).with_detail(e.to_string())),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::cluster::store::ClusterConfig;

    fn create_test_app() -> (Router, ClusterHandle) {
        let cluster = ClusterHandle::new(ClusterConfig::default());
        let state = ApiState::new(cluster.clone(), Tutor::disabled());
        (create_router(state), cluster)
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<&str>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        app.oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = create_test_app();
        let response = send(app, "GET", "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_cluster() {
        let (app, _) = create_test_app();

        let response = send(app, "GET", "/v1/cluster", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["version"], 0);
        assert_eq!(json["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(json["stats"]["health"], "Healthy");
    }

    #[tokio::test]
    async fn test_add_node_with_name() {
        let (app, cluster) = create_test_app();

        let response = send(app, "POST", "/v1/nodes", Some(r#"{"name":"ship-gamma"}"#)).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let snapshot = cluster.snapshot().await;
        assert_eq!(snapshot.nodes[2].name, "ship-gamma");
    }

    #[tokio::test]
    async fn test_add_node_without_body() {
        let (app, cluster) = create_test_app();

        let response = send(app, "POST", "/v1/nodes", None).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(cluster.snapshot().await.nodes.len(), 3);
    }

    #[tokio::test]
    async fn test_add_pod_until_full() {
        let (app, _) = create_test_app();

        for _ in 0..8 {
            let response = send(app.clone(), "POST", "/v1/pods", None).await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = send(app, "POST", "/v1/pods", None).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["error"], "cluster full");
    }

    #[tokio::test]
    async fn test_crash_node() {
        let (app, cluster) = create_test_app();

        let response = send(app, "POST", "/v1/nodes/node-1/crash", None).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let json = body_json(response).await;
        assert_eq!(json["nodes"][0]["status"], "NotReady");
        assert_eq!(cluster.pending_recoveries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_node_is_noop() {
        let (app, cluster) = create_test_app();

        let response = send(app.clone(), "POST", "/v1/nodes/node-9/crash", None).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["version"], 0);

        let response = send(app, "DELETE", "/v1/nodes/node-9", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["version"], 0);

        assert!(cluster.pending_recoveries().await.is_empty());
    }

    #[tokio::test]
    async fn test_repeat_delete_succeeds() {
        let (app, _) = create_test_app();

        let response = send(app.clone(), "DELETE", "/v1/nodes/node-2", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["version"], 1);

        let response = send(app, "DELETE", "/v1/nodes/node-2", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["version"], 1);
        assert_eq!(json["nodes"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lagging_watcher_gets_latest_snapshot() {
        let config = ClusterConfig {
            snapshot_buffer: 1,
            ..Default::default()
        };
        let cluster = ClusterHandle::new(config);
        let (_, mut updates) = cluster.watch().await;

        for _ in 0..3 {
            cluster.add_pod(None).await.unwrap();
        }

        let snapshot = next_update(&mut updates, &cluster).await.unwrap();
        assert_eq!(snapshot.version, 3);
        assert_eq!(snapshot.total_pods(), 3);
    }

    #[tokio::test]
    async fn test_remove_node() {
        let (app, cluster) = create_test_app();

        let response = send(app, "DELETE", "/v1/nodes/node-2", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(cluster.snapshot().await.node("node-2").is_none());
    }

    #[tokio::test]
    async fn test_recoveries() {
        let (app, cluster) = create_test_app();
        cluster.add_pod(None).await.unwrap();
        cluster.crash_node(&NodeId::from("node-1")).await;

        let response = send(app.clone(), "GET", "/v1/recoveries", None).await;
        let json = body_json(response).await;
        assert_eq!(json["pending"][0]["fireAtMs"], 2000);
        assert!(json["history"].as_array().unwrap().is_empty());

        cluster.advance(2000).await;

        let response = send(app, "GET", "/v1/recoveries", None).await;
        let json = body_json(response).await;
        assert!(json["pending"].as_array().unwrap().is_empty());
        assert_eq!(json["history"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concepts() {
        let (app, _) = create_test_app();

        let response = send(app.clone(), "GET", "/v1/concepts", None).await;
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 8);

        let response = send(app.clone(), "GET", "/v1/concepts/node", None).await;
        let json = body_json(response).await;
        assert_eq!(json["visualAction"], "ADD_NODE");

        let response = send(app, "GET", "/v1/concepts/daemonset", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ask_without_tutor() {
        let (app, _) = create_test_app();

        let response = send(
            app,
            "POST",
            "/v1/tutor/ask",
            Some(r#"{"question":"What is a pod?","concept":"pod"}"#),
        )
        .await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().starts_with("API Key is missing"));
    }

    #[tokio::test]
    async fn test_ask_with_mock_tutor() {
        use crate::client::openai::mock::MockOpenAiClient;

        let client = Arc::new(MockOpenAiClient::new(vec!["Ships carry containers.".to_string()]));
        let state = ApiState::new(ClusterHandle::default(), Tutor::new(client.clone(), 0.7));
        let app = create_router(state);

        let response = send(
            app,
            "POST",
            "/v1/tutor/ask",
            Some(r#"{"question":"What is a node?","concept":"node"}"#),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["answer"], "Ships carry containers.");

        let request = client.last_request().unwrap();
        assert!(request.messages[1].content.contains("Analogy: The Cargo Ship"));
    }

    #[tokio::test]
    async fn test_ask_rate_limited() {
        use crate::client::openai::mock::MockOpenAiClient;
        use crate::client::ClientError;

        let client = Arc::new(MockOpenAiClient::failing(ClientError::Api {
            status: 429,
            message: "quota exceeded".to_string(),
        }));
        let state = ApiState::new(ClusterHandle::default(), Tutor::new(client, 0.7));
        let app = create_router(state);

        let response = send(app, "POST", "/v1/tutor/ask", Some(r#"{"question":"Hi"}"#)).await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().starts_with("Too much radio traffic"));
    }
}
