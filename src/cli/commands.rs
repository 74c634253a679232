//! Command implementations for the CLI
//!
//! SBIO pattern: Commands return Results, I/O is handled by caller

use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::cluster::api::{ErrorResponse, NameRequest, RecoveriesResponse};
use crate::cluster::{ClusterConfig, ClusterStore, NodeId, RecoveryOutcome, Snapshot};

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

// ============================================================================
// Scenarios (pure, run on a local store and virtual clock)
// ============================================================================

/// Built-in scripted scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    /// Fill every slot, then try one more pod
    Saturate,
    /// Crash a partly loaded ship; a neighbour takes all its containers
    Heal,
    /// Crash a full ship; the neighbour only has room for some containers
    Overflow,
    /// Crash a ship, then scrap it before its recovery fires
    RemoveDuringRecovery,
}

/// One action of a scenario and the cluster it left behind
#[derive(Debug, Clone)]
pub struct ScenarioStep {
    pub action: String,
    pub outcome: String,
    pub snapshot: Arc<Snapshot>,
}

/// Play a scenario from a fresh cluster
pub fn run_scenario(scenario: Scenario, config: ClusterConfig) -> Vec<ScenarioStep> {
    let capacity = config.pod_capacity;
    let delay = config.recovery_delay_ms;
    let first = NodeId::from_sequence(1);
    let mut store = ClusterStore::new(config);
    let mut steps = Vec::new();

    match scenario {
        Scenario::Saturate => {
            let slots = store.stats().free_slots;
            for _ in 0..=slots {
                add_pod_step(&mut store, &mut steps);
            }
        }
        Scenario::Heal => {
            for _ in 0..capacity.saturating_sub(1) {
                add_pod_step(&mut store, &mut steps);
            }
            crash_step(&mut store, &first, &mut steps);
            advance_step(&mut store, delay, &mut steps);
        }
        Scenario::Overflow => {
            for _ in 0..(capacity * 2).saturating_sub(1) {
                add_pod_step(&mut store, &mut steps);
            }
            crash_step(&mut store, &first, &mut steps);
            advance_step(&mut store, delay, &mut steps);
        }
        Scenario::RemoveDuringRecovery => {
            for _ in 0..2 {
                add_pod_step(&mut store, &mut steps);
            }
            crash_step(&mut store, &first, &mut steps);
            advance_step(&mut store, delay / 2, &mut steps);

            let removed = store.remove_node(&first);
            steps.push(ScenarioStep {
                action: format!("delete node {}", first),
                outcome: if removed { "removed" } else { "not found" }.to_string(),
                snapshot: store.snapshot(),
            });

            advance_step(&mut store, delay - delay / 2, &mut steps);
        }
    }

    steps
}

fn add_pod_step(store: &mut ClusterStore, steps: &mut Vec<ScenarioStep>) {
    let outcome = match store.add_pod() {
        Ok(id) => format!("{} scheduled", id),
        Err(e) => format!("rejected: {}", e),
    };
    steps.push(ScenarioStep {
        action: "add pod".to_string(),
        outcome,
        snapshot: store.snapshot(),
    });
}

fn crash_step(store: &mut ClusterStore, id: &NodeId, steps: &mut Vec<ScenarioStep>) {
    let outcome = match store.crash_node(id) {
        Some(fire_at) => format!("NotReady, recovery at t={}ms", fire_at),
        None => "ignored".to_string(),
    };
    steps.push(ScenarioStep {
        action: format!("crash {}", id),
        outcome,
        snapshot: store.snapshot(),
    });
}

fn advance_step(store: &mut ClusterStore, delta_ms: u64, steps: &mut Vec<ScenarioStep>) {
    let outcomes = store.advance(delta_ms);
    let outcome = if outcomes.is_empty() {
        "nothing due".to_string()
    } else {
        outcomes
            .iter()
            .map(describe_outcome)
            .collect::<Vec<_>>()
            .join("; ")
    };
    steps.push(ScenarioStep {
        action: format!("wait {}ms", delta_ms),
        outcome,
        snapshot: store.snapshot(),
    });
}

/// One-line summary of a fired recovery
pub fn describe_outcome(outcome: &RecoveryOutcome) -> String {
    match outcome {
        RecoveryOutcome::Skipped { node_id } => {
            format!("recovery of {} skipped (node gone)", node_id)
        }
        RecoveryOutcome::Completed(report) => format!(
            "recovered {}: {} placed, {} dropped",
            report.node_id,
            report.placements.len(),
            report.dropped.len()
        ),
    }
}

// ============================================================================
// HTTP Client for the simulator API
// ============================================================================

/// Client for driving a running simulator
pub struct SimulatorClient {
    client: reqwest::Client,
    base_url: String,
}

impl SimulatorClient {
    /// Create a new client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        self.client.request(method, &url)
    }

    /// Current cluster snapshot
    pub async fn snapshot(&self) -> CommandResult<Snapshot> {
        let resp = self
            .build_request(reqwest::Method::GET, "/v1/cluster")
            .send()
            .await?;
        parse_response(resp).await
    }

    /// Add a node
    pub async fn add_node(&self, name: Option<String>) -> CommandResult<Snapshot> {
        let resp = self
            .build_request(reqwest::Method::POST, "/v1/nodes")
            .json(&NameRequest { name })
            .send()
            .await?;
        parse_response(resp).await
    }

    /// Add a pod
    pub async fn add_pod(&self, name: Option<String>) -> CommandResult<Snapshot> {
        let resp = self
            .build_request(reqwest::Method::POST, "/v1/pods")
            .json(&NameRequest { name })
            .send()
            .await?;
        parse_response(resp).await
    }

    /// Crash a node
    pub async fn crash_node(&self, node: &str) -> CommandResult<Snapshot> {
        let path = format!("/v1/nodes/{}/crash", node);
        let resp = self
            .build_request(reqwest::Method::POST, &path)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// Delete a node
    pub async fn delete_node(&self, node: &str) -> CommandResult<Snapshot> {
        let path = format!("/v1/nodes/{}", node);
        let resp = self
            .build_request(reqwest::Method::DELETE, &path)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// Recent and queued recoveries
    pub async fn recoveries(&self) -> CommandResult<RecoveriesResponse> {
        let resp = self
            .build_request(reqwest::Method::GET, "/v1/recoveries")
            .send()
            .await?;
        parse_response(resp).await
    }

    /// Stream snapshots until the server closes the connection
    pub async fn watch<F>(&self, mut on_snapshot: F) -> CommandResult<()>
    where
        F: FnMut(Snapshot),
    {
        use futures::StreamExt;
        use tokio_tungstenite::{connect_async, tungstenite::Message};

        let url = format!("{}/v1/watch", ws_url(&self.base_url));
        let (mut ws_stream, _) = connect_async(&url)
            .await
            .map_err(|e| CommandError::WebSocket(e.to_string()))?;

        while let Some(message) = ws_stream.next().await {
            match message.map_err(|e| CommandError::WebSocket(e.to_string()))? {
                Message::Text(text) => on_snapshot(serde_json::from_str(text.as_str())?),
                Message::Close(_) => break,
                _ => {}
            }
        }

        Ok(())
    }
}

/// Decode a success body, or turn the error body into a `CommandError`
async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> CommandResult<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }

    let text = resp.text().await.unwrap_or_default();
    Err(CommandError::Server {
        status: status.as_u16(),
        message: server_message(&text),
    })
}

/// Pick the human message out of an error body
fn server_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => match err.detail {
            Some(detail) => format!("{} ({})", err.error, detail),
            None => err.error,
        },
        Err(_) if body.is_empty() => "Unknown error".to_string(),
        Err(_) => body.to_string(),
    }
}

/// Map an http(s) base URL onto its ws(s) equivalent
pub fn ws_url(base_url: &str) -> String {
    if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        format!("ws://{}", base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{PodStatus, RecoveryOutcome};

    fn outcomes(steps: &[ScenarioStep]) -> Vec<&str> {
        steps.iter().map(|s| s.outcome.as_str()).collect()
    }

    #[test]
    fn test_saturate() {
        let steps = run_scenario(Scenario::Saturate, ClusterConfig::default());

        assert_eq!(steps.len(), 9);
        assert!(steps[..8].iter().all(|s| s.outcome.ends_with("scheduled")));
        assert!(steps[8].outcome.starts_with("rejected"));

        let last = &steps[8].snapshot;
        assert!(last.nodes.iter().all(|n| n.pod_count() == 4));
    }

    #[test]
    fn test_heal() {
        let steps = run_scenario(Scenario::Heal, ClusterConfig::default());

        let crashed = &steps[3].snapshot;
        assert_eq!(crashed.nodes[0].pod_count(), 3);
        assert!(!crashed.nodes[0].is_ready());

        let healed = &steps.last().unwrap().snapshot;
        assert_eq!(healed.nodes[0].pod_count(), 0);
        assert_eq!(healed.nodes[1].pod_count(), 3);
        assert!(healed.nodes[1]
            .pods
            .iter()
            .all(|p| p.status == PodStatus::Running));
        assert_eq!(
            steps.last().unwrap().outcome,
            "recovered node-1: 3 placed, 0 dropped"
        );
    }

    #[test]
    fn test_overflow() {
        let steps = run_scenario(Scenario::Overflow, ClusterConfig::default());

        let last = steps.last().unwrap();
        assert_eq!(last.outcome, "recovered node-1: 1 placed, 3 dropped");
        assert_eq!(last.snapshot.nodes[1].pod_count(), 4);
        assert_eq!(last.snapshot.stats.dropped_pods, 3);
    }

    #[test]
    fn test_remove_during_recovery() {
        let steps = run_scenario(Scenario::RemoveDuringRecovery, ClusterConfig::default());

        assert_eq!(
            outcomes(&steps)[3..],
            [
                "nothing due",
                "removed",
                "recovery of node-1 skipped (node gone)"
            ]
        );
        let last = &steps.last().unwrap().snapshot;
        assert_eq!(last.nodes.len(), 1);
        assert_eq!(last.nodes[0].id.as_str(), "node-2");
    }

    #[test]
    fn test_describe_skipped() {
        let outcome = RecoveryOutcome::Skipped {
            node_id: NodeId::from("node-7"),
        };
        assert_eq!(describe_outcome(&outcome), "recovery of node-7 skipped (node gone)");
    }

    #[test]
    fn test_ws_url() {
        assert_eq!(ws_url("http://localhost:8080"), "ws://localhost:8080");
        assert_eq!(ws_url("https://sim.example.com"), "wss://sim.example.com");
        assert_eq!(ws_url("localhost:8080"), "ws://localhost:8080");
    }

    #[test]
    fn test_server_message() {
        assert_eq!(
            server_message(r#"{"error":"cluster full","detail":"no room"}"#),
            "cluster full (no room)"
        );
        assert_eq!(server_message(r#"{"error":"node node-9 not found"}"#), "node node-9 not found");
        assert_eq!(server_message(""), "Unknown error");
        assert_eq!(server_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_client_trims_base_url() {
        let client = SimulatorClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
