//! Catalog of Kubernetes concepts taught by the simulator
//!
//! Each concept pairs a Kubernetes term with a shipping-port analogy. Some
//! concepts carry a [`VisualAction`] hinting which simulator control
//! demonstrates them; only the renderer acts on it.

use serde::{Deserialize, Serialize};

/// Simulator control that demonstrates a concept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisualAction {
    AddNode,
    AddPod,
    ScaleUp,
}

/// A teachable concept
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Concept {
    pub id: &'static str,
    pub title: &'static str,
    /// The layman's term
    pub analogy: &'static str,
    pub description: &'static str,
    #[serde(rename = "visualAction")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_action: Option<VisualAction>,
}

impl Concept {
    /// Context string handed to the tutor while this concept is open
    pub fn tutor_context(&self) -> String {
        format!(
            "The user is currently learning about the Kubernetes {} (Analogy: {}). Description: {}",
            self.title, self.analogy, self.description
        )
    }
}

const CATALOG: &[Concept] = &[
    Concept {
        id: "cluster",
        title: "Cluster",
        analogy: "The Shipping Port",
        description: "The entire facility where all the action happens. It manages the ships (Nodes) and the cargo (Pods).",
        visual_action: None,
    },
    Concept {
        id: "node",
        title: "Node",
        analogy: "The Cargo Ship",
        description: "A worker machine (virtual or physical) that carries the containers. It needs a captain (Kubelet) to report back to the port authority.",
        visual_action: Some(VisualAction::AddNode),
    },
    Concept {
        id: "pod",
        title: "Pod",
        analogy: "The Shipping Container",
        description: "The smallest deployable unit. Usually wraps one application container (like a box inside the shipping container). Pods live on Nodes.",
        visual_action: Some(VisualAction::AddPod),
    },
    Concept {
        id: "deployment",
        title: "Deployment",
        analogy: "The Crane Operator / Manifest",
        description: "Ensures the right number of containers are always present. If a container falls overboard (crashes), the Deployment orders a new one.",
        visual_action: Some(VisualAction::ScaleUp),
    },
    Concept {
        id: "service",
        title: "Service",
        analogy: "The Dispatch Office",
        description: "Provides a permanent phone number (IP address) to reach a set of Pods, even if the Pods themselves change or move ships.",
        visual_action: None,
    },
    Concept {
        id: "ingress",
        title: "Ingress",
        analogy: "The Port Gate",
        description: "Manages external access to the services in the cluster, typically HTTP. It routes traffic from the outside world to the correct Service.",
        visual_action: None,
    },
    Concept {
        id: "configmap",
        title: "ConfigMap",
        analogy: "The Instruction Label",
        description: "Configuration data (like DB URLs) decoupled from container images, so you can change settings without rebuilding the \"box\".",
        visual_action: None,
    },
    Concept {
        id: "secret",
        title: "Secret",
        analogy: "The Safe",
        description: "Similar to ConfigMaps but specifically for sensitive info like passwords or keys. Keeps them locked away securely.",
        visual_action: None,
    },
];

/// All concepts, in teaching order
pub fn catalog() -> &'static [Concept] {
    CATALOG
}

/// Look up a concept by id
pub fn find(id: &str) -> Option<&'static Concept> {
    CATALOG.iter().find(|c| c.id == id)
}
