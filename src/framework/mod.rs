//! Argumentation framework snapshots.
//!
//! This module provides:
//! - The internal, fraction-scaled graph model ([`ArgumentationFramework`])
//! - The JSON wire shape shared by the remote engine and export files
//! - The single place where percentage and fraction scales are converted
//!
//! A framework is validated once, at construction, and never mutated
//! afterwards. Updates arrive as whole new snapshots which are published as
//! [`Snapshot`] (`Arc`) values, so any number of readers can hold one while
//! the session moves on.

mod normalize;
mod wire;

#[cfg(test)]
#[path = "normalize_tests.rs"]
mod normalize_tests;

pub use normalize::*;
pub use wire::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{FrameworkError, FrameworkResult};

/// Shared, immutable framework snapshot.
pub type Snapshot = Arc<ArgumentationFramework>;

/// Origin of an argument node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// The claim under evaluation.
    Topic,
    /// An argument contributed by the engine.
    Agent,
}

impl Provenance {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Topic => "topic",
            Provenance::Agent => "agent",
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A weighted argument in the graph. Scores are fractions in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentNode {
    /// Key of the node in the framework map.
    pub id: String,
    /// Short name carried on the wire (usually equal to `id`).
    pub name: String,
    /// Argument text.
    pub label: String,
    /// Base score before aggregation.
    pub initial_weight: f64,
    /// Aggregated score computed by the engine.
    pub strength: f64,
    /// Where the argument came from.
    pub provenance: Provenance,
}

/// Directed edge between two argument ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Source argument id.
    pub src: String,
    /// Target argument id.
    pub dst: String,
}

impl Edge {
    /// Create a new edge.
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

/// Validated argumentation framework.
///
/// Holds exactly one [`Provenance::Topic`] node, and every edge endpoint
/// names an existing node.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentationFramework {
    nodes: BTreeMap<String, ArgumentNode>,
    attack_edges: Vec<Edge>,
    support_edges: Vec<Edge>,
    topic_id: String,
}

impl ArgumentationFramework {
    /// Build a framework, enforcing the snapshot invariants.
    pub fn new(
        nodes: BTreeMap<String, ArgumentNode>,
        attack_edges: Vec<Edge>,
        support_edges: Vec<Edge>,
    ) -> FrameworkResult<Self> {
        let mut topics = nodes
            .values()
            .filter(|n| n.provenance == Provenance::Topic)
            .map(|n| n.id.clone());

        let topic_id = match (topics.next(), topics.count()) {
            (Some(id), 0) => id,
            (None, _) => return Err(FrameworkError::TopicCount { count: 0 }),
            (Some(_), rest) => return Err(FrameworkError::TopicCount { count: rest + 1 }),
        };

        for edge in attack_edges.iter().chain(support_edges.iter()) {
            if !nodes.contains_key(&edge.src) || !nodes.contains_key(&edge.dst) {
                return Err(FrameworkError::DanglingEdge {
                    src: edge.src.clone(),
                    dst: edge.dst.clone(),
                });
            }
        }

        Ok(Self {
            nodes,
            attack_edges,
            support_edges,
            topic_id,
        })
    }

    /// All nodes keyed by id.
    pub fn nodes(&self) -> &BTreeMap<String, ArgumentNode> {
        &self.nodes
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&ArgumentNode> {
        self.nodes.get(id)
    }

    /// Attack edges in arrival order.
    pub fn attack_edges(&self) -> &[Edge] {
        &self.attack_edges
    }

    /// Support edges in arrival order.
    pub fn support_edges(&self) -> &[Edge] {
        &self.support_edges
    }

    /// The claim node.
    pub fn topic(&self) -> &ArgumentNode {
        // present by construction
        &self.nodes[&self.topic_id]
    }

    /// Confidence in the claim as a whole percentage.
    pub fn confidence(&self) -> u8 {
        fraction_to_percent(self.topic().strength)
    }

    /// Wrap into a shareable snapshot.
    pub fn into_snapshot(self) -> Snapshot {
        Arc::new(self)
    }
}
