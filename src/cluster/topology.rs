//! Static cluster topology and replica placement.
//!
//! Placement is rendezvous hashing: every node is scored with a stable
//! hash of `(node, key)` and the key's replica set is the top-`from`
//! nodes by score. Every node computes the same ranking independently,
//! and removing one node only reassigns the keys it owned.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("this node's URL {0:?} is not part of the cluster")]
    UnknownSelf(String),

    #[error("cluster has no nodes")]
    Empty,
}

/// The local node identity and the full, ordered node list.
#[derive(Debug, Clone)]
pub struct Topology {
    me: String,
    nodes: Vec<String>,
}

impl Topology {
    /// Builds a topology from the full node list (sorted and deduplicated
    /// here, so every node agrees on it). `me` must be in the list.
    pub fn new(me: String, mut nodes: Vec<String>) -> Result<Self, TopologyError> {
        nodes.sort();
        nodes.dedup();
        if nodes.is_empty() {
            return Err(TopologyError::Empty);
        }
        if !nodes.contains(&me) {
            return Err(TopologyError::UnknownSelf(me));
        }
        Ok(Self { me, nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn me(&self) -> &str {
        &self.me
    }

    pub fn is_me(&self, node: &str) -> bool {
        self.me == node
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// The peer node URLs (everyone but this node).
    pub fn peers(&self) -> impl Iterator<Item = &String> {
        self.nodes.iter().filter(move |node| **node != self.me)
    }

    /// The top-`from` nodes for `key` by rendezvous score. `from` is
    /// capped at the cluster size.
    pub fn replicas_for(&self, key: &[u8], from: usize) -> Vec<String> {
        let mut scored: Vec<(u64, &String)> = self
            .nodes
            .iter()
            .map(|node| (score(node, key), node))
            .collect();
        // Descending by score; node name untangles the (unlikely) tie so
        // every coordinator picks the same set.
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored
            .into_iter()
            .take(from.min(self.nodes.len()))
            .map(|(_, node)| node.clone())
            .collect()
    }
}

/// Stable per-(node, key) score.
fn score(node: &str, key: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    node.hash(&mut hasher);
    key.hash(&mut hasher);
    hasher.finish()
}
