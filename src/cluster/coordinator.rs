//! The replication coordinator.
//!
//! One coordinator per node. For every client operation it selects the
//! key's replica set, dispatches the operation — a local engine call for
//! itself, a proxied HTTP request for peers — and collects replies
//! concurrently until the requested `ack` count is reached; the rest of
//! the fan-out is abandoned. Reads resolve the freshest version across
//! the collected replies by logical timestamp, so a removal on one
//! replica beats an older value on another.
//!
//! Local and remote replicas are treated symmetrically: this node is
//! simply one entry of the replica set, with the network hop elided.

use std::collections::HashMap;

use futures_util::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
use tracing::{info, warn};

use crate::cell::FOREVER;
use crate::engine::{Engine, EngineError, KeyState};

use super::peer::PeerClient;
use super::replicas::ReplicasFactor;
use super::topology::Topology;

/// Errors surfaced by coordinated operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// No replica in the quorum holds a live version of the key.
    #[error("key not found")]
    NotFound,

    /// Fewer than `ack` replicas answered before the deadline.
    #[error("not enough replicas")]
    QuorumFailed,

    /// The local storage engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A peer client could not be constructed.
    #[error("peer client: {0}")]
    Peer(#[from] reqwest::Error),
}

/// Client-facing operations over the replica set of each key.
pub struct Coordinator {
    engine: Engine,
    topology: Topology,
    peers: HashMap<String, PeerClient>,
    quorum: ReplicasFactor,
}

impl Coordinator {
    pub fn new(engine: Engine, topology: Topology) -> Result<Self, ClusterError> {
        let mut peers = HashMap::new();
        for node in topology.peers() {
            peers.insert(node.clone(), PeerClient::new(node.clone())?);
        }
        let quorum = ReplicasFactor::quorum(topology.len());
        info!(
            me = topology.me(),
            nodes = topology.len(),
            %quorum,
            "coordinator ready"
        );
        Ok(Self {
            engine,
            topology,
            peers,
            quorum,
        })
    }

    /// The engine-configured default factor (majority of all nodes).
    pub fn quorum(&self) -> ReplicasFactor {
        self.quorum
    }

    pub fn cluster_size(&self) -> usize {
        self.topology.len()
    }

    /// The local storage engine — used for proxied operations and for
    /// range scans, which read local state only.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    // --------------------------------------------------------------------------------------------
    // Coordinated operations
    // --------------------------------------------------------------------------------------------

    /// Coordinated read: the freshest version among the first `ack`
    /// replica replies.
    pub async fn get(&self, id: &str, factor: ReplicasFactor) -> Result<Vec<u8>, ClusterError> {
        let replicas = self.topology.replicas_for(id.as_bytes(), factor.from());
        let mut pending: FuturesUnordered<_> = replicas
            .iter()
            .map(|node| self.replica_get(node, id))
            .collect();

        let mut replies: Vec<KeyState> = Vec::with_capacity(factor.ack());
        while let Some(reply) = pending.next().await {
            if let Some(state) = reply {
                replies.push(state);
                if replies.len() >= factor.ack() {
                    break;
                }
            }
        }
        if replies.len() < factor.ack() {
            warn!(id, %factor, answered = replies.len(), "read quorum failed");
            return Err(ClusterError::QuorumFailed);
        }

        match resolve_freshest(&replies) {
            KeyState::Present { value, .. } => Ok(value.clone()),
            KeyState::Removed { .. } | KeyState::Absent => Err(ClusterError::NotFound),
        }
    }

    /// Coordinated write: succeeds once `ack` replicas acknowledged.
    pub async fn upsert(
        &self,
        id: &str,
        value: Vec<u8>,
        expire: Option<i64>,
        factor: ReplicasFactor,
    ) -> Result<(), ClusterError> {
        let replicas = self.topology.replicas_for(id.as_bytes(), factor.from());
        let mut pending: FuturesUnordered<_> = replicas
            .iter()
            .map(|node| self.replica_upsert(node, id, value.clone(), expire))
            .collect();
        self.await_acks(&mut pending, factor, id).await
    }

    /// Coordinated removal: succeeds once `ack` replicas acknowledged.
    pub async fn remove(&self, id: &str, factor: ReplicasFactor) -> Result<(), ClusterError> {
        let replicas = self.topology.replicas_for(id.as_bytes(), factor.from());
        let mut pending: FuturesUnordered<_> = replicas
            .iter()
            .map(|node| self.replica_remove(node, id))
            .collect();
        self.await_acks(&mut pending, factor, id).await
    }

    async fn await_acks<S>(
        &self,
        pending: &mut S,
        factor: ReplicasFactor,
        id: &str,
    ) -> Result<(), ClusterError>
    where
        S: futures_util::Stream<Item = bool> + Unpin,
    {
        let mut acks = 0usize;
        while let Some(acked) = pending.next().await {
            if acked {
                acks += 1;
                if acks >= factor.ack() {
                    return Ok(());
                }
            }
        }
        warn!(id, %factor, acks, "write quorum failed");
        Err(ClusterError::QuorumFailed)
    }

    // --------------------------------------------------------------------------------------------
    // Per-replica dispatch
    // --------------------------------------------------------------------------------------------

    async fn replica_get(&self, node: &str, id: &str) -> Option<KeyState> {
        if self.topology.is_me(node) {
            let engine = self.engine.clone();
            let key = id.as_bytes().to_vec();
            run_blocking(move || engine.state(&key)).await
        } else {
            self.peers.get(node)?.get(id).await
        }
    }

    async fn replica_upsert(
        &self,
        node: &str,
        id: &str,
        value: Vec<u8>,
        expire: Option<i64>,
    ) -> bool {
        if self.topology.is_me(node) {
            let engine = self.engine.clone();
            let key = id.as_bytes().to_vec();
            run_blocking(move || engine.upsert_expiring(key, value, expire.unwrap_or(FOREVER)))
                .await
                .is_some()
        } else {
            match self.peers.get(node) {
                Some(peer) => peer.put(id, value, expire).await,
                None => false,
            }
        }
    }

    async fn replica_remove(&self, node: &str, id: &str) -> bool {
        if self.topology.is_me(node) {
            let engine = self.engine.clone();
            let key = id.as_bytes().to_vec();
            run_blocking(move || engine.remove(key)).await.is_some()
        } else {
            match self.peers.get(node) {
                Some(peer) => peer.delete(id).await,
                None => false,
            }
        }
    }

    // --------------------------------------------------------------------------------------------
    // Local (proxied) operations — no further fan-out
    // --------------------------------------------------------------------------------------------

    /// Replica-level read of local storage.
    pub async fn local_state(&self, id: &str) -> Result<KeyState, ClusterError> {
        let engine = self.engine.clone();
        let key = id.as_bytes().to_vec();
        match run_blocking(move || engine.state(&key)).await {
            Some(state) => Ok(state),
            None => Err(ClusterError::Engine(EngineError::Internal(
                "local read failed".into(),
            ))),
        }
    }

    /// Replica-level write to local storage.
    pub async fn local_upsert(
        &self,
        id: &str,
        value: Vec<u8>,
        expire: Option<i64>,
    ) -> Result<(), ClusterError> {
        let engine = self.engine.clone();
        let key = id.as_bytes().to_vec();
        match run_blocking(move || engine.upsert_expiring(key, value, expire.unwrap_or(FOREVER)))
            .await
        {
            Some(()) => Ok(()),
            None => Err(ClusterError::Engine(EngineError::Internal(
                "local write failed".into(),
            ))),
        }
    }

    /// Replica-level removal from local storage.
    pub async fn local_remove(&self, id: &str) -> Result<(), ClusterError> {
        let engine = self.engine.clone();
        let key = id.as_bytes().to_vec();
        match run_blocking(move || engine.remove(key)).await {
            Some(()) => Ok(()),
            None => Err(ClusterError::Engine(EngineError::Internal(
                "local removal failed".into(),
            ))),
        }
    }
}

/// Runs a blocking engine call off the async runtime; `None` on failure.
async fn run_blocking<T, F>(call: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
{
    match tokio::task::spawn_blocking(call).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            warn!(%err, "local engine call failed");
            None
        }
        Err(err) => {
            warn!(%err, "local engine call panicked");
            None
        }
    }
}

/// Picks the entry with the greatest timestamp among replies that carry
/// one; `Absent` if none does. On a timestamp tie a removal wins, so a
/// delete acknowledged alongside a concurrent write of the same instant
/// stays deleted everywhere.
pub fn resolve_freshest(replies: &[KeyState]) -> &KeyState {
    let mut freshest: &KeyState = &KeyState::Absent;
    let mut best: Option<(i64, bool)> = None;
    for reply in replies {
        let candidate = match reply {
            KeyState::Present { timestamp, .. } => Some((*timestamp, false)),
            KeyState::Removed { timestamp } => Some((*timestamp, true)),
            KeyState::Absent => None,
        };
        let Some((timestamp, removed)) = candidate else {
            continue;
        };
        let wins = match best {
            None => true,
            Some((best_timestamp, best_removed)) => {
                timestamp > best_timestamp
                    || (timestamp == best_timestamp && removed && !best_removed)
            }
        };
        if wins {
            best = Some((timestamp, removed));
            freshest = reply;
        }
    }
    freshest
}
