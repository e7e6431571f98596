//! The `ack/from` replication factor.

use thiserror::Error;

/// Error for a malformed or out-of-range `replicas=a/f` parameter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FactorError {
    #[error("malformed replicas factor {0:?}, expected \"ack/from\"")]
    Malformed(String),

    #[error("replicas factor out of range: need 1 <= ack <= from, got {ack}/{from}")]
    OutOfRange { ack: usize, from: usize },
}

/// How many replicas an operation talks to (`from`) and how many must
/// succeed (`ack`). Always `1 <= ack <= from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicasFactor {
    ack: usize,
    from: usize,
}

impl ReplicasFactor {
    pub fn new(ack: usize, from: usize) -> Result<Self, FactorError> {
        if ack < 1 || from < ack {
            return Err(FactorError::OutOfRange { ack, from });
        }
        Ok(Self { ack, from })
    }

    /// Parses the request form `"a/f"`.
    pub fn parse(raw: &str) -> Result<Self, FactorError> {
        let (ack, from) = raw
            .split_once('/')
            .ok_or_else(|| FactorError::Malformed(raw.to_string()))?;
        let ack = ack
            .parse()
            .map_err(|_| FactorError::Malformed(raw.to_string()))?;
        let from = from
            .parse()
            .map_err(|_| FactorError::Malformed(raw.to_string()))?;
        Self::new(ack, from)
    }

    /// The default factor for a cluster of `nodes`: majority of all.
    pub fn quorum(nodes: usize) -> Self {
        Self {
            ack: nodes / 2 + 1,
            from: nodes,
        }
    }

    pub fn ack(&self) -> usize {
        self.ack
    }

    pub fn from(&self) -> usize {
        self.from
    }

    /// Whether `from` fits the cluster size.
    pub fn fits(&self, nodes: usize) -> bool {
        self.from <= nodes
    }
}

impl std::fmt::Display for ReplicasFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.ack, self.from)
    }
}
