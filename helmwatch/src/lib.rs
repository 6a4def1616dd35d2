#![deny(unused_must_use)]

mod error;
pub use error::Error;

/// Pure membership, history and diagnosis algorithms.
pub mod process;

/// Implementation of gRPC services.
pub mod service;

/// Implementation of the cluster node hosting the membership core.
pub mod node;

pub use service::cluster::client;

use anyhow::{Context, Result};
use derive_more::{Deref, Display, FromStr};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::Uri;

/// Network endpoint of a cluster node.
#[derive(
    serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq, Hash, Debug, Display, FromStr,
)]
pub struct NodeAddress(#[serde(with = "http_serde::uri")] Uri);

impl NodeAddress {
    pub fn new(uri: Uri) -> Self {
        Self(uri)
    }

    pub fn uri(&self) -> &Uri {
        &self.0
    }
}

/// Unique identifier of a node incarnation.
/// A restarted node comes back with a fresh id but usually the same address.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Version of the membership state. Bumped on every published state.
pub type StateVersion = u64;

/// Tunable knobs of the membership and stability-diagnosis subsystem.
#[derive(Clone, Debug)]
pub struct Config {
    /// A master observed within this window counts as "recently led".
    pub recent_master_lookback: Duration,
    /// Identity changes at or above this count within the retention window
    /// are conclusive on their own.
    pub unacceptable_identity_changes: usize,
    /// Master-to-null transitions at or above this count require remote
    /// confirmation before the cluster is classified as degraded.
    pub unacceptable_null_transitions: usize,
    /// Master-history entries older than this are evicted.
    pub history_retention: Duration,
    /// Fixed delay between two formation-state polls of the same peer.
    pub poll_interval: Duration,
    /// Delay before the first poll. Lets a normal master handover complete
    /// without wasted RPCs.
    pub poll_initial_delay: Duration,
    /// Per-request timeout of history and formation fetches.
    pub rpc_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recent_master_lookback: Duration::from_secs(30),
            unacceptable_identity_changes: 4,
            unacceptable_null_transitions: 4,
            history_retention: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(10),
            poll_initial_delay: Duration::from_secs(10),
            rpc_timeout: Duration::from_secs(10),
        }
    }
}
