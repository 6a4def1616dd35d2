use super::*;
use process::Version;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("local node is not the elected master (current master={master:?})")]
    NotMaster { master: Option<NodeId> },
    #[error("node {name} (version {version}) is older than the cluster minimum {minimum}")]
    NodeTooOld {
        name: String,
        version: Version,
        minimum: Version,
    },
    #[error("node {name} (version {version}) is outside the compatible range [{min}, {max}]")]
    VersionOutOfRange {
        name: String,
        version: Version,
        min: Version,
        max: Version,
    },
    #[error("index {index} (compatibility version {version}) is not supported by node {name}")]
    IndexIncompatible {
        index: String,
        version: Version,
        name: String,
    },
    #[error("join request dropped before completion")]
    JoinAbandoned,
}
