use super::*;

use std::collections::HashMap;
use std::fmt;

/// Role flags of a node. Empty by default; each flag toggles independently.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct NodeRoles(u8);

impl NodeRoles {
    pub const NONE: Self = Self(0);
    pub const MASTER_ELIGIBLE: Self = Self(1);
    pub const DATA: Self = Self(1 << 1);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn is_master_eligible(self) -> bool {
        self.contains(Self::MASTER_ELIGIBLE)
    }

    pub fn can_hold_data(self) -> bool {
        self.contains(Self::DATA)
    }
}

/// Release version of a node, encoded as major * 10000 + minor * 100 + patch.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u32);

impl Version {
    pub const CURRENT: Self = Self::new(1, 4, 0);
    /// Peers below this version do not serve history or formation fetches.
    pub const MIN_FETCH_SUPPORT: Self = Self::new(1, 1, 0);

    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self(major as u32 * 10_000 + minor as u32 * 100 + patch as u32)
    }

    pub const fn id(self) -> u32 {
        self.0
    }

    pub const fn from_id(id: u32) -> Self {
        Self(id)
    }

    pub fn major(self) -> u32 {
        self.0 / 10_000
    }

    pub fn minor(self) -> u32 {
        self.0 / 100 % 100
    }

    pub fn patch(self) -> u32 {
        self.0 % 100
    }

    /// Nodes interoperate when they are at most one major release apart.
    pub fn compatible_with(self, other: Self) -> bool {
        self.major().abs_diff(other.major()) <= 1
    }

    /// Oldest index storage-format version a node of this version can read.
    pub fn min_index_compat(self) -> Self {
        Self(self.major().saturating_sub(1) * 10_000)
    }

    pub fn supports_index(self, compat: Version) -> bool {
        self.min_index_compat() <= compat && compat <= self
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Immutable identity of a cluster node.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub address: NodeAddress,
    pub roles: NodeRoles,
    pub version: Version,
}

impl Node {
    /// True when `other` is the same node retrying a join: same id, same attributes.
    pub fn equivalent(&self, other: &Self) -> bool {
        self.id == other.id && self.roles == other.roles && self.address == other.address
    }

    /// A known node conflicts with a joining one when it reuses the same id
    /// with different attributes, or the same address under a different id.
    /// Either is residue of a previous master term.
    pub fn conflicts_with(&self, joining: &Self) -> bool {
        (self.id == joining.id && self != joining)
            || (self.address == joining.address && self.id != joining.id)
    }
}

/// Storage-format compatibility of one index.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct IndexMetadata {
    pub name: String,
    pub compat_version: Version,
}

/// A node excluded from quorum voting, tracked by name until its id resolves.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct VotingExclusion {
    pub name: String,
    pub id: Option<NodeId>,
}

impl VotingExclusion {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
        }
    }
}

/// Point-in-time membership of the cluster.
/// Replaced wholesale on every transition, never mutated in place.
#[derive(Clone, Debug)]
pub struct MembershipState {
    pub version: StateVersion,
    pub nodes: HashMap<NodeId, Node>,
    pub master: Option<NodeId>,
    pub voting_exclusions: Vec<VotingExclusion>,
    pub min_node_version: Version,
    pub max_node_version: Version,
    /// False until the initial state recovery completes. The minimum-version
    /// join barrier is not enforced before that.
    pub state_recovered: bool,
    pub indices: Vec<IndexMetadata>,
}

impl MembershipState {
    pub fn initial(local: &Node) -> Self {
        Self {
            version: 0,
            nodes: HashMap::new(),
            master: None,
            voting_exclusions: vec![],
            min_node_version: local.version,
            max_node_version: local.version,
            state_recovered: false,
            indices: vec![],
        }
    }

    pub fn master_node(&self) -> Option<&Node> {
        self.master.as_ref().and_then(|id| self.nodes.get(id))
    }

    pub fn master_eligible_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.roles.is_master_eligible())
    }
}
