use super::*;

/// One node's ask to join the cluster, paired with its completion.
pub struct JoinRequest {
    pub node: Node,
    /// True when this request asks the local node to take mastership.
    pub assume_mastership: bool,
    pub completion: JoinCompletion,
}

/// Join requests received since the last membership update, coalesced into
/// one atomic state transition.
pub struct JoinBatch {
    requests: Vec<JoinRequest>,
}

impl JoinBatch {
    pub fn new(requests: Vec<JoinRequest>) -> Self {
        Self { requests }
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn wants_local_mastership(&self) -> bool {
        self.requests.iter().any(|r| r.assume_mastership)
    }
}

/// Result of applying one batch: the state to publish and the completions
/// to deliver once it is published.
pub struct Applied {
    pub state: MembershipState,
    pub admitted: Vec<JoinCompletion>,
}

/// Applies a batch of join requests to the current membership state.
///
/// Invocation is serialized by the surrounding consensus layer; no lock is
/// needed here and each call sees the latest published state.
pub struct JoinExecutor {
    pub local: Node,
}

impl JoinExecutor {
    /// Produce the next membership state from `current` and `batch`.
    ///
    /// Validation failures complete their own request and never abort
    /// siblings. A batch sent to a non-master completes every request with
    /// `NotMaster` and produces no new state (`None`). Any other outcome is
    /// a fresh state instance with a bumped version, even when nothing
    /// visibly changed: the version bump is the joining nodes' confirmation
    /// that the batch was applied.
    pub fn execute(&self, current: &MembershipState, batch: JoinBatch) -> Option<Applied> {
        let becoming_master = current.master.is_none() && batch.wants_local_mastership();

        if !becoming_master && current.master.as_ref() != Some(&self.local.id) {
            let master = current.master.clone();
            for req in batch.requests {
                req.completion.complete_err(Error::NotMaster {
                    master: master.clone(),
                });
            }
            return None;
        }

        let mut nodes = current.nodes.clone();
        let mut master = current.master.clone();
        let mut min_version = current.min_node_version;
        let mut max_version = current.max_node_version;
        let mut state_recovered = current.state_recovered;
        let mut changed = false;

        if becoming_master {
            assert!(
                current.master.is_none(),
                "mastership assumption with an elected master"
            );
            info!("assuming mastership of the cluster");
            master = Some(self.local.id.clone());

            // Evict residue of the previous master term: any known node the
            // batch now contradicts by id or by address.
            for req in &batch.requests {
                let stale: Vec<NodeId> = nodes
                    .values()
                    .filter(|known| known.conflicts_with(&req.node))
                    .map(|n| n.id.clone())
                    .collect();
                for id in stale {
                    warn!("evicting conflicting node (node_id={id})");
                    nodes.remove(&id);
                    changed = true;
                }
            }

            // The no-master block lifts and the new master recovers state.
            state_recovered = true;
        }

        let mut admitted = vec![];
        for req in batch.requests {
            // Idempotent retry: the node is already in with identical identity.
            if nodes
                .get(&req.node.id)
                .is_some_and(|n| n.equivalent(&req.node))
            {
                admitted.push(req.completion);
                continue;
            }

            if let Err(e) = validate_join(
                &req.node,
                current.state_recovered,
                min_version,
                max_version,
                &current.indices,
            ) {
                debug!("rejecting join of {}: {e}", req.node.name);
                req.completion.complete_err(e);
                continue;
            }

            if req.node.roles.is_master_eligible() {
                min_version = min_version.min(req.node.version);
                max_version = max_version.max(req.node.version);
            }
            info!("admitting node {} (node_id={})", req.node.name, req.node.id);
            nodes.insert(req.node.id.clone(), req.node);
            admitted.push(req.completion);
            changed = true;
        }

        let mut voting_exclusions = current.voting_exclusions.clone();
        if changed {
            // Replace by-name placeholders now that the named node has an id.
            for exclusion in voting_exclusions.iter_mut() {
                if exclusion.id.is_some() {
                    continue;
                }
                if let Some(node) = nodes.values().find(|n| n.name == exclusion.name) {
                    debug!(
                        "resolved voting exclusion {} to node_id={}",
                        exclusion.name, node.id
                    );
                    exclusion.id = Some(node.id.clone());
                }
            }
        }

        let state = MembershipState {
            version: current.version + 1,
            nodes,
            master,
            voting_exclusions,
            min_node_version: min_version,
            max_node_version: max_version,
            state_recovered,
            indices: current.indices.clone(),
        };
        Some(Applied { state, admitted })
    }
}

fn validate_join(
    node: &Node,
    state_recovered: bool,
    min: Version,
    max: Version,
    indices: &[IndexMetadata],
) -> Result<(), Error> {
    // The minimum-version barrier only holds once the cluster has exited its
    // initial recovery phase.
    if state_recovered && node.version < min {
        return Err(Error::NodeTooOld {
            name: node.name.clone(),
            version: node.version,
            minimum: min,
        });
    }
    if !(node.version.compatible_with(min) && node.version.compatible_with(max)) {
        return Err(Error::VersionOutOfRange {
            name: node.name.clone(),
            version: node.version,
            min,
            max,
        });
    }
    for index in indices {
        if !node.version.supports_index(index.compat_version) {
            return Err(Error::IndexIncompatible {
                index: index.name.clone(),
                version: index.compat_version,
                name: node.name.clone(),
            });
        }
    }
    Ok(())
}
