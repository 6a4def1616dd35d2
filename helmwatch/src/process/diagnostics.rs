use super::*;

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

/// Health classification of the cluster's leadership.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DiagnosisStatus {
    Stable,
    Degraded,
    DegradedConfirmed,
    NoMaster,
    Unknown,
}

impl fmt::Display for DiagnosisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stable => "STABLE",
            Self::Degraded => "DEGRADED",
            Self::DegradedConfirmed => "DEGRADED_CONFIRMED",
            Self::NoMaster => "NO_MASTER",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// Why no master could be established, when the status is `NoMaster`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum NoMasterReason {
    /// No master-eligible peer is known and discovery has found no master.
    NoEligiblePeers,
    /// Discovery found a master but this node could not join it.
    CannotJoinDiscoveredMaster(NodeId),
    /// The local node is not master-eligible. Terminal: no sub-diagnosis.
    NotEligibleSelf,
    /// A formation-state poll of a peer failed; its cached error is carried.
    RemoteDiagnosisFailed { peer: NodeId, error: String },
    /// Some peer has not discovered all other eligible peers.
    DiscoveryProblem { reporter: NodeId, missing: Vec<NodeId> },
    /// All peers discovered each other but none can assemble a voting quorum.
    QuorumProblem,
    Undetermined,
}

/// A peer's self-reported view of cluster formation.
/// Consumed by the diagnosis; produced by the election layer.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FormationState {
    pub node: Node,
    pub discovered_peers: Vec<Node>,
    pub has_quorum: bool,
    pub description: String,
}

/// The last remote-history fetch outcome, as the diagnosis sees it.
#[derive(Clone, Copy, Debug)]
pub enum RemoteHistoryView<'a> {
    /// No fetch has completed yet: a known unknown, not an error.
    Unknown,
    Fetched(&'a MasterHistory),
    Failed(&'a str),
}

/// Everything the diagnosis reads. Assembled from caches by the caller;
/// nothing here triggers I/O.
pub struct DiagnosisInput<'a> {
    pub now: Instant,
    pub config: &'a Config,
    pub local: &'a Node,
    pub local_history: &'a MasterHistory,
    /// Cached history of the most recent master, if any fetch completed.
    pub remote_history: RemoteHistoryView<'a>,
    /// Peer-finder outcome: a discovered-but-unjoined master, if any.
    pub discovered_master: Option<&'a Node>,
    /// Master-eligible peers known from membership and discovery, self excluded.
    pub eligible_peers: &'a [Node],
    /// Polled formation state per peer. Errors are cached values, not failures.
    pub formation_cache: &'a HashMap<NodeId, Result<FormationState, String>>,
}

/// Raw evidence behind a diagnosis, populated in explain mode only.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct DiagnosisDetails {
    pub current_master: Option<Node>,
    pub recent_masters: Vec<Node>,
    pub remote_error: Option<String>,
    pub formation_descriptions: Vec<String>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Diagnosis {
    pub status: DiagnosisStatus,
    pub summary: String,
    pub reason: Option<NoMasterReason>,
    pub details: Option<DiagnosisDetails>,
}

/// Classify cluster health from the current caches.
///
/// Pure function of its input: identical inputs yield an identical
/// diagnosis, and nothing is mutated or fetched here. Triggering fetches is
/// the caller's concern.
pub fn diagnose(input: &DiagnosisInput, explain: bool) -> Diagnosis {
    if input
        .local_history
        .seen_master_within(input.now, input.config.recent_master_lookback)
    {
        diagnose_recently_led(input, explain)
    } else {
        diagnose_no_recent_master(input, explain)
    }
}

fn diagnose_recently_led(input: &DiagnosisInput, explain: bool) -> Diagnosis {
    let changes = input.local_history.identity_change_count(input.now);
    if changes >= input.config.unacceptable_identity_changes {
        // The local node has itself seen this many distinct masters: conclusive
        // without remote confirmation.
        return finish(
            input,
            explain,
            DiagnosisStatus::DegradedConfirmed,
            format!(
                "the elected master has changed identity {changes} times in the last {}",
                window(input)
            ),
            None,
        );
    }

    let nulls = input.local_history.null_transition_count(input.now);
    if nulls >= input.config.unacceptable_null_transitions {
        return confirm_null_transitions(input, explain, nulls);
    }

    finish(
        input,
        explain,
        DiagnosisStatus::Stable,
        "the cluster has a stable elected master".to_owned(),
        None,
    )
}

fn confirm_null_transitions(input: &DiagnosisInput, explain: bool, nulls: usize) -> Diagnosis {
    let summary_base = format!(
        "the elected master was lost {nulls} times in the last {}",
        window(input)
    );

    let Some(recent) = input.local_history.most_recent_master(input.now) else {
        return finish(input, explain, DiagnosisStatus::Degraded, summary_base, None);
    };

    if recent.id == input.local.id {
        // The local node was the most recent master; its own history is
        // authoritative and no self-RPC is needed.
        return finish(
            input,
            explain,
            DiagnosisStatus::Degraded,
            format!("{summary_base}; the local node was the most recent master"),
            None,
        );
    }

    match input.remote_history {
        RemoteHistoryView::Unknown => finish(
            input,
            explain,
            DiagnosisStatus::Unknown,
            format!(
                "{summary_base}; waiting for the master history of {} to arrive",
                recent.name
            ),
            None,
        ),
        RemoteHistoryView::Failed(error) => finish(
            input,
            explain,
            DiagnosisStatus::Degraded,
            format!(
                "{summary_base}; the master history of {} could not be fetched: {error}",
                recent.name
            ),
            Some(error.to_owned()),
        ),
        RemoteHistoryView::Fetched(remote) => {
            let corroborated = remote.null_transition_count(input.now)
                >= input.config.unacceptable_null_transitions
                || remote.identity_change_count(input.now)
                    >= input.config.unacceptable_identity_changes;
            if corroborated {
                finish(
                    input,
                    explain,
                    DiagnosisStatus::DegradedConfirmed,
                    format!(
                        "{summary_base}; the most recent master {} corroborates the instability",
                        recent.name
                    ),
                    None,
                )
            } else {
                // The anomaly is presumed local to this node.
                finish(
                    input,
                    explain,
                    DiagnosisStatus::Stable,
                    format!(
                        "the most recent master {} reports a stable view; \
                         the observed instability is local to this node",
                        recent.name
                    ),
                    None,
                )
            }
        }
    }
}

fn diagnose_no_recent_master(input: &DiagnosisInput, explain: bool) -> Diagnosis {
    if input.eligible_peers.is_empty() && input.discovered_master.is_none() {
        return no_master(
            input,
            explain,
            NoMasterReason::NoEligiblePeers,
            "no master observed and no master-eligible peers discovered".to_owned(),
        );
    }

    if let Some(found) = input.discovered_master {
        return no_master(
            input,
            explain,
            NoMasterReason::CannotJoinDiscoveredMaster(found.id.clone()),
            format!(
                "a master {} has been discovered but this node could not join it",
                found.name
            ),
        );
    }

    if !input.local.roles.is_master_eligible() {
        return no_master(
            input,
            explain,
            NoMasterReason::NotEligibleSelf,
            "no master observed and the local node is not master-eligible".to_owned(),
        );
    }

    // The local node is eligible and nobody has a master: consult the polled
    // formation state of every eligible peer. A peer with no cached entry yet
    // contributes nothing; the diagnosis never waits for it.
    for peer in input.eligible_peers {
        if let Some(Err(error)) = input.formation_cache.get(&peer.id) {
            return no_master(
                input,
                explain,
                NoMasterReason::RemoteDiagnosisFailed {
                    peer: peer.id.clone(),
                    error: error.clone(),
                },
                format!(
                    "no master observed and the formation state of {} could not be fetched: {error}",
                    peer.name
                ),
            );
        }
    }

    for peer in input.eligible_peers {
        if let Some(Ok(formation)) = input.formation_cache.get(&peer.id) {
            let missing: Vec<&Node> = input
                .eligible_peers
                .iter()
                .filter(|p| p.id != peer.id)
                .filter(|p| !formation.discovered_peers.iter().any(|d| d.id == p.id))
                .collect();
            if !missing.is_empty() {
                let names: Vec<&str> = missing.iter().map(|n| n.name.as_str()).collect();
                return no_master(
                    input,
                    explain,
                    NoMasterReason::DiscoveryProblem {
                        reporter: peer.id.clone(),
                        missing: missing.iter().map(|n| n.id.clone()).collect(),
                    },
                    format!(
                        "no master observed; {} has not discovered [{}]",
                        peer.name,
                        names.join(", ")
                    ),
                );
            }
        }
    }

    for peer in input.eligible_peers {
        if let Some(Ok(formation)) = input.formation_cache.get(&peer.id) {
            if !formation.has_quorum {
                return no_master(
                    input,
                    explain,
                    NoMasterReason::QuorumProblem,
                    format!(
                        "no master observed; {} cannot assemble a voting quorum: {}",
                        peer.name, formation.description
                    ),
                );
            }
        }
    }

    no_master(
        input,
        explain,
        NoMasterReason::Undetermined,
        "no master observed; the cause could not be determined".to_owned(),
    )
}

fn window(input: &DiagnosisInput) -> String {
    let mins = input.config.history_retention.as_secs() / 60;
    format!("{mins} minutes")
}

fn no_master(
    input: &DiagnosisInput,
    explain: bool,
    reason: NoMasterReason,
    summary: String,
) -> Diagnosis {
    let mut out = finish(input, explain, DiagnosisStatus::NoMaster, summary, None);
    out.reason = Some(reason);
    out
}

fn finish(
    input: &DiagnosisInput,
    explain: bool,
    status: DiagnosisStatus,
    summary: String,
    remote_error: Option<String>,
) -> Diagnosis {
    let details = explain.then(|| DiagnosisDetails {
        current_master: input.local_history.current_master().cloned(),
        recent_masters: input.local_history.recent_masters(input.now),
        remote_error,
        formation_descriptions: input
            .formation_cache
            .values()
            .filter_map(|r| r.as_ref().ok())
            .map(|f| f.description.clone())
            .collect(),
    });
    Diagnosis {
        status,
        summary,
        reason: None,
        details,
    }
}
