use super::*;

use process::{
    diagnose, Diagnosis, DiagnosisInput, FormationState, MasterHistory, MembershipState, Node,
    RemoteHistoryView, Version,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use super::thread::ThreadHandle;

/// Drives the formation-state polling lifecycle and assembles diagnosis
/// inputs from the caches. The classification itself lives in
/// `process::diagnostics` and is pure.
#[derive(Deref, Clone)]
pub struct DiagnosticsService(pub Arc<Inner>);

pub struct Inner {
    handle: ClusterHandle,
    history: MasterHistoryService,
    state_rx: watch::Receiver<Arc<MembershipState>>,
    discovery: spin::RwLock<DiscoveryView>,
    /// Replaced wholesale after each poll round so a reader never observes a
    /// half-updated topology.
    formation_cache: spin::RwLock<Arc<HashMap<NodeId, Result<FormationState, String>>>>,
    /// Bumped when polling stops. A round that started before the bump must
    /// not install its result.
    poll_generation: AtomicU64,
    poller: spin::Mutex<Option<ThreadHandle>>,
}

impl DiagnosticsService {
    pub fn new(
        handle: ClusterHandle,
        history: MasterHistoryService,
        state_rx: watch::Receiver<Arc<MembershipState>>,
    ) -> Self {
        Self(Arc::new(Inner {
            handle,
            history,
            state_rx,
            discovery: spin::RwLock::new(DiscoveryView::default()),
            formation_cache: spin::RwLock::new(Arc::new(HashMap::new())),
            poll_generation: AtomicU64::new(0),
            poller: spin::Mutex::new(None),
        }))
    }

    pub fn set_discovery(&self, view: DiscoveryView) {
        *self.discovery.write() = view;
    }

    /// The local node's own formation report, served to polling peers.
    pub fn formation_state(&self) -> FormationState {
        let state = self.state_rx.borrow().clone();
        let view = self.discovery.read().clone();
        FormationState {
            node: self.handle.local.clone(),
            discovered_peers: view.discovered_peers,
            has_quorum: state.master.is_some() || view.has_quorum,
            description: view.description,
        }
    }

    /// Start polling when the master is lost and this node could become one;
    /// cancel and reset when a master is present again.
    pub fn on_membership_change(&self, state: &MembershipState) {
        let eligible = self.handle.local.roles.is_master_eligible();
        let mut poller = self.poller.lock();
        if state.master.is_none() && eligible {
            if poller.is_none() {
                info!("no elected master; starting formation-state polling");
                *poller = Some(thread::poll_formation::new(
                    self.clone(),
                    self.handle.config.poll_initial_delay,
                    self.handle.config.poll_interval,
                ));
            }
        } else if poller.take().is_some() {
            info!("elected master present; stopping formation-state polling");
            self.poll_generation.fetch_add(1, Ordering::SeqCst);
            *self.formation_cache.write() = Arc::new(HashMap::new());
        }
    }

    /// One poll round: fetch the formation state of every eligible peer
    /// concurrently and swap the cache in one shot. Fetch failures are cached
    /// values too; a hung peer costs one timeout, not one per peer behind it.
    pub(super) async fn poll_peers(&self) {
        let generation = self.poll_generation.load(Ordering::SeqCst);
        let state = self.state_rx.borrow().clone();
        let peers = self.eligible_peers(&state);
        let mut fetches = vec![];
        for peer in peers {
            if peer.version < Version::MIN_FETCH_SUPPORT {
                debug!(
                    "not polling {}: version {} predates fetch support",
                    peer.name, peer.version
                );
                continue;
            }
            let comm = self.handle.connect(&peer.address);
            fetches.push(async move {
                let outcome = match comm.fetch_formation_state().await {
                    Ok(f) => Ok(f),
                    Err(e) => {
                        warn!("formation state fetch from {} failed: {e:#}", peer.name);
                        Err(format!("{e:#}"))
                    }
                };
                (peer.id, outcome)
            });
        }
        let fresh = futures::future::join_all(fetches).await.into_iter().collect();
        self.install_formation(generation, fresh);
    }

    /// Install a completed round unless polling stopped while it ran. A round
    /// outliving its cancellation must not resurrect old-topology data.
    fn install_formation(
        &self,
        generation: u64,
        fresh: HashMap<NodeId, Result<FormationState, String>>,
    ) {
        let mut cache = self.formation_cache.write();
        if self.poll_generation.load(Ordering::SeqCst) == generation {
            *cache = Arc::new(fresh);
        }
    }

    /// Master-eligible peers known from membership or discovery, self
    /// excluded, deduplicated by id and ordered for a deterministic report.
    fn eligible_peers(&self, state: &MembershipState) -> Vec<Node> {
        let view = self.discovery.read().clone();
        let mut out: Vec<Node> = vec![];
        let known = state
            .master_eligible_nodes()
            .cloned()
            .chain(view.discovered_peers.into_iter().filter(|n| n.roles.is_master_eligible()));
        for n in known {
            if n.id == self.handle.local.id {
                continue;
            }
            if out.iter().any(|seen| seen.id == n.id) {
                continue;
            }
            out.push(n);
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn diagnose(&self, explain: bool) -> Diagnosis {
        let now = Instant::now();
        let state = self.state_rx.borrow().clone();
        let local_history = self.history.local_snapshot();

        self.maybe_request_remote(now, &local_history);

        let remote = match local_history.most_recent_master(now) {
            Some(recent) if recent.id != self.handle.local.id => {
                self.history.remote_snapshot(&recent.id)
            }
            _ => None,
        };
        let remote_view = match &remote {
            None => RemoteHistoryView::Unknown,
            Some(Ok(h)) => RemoteHistoryView::Fetched(h),
            Some(Err(e)) => RemoteHistoryView::Failed(e),
        };

        let view = self.discovery.read().clone();
        let eligible = self.eligible_peers(&state);
        let cache = self.formation_cache.read().clone();
        let input = DiagnosisInput {
            now,
            config: &self.handle.config,
            local: &self.handle.local,
            local_history: &local_history,
            remote_history: remote_view,
            discovered_master: view.discovered_master.as_ref(),
            eligible_peers: &eligible,
            formation_cache: &cache,
        };
        diagnose(&input, explain)
    }

    /// Kick off a remote-history fetch whenever the next diagnosis needs the
    /// most recent master's corroboration. Each completed fetch overwrites
    /// the cached slot, so the confirmation follows the remote's current
    /// view; the in-flight guard collapses concurrent requests.
    fn maybe_request_remote(&self, now: Instant, history: &MasterHistory) {
        let config = &self.handle.config;
        if !history.seen_master_within(now, config.recent_master_lookback) {
            return;
        }
        if history.identity_change_count(now) >= config.unacceptable_identity_changes {
            return;
        }
        if history.null_transition_count(now) < config.unacceptable_null_transitions {
            return;
        }
        let Some(recent) = history.most_recent_master(now) else {
            return;
        };
        if recent.id == self.handle.local.id {
            return;
        }
        self.history.request_remote(recent.clone());
    }
}
