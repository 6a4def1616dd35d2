use super::*;

mod communicator;
mod diagnostics_service;
mod history_service;
mod thread;

use communicator::{ClusterConnection, Communicator};
use diagnostics_service::DiagnosticsService;
use history_service::MasterHistoryService;
use process::{
    Applied, Diagnosis, FormationState, JoinBatch, JoinExecutor, MembershipState, Node,
};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What the peer-finder last reported. Produced by the election layer,
/// consumed here; a node with no election layer simply leaves the default.
#[derive(Clone, Debug)]
pub struct DiscoveryView {
    /// An elected master discovered elsewhere that this node has not joined.
    pub discovered_master: Option<Node>,
    pub discovered_peers: Vec<Node>,
    pub has_quorum: bool,
    pub description: String,
}

impl Default for DiscoveryView {
    fn default() -> Self {
        Self {
            discovered_master: None,
            discovered_peers: vec![],
            has_quorum: false,
            description: "no discovery round completed yet".to_owned(),
        }
    }
}

/// Gives I/O capability to the services living on a `ClusterNode`.
#[derive(Clone)]
pub struct ClusterHandle {
    pub local: Node,
    pub config: Config,
    connection_cache: moka::sync::Cache<NodeAddress, ClusterConnection>,
}

impl ClusterHandle {
    pub(super) fn connect(&self, dest: &NodeAddress) -> Communicator {
        let conn = self
            .connection_cache
            .get_with(dest.clone(), || ClusterConnection::new(dest.clone()));
        Communicator::new(conn, self.config.rpc_timeout)
    }

    fn invalidate(&self, dest: &NodeAddress) {
        self.connection_cache.invalidate(dest);
    }
}

/// `ClusterNode` hosts the membership state, the master history and the
/// stability diagnostics of one node.
#[derive(Deref, Clone)]
pub struct ClusterNode(pub Arc<Inner>);

pub struct Inner {
    handle: ClusterHandle,
    executor: JoinExecutor,
    state_tx: watch::Sender<Arc<MembershipState>>,
    pending: spin::Mutex<Vec<process::JoinRequest>>,
    /// Serializes every state transition: join batches and election-layer
    /// reports alike. Whoever holds it drains the whole queue, so a submitter
    /// returning from `apply_pending` knows its request is decided.
    applier: spin::Mutex<()>,
    history: MasterHistoryService,
    diagnostics: DiagnosticsService,
}

impl ClusterNode {
    pub fn new(local: Node, config: Config) -> Self {
        let cache = moka::sync::Cache::builder()
            .initial_capacity(3)
            .time_to_idle(Duration::from_secs(60))
            .build();
        let handle = ClusterHandle {
            local: local.clone(),
            config,
            connection_cache: cache,
        };
        let (state_tx, state_rx) = watch::channel(Arc::new(MembershipState::initial(&local)));
        let history = MasterHistoryService::new(handle.clone());
        let diagnostics = DiagnosticsService::new(handle.clone(), history.clone(), state_rx);
        Self(Arc::new(Inner {
            handle,
            executor: JoinExecutor { local },
            state_tx,
            pending: spin::Mutex::new(vec![]),
            applier: spin::Mutex::new(()),
            history,
            diagnostics,
        }))
    }

    pub fn local(&self) -> &Node {
        &self.handle.local
    }

    pub fn config(&self) -> &Config {
        &self.handle.config
    }

    /// The current membership state. Replaced wholesale on every transition.
    pub fn state(&self) -> Arc<MembershipState> {
        self.state_tx.borrow().clone()
    }

    pub fn observe_state(&self) -> watch::Receiver<Arc<MembershipState>> {
        self.state_tx.subscribe()
    }

    /// Self-join and assume mastership. The entry point of a fresh cluster.
    pub async fn bootstrap(&self) -> Result<StateVersion, Error> {
        self.submit_join(self.handle.local.clone(), true).await
    }

    /// Queue one join request and drive the applier. Resolves once the
    /// request is decided: admitted with the published state version, or
    /// rejected with the reason.
    pub async fn submit_join(
        &self,
        node: Node,
        assume_mastership: bool,
    ) -> Result<StateVersion, Error> {
        let (completion, rx) = process::prepare_join_completion();
        self.pending.lock().push(process::JoinRequest {
            node,
            assume_mastership,
            completion,
        });
        self.apply_pending();
        rx.await.map_err(|_| Error::JoinAbandoned)?
    }

    fn apply_pending(&self) {
        let _guard = self.applier.lock();
        let requests = std::mem::take(&mut *self.pending.lock());
        if requests.is_empty() {
            // A concurrent submitter already drained the queue.
            return;
        }
        let batch = JoinBatch::new(requests);
        debug!("applying a join batch of {} request(s)", batch.len());
        let current = self.state_tx.borrow().clone();
        if let Some(applied) = self.executor.execute(&current, batch) {
            self.publish(applied);
        }
    }

    /// Record an externally elected master, as reported by the election layer.
    pub fn adopt_master(&self, master: Node) {
        let _guard = self.applier.lock();
        let current = self.state_tx.borrow().clone();
        info!("adopting {} as the elected master", master.name);
        let mut next = (*current).clone();
        next.version += 1;
        next.master = Some(master.id.clone());
        next.nodes.entry(master.id.clone()).or_insert(master);
        self.publish(Applied {
            state: next,
            admitted: vec![],
        });
    }

    /// Record loss of the elected master, as reported by the election layer.
    pub fn clear_master(&self) {
        let _guard = self.applier.lock();
        let current = self.state_tx.borrow().clone();
        if current.master.is_none() {
            return;
        }
        warn!("elected master lost");
        let mut next = (*current).clone();
        next.version += 1;
        next.master = None;
        self.publish(Applied {
            state: next,
            admitted: vec![],
        });
    }

    fn publish(&self, applied: Applied) {
        let old = self.state_tx.borrow().clone();
        let state = Arc::new(applied.state);

        for (id, node) in old.nodes.iter() {
            if !state.nodes.contains_key(id) {
                debug!("dropping connection to removed node {}", node.name);
                self.handle.invalidate(&node.address);
            }
        }

        self.history
            .record(Instant::now(), state.master_node().cloned());
        self.diagnostics.on_membership_change(&state);
        self.state_tx.send_replace(state.clone());
        for completion in applied.admitted {
            completion.complete_ok(state.version);
        }
        info!(
            "published membership state (version={}, nodes={}, master={:?})",
            state.version,
            state.nodes.len(),
            state.master
        );
    }

    pub fn set_discovery(&self, view: DiscoveryView) {
        self.diagnostics.set_discovery(view);
    }

    pub fn formation_state(&self) -> FormationState {
        self.diagnostics.formation_state()
    }

    pub fn diagnose(&self, explain: bool) -> Diagnosis {
        self.diagnostics.diagnose(explain)
    }

    /// The local master history as wire entries, oldest first.
    pub fn master_history(&self, now: Instant) -> Vec<(Duration, Option<Node>)> {
        self.history.wire_entries(now)
    }
}
