use super::*;

use process::{MasterHistory, Node, Version};
use std::time::Instant;

pub enum RemoteHistory {
    Fetched(MasterHistory),
    Failed(String),
}

/// Owns the live local master history and a single cached remote history.
///
/// Only the history of the one node currently identified as the most recent
/// master is worth keeping, so the remote slot holds at most one entry and
/// concurrent fetches resolve last-write-wins.
#[derive(Deref, Clone)]
pub struct MasterHistoryService(pub Arc<Inner>);

pub struct Inner {
    handle: ClusterHandle,
    local: spin::Mutex<MasterHistory>,
    remote: spin::Mutex<Option<(NodeId, RemoteHistory)>>,
    inflight: spin::Mutex<Option<NodeId>>,
}

impl MasterHistoryService {
    pub fn new(handle: ClusterHandle) -> Self {
        let retention = handle.config.history_retention;
        Self(Arc::new(Inner {
            handle,
            local: spin::Mutex::new(MasterHistory::new(retention)),
            remote: spin::Mutex::new(None),
            inflight: spin::Mutex::new(None),
        }))
    }

    pub fn record(&self, now: Instant, master: Option<Node>) {
        self.local.lock().record(now, master);
    }

    pub fn local_snapshot(&self) -> MasterHistory {
        self.local.lock().clone()
    }

    pub fn wire_entries(&self, now: Instant) -> Vec<(Duration, Option<Node>)> {
        self.local.lock().wire_entries(now)
    }

    /// Cached view of `peer`'s history. Never blocks, never fetches.
    pub fn remote_snapshot(&self, peer: &NodeId) -> Option<Result<MasterHistory, String>> {
        let slot = self.remote.lock();
        match slot.as_ref() {
            Some((id, RemoteHistory::Fetched(h))) if id == peer => Some(Ok(h.clone())),
            Some((id, RemoteHistory::Failed(e))) if id == peer => Some(Err(e.clone())),
            _ => None,
        }
    }

    /// Fire-and-forget fetch of `peer`'s master history.
    ///
    /// The remote slot is overwritten when the fetch completes, success or
    /// failure. Peers below the minimum fetch-capable version are skipped
    /// silently.
    pub fn request_remote(&self, peer: Node) {
        if peer.version < Version::MIN_FETCH_SUPPORT {
            debug!(
                "not fetching master history from {}: version {} predates fetch support",
                peer.name, peer.version
            );
            return;
        }
        {
            let mut inflight = self.inflight.lock();
            if inflight.as_ref() == Some(&peer.id) {
                return;
            }
            *inflight = Some(peer.id.clone());
        }
        info!("fetching master history from the most recent master {}", peer.name);

        let this = self.clone();
        tokio::spawn(async move {
            let comm = this.handle.connect(&peer.address);
            let outcome = match comm.fetch_master_history().await {
                Ok(entries) => {
                    let now = Instant::now();
                    let retention = this.handle.config.history_retention;
                    RemoteHistory::Fetched(MasterHistory::from_wire(retention, now, entries))
                }
                Err(e) => {
                    warn!("master history fetch from {} failed: {e:#}", peer.name);
                    RemoteHistory::Failed(format!("{e:#}"))
                }
            };
            *this.remote.lock() = Some((peer.id.clone(), outcome));
            let mut inflight = this.inflight.lock();
            if inflight.as_ref() == Some(&peer.id) {
                *inflight = None;
            }
        });
    }
}
