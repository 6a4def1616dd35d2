use super::*;

pub mod client;

use client as proto;
use client::cluster_server::{Cluster, ClusterServer};
use std::pin::Pin;
use std::time::Instant;
use tracing::debug;

/// Create a Cluster service backed by a `ClusterNode`.
pub fn new(node: node::ClusterNode) -> ClusterServer<impl Cluster> {
    let conn_cache = moka::sync::Cache::builder()
        .initial_capacity(3)
        .time_to_idle(Duration::from_secs(60))
        .build();
    ClusterServer::new(ClusterService { node, conn_cache })
}

#[doc(hidden)]
pub struct ClusterService {
    node: node::ClusterNode,
    conn_cache: moka::sync::Cache<NodeAddress, proto::ClusterClient>,
}

impl ClusterService {
    fn connect(&self, address: &NodeAddress) -> proto::ClusterClient {
        self.conn_cache.get_with(address.clone(), || {
            let endpoint = tonic::transport::Endpoint::from(address.uri().clone());
            proto::ClusterClient::new(endpoint.connect_lazy())
        })
    }
}

fn status_of(e: Error) -> tonic::Status {
    match &e {
        Error::NotMaster { .. } => tonic::Status::failed_precondition(e.to_string()),
        Error::JoinAbandoned => tonic::Status::aborted(e.to_string()),
        _ => tonic::Status::invalid_argument(e.to_string()),
    }
}

#[tonic::async_trait]
impl Cluster for ClusterService {
    async fn join(
        &self,
        request: tonic::Request<proto::JoinRequest>,
    ) -> std::result::Result<tonic::Response<proto::JoinResponse>, tonic::Status> {
        let req = request.into_inner();
        let descriptor = req
            .node
            .ok_or_else(|| tonic::Status::invalid_argument("missing node descriptor"))?;
        let joining = proto::decode_node(descriptor)
            .map_err(|e| tonic::Status::invalid_argument(e.to_string()))?;

        // A join sent to a non-master is forwarded to the elected master when
        // one is known. Mastership assumptions are always handled locally.
        if !req.assume_mastership {
            let state = self.node.state();
            if let Some(master) = state.master_node() {
                if master.id != self.node.local().id {
                    debug!(
                        "forwarding join of {} to the elected master {}",
                        joining.name, master.name
                    );
                    let fwd = proto::JoinRequest {
                        node: Some(proto::encode_node(&joining)),
                        assume_mastership: false,
                    };
                    return self.connect(&master.address).join(fwd).await;
                }
            }
        }

        let version = self
            .node
            .submit_join(joining, req.assume_mastership)
            .await
            .map_err(status_of)?;
        Ok(tonic::Response::new(proto::JoinResponse {
            state_version: version,
        }))
    }

    async fn get_membership(
        &self,
        _: tonic::Request<proto::MembershipRequest>,
    ) -> std::result::Result<tonic::Response<proto::Membership>, tonic::Status> {
        let state = self.node.state();
        let mut nodes: Vec<_> = state.nodes.values().map(proto::encode_node).collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tonic::Response::new(proto::Membership {
            state_version: state.version,
            nodes,
            master_id: state.master.as_ref().map(|m| m.to_string()),
        }))
    }

    async fn get_master_history(
        &self,
        _: tonic::Request<proto::MasterHistoryRequest>,
    ) -> std::result::Result<tonic::Response<proto::MasterHistorySnapshot>, tonic::Status> {
        let entries = self
            .node
            .master_history(Instant::now())
            .into_iter()
            .map(|(age, master)| proto::MasterHistoryEntry {
                master: master.as_ref().map(proto::encode_node),
                age_millis: age.as_millis() as u64,
            })
            .collect();
        Ok(tonic::Response::new(proto::MasterHistorySnapshot {
            entries,
        }))
    }

    async fn get_formation_state(
        &self,
        _: tonic::Request<proto::FormationStateRequest>,
    ) -> std::result::Result<tonic::Response<proto::FormationState>, tonic::Status> {
        let formation = self.node.formation_state();
        Ok(tonic::Response::new(proto::encode_formation(&formation)))
    }

    async fn diagnose(
        &self,
        request: tonic::Request<proto::DiagnoseRequest>,
    ) -> std::result::Result<tonic::Response<proto::DiagnoseResponse>, tonic::Status> {
        let explain = request.into_inner().explain;
        let diagnosis = self.node.diagnose(explain);
        Ok(tonic::Response::new(proto::encode_diagnosis(diagnosis)))
    }

    type WatchDiagnosisStream =
        Pin<Box<dyn Stream<Item = std::result::Result<proto::DiagnoseResponse, tonic::Status>> + Send>>;

    async fn watch_diagnosis(
        &self,
        request: tonic::Request<proto::DiagnoseRequest>,
    ) -> std::result::Result<tonic::Response<Self::WatchDiagnosisStream>, tonic::Status> {
        let explain = request.into_inner().explain;
        let node = self.node.clone();
        let st = async_stream::try_stream! {
            let mut intvl = tokio::time::interval(Duration::from_secs(1));
            loop {
                intvl.tick().await;
                yield proto::encode_diagnosis(node.diagnose(explain));
            }
        };
        Ok(tonic::Response::new(Box::pin(st)))
    }
}
