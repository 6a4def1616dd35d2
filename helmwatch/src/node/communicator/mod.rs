use super::*;

use crate::service::cluster::client as proto;
use process::{FormationState, Node};

/// Lazily established channel to one peer, shared by every `Communicator`
/// handed out for that peer.
#[derive(Clone)]
pub struct ClusterConnection {
    client: proto::ClusterClient,
}
impl ClusterConnection {
    pub fn new(dest: NodeAddress) -> Self {
        let client = {
            let endpoint = tonic::transport::Endpoint::from(dest.uri().clone())
                // (http2) Send ping to keep connection (default: disabled)
                .http2_keep_alive_interval(Duration::from_secs(1))
                // (http2) Send ping even if there is no active streams (default: disabled)
                .keep_alive_while_idle(true);

            let chan = endpoint.connect_lazy();
            proto::ClusterClient::new(chan)
        };
        Self { client }
    }
}

pub struct Communicator {
    conn: ClusterConnection,
    timeout: Duration,
}
impl Communicator {
    pub fn new(conn: ClusterConnection, timeout: Duration) -> Self {
        Self { conn, timeout }
    }
}

impl Communicator {
    pub async fn join(&self, node: &Node, assume_mastership: bool) -> Result<StateVersion> {
        let req = proto::JoinRequest {
            node: Some(proto::encode_node(node)),
            assume_mastership,
        };
        let mut cli = self.conn.client.clone();
        let resp = tokio::time::timeout(self.timeout, cli.join(req))
            .await
            .context("join request timed out")??
            .into_inner();
        Ok(resp.state_version)
    }

    pub async fn fetch_master_history(&self) -> Result<Vec<(Duration, Option<Node>)>> {
        let mut cli = self.conn.client.clone();
        let resp = tokio::time::timeout(
            self.timeout,
            cli.get_master_history(proto::MasterHistoryRequest {}),
        )
        .await
        .context("master history fetch timed out")??
        .into_inner();

        let mut out = Vec::with_capacity(resp.entries.len());
        for e in resp.entries {
            let master = e.master.map(proto::decode_node).transpose()?;
            out.push((Duration::from_millis(e.age_millis), master));
        }
        Ok(out)
    }

    pub async fn fetch_formation_state(&self) -> Result<FormationState> {
        let mut cli = self.conn.client.clone();
        let resp = tokio::time::timeout(
            self.timeout,
            cli.get_formation_state(proto::FormationStateRequest {}),
        )
        .await
        .context("formation state fetch timed out")??
        .into_inner();
        proto::decode_formation(resp)
    }
}
