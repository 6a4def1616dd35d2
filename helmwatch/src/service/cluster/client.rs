//! Generated protocol types, the typed client, and the conversions between
//! wire and in-memory representations.

use super::*;

tonic::include_proto!("helmwatch");

pub type ClusterClient = cluster_client::ClusterClient<tonic::transport::channel::Channel>;

pub fn encode_node(n: &process::Node) -> NodeDescriptor {
    NodeDescriptor {
        id: n.id.to_string(),
        name: n.name.clone(),
        address: n.address.to_string(),
        master_eligible: n.roles.is_master_eligible(),
        can_hold_data: n.roles.can_hold_data(),
        version: n.version.id(),
    }
}

pub fn decode_node(w: NodeDescriptor) -> Result<process::Node> {
    let address = w.address.parse::<NodeAddress>().context("invalid node address")?;
    let mut roles = process::NodeRoles::NONE;
    if w.master_eligible {
        roles = roles.with(process::NodeRoles::MASTER_ELIGIBLE);
    }
    if w.can_hold_data {
        roles = roles.with(process::NodeRoles::DATA);
    }
    Ok(process::Node {
        id: NodeId::new(w.id),
        name: w.name,
        address,
        roles,
        version: process::Version::from_id(w.version),
    })
}

pub fn encode_formation(f: &process::FormationState) -> FormationState {
    FormationState {
        node: Some(encode_node(&f.node)),
        discovered_peers: f.discovered_peers.iter().map(encode_node).collect(),
        has_quorum: f.has_quorum,
        description: f.description.clone(),
    }
}

pub fn decode_formation(w: FormationState) -> Result<process::FormationState> {
    let node = decode_node(w.node.context("missing node descriptor")?)?;
    let mut discovered_peers = Vec::with_capacity(w.discovered_peers.len());
    for p in w.discovered_peers {
        discovered_peers.push(decode_node(p)?);
    }
    Ok(process::FormationState {
        node,
        discovered_peers,
        has_quorum: w.has_quorum,
        description: w.description,
    })
}

pub fn encode_diagnosis(d: process::Diagnosis) -> DiagnoseResponse {
    DiagnoseResponse {
        status: d.status.to_string(),
        summary: d.summary,
        details: d.details.map(|x| DiagnosisDetails {
            current_master: x.current_master.as_ref().map(encode_node),
            recent_masters: x.recent_masters.iter().map(encode_node).collect(),
            remote_error: x.remote_error,
            formation_descriptions: x.formation_descriptions,
        }),
    }
}
