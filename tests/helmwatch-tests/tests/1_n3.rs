use anyhow::Result;
use helmwatch::client;
use helmwatch_tests::*;
use serial_test::serial;

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n3_join_through_master() -> Result<()> {
    let cluster = Cluster::new(3).await?;
    cluster.bootstrap(0).await?;

    let v1 = cluster.join_server(0, 1).await?;
    let v2 = cluster.join_server(0, 2).await?;
    assert!(v2 > v1);

    let membership = cluster
        .admin(0)
        .get_membership(client::MembershipRequest {})
        .await?
        .into_inner();
    assert_eq!(membership.nodes.len(), 3);
    assert_eq!(membership.master_id.as_deref(), Some("nd0"));

    // An identical rejoin is a no-op but still bumps the state version.
    let v3 = cluster.join_server(0, 1).await?;
    assert_eq!(v3, v2 + 1);
    let membership = cluster
        .admin(0)
        .get_membership(client::MembershipRequest {})
        .await?
        .into_inner();
    assert_eq!(membership.nodes.len(), 3);

    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n3_non_master_rejects_join() -> Result<()> {
    let cluster = Cluster::new(3).await?;
    cluster.bootstrap(0).await?;

    // nd1 knows no master, so it cannot forward and must reject.
    let err = cluster.join_server(1, 2).await.unwrap_err();
    let status = err.downcast::<tonic::Status>()?;
    assert_eq!(status.code(), tonic::Code::FailedPrecondition);

    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n3_join_forwarded_to_known_master() -> Result<()> {
    let mut cluster = Cluster::new(3).await?;
    cluster.bootstrap(0).await?;

    // The election layer tells nd1 who the master is.
    let m0 = cluster.env().member(0);
    cluster.env().node(1).adopt_master(m0);

    cluster.join_server(1, 2).await?;

    let membership = cluster
        .admin(0)
        .get_membership(client::MembershipRequest {})
        .await?
        .into_inner();
    assert!(membership.nodes.iter().any(|n| n.id == "nd2"));

    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn join_incompatible_version_rejected() -> Result<()> {
    let cluster = Cluster::new(1).await?;
    cluster.bootstrap(0).await?;

    let mut rogue = env::member(9, 19999);
    rogue.version = helmwatch::process::Version::new(3, 0, 0);
    let req = client::JoinRequest {
        node: Some(client::encode_node(&rogue)),
        assume_mastership: false,
    };
    let status = cluster.admin(0).join(req).await.unwrap_err();
    assert_eq!(status.code(), tonic::Code::InvalidArgument);

    // The rejection left the membership untouched.
    let membership = cluster
        .admin(0)
        .get_membership(client::MembershipRequest {})
        .await?
        .into_inner();
    assert_eq!(membership.nodes.len(), 1);

    Ok(())
}
