use anyhow::Result;
use helmwatch::client;
use helmwatch_tests::*;
use serial_test::serial;

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n1_fresh_node_reports_no_master() -> Result<()> {
    let cluster = Cluster::new(1).await?;

    let resp = cluster
        .admin(0)
        .diagnose(client::DiagnoseRequest { explain: false })
        .await?
        .into_inner();
    assert_eq!(resp.status, "NO_MASTER");
    assert!(resp.summary.contains("no master-eligible peers"));
    assert!(resp.details.is_none());

    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n1_bootstrap_becomes_stable() -> Result<()> {
    let cluster = Cluster::new(1).await?;

    let version = cluster.bootstrap(0).await?;
    assert_eq!(version, 1);

    let membership = cluster
        .admin(0)
        .get_membership(client::MembershipRequest {})
        .await?
        .into_inner();
    assert_eq!(membership.state_version, 1);
    assert_eq!(membership.nodes.len(), 1);
    assert_eq!(membership.master_id.as_deref(), Some("nd0"));

    let resp = cluster
        .admin(0)
        .diagnose(client::DiagnoseRequest { explain: true })
        .await?
        .into_inner();
    assert_eq!(resp.status, "STABLE");
    let details = resp.details.unwrap();
    assert_eq!(details.current_master.unwrap().id, "nd0");

    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n1_watch_diagnosis_streams() -> Result<()> {
    let cluster = Cluster::new(1).await?;
    cluster.bootstrap(0).await?;

    let mut stream = cluster
        .admin(0)
        .watch_diagnosis(client::DiagnoseRequest { explain: false })
        .await?
        .into_inner();

    let first = stream.message().await?.unwrap();
    assert_eq!(first.status, "STABLE");
    let second = stream.message().await?.unwrap();
    assert_eq!(second.status, "STABLE");

    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n1_master_history_over_rpc() -> Result<()> {
    let mut cluster = Cluster::new(1).await?;
    cluster.bootstrap(0).await?;

    let snap = cluster
        .admin(0)
        .get_master_history(client::MasterHistoryRequest {})
        .await?
        .into_inner();
    assert_eq!(snap.entries.len(), 1);
    assert_eq!(snap.entries[0].master.as_ref().unwrap().id, "nd0");

    cluster.env().node(0).clear_master();

    let snap = cluster
        .admin(0)
        .get_master_history(client::MasterHistoryRequest {})
        .await?
        .into_inner();
    // Oldest first: the elected-master entry precedes the loss entry.
    assert_eq!(snap.entries.len(), 2);
    assert!(snap.entries[0].master.is_some());
    assert!(snap.entries[1].master.is_none());
    assert!(snap.entries[0].age_millis >= snap.entries[1].age_millis);

    Ok(())
}
