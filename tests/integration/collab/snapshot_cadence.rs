use serde_json::json;
use valor_collab::config::CollabConfig;
use valor_collab::core::Snapshot;
use valor_collab::collab::SnapshotStore;

use crate::fixtures::cluster::{Cluster, Node, room};
use crate::fixtures::envelope::{request, set_op, submit};

const STORAGE_KEY: &str = "collab:snapshot:t1:d1";

fn cadence_cluster() -> Cluster {
    Cluster::new(CollabConfig {
        snapshot_interval: 2,
        ..CollabConfig::default()
    })
}

fn submit_batch(node: &Node, n: u64) {
    node.handle(&request(
        "op_submit",
        "u1",
        &format!("r{n}"),
        submit(n - 1, vec![set_op("counter", json!(n), n)]),
    ));
}

fn stored(cluster: &Cluster) -> Option<Snapshot> {
    cluster
        .store
        .load(STORAGE_KEY)
        .unwrap()
        .map(|bytes| Snapshot::decode(&bytes).unwrap())
}

#[test]
fn saves_every_second_batch() {
    let cluster = cadence_cluster();
    let node = cluster.node();

    submit_batch(&node, 1);
    assert_eq!(cluster.store.save_count(), 0);
    assert!(stored(&cluster).is_none());

    submit_batch(&node, 2);
    assert_eq!(cluster.store.save_count(), 1);
    let snapshot = stored(&cluster).unwrap();
    assert_eq!(snapshot.base_version, 2);
    assert_eq!(snapshot.lww_state["counter"].value, json!(2));
    assert_eq!(snapshot.lww_state["counter"].user_id.as_str(), "u1");

    submit_batch(&node, 3);
    assert_eq!(cluster.store.save_count(), 1);
    submit_batch(&node, 4);
    assert_eq!(cluster.store.save_count(), 2);
    assert_eq!(stored(&cluster).unwrap().base_version, 4);
}

#[test]
fn failed_save_is_retried_on_next_batch() {
    let cluster = cadence_cluster();
    let node = cluster.node();

    submit_batch(&node, 1);
    cluster.store.set_failing(true);
    submit_batch(&node, 2);
    assert_eq!(cluster.store.save_count(), 0);
    assert_eq!(node.snapshot(&room()).version, 2, "apply succeeds anyway");

    cluster.store.set_failing(false);
    submit_batch(&node, 3);
    assert_eq!(cluster.store.save_count(), 1);
    assert_eq!(stored(&cluster).unwrap().base_version, 3);
}

#[test]
fn remote_batches_count_towards_cadence() {
    let cluster = cadence_cluster();
    let a = cluster.node();
    let b = cluster.node();

    submit_batch(&a, 1);
    b.pump();
    submit_batch(&a, 2);
    assert_eq!(cluster.store.save_count(), 1);
    b.pump();
    assert_eq!(cluster.store.save_count(), 2, "b saved after its second batch");
}

#[test]
fn zero_interval_never_saves() {
    let cluster = Cluster::new(CollabConfig {
        snapshot_interval: 0,
        ..CollabConfig::default()
    });
    let node = cluster.node();
    for n in 1..=5 {
        submit_batch(&node, n);
    }
    assert_eq!(cluster.store.save_count(), 0);
}
