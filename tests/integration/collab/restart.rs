use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use valor_collab::collab::{FsSnapshotStore, MemorySnapshotStore, SnapshotStore, TimeoutStore};
use valor_collab::config::CollabConfig;

use crate::fixtures::cluster::{Cluster, room};
use crate::fixtures::envelope::{request, set_op, submit};
use crate::fixtures::store_dir::TempStoreDir;

fn fs_store(dir: &TempStoreDir) -> Arc<dyn SnapshotStore> {
    let store = FsSnapshotStore::open(dir.snapshot_dir()).unwrap();
    Arc::new(TimeoutStore::new(store, Duration::from_secs(5)))
}

#[test]
fn restarted_process_keeps_lww_provenance() {
    let dir = TempStoreDir::new().unwrap();
    let cluster = Cluster::new(CollabConfig {
        snapshot_interval: 1,
        ..CollabConfig::default()
    });

    {
        let node = cluster.node_with_store(fs_store(&dir));
        node.handle(&request(
            "op_submit",
            "u9",
            "r1",
            submit(0, vec![set_op("inputs.g", json!(0.02), 5_000)]),
        ));
    }

    let restarted = cluster.node_with_store(fs_store(&dir));
    let snapshot = restarted.snapshot(&room());
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.state["inputs.g"], json!(0.02));

    // Same timestamp, lower writer id: loses against the reloaded stamp.
    restarted.handle(&request(
        "op_submit",
        "u1",
        "r2",
        submit(1, vec![set_op("inputs.g", json!(0.05), 5_000)]),
    ));
    let snapshot = restarted.snapshot(&room());
    assert_eq!(snapshot.version, 2);
    assert_eq!(snapshot.state["inputs.g"], json!(0.02));
}

#[test]
fn corrupt_snapshot_starts_empty_room() {
    let store = Arc::new(MemorySnapshotStore::new());
    store
        .insert_raw("collab:snapshot:t1:d1", b"{not json".to_vec())
        .unwrap();
    let cluster = Cluster::with_store(CollabConfig::default(), store);
    let node = cluster.node();

    let snapshot = node.snapshot(&room());
    assert_eq!(snapshot.version, 0);
    assert!(snapshot.state.is_empty());
}

#[test]
fn slow_store_times_out_without_blocking_the_room() {
    let slow = Arc::new(MemorySnapshotStore::new());
    slow.set_delay(Duration::from_millis(500));
    let store: Arc<dyn SnapshotStore> = Arc::new(TimeoutStore::new(
        Arc::clone(&slow),
        Duration::from_millis(20),
    ));
    let cluster = Cluster::new(CollabConfig {
        snapshot_interval: 1,
        ..CollabConfig::default()
    });
    let node = cluster.node_with_store(store);

    let out = node.handle(&request(
        "op_submit",
        "u1",
        "r1",
        submit(0, vec![set_op("x", json!(1), 1)]),
    ));
    assert_eq!(out[0].envelope().payload["opVersion"], 1);
    assert_eq!(node.snapshot(&room()).state["x"], json!(1));
}
