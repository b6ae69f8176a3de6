use serde_json::json;
use valor_collab::collab::Outbound;
use valor_collab::config::CollabConfig;
use valor_collab::protocol::MessageType;

use crate::fixtures::cluster::{Cluster, room};
use crate::fixtures::envelope::{note_op, request, set_op, submit};

#[test]
fn concurrent_writers_on_two_processes_converge() {
    let cluster = Cluster::new(CollabConfig::default());
    let a = cluster.node();
    let b = cluster.node();

    a.handle(&request(
        "op_submit",
        "u1",
        "r1",
        submit(0, vec![set_op("inputs.wacc", json!(9.0), 1_000)]),
    ));
    b.handle(&request(
        "op_submit",
        "u9",
        "r2",
        submit(0, vec![set_op("inputs.wacc", json!(7.5), 1_000)]),
    ));

    // Before fan-out each process only knows its own write.
    assert_eq!(a.snapshot(&room()).state["inputs.wacc"], json!(9.0));
    assert_eq!(b.snapshot(&room()).state["inputs.wacc"], json!(7.5));

    a.pump();
    b.pump();

    let left = a.snapshot(&room());
    let right = b.snapshot(&room());
    assert_eq!(left.state, right.state);
    assert_eq!(left.state["inputs.wacc"], json!(7.5), "u9 wins the tie");
    assert_eq!(left.version, right.version);
}

#[test]
fn notes_from_both_processes_reach_both() {
    let cluster = Cluster::new(CollabConfig::default());
    let a = cluster.node();
    let b = cluster.node();

    a.handle(&request("op_submit", "u1", "r1", submit(0, vec![note_op("from a", 1)])));
    b.handle(&request("op_submit", "u2", "r2", submit(0, vec![note_op("from b", 2)])));
    a.pump();
    b.pump();

    for node in [&a, &b] {
        let texts: Vec<_> = node
            .snapshot(&room())
            .notes
            .into_iter()
            .map(|note| note.text)
            .collect();
        assert_eq!(texts.len(), 2);
        assert!(texts.contains(&"from a".to_string()));
        assert!(texts.contains(&"from b".to_string()));
    }
}

#[test]
fn own_events_are_broadcast_but_not_reapplied() {
    let cluster = Cluster::new(CollabConfig::default());
    let a = cluster.node();

    a.handle(&request(
        "op_submit",
        "u1",
        "r1",
        submit(0, vec![note_op("once", 1)]),
    ));
    let out = a.pump();

    assert_eq!(out.len(), 1);
    let Outbound::Room { key, envelope } = &out[0] else {
        panic!("expected room message, got {out:?}");
    };
    assert_eq!(key, &room());
    assert_eq!(envelope.kind, MessageType::OpBroadcast);
    assert_eq!(envelope.payload["opVersion"], 1);
    assert_eq!(envelope.user_id, "u1");

    let snapshot = a.snapshot(&room());
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.notes.len(), 1);
}

#[test]
fn publish_failure_does_not_fail_the_submit() {
    let cluster = Cluster::new(CollabConfig::default());
    let a = cluster.node();
    let b = cluster.node();
    cluster.broker.set_failing(true);

    let out = a.handle(&request(
        "op_submit",
        "u1",
        "r1",
        submit(0, vec![set_op("x", json!(1), 1)]),
    ));
    assert_eq!(out[0].envelope().kind, MessageType::OpAck);

    // The other process never hears about it.
    assert!(b.pump().is_empty());
    assert!(b.snapshot(&room()).state.is_empty());
}
