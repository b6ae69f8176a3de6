use serde_json::{Value, json};
use valor_collab::config::CollabConfig;
use valor_collab::core::{ErrorCode, ErrorPayload, UserId};
use valor_collab::protocol::{MessageType, OpAck, SnapshotResponse};

use crate::fixtures::cluster::{Cluster, room};
use crate::fixtures::envelope::{request, request_in, set_op, submit};

#[test]
fn join_submit_submit_leave() {
    let cluster = Cluster::new(CollabConfig::default());
    let node = cluster.node();
    let key = room();
    let u1 = UserId::new("u1").unwrap();

    let out = node.handle(&request("join_room", "u1", "join-1", Value::Null));
    let joined: SnapshotResponse = out[0].envelope().decode_payload().unwrap();
    assert_eq!(joined.base_version, 0);
    assert!(joined.state.is_empty());

    let out = node.handle(&request(
        "op_submit",
        "u1",
        "op-1",
        submit(0, vec![set_op("inputs.wacc", json!(9.0), 1_000)]),
    ));
    let ack: OpAck = out[0].envelope().decode_payload().unwrap();
    assert_eq!(ack.op_version, 1);
    let snapshot = node.snapshot(&key);
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.state["inputs.wacc"], json!(9.0));

    let out = node.handle(&request(
        "op_submit",
        "u1",
        "op-2",
        submit(1, vec![set_op("inputs.wacc", json!(8.5), 1_010)]),
    ));
    let ack: OpAck = out[0].envelope().decode_payload().unwrap();
    assert_eq!(ack.op_version, 2);
    assert_eq!(node.snapshot(&key).state["inputs.wacc"], json!(8.5));

    let room_handle = node.manager().get_or_create(&key).unwrap();
    assert!(room_handle.lock().unwrap().is_member(&u1));

    let out = node.handle(&request("leave_room", "u1", "leave-1", Value::Null));
    assert_eq!(out[0].envelope().kind, MessageType::PresenceUpdate);
    assert_eq!(out[0].envelope().payload["status"], "offline");
    assert!(!room_handle.lock().unwrap().is_member(&u1));
    assert_eq!(node.manager().presence_view(&key), json!([]));
}

#[test]
fn stale_write_does_not_override_newer_value() {
    let cluster = Cluster::new(CollabConfig::default());
    let node = cluster.node();

    node.handle(&request(
        "op_submit",
        "u1",
        "r1",
        submit(0, vec![set_op("p", json!("new"), 2_000)]),
    ));
    let out = node.handle(&request(
        "op_submit",
        "u2",
        "r2",
        submit(0, vec![set_op("p", json!("old"), 1_000)]),
    ));

    let ack: OpAck = out[0].envelope().decode_payload().unwrap();
    assert_eq!(ack.op_version, 2, "a losing batch still bumps the version");
    assert_eq!(node.snapshot(&room()).state["p"], json!("new"));
}

#[test]
fn rejected_tenant_gets_error_with_request_id() {
    let config = CollabConfig {
        tenant_allowlist_enabled: true,
        allowed_tenants: vec!["t1".into()],
        ..CollabConfig::default()
    };
    let cluster = Cluster::new(config);
    let node = cluster.node();

    let out = node.handle(&request_in(
        "t2",
        "d1",
        "join_room",
        "u1",
        "join-x",
        Value::Null,
    ));
    let reply = out[0].envelope();
    assert_eq!(reply.kind, MessageType::Error);
    assert_eq!(reply.request_id.as_deref(), Some("join-x"));
    let error: ErrorPayload = reply.decode_payload().unwrap();
    assert_eq!(error.code, ErrorCode::TenantNotAllowed);

    let out = node.handle(&request("join_room", "u1", "join-ok", Value::Null));
    assert_eq!(out[0].envelope().kind, MessageType::SnapshotResponse);
}

#[test]
fn full_room_rejects_new_members_only() {
    let config = CollabConfig {
        max_room_members: 1,
        ..CollabConfig::default()
    };
    let cluster = Cluster::new(config);
    let node = cluster.node();

    node.handle(&request("join_room", "u1", "j1", Value::Null));
    let out = node.handle(&request("join_room", "u2", "j2", Value::Null));
    let error: ErrorPayload = out[0].envelope().decode_payload().unwrap();
    assert_eq!(error.code, ErrorCode::RoomFull);

    let out = node.handle(&request("join_room", "u1", "j3", Value::Null));
    assert_eq!(out[0].envelope().kind, MessageType::SnapshotResponse);
}

#[test]
fn rate_limit_rejects_batches_over_budget() {
    let config = CollabConfig {
        ops_per_minute_limit: 2,
        ..CollabConfig::default()
    };
    let cluster = Cluster::new(config);
    let node = cluster.node();

    let ops = vec![set_op("a", json!(1), 1), set_op("b", json!(2), 1)];
    let out = node.handle(&request("op_submit", "u1", "r1", submit(0, ops)));
    assert_eq!(out[0].envelope().kind, MessageType::OpAck);

    let out = node.handle(&request(
        "op_submit",
        "u1",
        "r2",
        submit(1, vec![set_op("c", json!(3), 2)]),
    ));
    let error: ErrorPayload = out[0].envelope().decode_payload().unwrap();
    assert_eq!(error.code, ErrorCode::RateLimited);
    assert!(error.details.is_some());
    assert_eq!(node.snapshot(&room()).version, 1);
}
