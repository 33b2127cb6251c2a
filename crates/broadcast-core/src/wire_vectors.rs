//! Wire vectors as emitted by the cluster harness
//!
//! Each vector is a verbatim line the harness sends, or a line it must accept
//! back, checked against our typed decoding.

use crate::message::*;
use crate::types::*;

const INIT: &str = r#"{"src":"c0","dest":"n1","body":{"type":"init","msg_id":1,"node_id":"n1","node_ids":["n1","n2","n3"]}}"#;
const BROADCAST: &str =
    r#"{"src":"c1","dest":"n1","body":{"type":"broadcast","msg_id":7,"message":1000}}"#;
const READ: &str = r#"{"src":"c1","dest":"n1","body":{"type":"read","msg_id":8}}"#;
const TOPOLOGY: &str = r#"{"src":"c1","dest":"n1","body":{"type":"topology","msg_id":2,"topology":{"n1":["n2","n3"],"n2":["n1"],"n3":["n1"]}}}"#;
const PERIODIC: &str =
    r#"{"src":"n2","dest":"n1","body":{"type":"periodic_broadcast","message":[1,2,"three"]}}"#;

#[test]
fn test_init_vector() {
    let env = Envelope::from_json(INIT.as_bytes()).unwrap();
    assert_eq!(env.body.msg_id, Some(1));
    match env.body.payload {
        Payload::Init { node_id, node_ids } => {
            assert_eq!(node_id, NodeId::from("n1"));
            assert_eq!(node_ids.len(), 3);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn test_broadcast_vector() {
    let env = Envelope::from_json(BROADCAST.as_bytes()).unwrap();
    assert_eq!(env.src, NodeId::from("c1"));
    assert_eq!(env.body.payload, Payload::Broadcast { message: Value::Int(1000) });
}

#[test]
fn test_read_vector() {
    let env = Envelope::from_json(READ.as_bytes()).unwrap();
    assert_eq!(env.body.payload, Payload::Read);
    assert_eq!(env.body.in_reply_to, None);
}

#[test]
fn test_topology_vector() {
    let env = Envelope::from_json(TOPOLOGY.as_bytes()).unwrap();
    let Payload::Topology { topology } = env.body.payload else {
        panic!("expected topology");
    };
    assert_eq!(topology[&NodeId::from("n3")], vec![NodeId::from("n1")]);
}

#[test]
fn test_periodic_broadcast_vector() {
    let env = Envelope::from_json(PERIODIC.as_bytes()).unwrap();
    assert_eq!(
        env.body.payload,
        Payload::PeriodicBroadcast {
            message: vec![Value::Int(1), Value::Int(2), Value::from("three")]
        }
    );
}

#[test]
fn test_read_ok_shape() {
    let mut body = Body::new(Payload::ReadOk {
        messages: vec![Value::Int(99)],
    });
    body.msg_id = Some(3);
    body.in_reply_to = Some(8);
    let env = Envelope::new(NodeId::from("n1"), NodeId::from("c1"), body);

    let json: serde_json::Value = serde_json::from_slice(&env.to_json().unwrap()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "src": "n1",
            "dest": "c1",
            "body": {"type": "read_ok", "msg_id": 3, "in_reply_to": 8, "messages": [99]}
        })
    );
}

#[test]
fn test_extra_fields_ignored() {
    let line = r#"{"src":"c1","dest":"n1","id":4,"body":{"type":"read","msg_id":1,"trace":"x"}}"#;
    assert!(Envelope::from_json(line.as_bytes()).is_ok());
}

#[test]
fn test_rejected_shapes() {
    let rejected = [
        // unknown type
        r#"{"src":"c1","dest":"n1","body":{"type":"echo","echo":"hi"}}"#,
        // missing field
        r#"{"src":"c1","dest":"n1","body":{"type":"broadcast"}}"#,
        // ill-typed value
        r#"{"src":"c1","dest":"n1","body":{"type":"broadcast","message":{"a":1}}}"#,
        // batch must be a sequence
        r#"{"src":"n2","dest":"n1","body":{"type":"periodic_broadcast","message":5}}"#,
        // topology neighbors must be ids
        r#"{"src":"c1","dest":"n1","body":{"type":"topology","topology":{"n1":[1]}}}"#,
        // no body
        r#"{"src":"c1","dest":"n1"}"#,
    ];
    for line in rejected {
        assert!(Envelope::from_json(line.as_bytes()).is_err(), "accepted {line}");
    }
}
