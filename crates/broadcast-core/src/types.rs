//! Core types for the broadcast node
//!
//! Values are compared only for equality; the protocol never looks inside
//! them. Node identifiers are the opaque names handed out by the cluster
//! harness at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// =============================================================================
// IDENTITY
// =============================================================================

/// Node identifier assigned by the cluster harness (`n1`, `c4`, ...)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// =============================================================================
// VALUES
// =============================================================================

/// An opaque unit of application data.
///
/// On the wire a value is either a JSON integer or a JSON string. The two
/// never compare equal: `1` and `"1"` are distinct values.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

// =============================================================================
// TOPOLOGY
// =============================================================================

/// Cluster-wide adjacency: node id to the ids it gossips with.
pub type Topology = HashMap<NodeId, Vec<NodeId>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_kinds_are_distinct() {
        assert_ne!(Value::from(1), Value::from("1"));
        assert_eq!(Value::from(7), Value::Int(7));
    }

    #[test]
    fn test_value_json_shapes() {
        assert_eq!(serde_json::to_string(&Value::from(42)).unwrap(), "42");
        assert_eq!(serde_json::to_string(&Value::from("x")).unwrap(), "\"x\"");

        let v: Value = serde_json::from_str("-3").unwrap();
        assert_eq!(v, Value::Int(-3));
        let v: Value = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(v, Value::Text("abc".into()));

        assert!(serde_json::from_str::<Value>("1.5").is_err());
        assert!(serde_json::from_str::<Value>("[1]").is_err());
    }

    #[test]
    fn test_topology_from_json() {
        let topology: Topology =
            serde_json::from_str(r#"{"n1": ["n2", "n3"], "n2": ["n1"]}"#).unwrap();
        assert_eq!(
            topology[&NodeId::from("n1")],
            vec![NodeId::from("n2"), NodeId::from("n3")]
        );
        assert_eq!(topology.len(), 2);
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId::new("n1").to_string(), "n1");
    }
}
