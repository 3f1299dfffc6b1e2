use serde::{Deserialize, Serialize};
use std::fmt;

/// The identifier the remote API assigns to an instance.
///
/// VMs carry a numeric id; containers and apps are addressed by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum InstanceId {
    Numeric(u64),
    Name(String),
}

impl InstanceId {
    /// Returns the id as a JSON parameter for RPC calls.
    #[must_use]
    pub fn to_param(&self) -> serde_json::Value {
        match self {
            InstanceId::Numeric(id) => serde_json::Value::from(*id),
            InstanceId::Name(name) => serde_json::Value::from(name.as_str()),
        }
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceId::Numeric(id) => write!(f, "{}", id),
            InstanceId::Name(name) => f.write_str(name),
        }
    }
}

impl From<u64> for InstanceId {
    fn from(id: u64) -> Self {
        InstanceId::Numeric(id)
    }
}

impl From<&str> for InstanceId {
    fn from(name: &str) -> Self {
        InstanceId::Name(name.to_string())
    }
}
