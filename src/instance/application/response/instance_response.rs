//! Parsers for instance query results.

use crate::{
    core::domain::{
        error::{ConvergeError, ConvergeResult},
        model::{device::DeviceSpec, instance::InstanceKind, power_state::PowerState},
        value_object::InstanceId,
    },
    instance::application::response::device_response::parse_devices,
};
use serde::Deserialize;
use serde_json::Value;

/// One instance as reported by a query.
///
/// `devices` is only populated for kinds whose query embeds them.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub power: PowerState,
    pub devices: Vec<DeviceSpec>,
}

#[derive(Debug, Deserialize)]
struct VmStatus {
    state: String,
}

#[derive(Debug, Deserialize)]
struct VmRecord {
    id: u64,
    status: VmStatus,
    #[serde(default)]
    devices: Value,
}

#[derive(Debug, Deserialize)]
struct ContainerRecord {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct AppRecord {
    #[serde(alias = "id")]
    name: String,
    state: String,
}

/// Parses a query result into at most one instance record.
///
/// An empty result means the instance no longer exists.
pub fn parse_query(kind: InstanceKind, raw: &Value) -> ConvergeResult<Option<InstanceRecord>> {
    let records = raw.as_array().ok_or_else(|| {
        ConvergeError::Parse(format!("expected a list of {} records, got: {}", kind, raw))
    })?;
    match records.as_slice() {
        [] => Ok(None),
        [record] => parse_record(kind, record).map(Some),
        many => Err(ConvergeError::Parse(format!(
            "query matched {} {} records, expected at most one",
            many.len(),
            kind
        ))),
    }
}

fn parse_record(kind: InstanceKind, raw: &Value) -> ConvergeResult<InstanceRecord> {
    match kind {
        InstanceKind::Vm => {
            let record: VmRecord = serde_json::from_value(raw.clone())?;
            Ok(InstanceRecord {
                id: InstanceId::Numeric(record.id),
                power: PowerState::parse(kind, &record.status.state)?,
                devices: parse_devices(kind, &record.devices)?,
            })
        }
        InstanceKind::Container => {
            let record: ContainerRecord = serde_json::from_value(raw.clone())?;
            Ok(InstanceRecord {
                id: InstanceId::Name(record.id),
                power: PowerState::parse(kind, &record.status)?,
                devices: Vec::new(),
            })
        }
        InstanceKind::App => {
            let record: AppRecord = serde_json::from_value(raw.clone())?;
            Ok(InstanceRecord {
                id: InstanceId::Name(record.name),
                power: PowerState::parse(kind, &record.state)?,
                devices: Vec::new(),
            })
        }
    }
}

/// Extracts the instance id from a create response, falling back to the
/// instance name for kinds addressed by name.
pub fn parse_created_id(kind: InstanceKind, name: &str, raw: &Value) -> ConvergeResult<InstanceId> {
    match kind {
        InstanceKind::Vm => raw
            .get("id")
            .and_then(Value::as_u64)
            .map(InstanceId::Numeric)
            .ok_or_else(|| {
                ConvergeError::Parse(format!("vm create response carries no id: {}", raw))
            }),
        InstanceKind::Container | InstanceKind::App => Ok(raw
            .get("id")
            .and_then(Value::as_str)
            .map(InstanceId::from)
            .unwrap_or_else(|| InstanceId::from(name))),
    }
}
