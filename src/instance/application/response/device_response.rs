//! Parsers turning remote device records into typed devices.

use crate::core::domain::{
    error::{ConvergeError, ConvergeResult},
    model::{
        device::{Device, DeviceKind, DeviceSpec},
        instance::InstanceKind,
    },
    value_object::DeviceIdentity,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

/// A VM device record: `{"id": 5, "attributes": {"dtype": "DISK", ...}}`.
#[derive(Debug, Deserialize)]
struct VmDeviceRecord {
    id: u64,
    #[serde(default)]
    attributes: Map<String, Value>,
}

/// Parses a list of remote device records.
///
/// Records whose type has no typed model are skipped and so stay
/// unmanaged; records of a known type that do not decode are an error.
pub fn parse_devices(kind: InstanceKind, raw: &Value) -> ConvergeResult<Vec<DeviceSpec>> {
    let records = match raw {
        Value::Array(records) => records,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(ConvergeError::Parse(format!(
                "expected a device list, got: {}",
                other
            )));
        }
    };

    let mut devices = Vec::with_capacity(records.len());
    for record in records {
        if let Some(device) = parse_device(kind, record)? {
            devices.push(device);
        }
    }
    Ok(devices)
}

/// Parses one remote device record, returning `None` for unmodelled types.
pub fn parse_device(kind: InstanceKind, raw: &Value) -> ConvergeResult<Option<DeviceSpec>> {
    let (identity, attributes) = match kind {
        InstanceKind::Vm => {
            let record: VmDeviceRecord = serde_json::from_value(raw.clone())?;
            let mut attributes = record.attributes;
            if let Some(tag) = attributes.remove("dtype") {
                attributes.insert("dev_type".to_string(), tag);
            }
            (Some(DeviceIdentity::Id(record.id)), attributes)
        }
        InstanceKind::Container | InstanceKind::App => {
            let attributes = raw.as_object().cloned().ok_or_else(|| {
                ConvergeError::Parse(format!("device record is not a map: {}", raw))
            })?;
            let identity =
                DeviceIdentity::from_remote_name(attributes.get("name").and_then(Value::as_str));
            (identity, attributes)
        }
    };

    let dev_type = attributes
        .get("dev_type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if !DeviceKind::ALL.iter().any(|k| k.dev_type() == dev_type) {
        debug!(dev_type = %dev_type, "skipping device of unmanaged type");
        return Ok(None);
    }

    let device: Device = serde_json::from_value(Value::Object(attributes)).map_err(|e| {
        ConvergeError::Parse(format!("malformed {} device record: {}", dev_type, e))
    })?;
    Ok(Some(DeviceSpec { identity, device }))
}

/// Extracts the identity the server assigned in a device create response.
///
/// Only VM-style kinds return the created record; for other kinds the
/// identity is learned from the next observed-state fetch.
pub fn parse_created_identity(kind: InstanceKind, raw: &Value) -> Option<DeviceIdentity> {
    if !kind.uses_numeric_device_ids() {
        return None;
    }
    raw.get("id").and_then(Value::as_u64).map(DeviceIdentity::Id)
}
