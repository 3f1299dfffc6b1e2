//! Builders turning a typed device into the parameters of a device RPC.
//!
//! Container-style kinds take a flat attribute map tagged `dev_type`. VM-style
//! kinds nest the attributes under `attributes` and tag them `dtype`.

use crate::core::domain::{
    error::{ConvergeError, ConvergeResult},
    model::{
        device::{Device, DeviceSpec},
        instance::InstanceKind,
    },
    value_object::{DeviceIdentity, InstanceId},
};
use serde_json::{Map, Value, json};

const CONTAINER_TAG: &str = "dev_type";
const VM_TAG: &str = "dtype";

/// Returns the flat, `dev_type`-tagged attribute map of a device.
pub fn device_attributes(device: &Device) -> ConvergeResult<Map<String, Value>> {
    match serde_json::to_value(device)? {
        Value::Object(map) => Ok(map),
        other => Err(ConvergeError::Parse(format!(
            "device did not serialize to a map: {}",
            other
        ))),
    }
}

/// Renames the `dev_type` tag to the VM `dtype` tag.
fn vm_attributes(device: &Device) -> ConvergeResult<Map<String, Value>> {
    let mut attributes = device_attributes(device)?;
    if let Some(tag) = attributes.remove(CONTAINER_TAG) {
        attributes.insert(VM_TAG.to_string(), tag);
    }
    Ok(attributes)
}

/// The attribute map of a device as embedded in an instance create request.
pub fn embedded_device(kind: InstanceKind, spec: &DeviceSpec) -> ConvergeResult<Value> {
    match kind {
        InstanceKind::Vm => Ok(json!({ "attributes": vm_attributes(&spec.device)? })),
        InstanceKind::Container | InstanceKind::App => {
            let mut attributes = device_attributes(&spec.device)?;
            if let Some(DeviceIdentity::Name(name)) = &spec.identity {
                attributes.insert("name".to_string(), Value::from(name.as_str()));
            }
            Ok(Value::Object(attributes))
        }
    }
}

/// Parameters for creating one device on an existing instance.
pub fn create_params(
    kind: InstanceKind,
    instance_id: &InstanceId,
    spec: &DeviceSpec,
) -> ConvergeResult<Value> {
    match kind {
        InstanceKind::Vm => Ok(json!([{
            "vm": instance_id.to_param(),
            "attributes": vm_attributes(&spec.device)?
        }])),
        _ => Ok(json!([instance_id.to_param(), embedded_device(kind, spec)?])),
    }
}

/// Parameters for replacing all attributes of an existing device.
pub fn update_params(
    kind: InstanceKind,
    instance_id: &InstanceId,
    identity: &DeviceIdentity,
    device: &Device,
) -> ConvergeResult<Value> {
    match kind {
        InstanceKind::Vm => Ok(json!([
            identity.to_param(),
            { "attributes": vm_attributes(device)? }
        ])),
        _ => {
            let mut attributes = device_attributes(device)?;
            attributes.insert("name".to_string(), identity.to_param());
            Ok(json!([instance_id.to_param(), attributes]))
        }
    }
}

/// Parameters for deleting a device.
pub fn delete_params(
    kind: InstanceKind,
    instance_id: &InstanceId,
    identity: &DeviceIdentity,
) -> Value {
    match kind {
        InstanceKind::Vm => json!([identity.to_param()]),
        _ => json!([instance_id.to_param(), identity.to_param()]),
    }
}
