//! Parameters for instance-level calls: query, create, delete, start and stop.

use crate::{
    core::domain::{
        error::ConvergeResult,
        model::instance::{InstanceKind, InstanceSpec},
        value_object::InstanceId,
    },
    instance::application::request::device_request::embedded_device,
};
use serde_json::{Value, json};
use std::time::Duration;

/// A query filter matching exactly one instance.
pub fn query_params(kind: InstanceKind, id: &InstanceId) -> Value {
    json!([[[kind.methods().query_field, "=", id.to_param()]]])
}

/// Parameters for listing the devices of an instance.
pub fn device_list_params(id: &InstanceId) -> Value {
    json!([id.to_param()])
}

/// Parameters for creating an instance with its initial device set.
///
/// Caller-supplied `create_params` are merged in first, so `name` and
/// `devices` always reflect the specification.
pub fn create_params(spec: &InstanceSpec) -> ConvergeResult<Value> {
    let mut body = spec.create_params.clone();
    let name_key = match spec.kind {
        InstanceKind::App => "app_name",
        InstanceKind::Vm | InstanceKind::Container => "name",
    };
    body.insert(name_key.to_string(), Value::from(spec.name.as_str()));

    if spec.kind.supports_devices() {
        let devices = spec
            .devices
            .iter()
            .map(|device| embedded_device(spec.kind, device))
            .collect::<ConvergeResult<Vec<_>>>()?;
        body.insert("devices".to_string(), Value::Array(devices));
    }
    Ok(json!([body]))
}

pub fn start_params(id: &InstanceId) -> Value {
    json!([id.to_param()])
}

/// Parameters for a graceful stop bounded by `shutdown_timeout`.
///
/// Apps take no shutdown hint.
pub fn stop_params(kind: InstanceKind, id: &InstanceId, shutdown_timeout: Duration) -> Value {
    let secs = shutdown_timeout.as_secs();
    match kind {
        InstanceKind::Vm => json!([
            id.to_param(),
            {"force": false, "force_after_timeout": true, "timeout": secs}
        ]),
        InstanceKind::Container => json!([id.to_param(), {"timeout": secs, "force": true}]),
        InstanceKind::App => json!([id.to_param()]),
    }
}

pub fn delete_params(kind: InstanceKind, id: &InstanceId) -> Value {
    match kind {
        InstanceKind::Vm => json!([id.to_param(), {"zvols": false, "force": false}]),
        InstanceKind::Container | InstanceKind::App => json!([id.to_param()]),
    }
}
