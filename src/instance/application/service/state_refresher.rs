//! Observed-state fetch and the mapping of a fresh snapshot back onto a spec.

use crate::{
    core::{
        domain::{
            error::ConvergeResult,
            model::{
                device::{Device, DeviceSpec},
                instance::{InstanceKind, InstanceSpec, ObservedState},
                power_state::DesiredState,
            },
            value_object::InstanceId,
        },
        infrastructure::rpc_gateway::{RpcGateway, invoke},
    },
    instance::application::{
        request::instance_request,
        response::{
            device_response,
            instance_response::{self, InstanceRecord},
        },
    },
};
use std::collections::HashMap;
use tracing::debug;

/// Queries one instance; `None` means it no longer exists.
pub(crate) async fn query_instance<G: RpcGateway + ?Sized>(
    gateway: &G,
    kind: InstanceKind,
    id: &InstanceId,
) -> ConvergeResult<Option<InstanceRecord>> {
    let methods = kind.methods();
    let raw = invoke(gateway, methods.query, instance_request::query_params(kind, id)).await?;
    instance_response::parse_query(kind, &raw)
}

/// Fetches the observed state of one instance.
///
/// Kinds whose query omits devices get a second listing call.
pub async fn fetch<G: RpcGateway + ?Sized>(
    gateway: &G,
    kind: InstanceKind,
    id: &InstanceId,
) -> ConvergeResult<Option<ObservedState>> {
    let Some(record) = query_instance(gateway, kind, id).await? else {
        debug!(instance = %id, "instance not found");
        return Ok(None);
    };

    let devices = match kind.methods().devices.as_ref().and_then(|d| d.list) {
        Some(list) => {
            let raw = invoke(gateway, list, instance_request::device_list_params(&record.id)).await?;
            device_response::parse_devices(kind, &raw)?
        }
        None => record.devices,
    };

    Ok(Some(ObservedState {
        id: record.id,
        power: record.power,
        devices,
    }))
}

/// Builds the instance specification to store after a read.
///
/// Caller-only fields (desired state, timeouts, create parameters) come from
/// `prior`; an unknown desired state is taken from what was observed. The
/// observed power state is always the fresh one.
///
/// Devices are the observed set. Devices `prior` already tracked keep their
/// position; devices the remote added are appended in observed order.
/// Write-only attributes the remote never echoes are carried from `prior`.
#[must_use]
pub fn refresh(prior: &InstanceSpec, observed: ObservedState) -> InstanceSpec {
    let desired_state = prior
        .desired_state
        .unwrap_or_else(|| DesiredState::from_observed(observed.power));

    InstanceSpec {
        id: Some(observed.id),
        name: prior.name.clone(),
        kind: prior.kind,
        devices: merge_devices(&prior.devices, observed.devices),
        desired_state: Some(desired_state),
        observed_state: Some(observed.power),
        state_timeout: prior.state_timeout,
        shutdown_timeout: prior.shutdown_timeout,
        create_params: prior.create_params.clone(),
    }
}

fn merge_devices(prior: &[DeviceSpec], observed: Vec<DeviceSpec>) -> Vec<DeviceSpec> {
    let mut fresh: Vec<Option<DeviceSpec>> = observed.into_iter().map(Some).collect();
    let position: HashMap<_, _> = fresh
        .iter()
        .enumerate()
        .filter_map(|(i, spec)| spec.as_ref()?.identity.clone().map(|id| (id, i)))
        .collect();

    let mut merged = Vec::with_capacity(fresh.len());
    for tracked in prior {
        let Some(index) = tracked.identity.as_ref().and_then(|id| position.get(id)) else {
            continue;
        };
        if let Some(mut spec) = fresh[*index].take() {
            carry_write_only(&tracked.device, &mut spec.device);
            merged.push(spec);
        }
    }
    merged.extend(fresh.into_iter().flatten());
    merged
}

fn carry_write_only(prior: &Device, observed: &mut Device) {
    if let (Device::Display(before), Device::Display(after)) = (prior, observed) {
        if after.password.is_none() {
            after.password.clone_from(&before.password);
        }
    }
}
