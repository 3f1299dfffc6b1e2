//! Domain models for managed instances: the desired specification, the
//! observed snapshot, and the per-kind remote method table.

use crate::core::domain::{
    error::{ConvergeResult, ValidationError},
    model::{
        device::DeviceSpec,
        power_state::{DesiredState, PowerState},
    },
    value_object::{DeviceIdentity, InstanceId, serde_helpers::duration_secs},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_STATE_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(90);

/// The kinds of remotely managed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceKind {
    /// A virtual machine. Devices carry server-assigned numeric ids.
    Vm,
    /// A container or container-style instance. Devices are addressed by name.
    Container,
    /// An app-like workload. Has no devices; `Crashed` is a stable state.
    App,
}

/// Whether a remote method returns immediately or runs as a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    Immediate,
    Job,
}

/// A remote method name together with how it must be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMethod {
    pub name: &'static str,
    pub mode: CallMode,
}

const fn immediate(name: &'static str) -> RemoteMethod {
    RemoteMethod {
        name,
        mode: CallMode::Immediate,
    }
}

const fn job(name: &'static str) -> RemoteMethod {
    RemoteMethod {
        name,
        mode: CallMode::Job,
    }
}

/// Device methods of a kind that supports devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMethods {
    /// Separate listing call, for kinds whose query omits devices.
    pub list: Option<RemoteMethod>,
    pub create: RemoteMethod,
    pub update: RemoteMethod,
    pub delete: RemoteMethod,
}

/// The remote method table of one instance kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMethods {
    pub query: RemoteMethod,
    /// Field the query filter matches the instance id against.
    pub query_field: &'static str,
    pub create: RemoteMethod,
    pub delete: RemoteMethod,
    pub start: RemoteMethod,
    pub stop: RemoteMethod,
    pub devices: Option<DeviceMethods>,
}

const VM_METHODS: RemoteMethods = RemoteMethods {
    query: immediate("vm.query"),
    query_field: "id",
    create: immediate("vm.create"),
    delete: immediate("vm.delete"),
    start: immediate("vm.start"),
    stop: job("vm.stop"),
    devices: Some(DeviceMethods {
        list: None,
        create: immediate("vm.device.create"),
        update: immediate("vm.device.update"),
        delete: immediate("vm.device.delete"),
    }),
};

const CONTAINER_METHODS: RemoteMethods = RemoteMethods {
    query: immediate("virt.instance.query"),
    query_field: "id",
    create: job("virt.instance.create"),
    delete: job("virt.instance.delete"),
    start: job("virt.instance.start"),
    stop: job("virt.instance.stop"),
    devices: Some(DeviceMethods {
        list: Some(immediate("virt.instance.device_list")),
        create: immediate("virt.instance.device_add"),
        update: immediate("virt.instance.device_update"),
        delete: immediate("virt.instance.device_delete"),
    }),
};

const APP_METHODS: RemoteMethods = RemoteMethods {
    query: immediate("app.query"),
    query_field: "name",
    create: job("app.create"),
    delete: job("app.delete"),
    start: job("app.start"),
    stop: job("app.stop"),
    devices: None,
};

impl InstanceKind {
    #[must_use]
    pub fn methods(self) -> &'static RemoteMethods {
        match self {
            InstanceKind::Vm => &VM_METHODS,
            InstanceKind::Container => &CONTAINER_METHODS,
            InstanceKind::App => &APP_METHODS,
        }
    }

    #[must_use]
    pub fn supports_devices(self) -> bool {
        self.methods().devices.is_some()
    }

    /// True if the remote assigns numeric device ids and returns the created
    /// record from a device create.
    #[must_use]
    pub fn uses_numeric_device_ids(self) -> bool {
        self == InstanceKind::Vm
    }
}

impl fmt::Display for InstanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKind::Vm => write!(f, "vm"),
            InstanceKind::Container => write!(f, "container"),
            InstanceKind::App => write!(f, "app"),
        }
    }
}

/// The desired configuration of one instance.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InstanceSpec {
    /// Assigned by the remote after creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<InstanceId>,
    pub name: String,
    pub kind: InstanceKind,
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
    /// `None` when the intent is unknown, e.g. right after import.
    #[serde(default)]
    pub desired_state: Option<DesiredState>,
    /// Computed; only ever written from a fresh query.
    #[serde(default)]
    pub observed_state: Option<PowerState>,
    #[serde(with = "duration_secs")]
    pub state_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub shutdown_timeout: Duration,
    /// Remote creation attributes passed through verbatim.
    #[serde(default)]
    pub create_params: serde_json::Map<String, serde_json::Value>,
}

impl InstanceSpec {
    pub fn new(kind: InstanceKind, name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind,
            devices: Vec::new(),
            desired_state: None,
            observed_state: None,
            state_timeout: DEFAULT_STATE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            create_params: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<InstanceId>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_device(mut self, device: DeviceSpec) -> Self {
        self.devices.push(device);
        self
    }

    #[must_use]
    pub fn with_desired_state(mut self, state: DesiredState) -> Self {
        self.desired_state = Some(state);
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, state_timeout: Duration, shutdown_timeout: Duration) -> Self {
        self.state_timeout = state_timeout;
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    #[must_use]
    pub fn with_create_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.create_params.insert(key.into(), value.into());
        self
    }

    /// Returns the instance id, or a validation error if it is not known yet.
    pub(crate) fn require_id(&self) -> ConvergeResult<&InstanceId> {
        self.id.as_ref().ok_or_else(|| {
            ValidationError::Field {
                field: "id".to_string(),
                message: format!("Instance '{}' has no remote id yet", self.name),
            }
            .into()
        })
    }

    /// Checks the specification before anything is sent to the remote.
    ///
    /// # Errors
    /// Returns `ValidationError` if the name is empty, devices are given for
    /// a kind without devices, an identity does not fit the kind, or two
    /// devices share an identity.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Field {
                field: "name".to_string(),
                message: "Instance name cannot be empty".to_string(),
            });
        }

        if !self.kind.supports_devices() && !self.devices.is_empty() {
            return Err(ValidationError::ConstraintViolation(format!(
                "{} instances do not support devices",
                self.kind
            )));
        }

        let mut seen = HashSet::new();
        for spec in &self.devices {
            let Some(identity) = &spec.identity else {
                continue;
            };
            match (self.kind, identity) {
                (InstanceKind::Vm, DeviceIdentity::Name(name)) => {
                    return Err(ValidationError::ConstraintViolation(format!(
                        "vm devices are addressed by numeric id, got name '{}'",
                        name
                    )));
                }
                (InstanceKind::Container, DeviceIdentity::Id(id)) => {
                    return Err(ValidationError::ConstraintViolation(format!(
                        "container devices are addressed by name, got id {}",
                        id
                    )));
                }
                // Names read back from the remote are opaque keys; only emptiness is checked.
                (_, DeviceIdentity::Name(name)) if name.is_empty() => {
                    return Err(ValidationError::Field {
                        field: "device.name".to_string(),
                        message: "Device name cannot be empty".to_string(),
                    });
                }
                _ => {}
            }
            if !seen.insert(identity) {
                return Err(ValidationError::ConstraintViolation(format!(
                    "duplicate device identity '{}'",
                    identity
                )));
            }
        }
        Ok(())
    }
}

/// The last fetched truth about an instance. Replaced wholesale on every read.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedState {
    pub id: InstanceId,
    pub power: PowerState,
    pub devices: Vec<DeviceSpec>,
}
