//! Moves the observed device set of an instance to the desired one.

use crate::{
    core::{
        domain::{
            error::{ConvergeResult, DeviceOperation, ValidationError},
            model::{
                device::{DeviceKind, DeviceSpec},
                instance::{DeviceMethods, InstanceKind},
            },
            value_object::{DeviceIdentity, InstanceId},
        },
        infrastructure::rpc_gateway::{RpcGateway, invoke},
    },
    instance::application::{request::device_request, response::device_response},
};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// Counts of the device operations one reconciliation issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl ReconcileSummary {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Computes and applies the device operations for one instance.
///
/// Operations run strictly one at a time: all deletes first, then creates and
/// updates kind by kind. The first failure aborts the remaining operations;
/// nothing already applied is undone.
pub struct DeviceReconciler<'a, G: RpcGateway + ?Sized> {
    gateway: &'a G,
    kind: InstanceKind,
    instance_id: &'a InstanceId,
    methods: &'static DeviceMethods,
}

impl<'a, G: RpcGateway + ?Sized> DeviceReconciler<'a, G> {
    /// Creates a reconciler for one instance.
    ///
    /// # Errors
    /// Returns `ValidationError` if the instance kind has no devices.
    pub fn new(
        gateway: &'a G,
        kind: InstanceKind,
        instance_id: &'a InstanceId,
    ) -> ConvergeResult<Self> {
        let methods = kind.methods().devices.as_ref().ok_or_else(|| {
            ValidationError::ConstraintViolation(format!("{} instances do not support devices", kind))
        })?;
        Ok(Self {
            gateway,
            kind,
            instance_id,
            methods,
        })
    }

    /// Reconciles `state` towards `plan`.
    ///
    /// Identities the server assigns to created VM-style devices are written
    /// back onto the matching `plan` entries.
    pub async fn reconcile(
        &self,
        plan: &mut [DeviceSpec],
        state: &[DeviceSpec],
    ) -> ConvergeResult<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();

        for identity in Self::deletions(plan, state) {
            self.delete(identity).await?;
            summary.deleted += 1;
        }

        let observed: HashMap<&DeviceIdentity, &DeviceSpec> = state
            .iter()
            .filter_map(|spec| spec.identity.as_ref().map(|id| (id, spec)))
            .collect();

        for kind in DeviceKind::ALL {
            for entry in plan.iter_mut().filter(|spec| spec.kind() == kind) {
                let current = entry.identity.as_ref().and_then(|id| observed.get(id));
                match current {
                    None => {
                        self.create(entry).await?;
                        summary.created += 1;
                    }
                    Some(current) if entry.device.differs_from(&current.device) => {
                        self.update(entry).await?;
                        summary.updated += 1;
                    }
                    Some(_) => {
                        debug!(identity = %entry.identity_label(), "device unchanged");
                    }
                }
            }
        }

        info!(
            instance = %self.instance_id,
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            "device set reconciled"
        );
        Ok(summary)
    }

    /// Identities observed but no longer desired, in sorted order.
    fn deletions<'s>(plan: &[DeviceSpec], state: &'s [DeviceSpec]) -> BTreeSet<&'s DeviceIdentity> {
        let wanted: HashSet<&DeviceIdentity> =
            plan.iter().filter_map(|spec| spec.identity.as_ref()).collect();
        state
            .iter()
            .filter_map(|spec| spec.identity.as_ref())
            .filter(|identity| !wanted.contains(identity))
            .collect()
    }

    async fn delete(&self, identity: &DeviceIdentity) -> ConvergeResult<()> {
        info!(instance = %self.instance_id, identity = %identity, "deleting device");
        let params = device_request::delete_params(self.kind, self.instance_id, identity);
        invoke(self.gateway, self.methods.delete, params)
            .await
            .map_err(|e| e.for_device(DeviceOperation::Delete, identity.to_string()))?;
        Ok(())
    }

    async fn create(&self, entry: &mut DeviceSpec) -> ConvergeResult<()> {
        info!(
            instance = %self.instance_id,
            kind = %entry.kind(),
            identity = %entry.identity_label(),
            "creating device"
        );
        let label = entry.identity_label();
        let response = async {
            let params = device_request::create_params(self.kind, self.instance_id, entry)?;
            invoke(self.gateway, self.methods.create, params).await
        }
        .await
        .map_err(|e| e.for_device(DeviceOperation::Create, label))?;

        if let Some(identity) = device_response::parse_created_identity(self.kind, &response) {
            debug!(identity = %identity, "server assigned device identity");
            entry.identity = Some(identity);
        }
        Ok(())
    }

    async fn update(&self, entry: &DeviceSpec) -> ConvergeResult<()> {
        let label = entry.identity_label();
        info!(instance = %self.instance_id, identity = %label, "updating device");
        let result = async {
            let identity = entry.identity.as_ref().ok_or_else(|| {
                ValidationError::Field {
                    field: "device.identity".to_string(),
                    message: "Cannot update a device without identity".to_string(),
                }
            })?;
            let params =
                device_request::update_params(self.kind, self.instance_id, identity, &entry.device)?;
            invoke(self.gateway, self.methods.update, params).await
        }
        .await;
        result.map_err(|e| e.for_device(DeviceOperation::Update, label))?;
        Ok(())
    }
}
