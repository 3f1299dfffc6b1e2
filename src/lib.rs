mod core;
mod instance;

#[cfg(test)]
mod tests;

pub use crate::core::{
    domain::{
        error::{ConvergeError, ConvergeResult, DeviceOperation, ValidationError},
        model::{
            converge_config::{ConvergeConfig, RateLimitConfig},
            device::{
                CdromDevice, Device, DeviceKind, DeviceSpec, DiskDevice, DisplayDevice, MatchKey,
                NicDevice, NicType, PciDevice, Protocol, ProxyDevice, RawDevice, UsbDevice,
            },
            instance::{InstanceKind, InstanceSpec, ObservedState},
            power_state::{DesiredState, PowerState},
        },
        value_object::{ApiKey, DeviceIdentity, EndpointUrl, InstanceId},
    },
    infrastructure::{
        api_client::{HttpRpcGateway, HttpRpcGatewayBuilder},
        rpc_gateway::RpcGateway,
    },
};
pub use crate::instance::application::service::{
    device_reconciler::{DeviceReconciler, ReconcileSummary},
    identity_matcher::IdentityMatcher,
    power_converger::PowerConverger,
    state_refresher::{fetch, refresh},
};
pub use tokio_util::sync::CancellationToken;

use crate::{
    core::infrastructure::rpc_gateway::invoke,
    instance::application::{
        request::instance_request,
        response::instance_response,
        service::state_refresher,
    },
};
use tracing::info;

/// Drives remotely managed instances towards their desired specification
///
/// One manager wraps one gateway. Each operation takes the caller's
/// `InstanceSpec` and, on success, replaces it with the refreshed view of the
/// instance: observed power state and devices from the remote, caller-only
/// fields (desired state, timeouts, create parameters) carried over.
///
/// Operations on distinct instances may run concurrently; a single spec must
/// not be applied twice at once.
///
/// # Examples
///
/// ```no_run
/// use instance_converge::{
///     CancellationToken, ConvergeResult, DesiredState, HttpRpcGateway, InstanceKind,
///     InstanceManager, InstanceSpec,
/// };
///
/// #[tokio::main]
/// async fn main() -> ConvergeResult<()> {
///     let gateway = HttpRpcGateway::builder()
///         .endpoint("https://nas.example.com")
///         .api_key("1-abcdef")
///         .build()?;
///     let manager = InstanceManager::new(gateway);
///
///     let mut spec = InstanceSpec::new(InstanceKind::Container, "web")
///         .with_desired_state(DesiredState::Running);
///     manager.create(&mut spec, &CancellationToken::new()).await?;
///     Ok(())
/// }
/// ```
pub struct InstanceManager<G: RpcGateway> {
    gateway: G,
    config: ConvergeConfig,
}

impl<G: RpcGateway> InstanceManager<G> {
    /// Creates a manager with the default polling configuration
    pub fn new(gateway: G) -> Self {
        Self::with_config(gateway, ConvergeConfig::default())
    }

    pub fn with_config(gateway: G, config: ConvergeConfig) -> Self {
        Self { gateway, config }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn config(&self) -> &ConvergeConfig {
        &self.config
    }

    /// Creates the instance described by `spec`
    ///
    /// The device set is embedded in the create call. Afterwards the
    /// identities the remote assigned are matched back onto the unnamed
    /// devices, the power state is converged if a desired state is set, and
    /// `spec` is refreshed from a final read.
    ///
    /// # Errors
    ///
    /// This method will return an error if:
    /// - The specification does not validate
    /// - The create call fails or its response carries no id
    /// - The instance cannot be found after creation
    /// - Power convergence fails, times out or is cancelled
    pub async fn create(
        &self,
        spec: &mut InstanceSpec,
        cancel: &CancellationToken,
    ) -> ConvergeResult<()> {
        spec.validate()?;
        let kind = spec.kind;
        info!(instance = %spec.name, kind = %kind, "creating instance");

        let params = instance_request::create_params(spec)?;
        let raw = invoke(&self.gateway, kind.methods().create, params).await?;
        let id = instance_response::parse_created_id(kind, &spec.name, &raw)?;
        spec.id = Some(id.clone());

        let observed = self.fetch_required(spec, &id, "after create").await?;
        if kind.uses_numeric_device_ids() {
            // A fresh instance has fresh device ids; anything carried in is stale.
            for device in &mut spec.devices {
                device.identity = None;
            }
        }
        IdentityMatcher::assign(&mut spec.devices, &observed.devices);

        if let Some(desired) = spec.desired_state {
            self.power_converger(kind, &id)
                .reconcile(
                    observed.power,
                    desired,
                    spec.state_timeout,
                    spec.shutdown_timeout,
                    cancel,
                )
                .await?;
        }

        let observed = self.fetch_required(spec, &id, "after create").await?;
        *spec = state_refresher::refresh(spec, observed);
        info!(instance = %spec.name, id = %id, "instance created");
        Ok(())
    }

    /// Applies `spec` to an existing instance
    ///
    /// Devices are reconciled first, then the power state. Both steps are
    /// no-ops when the instance already matches.
    ///
    /// # Errors
    ///
    /// This method will return an error if:
    /// - The specification does not validate or carries no id
    /// - The instance no longer exists
    /// - A device operation fails; operations already applied are kept
    /// - Power convergence fails, times out or is cancelled
    pub async fn apply(
        &self,
        spec: &mut InstanceSpec,
        cancel: &CancellationToken,
    ) -> ConvergeResult<()> {
        spec.validate()?;
        let kind = spec.kind;
        let id = spec.require_id()?.clone();
        info!(instance = %spec.name, id = %id, "applying instance specification");

        let observed = self.fetch_required(spec, &id, "").await?;

        if kind.supports_devices() {
            DeviceReconciler::new(&self.gateway, kind, &id)?
                .reconcile(&mut spec.devices, &observed.devices)
                .await?;
        }

        if let Some(desired) = spec.desired_state {
            self.power_converger(kind, &id)
                .reconcile(
                    observed.power,
                    desired,
                    spec.state_timeout,
                    spec.shutdown_timeout,
                    cancel,
                )
                .await?;
        }

        let observed = self.fetch_required(spec, &id, "after update").await?;
        *spec = state_refresher::refresh(spec, observed);
        Ok(())
    }

    /// Reads the current state of the instance behind `spec`
    ///
    /// Returns `Ok(None)` if the instance no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if `spec` carries no id or the query fails.
    pub async fn read(&self, spec: &InstanceSpec) -> ConvergeResult<Option<InstanceSpec>> {
        let id = spec.require_id()?;
        let observed = state_refresher::fetch(&self.gateway, spec.kind, id).await?;
        Ok(observed.map(|observed| state_refresher::refresh(spec, observed)))
    }

    /// Deletes the instance behind `spec`, stopping it first if it runs.
    ///
    /// An instance caught mid-transition is waited out; it is stopped only if
    /// it settles running.
    ///
    /// Deleting an instance that is already gone succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if `spec` carries no id, the stop does not converge,
    /// or the delete call fails.
    pub async fn delete(&self, spec: &InstanceSpec, cancel: &CancellationToken) -> ConvergeResult<()> {
        let kind = spec.kind;
        let id = spec.require_id()?;
        let Some(observed) = state_refresher::fetch(&self.gateway, kind, id).await? else {
            info!(instance = %spec.name, id = %id, "instance already gone");
            return Ok(());
        };

        // A transient state is waited out before deciding whether to stop.
        if matches!(
            observed.power,
            PowerState::Running | PowerState::Starting | PowerState::Stopping
        ) {
            self.power_converger(kind, id)
                .reconcile(
                    observed.power,
                    DesiredState::Stopped,
                    spec.state_timeout,
                    spec.shutdown_timeout,
                    cancel,
                )
                .await?;
        }

        info!(instance = %spec.name, id = %id, "deleting instance");
        invoke(
            &self.gateway,
            kind.methods().delete,
            instance_request::delete_params(kind, id),
        )
        .await?;
        Ok(())
    }

    fn power_converger<'a>(&'a self, kind: InstanceKind, id: &'a InstanceId) -> PowerConverger<'a, G> {
        PowerConverger::new(&self.gateway, &self.config, kind, id)
    }

    async fn fetch_required(
        &self,
        spec: &InstanceSpec,
        id: &InstanceId,
        context: &str,
    ) -> ConvergeResult<ObservedState> {
        state_refresher::fetch(&self.gateway, spec.kind, id)
            .await?
            .ok_or_else(|| {
                ConvergeError::NotFound(
                    format!("instance '{}' not found {}", spec.name, context)
                        .trim_end()
                        .to_string(),
                )
            })
    }
}
