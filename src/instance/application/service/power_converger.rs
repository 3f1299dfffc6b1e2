//! Drives an instance to a desired power state and waits for it to settle.

use crate::{
    core::{
        domain::{
            error::{ConvergeError, ConvergeResult},
            model::{
                converge_config::ConvergeConfig,
                instance::InstanceKind,
                power_state::{DesiredState, PowerState},
            },
            value_object::InstanceId,
        },
        infrastructure::rpc_gateway::{RpcGateway, invoke},
    },
    instance::application::{request::instance_request, service::state_refresher},
};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Power-state convergence for one instance.
///
/// A transition is issued only when the current state differs from the
/// desired one. After the transition call returns, the observed state is
/// polled until it is stable for the instance kind or the timeout passes.
pub struct PowerConverger<'a, G: RpcGateway + ?Sized> {
    gateway: &'a G,
    config: &'a ConvergeConfig,
    kind: InstanceKind,
    instance_id: &'a InstanceId,
}

impl<'a, G: RpcGateway + ?Sized> PowerConverger<'a, G> {
    pub fn new(
        gateway: &'a G,
        config: &'a ConvergeConfig,
        kind: InstanceKind,
        instance_id: &'a InstanceId,
    ) -> Self {
        Self {
            gateway,
            config,
            kind,
            instance_id,
        }
    }

    /// Converges from `current` to `desired` and returns the state reached.
    ///
    /// If `current` is transient, the engine first waits for it to settle so
    /// that a transition is never issued against a moving target. Both waits
    /// share one deadline, `timeout` after the call.
    ///
    /// # Errors
    /// - the transition call's own error, without polling
    /// - `ConvergeError::Timeout` if no stable state is seen within `timeout`
    /// - `ConvergeError::WrongTerminalState` if a stable state other than
    ///   `desired` is reached
    /// - `ConvergeError::Cancelled` if `cancel` fires while waiting
    pub async fn reconcile(
        &self,
        current: PowerState,
        desired: DesiredState,
        timeout: Duration,
        shutdown_timeout: Duration,
        cancel: &CancellationToken,
    ) -> ConvergeResult<PowerState> {
        if current.satisfies(desired) {
            debug!(instance = %self.instance_id, state = %current, "power state already converged");
            return Ok(current);
        }

        let started = Instant::now();
        let deadline = started + timeout;
        let interval = self.config.poll_interval_for(timeout);

        let current = if current.is_stable(self.kind) {
            current
        } else {
            info!(instance = %self.instance_id, state = %current, "waiting for transient state to settle");
            let settled = self.poll_until(started, deadline, interval, cancel).await?;
            if settled.satisfies(desired) {
                return Ok(settled);
            }
            settled
        };

        info!(
            instance = %self.instance_id,
            from = %current,
            to = %desired,
            "issuing power transition"
        );
        self.transition(desired, shutdown_timeout).await?;

        let reached = self.poll_until(started, deadline, interval, cancel).await?;
        if !reached.satisfies(desired) {
            return Err(ConvergeError::WrongTerminalState { reached, desired });
        }
        info!(instance = %self.instance_id, state = %reached, "power state converged");
        Ok(reached)
    }

    /// Issues the start or stop call for `desired`.
    async fn transition(&self, desired: DesiredState, shutdown_timeout: Duration) -> ConvergeResult<()> {
        let methods = self.kind.methods();
        match desired {
            DesiredState::Running => {
                let params = instance_request::start_params(self.instance_id);
                invoke(self.gateway, methods.start, params).await?;
            }
            DesiredState::Stopped => {
                let params =
                    instance_request::stop_params(self.kind, self.instance_id, shutdown_timeout);
                invoke(self.gateway, methods.stop, params).await?;
            }
        }
        Ok(())
    }

    /// Polls the observed power state until it is stable or `timeout` passes.
    ///
    /// The first query happens one interval after the call. A timeout is only
    /// reported after a query made at or past the deadline.
    pub async fn wait_for_stable_state(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ConvergeResult<PowerState> {
        let started = Instant::now();
        let interval = self.config.poll_interval_for(timeout);
        self.poll_until(started, started + timeout, interval, cancel).await
    }

    async fn poll_until(
        &self,
        started: Instant,
        deadline: Instant,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> ConvergeResult<PowerState> {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ConvergeError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }

            let state = self.query_state().await?;
            debug!(instance = %self.instance_id, state = %state, "polled power state");
            if state.is_stable(self.kind) {
                return Ok(state);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ConvergeError::Timeout {
                    state,
                    elapsed: now - started,
                });
            }
        }
    }

    async fn query_state(&self) -> ConvergeResult<PowerState> {
        state_refresher::query_instance(self.gateway, self.kind, self.instance_id)
            .await?
            .map(|record| record.power)
            .ok_or_else(|| {
                ConvergeError::NotFound(format!(
                    "{} '{}' disappeared while waiting for a stable state",
                    self.kind, self.instance_id
                ))
            })
    }
}
