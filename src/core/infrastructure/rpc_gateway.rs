//! The narrow contract through which the core talks to the remote API.

use crate::core::domain::{
    error::ConvergeResult,
    model::instance::{CallMode, RemoteMethod},
};
use async_trait::async_trait;
use serde_json::Value;

/// Issues calls against the remote management API.
///
/// Method names and parameter shapes are opaque to the gateway. Implementors
/// must not retry failed calls; every error is surfaced to the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RpcGateway: Send + Sync {
    /// Invokes a method that completes immediately and returns its raw result.
    async fn call(&self, method: &str, params: Value) -> ConvergeResult<Value>;

    /// Invokes a method that runs as an asynchronous job on the remote side and
    /// waits until the job succeeds or fails. Returns the job's result.
    async fn call_and_wait(&self, method: &str, params: Value) -> ConvergeResult<Value>;
}

/// Invokes `method` the way its call mode requires.
pub(crate) async fn invoke<G>(gateway: &G, method: RemoteMethod, params: Value) -> ConvergeResult<Value>
where
    G: RpcGateway + ?Sized,
{
    match method.mode {
        CallMode::Immediate => gateway.call(method.name, params).await,
        CallMode::Job => gateway.call_and_wait(method.name, params).await,
    }
}
