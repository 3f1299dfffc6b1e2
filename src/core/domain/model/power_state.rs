//! Power states reported by the remote API and the states a caller may request.

use crate::core::domain::{
    error::{ConvergeError, ConvergeResult},
    model::instance::InstanceKind,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An observed power state.
///
/// `Starting` and `Stopping` are transient. `Crashed` is only reported by
/// app-like instances, where it counts as stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    Running,
    Stopped,
    Starting,
    Stopping,
    Crashed,
}

impl PowerState {
    /// Parses a remote status string for the given kind of instance.
    ///
    /// # Errors
    /// Returns `ConvergeError::Parse` for a status the kind never reports.
    pub fn parse(kind: InstanceKind, raw: &str) -> ConvergeResult<Self> {
        let state = match (kind, raw.to_ascii_uppercase().as_str()) {
            (_, "RUNNING") => PowerState::Running,
            (_, "STOPPED") => PowerState::Stopped,
            (_, "STOPPING") => PowerState::Stopping,
            (_, "STARTING") => PowerState::Starting,
            (InstanceKind::App, "DEPLOYING") => PowerState::Starting,
            (InstanceKind::App, "CRASHED") => PowerState::Crashed,
            (InstanceKind::Vm, "SUSPENDED") => PowerState::Stopping,
            (_, other) => {
                return Err(ConvergeError::Parse(format!(
                    "unknown {} status '{}'",
                    kind, other
                )));
            }
        };
        Ok(state)
    }

    /// Returns true if no further transition is expected without caller action.
    #[must_use]
    pub fn is_stable(self, kind: InstanceKind) -> bool {
        match self {
            PowerState::Running | PowerState::Stopped => true,
            PowerState::Crashed => kind == InstanceKind::App,
            PowerState::Starting | PowerState::Stopping => false,
        }
    }

    /// Returns true if this state already satisfies the desired one.
    #[must_use]
    pub fn satisfies(self, desired: DesiredState) -> bool {
        self == desired.as_power_state()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PowerState::Running => "RUNNING",
            PowerState::Stopped => "STOPPED",
            PowerState::Starting => "STARTING",
            PowerState::Stopping => "STOPPING",
            PowerState::Crashed => "CRASHED",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The power state a caller asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DesiredState {
    Running,
    Stopped,
}

impl DesiredState {
    #[must_use]
    pub fn as_power_state(self) -> PowerState {
        match self {
            DesiredState::Running => PowerState::Running,
            DesiredState::Stopped => PowerState::Stopped,
        }
    }

    /// The intent implied by an observed state, used when a caller has none.
    #[must_use]
    pub fn from_observed(state: PowerState) -> Self {
        match state {
            PowerState::Running | PowerState::Starting => DesiredState::Running,
            PowerState::Stopped | PowerState::Stopping | PowerState::Crashed => {
                DesiredState::Stopped
            }
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_power_state().fmt(f)
    }
}
